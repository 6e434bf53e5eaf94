//! Leave Domain - Leave records and their lifecycle
//!
//! A leave record holds the dates of a sick or companion leave, derives its
//! inclusive duration, and carries a status recomputed from the calendar:
//! `Active` until its last day has passed, then `Expired`. `Cancelled` is
//! entered only by command and survives every later refresh.

pub mod record;
pub mod ports;
pub mod service;
pub mod memory;
pub mod error;

pub use record::{derive_leave_status, LeaveRecord, LeaveStatus};
pub use ports::{LeaveRepository, LeaveStatusUpdate};
pub use service::{LeaveRefreshReport, LeaveService};
pub use memory::InMemoryLeaveRepository;
pub use error::LeaveError;
