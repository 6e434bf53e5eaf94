//! Core Kernel - Foundational types for the clinic billing engine
//!
//! This crate provides the building blocks shared by the pricing, leave and
//! billing domains:
//! - Money with precise decimal arithmetic (single currency)
//! - Strongly typed identifiers and the leave type catalogue
//! - Clinic clocks for deriving "today" in the clinic's timezone
//! - Port error types and the business reference-number generator

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod leave_type;
pub mod ports;
pub mod reference;
pub mod status;
pub mod error;

pub use money::{Money, MoneyError};
pub use temporal::{Clock, ClinicClock, FixedClock, DateRange, Timezone, TemporalError};
pub use identifiers::{
    ClientId, InvoiceId, PaymentId, AllocationId, LeaveId, PriceTierId,
};
pub use leave_type::LeaveType;
pub use ports::{PortError, DomainPort};
pub use reference::{ReferenceGenerator, ReferenceKind, ReferenceRegistry};
pub use status::StatusChange;
pub use error::CoreError;
