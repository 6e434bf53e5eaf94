//! Repository layer
//!
//! One repository per aggregate. Repositories speak rows and
//! [`DatabaseError`](crate::DatabaseError); the adapters translate to domain
//! types at the port boundary.

pub mod pricing;
pub mod leave;
pub mod billing;

pub use pricing::{PriceTierRow, PricingRepository};
pub use leave::{LeaveRecordRepository, LeaveRecordRow};
pub use billing::{AllocationRow, BillingRepository, InvoiceRow, PaymentRow, ReferenceTable};
