//! Billing Domain - Invoices, payments and allocations
//!
//! This crate keeps a clinic's receivables consistent:
//!
//! - **Invoices** freeze a resolved price and derive their status from the
//!   money allocated to them
//! - **Payments** are split across a client's invoices by the
//!   [`PaymentAllocator`], which never lets a payment or an invoice be
//!   over-allocated
//! - **ClientLedger** recomputes a client's balance on demand
//!
//! # Consistency
//!
//! Multi-row changes are planned as an [`AllocationPlan`] and committed
//! atomically by a [`BillingStore`]. Invoices and payments carry a version;
//! a plan built from a stale read is rejected and the service retries from
//! a fresh read a bounded number of times.
//!
//! # Example
//!
//! ```rust,ignore
//! let outcome = allocator
//!     .record_payment(client_id, Money::new(dec!(600)), &[AllocationTarget::new(invoice.id, Money::new(dec!(600)))])
//!     .await?;
//! ```

pub mod invoice;
pub mod payment;
pub mod plan;
pub mod ports;
pub mod memory;
pub mod allocator;
pub mod invoicing;
pub mod ledger;
pub mod error;
mod retry;

pub use invoice::{derive_invoice_status, Invoice, InvoiceStatus};
pub use payment::{AllocationTarget, Payment, PaymentAllocation};
pub use plan::{AllocationContext, AllocationPlan, InvoiceBalance, InvoiceStatusChange, InvoiceUpdate, PaymentChange};
pub use ports::BillingStore;
pub use memory::InMemoryBillingStore;
pub use allocator::{AllocationOutcome, PaymentAllocator};
pub use invoicing::{InvoiceRefreshReport, InvoiceService};
pub use ledger::{ClientLedger, LedgerSummary};
pub use error::BillingError;
pub use retry::DEFAULT_MAX_ATTEMPTS;
