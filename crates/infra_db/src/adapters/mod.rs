//! Domain Adapters
//!
//! PostgreSQL implementations of the domain ports. Each adapter wraps the
//! matching repository, converts rows to domain models and reports failures
//! as `PortError`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresBillingStore;
//! use domain_billing::BillingStore;
//!
//! let store: Arc<dyn BillingStore> = Arc::new(PostgresBillingStore::new(pool));
//! let invoice = store.get_invoice(invoice_id).await?;
//! ```

pub mod pricing;
pub mod leave;
pub mod billing;

pub use pricing::PostgresPriceTable;
pub use leave::PostgresLeaveRepository;
pub use billing::PostgresBillingStore;
