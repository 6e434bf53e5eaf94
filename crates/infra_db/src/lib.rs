//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the clinic billing engine using SQLx.
//!
//! # Architecture
//!
//! - `repositories` run the SQL and return row types
//! - `adapters` implement the domain ports (`PriceTierRepository`,
//!   `LeaveRepository`, `BillingStore`, `ReferenceRegistry`) on top of them
//!
//! Queries are built at runtime, so the crate compiles without a live
//! database. The schema lives in the workspace `migrations/` directory and
//! is applied by [`run_migrations`].
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresBillingStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/clinic")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresBillingStore::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use error::DatabaseError;
pub use adapters::{PostgresBillingStore, PostgresLeaveRepository, PostgresPriceTable};
