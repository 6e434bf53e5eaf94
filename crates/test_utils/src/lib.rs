//! Test Utilities Crate
//!
//! Shared test infrastructure for the clinic billing workspace.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built price tables, dates and references
//! - `builders`: Builders for invoices and leave records
//! - `database`: PostgreSQL testcontainer management
//! - `assertions`: Allocation and money assertions
//! - `generators`: Property-based strategies for allocation workloads

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
