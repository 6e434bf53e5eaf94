//! Clinic Billing Engine
//!
//! The inbound surface of the billing system. Controllers resolve prices,
//! issue invoices, record and allocate payments, and read balances through
//! [`BillingEngine`]; everything else in the workspace sits behind it.
//!
//! # Example
//!
//! ```rust,ignore
//! use billing_engine::{BillingEngine, EngineConfig};
//!
//! let config = EngineConfig::load()?;
//! let (engine, _pool) = BillingEngine::connect(&config).await?;
//! let price = engine.resolve_price(LeaveType::Sick, 5, Some(client_id)).await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod telemetry;

pub use config::{EngineConfig, LogFormat};
pub use engine::{BillingEngine, EnginePorts, EngineSettings, MaintenanceReport};
pub use error::EngineError;
pub use telemetry::init_tracing;
