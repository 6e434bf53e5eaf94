//! Engine error handling

use thiserror::Error;

use domain_billing::BillingError;
use domain_leave::LeaveError;
use domain_pricing::PricingError;
use infra_db::DatabaseError;

/// Errors surfaced by the engine facade
///
/// Domain errors pass through unchanged so callers can still match on
/// `NoPriceFound`, `OverAllocation` and friends.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Leave(#[from] LeaveError),

    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

impl EngineError {
    pub fn config(message: impl Into<String>) -> Self {
        EngineError::Config(message.into())
    }

    /// True when no tier priced the requested leave
    pub fn is_no_price_found(&self) -> bool {
        matches!(self, EngineError::Pricing(PricingError::NoPriceFound { .. }))
    }
}
