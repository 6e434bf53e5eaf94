//! Billing domain errors

use thiserror::Error;

use core_kernel::{Money, MoneyError, PortError};

/// Errors that can occur in the billing domain
#[derive(Debug, Error)]
pub enum BillingError {
    /// Negative amounts, client mismatches, cancelled targets
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An allocation would exceed a payment's or an invoice's remaining room
    #[error("Over-allocation on {target}: requested {requested}, available {available}")]
    OverAllocation {
        target: String,
        requested: Money,
        available: Money,
    },

    /// A version check failed and the bounded retries were used up
    #[error("Concurrent modification of {entity_type} {id}")]
    ConcurrentModification {
        entity_type: String,
        id: String,
    },

    /// Invoice not found
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    /// Payment not found
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// Calculation error
    #[error("Calculation error: {0}")]
    Calculation(#[from] MoneyError),

    /// Storage failure
    #[error(transparent)]
    Port(PortError),
}

impl BillingError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        BillingError::InvalidInput(message.into())
    }

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::ConcurrentModification { .. })
    }

    /// Returns true if an insert hit a reference number already in use
    pub fn is_reference_clash(&self) -> bool {
        matches!(self, BillingError::Port(err) if err.is_conflict())
    }
}

impl From<PortError> for BillingError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } if entity_type == "Invoice" => {
                BillingError::InvoiceNotFound(id)
            }
            PortError::NotFound { entity_type, id } if entity_type == "Payment" => {
                BillingError::PaymentNotFound(id)
            }
            PortError::Stale { entity_type, id } => {
                BillingError::ConcurrentModification { entity_type, id }
            }
            other => BillingError::Port(other),
        }
    }
}
