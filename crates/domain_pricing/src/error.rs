//! Pricing domain errors

use thiserror::Error;

use core_kernel::{ClientId, LeaveType, MoneyError, PortError};

/// Errors that can occur while maintaining or resolving prices
#[derive(Debug, Error)]
pub enum PricingError {
    /// Caller supplied a value outside the domain (e.g. duration <= 0)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No tier matched at any step of the waterfall
    #[error("No price found for {leave_type} leave of {duration_days} day(s){}", client_suffix(.client_id))]
    NoPriceFound {
        leave_type: LeaveType,
        duration_days: u32,
        client_id: Option<ClientId>,
    },

    /// Arithmetic failure while prorating
    #[error("Calculation error: {0}")]
    Calculation(#[from] MoneyError),

    /// Price table unavailable or rejected the operation
    #[error(transparent)]
    Port(#[from] PortError),
}

fn client_suffix(client_id: &Option<ClientId>) -> String {
    match client_id {
        Some(id) => format!(" for client {}", id),
        None => String::new(),
    }
}

impl PricingError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        PricingError::InvalidInput(message.into())
    }
}
