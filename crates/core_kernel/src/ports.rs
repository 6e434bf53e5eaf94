//! Ports and Adapters Infrastructure
//!
//! Each domain crate defines its own port traits (`PriceTierRepository`,
//! `LeaveRepository`, `BillingStore`) that extend the marker trait here.
//! Adapters in `infra_db` implement them either against PostgreSQL or in
//! memory.
//!
//! ```text
//!        domain services (resolver, allocator, sweeps)
//!                          │
//!                          ▼
//!                 port traits (async)
//!                  ▲               ▲
//!        ┌─────────┴──────┐  ┌─────┴──────────┐
//!        │ Postgres (sqlx) │  │   In-memory    │
//!        └────────────────┘  └────────────────┘
//! ```

use std::fmt;
use thiserror::Error;

/// Error type for port operations
///
/// All adapters report failures through this type so the domain never sees
/// driver-specific errors.
#[derive(Debug, Error)]
pub enum PortError {
    /// The requested entity was not found
    #[error("Not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    /// A validation error occurred
    #[error("Validation error: {message}")]
    Validation {
        message: String,
    },

    /// The operation conflicts with existing data (unique keys)
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
    },

    /// An optimistic version check failed; the entity changed since it was read
    #[error("Stale {entity_type} {id}: modified concurrently")]
    Stale {
        entity_type: String,
        id: String,
    },

    /// Connection to the underlying system failed
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An internal error occurred
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PortError {
    /// Creates a NotFound error
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
        }
    }

    /// Creates a Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict {
            message: message.into(),
        }
    }

    /// Creates a Stale error
    pub fn stale(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::Stale {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Creates a Connection error
    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true if this error indicates a transient failure that may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Connection { .. })
    }

    /// Returns true if this error indicates the entity was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    /// Returns true if this error is a uniqueness conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, PortError::Conflict { .. })
    }

    /// Returns true if an optimistic version check failed
    pub fn is_stale(&self) -> bool {
        matches!(self, PortError::Stale { .. })
    }
}

/// Marker trait for all domain ports
///
/// All port traits extend this marker so they can be shared across tasks
/// behind an `Arc<dyn ...>`.
pub trait DomainPort: Send + Sync + 'static {}
