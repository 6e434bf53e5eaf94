//! Database error types
//!
//! Repositories report [`DatabaseError`]; adapters translate it to the
//! domain's `PortError` at the port boundary.

use core_kernel::PortError;
use thiserror::Error;

/// Errors that can occur during database operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Entity not found in database
    #[error("{entity} with id '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// A row's version no longer matches the one the caller read
    #[error("{entity} '{id}' was modified concurrently")]
    StaleVersion { entity: &'static str, id: String },

    /// Migration error
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be mapped back to the domain
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl DatabaseError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound { entity, id: id.to_string() }
    }

    pub fn stale(entity: &'static str, id: impl std::fmt::Display) -> Self {
        DatabaseError::StaleVersion { entity, id: id.to_string() }
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        DatabaseError::CorruptRow(message.into())
    }

    /// Checks if this error indicates a record was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound { .. })
    }

    /// Checks if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_)
                | DatabaseError::ForeignKeyViolation(_)
                | DatabaseError::ConstraintViolation(_)
        )
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted
        )
    }
}

/// Maps SQLx errors by PostgreSQL error code
///
/// See <https://www.postgresql.org/docs/current/errcodes-appendix.html>
impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::RowNotFound => DatabaseError::NotFound {
                entity: "Record",
                id: String::new(),
            },
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::Io(e) => DatabaseError::ConnectionFailed(e.to_string()),
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseError::DuplicateEntry(message),
                    Some("23503") => DatabaseError::ForeignKeyViolation(message),
                    Some("23514") => DatabaseError::ConstraintViolation(message),
                    _ => DatabaseError::QueryFailed(message),
                }
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(error.to_string())
    }
}

impl From<DatabaseError> for PortError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound { entity, id } => PortError::not_found(entity, id),
            DatabaseError::DuplicateEntry(msg) => PortError::conflict(msg),
            DatabaseError::StaleVersion { entity, id } => PortError::stale(entity, id),
            DatabaseError::ConstraintViolation(msg) | DatabaseError::ForeignKeyViolation(msg) => {
                PortError::validation(msg)
            }
            DatabaseError::ConnectionFailed(msg) => PortError::connection(msg),
            DatabaseError::PoolExhausted => PortError::connection("connection pool exhausted"),
            other => PortError::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_mapping() {
        let stale: PortError = DatabaseError::stale("Invoice", "INV-1").into();
        assert!(stale.is_stale());

        let missing: PortError = DatabaseError::not_found("Payment", "PAY-1").into();
        assert!(missing.is_not_found());

        let duplicate: PortError = DatabaseError::DuplicateEntry("invoices_reference_key".into()).into();
        assert!(duplicate.is_conflict());

        let pool: PortError = DatabaseError::PoolExhausted.into();
        assert!(pool.is_transient());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(DatabaseError::from(sqlx::Error::RowNotFound).is_not_found());
        assert!(DatabaseError::from(sqlx::Error::PoolTimedOut).is_connection_error());
    }
}
