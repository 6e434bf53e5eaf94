//! Database connection pool management

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

use crate::error::DatabaseError;

/// Type alias for the PostgreSQL connection pool
pub type DatabasePool = PgPool;

/// Configuration options for the database connection pool
///
/// # Example
///
/// ```rust
/// use infra_db::DatabaseConfig;
/// use std::time::Duration;
///
/// let config = DatabaseConfig::new("postgres://localhost/clinic")
///     .max_connections(20)
///     .min_connections(5)
///     .connect_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Maximum lifetime of a connection
    pub max_lifetime: Duration,
    /// Idle timeout before closing a connection
    pub idle_timeout: Duration,
}

impl DatabaseConfig {
    /// Creates a configuration with default pool sizing for `url`
    ///
    /// # Arguments
    ///
    /// * `url` - Connection string of the billing database
    ///
    /// # Returns
    ///
    /// 10 connections at most, 2 kept open, a 30s connect timeout, 30 min
    /// connection lifetime and 10 min idle timeout
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout: Duration::from_secs(30),
            max_lifetime: Duration::from_secs(30 * 60),
            idle_timeout: Duration::from_secs(10 * 60),
        }
    }

    /// Caps the pool size
    ///
    /// # Arguments
    ///
    /// * `max` - Upper bound on open connections (default: 10)
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets how many connections stay open while idle
    ///
    /// # Arguments
    ///
    /// * `min` - Connections kept warm (default: 2)
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Bounds the wait for a free connection
    ///
    /// # Arguments
    ///
    /// * `timeout` - Acquire timeout before `PoolExhausted` (default: 30s)
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Recycles connections after a fixed age
    ///
    /// # Arguments
    ///
    /// * `lifetime` - Age at which a connection is closed (default: 30 min)
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Closes connections unused for a while
    ///
    /// # Arguments
    ///
    /// * `timeout` - Idle time before a connection above the minimum is
    ///   closed (default: 10 min)
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new("postgres://localhost/clinic")
    }
}

/// Creates a database connection pool with the given configuration
///
/// # Arguments
///
/// * `config` - Connection string and pool sizing
///
/// # Returns
///
/// A connected pool; migrations are not applied, see [`run_migrations`]
///
/// # Errors
///
/// Returns `DatabaseError::ConnectionFailed` if the pool cannot be created
pub async fn create_pool(config: DatabaseConfig) -> Result<DatabasePool, DatabaseError> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "creating database pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .connect(&config.url)
        .await
        .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

    info!("database pool created");
    Ok(pool)
}

/// Applies the embedded schema migrations
pub async fn run_migrations(pool: &DatabasePool) -> Result<(), DatabaseError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("database migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = DatabaseConfig::new("postgres://test")
            .max_connections(50)
            .min_connections(10)
            .connect_timeout(Duration::from_secs(60));

        assert_eq!(config.max_connections, 50);
        assert_eq!(config.min_connections, 10);
        assert_eq!(config.connect_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_new_applies_documented_defaults() {
        let config = DatabaseConfig::new("postgres://test")
            .max_lifetime(Duration::from_secs(60))
            .idle_timeout(Duration::from_secs(5));

        assert_eq!(config.min_connections, 2);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.max_lifetime, Duration::from_secs(60));
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(DatabaseConfig::new("postgres://test").max_lifetime, Duration::from_secs(30 * 60));
        assert_eq!(DatabaseConfig::new("postgres://test").idle_timeout, Duration::from_secs(10 * 60));
    }

    #[test]
    fn test_default_targets_local_database() {
        let config = DatabaseConfig::default();
        assert!(config.url.ends_with("/clinic"));
        assert_eq!(config.max_connections, 10);
    }
}
