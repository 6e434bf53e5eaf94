//! Engine configuration
//!
//! Loaded from `BILLING_`-prefixed environment variables, after an optional
//! `.env` file has been read into the environment.

use serde::Deserialize;

use core_kernel::Timezone;
use infra_db::DatabaseConfig;

use crate::error::EngineError;

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    /// Pool size
    pub max_connections: u32,
    /// IANA name of the clinic's timezone; "today" for leave status is read here
    pub timezone: String,
    /// Attempts at a read-plan-commit cycle, or at inserting under a fresh
    /// reference number, before the error surfaces
    pub max_allocation_attempts: u32,
    /// Random reference numbers tried before the timestamp fallback
    pub reference_max_attempts: u32,
    /// Tracing filter used when `RUST_LOG` is unset
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/clinic".to_string(),
            max_connections: 10,
            timezone: "Asia/Riyadh".to_string(),
            max_allocation_attempts: 3,
            reference_max_attempts: 10,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl EngineConfig {
    /// Loads `.env` (if present) and then the `BILLING_*` environment
    pub fn load() -> Result<Self, EngineError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Reads the `BILLING_*` environment without touching `.env`
    pub fn from_env() -> Result<Self, EngineError> {
        let config: EngineConfig = config::Config::builder()
            .add_source(config::Environment::with_prefix("BILLING").try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| EngineError::config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Rejects values the engine cannot run with
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.database_url.trim().is_empty() {
            return Err(EngineError::config("database_url must not be empty"));
        }
        if self.max_connections == 0 {
            return Err(EngineError::config("max_connections must be at least 1"));
        }
        if self.max_allocation_attempts == 0 {
            return Err(EngineError::config("max_allocation_attempts must be at least 1"));
        }
        if self.reference_max_attempts == 0 {
            return Err(EngineError::config("reference_max_attempts must be at least 1"));
        }
        self.clinic_timezone()?;
        Ok(())
    }

    pub fn clinic_timezone(&self) -> Result<Timezone, EngineError> {
        Timezone::from_name(&self.timezone).map_err(|e| EngineError::config(e.to_string()))
    }

    pub fn database(&self) -> DatabaseConfig {
        DatabaseConfig::new(&self.database_url).max_connections(self.max_connections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_allocation_attempts, 3);
        assert_eq!(config.clinic_timezone().unwrap(), Timezone::from_name("Asia/Riyadh").unwrap());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = EngineConfig {
            max_allocation_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let config = EngineConfig {
            timezone: "Mars/Olympus_Mons".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_pool_settings_follow_config() {
        let config = EngineConfig {
            max_connections: 4,
            ..Default::default()
        };
        let db = config.database();
        assert_eq!(db.max_connections, 4);
        assert_eq!(db.url, "postgres://localhost/clinic");
    }
}
