//! Tracing initialisation

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{EngineConfig, LogFormat};
use crate::error::EngineError;

/// Installs the global subscriber
///
/// The filter comes from `RUST_LOG` when set, otherwise from
/// `config.log_level`, otherwise `info`.
pub fn init_tracing(config: &EngineConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.log_format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
    };

    result.map_err(|e| EngineError::Telemetry(e.to_string()))
}
