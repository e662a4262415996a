//! Tracing subscriber setup.

use reelhouse_core::{ConfigError, ReelResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "reelhouse_client=debug,reelhouse_cache=debug,info";

/// Telemetry settings.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Fallback filter directives
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "reelhouse-client".to_string(),
            json: false,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Defaults overridden by `REELHOUSE_SERVICE_NAME`, `REELHOUSE_LOG_JSON`
    /// and `REELHOUSE_LOG_FILTER`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: std::env::var("REELHOUSE_SERVICE_NAME").unwrap_or(defaults.service_name),
            json: std::env::var("REELHOUSE_LOG_JSON")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.json),
            default_filter: std::env::var("REELHOUSE_LOG_FILTER").unwrap_or(defaults.default_filter),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Call once at startup. `RUST_LOG` overrides the configured filter.
pub fn init_tracing(config: &TelemetryConfig) -> ReelResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    result.map_err(|e| ConfigError::InvalidValue {
        field: "telemetry".to_string(),
        value: config.default_filter.clone(),
        reason: format!("failed to init subscriber: {e}"),
    })?;

    tracing::info!(
        service_name = config.service_name,
        json = config.json,
        "Telemetry initialized"
    );
    Ok(())
}
