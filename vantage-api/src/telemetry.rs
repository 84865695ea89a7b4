//! Tracing Subscriber Initialization
//!
//! `RUST_LOG` takes precedence; otherwise the configured level applies.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ServiceConfig;
use crate::error::{ApiError, ApiResult};

/// Install the global tracing subscriber.
///
/// Call once at startup. Fails if a subscriber is already installed.
pub fn init_tracing(level: &str, json: bool) -> ApiResult<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    result.map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(level, json, "Tracing initialized");
    Ok(())
}

/// [`init_tracing`] using the service configuration.
pub fn init_from_config(config: &ServiceConfig) -> ApiResult<()> {
    init_tracing(&config.log_level, config.log_json)
}
