//! Service Configuration
//!
//! Configuration is loaded from `VANTAGE_*` environment variables with
//! defaults suitable for a single-process deployment. Unparseable values fall
//! back to the default.

use std::time::Duration;
use vantage_core::{
    CacheManagerConfig, ConfigError, CoordinatorConfig, NamespaceConfig, UrlNormalizer,
    AI_ANALYSIS_NAMESPACE, FINAL_ANALYSIS_NAMESPACE, SCRAPED_NAMESPACE,
};

/// Default log level when neither `RUST_LOG` nor `VANTAGE_LOG_LEVEL` is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default admission priority for requests that do not set one.
pub const DEFAULT_PRIORITY: i32 = 0;

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

/// Configuration for the whole service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Namespace limits and sweep interval.
    pub cache: CacheManagerConfig,

    /// Concurrency slots, grace window, and queue depth.
    pub coordinator: CoordinatorConfig,

    /// How long a caller waits on a coordinated task. `None` waits
    /// indefinitely.
    pub wait_timeout: Option<Duration>,

    /// Priority for requests that do not set one.
    pub default_priority: i32,

    /// Query parameters that survive URL normalization.
    pub url_query_allowlist: Vec<String>,

    /// Fallback log filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// Emit JSON log lines instead of plain text.
    pub log_json: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache: CacheManagerConfig::default(),
            coordinator: CoordinatorConfig::default(),
            wait_timeout: None,
            default_priority: DEFAULT_PRIORITY,
            url_query_allowlist: Vec::new(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
        }
    }
}

impl ServiceConfig {
    /// Create ServiceConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `VANTAGE_{SCRAPED,AI_ANALYSIS,FINAL_ANALYSIS}_TTL_SECS`: Namespace TTL
    /// - `VANTAGE_{SCRAPED,AI_ANALYSIS,FINAL_ANALYSIS}_MAX_ENTRIES`: Namespace entry limit
    /// - `VANTAGE_{SCRAPED,AI_ANALYSIS,FINAL_ANALYSIS}_MAX_BYTES`: Namespace byte limit
    /// - `VANTAGE_CACHE_SWEEP_INTERVAL_SECS`: Background sweep interval (default: 300)
    /// - `VANTAGE_MAX_CONCURRENT_TASKS`: Concurrency slots (default: 4)
    /// - `VANTAGE_TASK_GRACE_MS`: Completed-task grace window (default: 2000)
    /// - `VANTAGE_MAX_QUEUE_DEPTH`: Queue limit (default: unbounded)
    /// - `VANTAGE_WAIT_TIMEOUT_SECS`: Caller wait deadline (default: none)
    /// - `VANTAGE_DEFAULT_PRIORITY`: Default request priority (default: 0)
    /// - `VANTAGE_URL_QUERY_ALLOWLIST`: Comma-separated query parameter names
    /// - `VANTAGE_LOG_LEVEL`: Fallback log filter (default: info)
    /// - `VANTAGE_LOG_JSON`: JSON log output (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |name: &str| lookup(name).and_then(|s| s.trim().parse::<u64>().ok());

        let namespace = |prefix: &str, base: NamespaceConfig| {
            let mut config = base;
            if let Some(secs) = parsed(&format!("VANTAGE_{prefix}_TTL_SECS")) {
                config.ttl = Duration::from_secs(secs);
            }
            if let Some(max) = parsed(&format!("VANTAGE_{prefix}_MAX_ENTRIES")) {
                config.max_entries = max as usize;
            }
            if let Some(max) = parsed(&format!("VANTAGE_{prefix}_MAX_BYTES")) {
                config.max_bytes = max;
            }
            config
        };

        let mut cache = defaults
            .cache
            .clone()
            .with_namespace(
                SCRAPED_NAMESPACE,
                namespace("SCRAPED", NamespaceConfig::scraped()),
            )
            .with_namespace(
                AI_ANALYSIS_NAMESPACE,
                namespace("AI_ANALYSIS", NamespaceConfig::ai_analysis()),
            )
            .with_namespace(
                FINAL_ANALYSIS_NAMESPACE,
                namespace("FINAL_ANALYSIS", NamespaceConfig::final_analysis()),
            );
        if let Some(secs) = parsed("VANTAGE_CACHE_SWEEP_INTERVAL_SECS") {
            cache = cache.with_sweep_interval(Duration::from_secs(secs));
        }

        let mut coordinator = defaults.coordinator.clone();
        if let Some(max) = parsed("VANTAGE_MAX_CONCURRENT_TASKS") {
            coordinator = coordinator.with_max_concurrent(max as usize);
        }
        if let Some(ms) = parsed("VANTAGE_TASK_GRACE_MS") {
            coordinator = coordinator.with_completed_grace(Duration::from_millis(ms));
        }
        if let Some(depth) = parsed("VANTAGE_MAX_QUEUE_DEPTH") {
            coordinator = coordinator.with_max_queue_depth(Some(depth as usize));
        }

        let wait_timeout = parsed("VANTAGE_WAIT_TIMEOUT_SECS").map(Duration::from_secs);

        let default_priority = lookup("VANTAGE_DEFAULT_PRIORITY")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_PRIORITY);

        let url_query_allowlist = lookup("VANTAGE_URL_QUERY_ALLOWLIST")
            .map(|s| {
                s.split(',')
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let log_level = lookup("VANTAGE_LOG_LEVEL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.log_level);

        let log_json = lookup("VANTAGE_LOG_JSON")
            .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false);

        Self {
            cache,
            coordinator,
            wait_timeout,
            default_priority,
            url_query_allowlist,
            log_level,
            log_json,
        }
    }

    /// Validate the cache, coordinator, and wait settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        self.coordinator.validate()?;
        if self.wait_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidValue {
                field: "wait_timeout".to_string(),
                value: "0".to_string(),
                reason: "leave unset to wait indefinitely".to_string(),
            });
        }
        Ok(())
    }

    /// URL normalizer using the configured query allow-list.
    pub fn url_normalizer(&self) -> UrlNormalizer {
        UrlNormalizer::new(self.url_query_allowlist.iter().cloned())
    }
}
