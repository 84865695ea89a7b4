//! Configuration types for the cache and the request coordinator.
//!
//! All limits and TTLs are configuration. The defaults below are starting
//! points, not invariants.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Namespace holding raw scraped page content.
pub const SCRAPED_NAMESPACE: &str = "scraped";

/// Namespace holding AI analysis output.
pub const AI_ANALYSIS_NAMESPACE: &str = "ai-analysis";

/// Namespace holding combined, final analysis results.
pub const FINAL_ANALYSIS_NAMESPACE: &str = "final-analysis";

const MIB: u64 = 1024 * 1024;

// ============================================================================
// NAMESPACE CONFIGURATION
// ============================================================================

/// Limits and TTL for a single cache namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Default time-to-live for entries written without an explicit TTL.
    pub ttl: Duration,
    /// Maximum number of resident entries.
    pub max_entries: usize,
    /// Maximum estimated bytes across all resident entries.
    pub max_bytes: u64,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 1000,
            max_bytes: 16 * MIB,
        }
    }
}

impl NamespaceConfig {
    /// Create a namespace config from explicit limits.
    pub fn new(ttl: Duration, max_entries: usize, max_bytes: u64) -> Self {
        Self {
            ttl,
            max_entries,
            max_bytes,
        }
    }

    /// Defaults for scraped page content (30 minutes).
    pub fn scraped() -> Self {
        Self::new(Duration::from_secs(30 * 60), 500, 50 * MIB)
    }

    /// Defaults for AI analysis output (24 hours).
    pub fn ai_analysis() -> Self {
        Self::new(Duration::from_secs(24 * 3600), 1000, 20 * MIB)
    }

    /// Defaults for final analysis records (7 days).
    pub fn final_analysis() -> Self {
        Self::new(Duration::from_secs(7 * 24 * 3600), 1000, 20 * MIB)
    }

    /// Set the default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the entry limit.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the byte limit.
    pub fn with_max_bytes(mut self, max: u64) -> Self {
        self.max_bytes = max;
        self
    }

    /// Validate the limits for the named namespace.
    pub fn validate(&self, namespace: &str) -> Result<(), ConfigError> {
        if self.ttl.is_zero() {
            return Err(invalid(
                format!("{}.ttl", namespace),
                format!("{:?}", self.ttl),
                "must be greater than zero",
            ));
        }
        if self.max_entries == 0 {
            return Err(invalid(
                format!("{}.max_entries", namespace),
                "0",
                "must be greater than zero",
            ));
        }
        if self.max_bytes == 0 {
            return Err(invalid(
                format!("{}.max_bytes", namespace),
                "0",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// HEALTH THRESHOLDS
// ============================================================================

/// Thresholds used to flag unhealthy namespaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Hit rate below which a namespace is reported (0.0 to 1.0).
    pub low_hit_rate: f64,
    /// Requests a namespace must have served before its hit rate is judged.
    pub min_requests: u64,
    /// Evictions-per-put ratio above which a namespace is thrashing.
    pub thrash_ratio: f64,
    /// Puts a namespace must have seen before thrashing is judged.
    pub min_puts: u64,
    /// Fraction of a limit at which a namespace counts as near capacity.
    pub near_capacity_ratio: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            low_hit_rate: 0.5,
            min_requests: 20,
            thrash_ratio: 0.5,
            min_puts: 10,
            near_capacity_ratio: 0.9,
        }
    }
}

// ============================================================================
// CACHE MANAGER CONFIGURATION
// ============================================================================

/// Configuration for the cache manager and its namespaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheManagerConfig {
    /// Per-namespace limits, keyed by namespace name.
    pub namespaces: BTreeMap<String, NamespaceConfig>,
    /// Limits for namespaces created without explicit configuration.
    pub default_namespace: NamespaceConfig,
    /// How often the background sweep runs.
    pub sweep_interval: Duration,
    /// Health report thresholds.
    pub health: HealthThresholds,
}

impl Default for CacheManagerConfig {
    fn default() -> Self {
        let mut namespaces = BTreeMap::new();
        namespaces.insert(SCRAPED_NAMESPACE.to_string(), NamespaceConfig::scraped());
        namespaces.insert(
            AI_ANALYSIS_NAMESPACE.to_string(),
            NamespaceConfig::ai_analysis(),
        );
        namespaces.insert(
            FINAL_ANALYSIS_NAMESPACE.to_string(),
            NamespaceConfig::final_analysis(),
        );

        Self {
            namespaces,
            default_namespace: NamespaceConfig::default(),
            sweep_interval: Duration::from_secs(5 * 60),
            health: HealthThresholds::default(),
        }
    }
}

impl CacheManagerConfig {
    /// Create a config with the default namespaces.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure (or replace) a namespace.
    pub fn with_namespace(mut self, name: impl Into<String>, config: NamespaceConfig) -> Self {
        self.namespaces.insert(name.into(), config);
        self
    }

    /// Set limits for unconfigured namespaces.
    pub fn with_default_namespace(mut self, config: NamespaceConfig) -> Self {
        self.default_namespace = config;
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the health thresholds.
    pub fn with_health_thresholds(mut self, health: HealthThresholds) -> Self {
        self.health = health;
        self
    }

    /// True if the namespace has explicit configuration.
    pub fn is_configured(&self, name: &str) -> bool {
        self.namespaces.contains_key(name)
    }

    /// Limits for a namespace, falling back to the default namespace config.
    pub fn namespace_config(&self, name: &str) -> NamespaceConfig {
        self.namespaces
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_namespace.clone())
    }

    /// Validate every namespace and the sweep interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, config) in &self.namespaces {
            config.validate(name)?;
        }
        self.default_namespace.validate("default")?;
        if self.sweep_interval.is_zero() {
            return Err(invalid(
                "sweep_interval",
                format!("{:?}", self.sweep_interval),
                "must be greater than zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.health.low_hit_rate) {
            return Err(invalid(
                "health.low_hit_rate",
                self.health.low_hit_rate.to_string(),
                "must be between 0.0 and 1.0",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// COORDINATOR CONFIGURATION
// ============================================================================

/// Configuration for the single-flight request coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Number of tasks allowed in the Running state at once.
    pub max_concurrent: usize,
    /// How long a completed task stays joinable by late callers.
    pub completed_grace: Duration,
    /// Maximum number of Queued tasks; `None` admits without limit.
    pub max_queue_depth: Option<usize>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            completed_grace: Duration::from_secs(2),
            max_queue_depth: None,
        }
    }
}

impl CoordinatorConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrency limit.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set the completed-task grace window.
    pub fn with_completed_grace(mut self, grace: Duration) -> Self {
        self.completed_grace = grace;
        self
    }

    /// Set (or clear) the queue depth limit.
    pub fn with_max_queue_depth(mut self, depth: Option<usize>) -> Self {
        self.max_queue_depth = depth;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(invalid(
                "max_concurrent",
                "0",
                "at least one concurrent task is required",
            ));
        }
        if self.max_queue_depth == Some(0) {
            return Err(invalid(
                "max_queue_depth",
                "0",
                "use None for an unbounded queue",
            ));
        }
        Ok(())
    }
}

fn invalid(
    field: impl Into<String>,
    value: impl Into<String>,
    reason: impl Into<String>,
) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        value: value.into(),
        reason: reason.into(),
    }
}
