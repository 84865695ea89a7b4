//! Aggregated metrics and health diagnostics across namespaces.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vantage_core::{HealthThresholds, Timestamp};

use crate::namespace::NamespaceMetrics;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Totals across every namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallMetrics {
    pub total_entries: usize,
    pub total_bytes: u64,
    /// Hit rate over all lookups (0.0 to 1.0).
    pub hit_rate: f64,
    pub total_requests: u64,
    pub total_evictions: u64,
}

/// Overall totals plus each namespace's metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub overall: OverallMetrics,
    pub per_namespace: BTreeMap<String, NamespaceMetrics>,
    pub collected_at: Timestamp,
}

impl AggregateMetrics {
    /// Fold per-namespace metrics into an aggregate.
    pub fn from_namespaces<I>(metrics: I, collected_at: Timestamp) -> Self
    where
        I: IntoIterator<Item = NamespaceMetrics>,
    {
        let mut overall = OverallMetrics::default();
        let mut hits = 0u64;
        let mut per_namespace = BTreeMap::new();

        for ns in metrics {
            overall.total_entries += ns.entries;
            overall.total_bytes += ns.bytes;
            overall.total_requests += ns.requests();
            overall.total_evictions += ns.evictions;
            hits += ns.hits;
            per_namespace.insert(ns.namespace.clone(), ns);
        }

        if overall.total_requests > 0 {
            overall.hit_rate = hits as f64 / overall.total_requests as f64;
        }

        Self {
            overall,
            per_namespace,
            collected_at,
        }
    }

    /// Render the operator-facing report. The per-namespace breakdown is only
    /// included when `detailed` is set.
    pub fn to_report(&self, detailed: bool) -> CacheMetricsReport {
        let overall = OverallReport {
            total_entries: self.overall.total_entries,
            memory_usage_mb: to_mb(self.overall.total_bytes),
            hit_rate_pct: to_pct(self.overall.hit_rate),
            total_requests: self.overall.total_requests,
        };

        let breakdown = detailed.then(|| {
            self.per_namespace
                .iter()
                .map(|(name, ns)| {
                    (
                        name.clone(),
                        NamespaceReport {
                            entries: ns.entries,
                            hit_rate_pct: to_pct(ns.hit_rate()),
                            size_mb: to_mb(ns.bytes),
                            hits: ns.hits,
                            misses: ns.misses,
                            evictions: ns.evictions,
                            expirations: ns.expirations,
                            max_entries: ns.max_entries,
                            max_size_mb: to_mb(ns.max_bytes),
                        },
                    )
                })
                .collect()
        });

        CacheMetricsReport {
            overall,
            breakdown,
            collected_at: self.collected_at,
        }
    }
}

/// Operator-facing cache metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetricsReport {
    pub overall: OverallReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<BTreeMap<String, NamespaceReport>>,
    pub collected_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallReport {
    pub total_entries: usize,
    pub memory_usage_mb: f64,
    pub hit_rate_pct: f64,
    pub total_requests: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceReport {
    pub entries: usize,
    pub hit_rate_pct: f64,
    pub size_mb: f64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub max_entries: usize,
    pub max_size_mb: f64,
}

fn to_mb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_MB)
}

fn to_pct(rate: f64) -> f64 {
    round2(rate * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// HEALTH
// ============================================================================

/// Cache health diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheHealthReport {
    pub is_healthy: bool,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Judge every namespace against the thresholds.
///
/// A namespace is flagged when its hit rate is below the low-water mark, when
/// it evicts a large share of what it stores (thrashing), or when it sits near
/// either capacity limit.
pub fn assess_health(metrics: &AggregateMetrics, thresholds: &HealthThresholds) -> CacheHealthReport {
    let mut report = CacheHealthReport::default();

    for (name, ns) in &metrics.per_namespace {
        if ns.requests() >= thresholds.min_requests && ns.hit_rate() < thresholds.low_hit_rate {
            report.warnings.push(format!(
                "Namespace '{}' hit rate is {:.1}% (below {:.1}%)",
                name,
                ns.hit_rate() * 100.0,
                thresholds.low_hit_rate * 100.0
            ));
            report.recommendations.push(format!(
                "Lengthen the TTL for '{}' or check that equivalent URLs normalize to the same key",
                name
            ));
        }

        if ns.puts >= thresholds.min_puts {
            let ratio = ns.evictions as f64 / ns.puts as f64;
            if ratio > thresholds.thrash_ratio {
                report.warnings.push(format!(
                    "Namespace '{}' evicted {} of {} writes ({:.1}%)",
                    name,
                    ns.evictions,
                    ns.puts,
                    ratio * 100.0
                ));
                report.recommendations.push(format!(
                    "Raise max_entries or max_bytes for '{}' to stop capacity thrashing",
                    name
                ));
            }
        }

        let byte_fill = ns.bytes as f64 / ns.max_bytes.max(1) as f64;
        let entry_fill = ns.entries as f64 / ns.max_entries.max(1) as f64;
        let fill = byte_fill.max(entry_fill);
        if fill >= thresholds.near_capacity_ratio {
            let limit = if byte_fill >= entry_fill { "byte" } else { "entry" };
            report.warnings.push(format!(
                "Namespace '{}' is at {:.1}% of its {} limit",
                name,
                fill * 100.0,
                limit
            ));
            report.recommendations.push(format!(
                "Increase the {} limit for '{}' or shorten its TTL",
                limit, name
            ));
        }
    }

    report.is_healthy = report.warnings.is_empty();
    report
}
