//! Aggregation engine configuration

use serde::Deserialize;

/// Aggregation rule file and retention
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Aggregation-rules file; `None` disables aggregation entirely
    pub rules_path: Option<String>,

    /// Buckets older than `frequency × max_retained_intervals` are evicted
    /// Default: 5
    pub max_retained_intervals: u32,

    /// How often the rules file is reloaded (seconds). Reload clears all
    /// buffers; unflushed buckets for removed rules are discarded.
    /// Default: 60
    pub rules_reload_secs: u64,

    /// Overrides how often the engine scans buffers for due compute
    /// deadlines (seconds). Buffers still flush at their own rule
    /// frequency; this only bounds the scan granularity.
    /// Default: 1
    pub compute_interval_override_secs: Option<u64>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            max_retained_intervals: 5,
            rules_reload_secs: 60,
            compute_interval_override_secs: None,
        }
    }
}
