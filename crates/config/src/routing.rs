//! Routing configuration
//!
//! Selects the routing method and names the configured destinations.
//! Destination strings use `host:port` or `host:port:instance` syntax.

use serde::Deserialize;

/// Which router variant the relay runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingMethod {
    /// Consistent hashing over all destinations
    #[default]
    ConsistentHashing,

    /// Ordered regex rules from the relay-rules file
    Rules,

    /// Consistent hashing keyed by aggregate output names
    AggregatedConsistentHashing,
}

/// Routing method and destinations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Router variant
    pub method: RoutingMethod,

    /// Distinct destinations each metric is sent to under consistent hashing
    /// Default: 1
    pub replication_factor: usize,

    /// Destination addresses (`host:port[:instance]`)
    pub destinations: Vec<String>,

    /// Relay-rules file (only read when `method = "rules"`)
    /// Default: "configs/relay-rules.conf"
    pub relay_rules_path: String,

    /// How often the relay-rules file is checked for mtime changes (seconds)
    /// Default: 60
    pub rules_reload_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            method: RoutingMethod::default(),
            replication_factor: 1,
            destinations: Vec::new(),
            relay_rules_path: "configs/relay-rules.conf".into(),
            rules_reload_secs: 60,
        }
    }
}
