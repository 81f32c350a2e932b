//! Metro Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use metro_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[routing]\ndestinations = [\"127.0.0.1:2004\"]").unwrap();
//! ```
//!
//! # Example Full Config
//!
//! ```toml
//! [intake]
//! address = "0.0.0.0"
//! port = 2003
//!
//! [cache]
//! max_size = 1000000
//! low_watermark = 0.9
//!
//! [aggregation]
//! rules_path = "configs/aggregation-rules.conf"
//! max_retained_intervals = 5
//!
//! [routing]
//! method = "consistent-hashing"
//! replication_factor = 2
//! destinations = ["10.0.0.1:2004:a", "10.0.0.1:2004:b"]
//!
//! [delivery]
//! max_queue_size = 10000
//! max_batch_size = 500
//!
//! [delivery.quality]
//! enabled = true
//! min_ratio = 0.9
//! ```

mod aggregation;
mod cache;
mod delivery;
mod error;
mod intake;
mod routing;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use aggregation::AggregationConfig;
pub use cache::CacheConfig;
pub use delivery::{DeliveryConfig, QualityConfig};
pub use error::{ConfigError, Result};
pub use intake::IntakeConfig;
pub use routing::{RoutingConfig, RoutingMethod};

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Line-protocol intake listener
    pub intake: IntakeConfig,

    /// Ingest cache sizing and watermarks
    pub cache: CacheConfig,

    /// Aggregation rule file and retention
    pub aggregation: AggregationConfig,

    /// Routing method and destinations
    pub routing: RoutingConfig,

    /// Per-destination delivery tuning
    pub delivery: DeliveryConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, contains invalid TOML, or
    /// fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-section consistency
    fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
