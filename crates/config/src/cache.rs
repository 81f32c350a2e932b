//! Ingest cache configuration

use serde::Deserialize;

/// Sizing and watermarks for the ingest cache
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum queued datapoints across all metrics before intake pauses
    /// Default: 1,000,000
    pub max_size: usize,

    /// Fraction of `max_size` the cache must drain below (after an overflow
    /// episode) before intake resumes
    /// Default: 0.9
    pub low_watermark: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1_000_000,
            low_watermark: 0.9,
        }
    }
}

impl CacheConfig {
    /// Absolute low-watermark size, derived from the fraction
    pub fn low_watermark_size(&self) -> usize {
        (self.max_size as f64 * self.low_watermark) as usize
    }
}
