//! Delivery channel configuration

use std::time::Duration;

use serde::Deserialize;

/// Per-destination delivery tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Maximum normal entries queued per destination before drop-newest
    /// Default: 10,000
    pub max_queue_size: usize,

    /// Maximum records sent in one batch
    /// Default: 500
    pub max_batch_size: usize,

    /// Fraction of `max_queue_size` a full queue must drain below before
    /// the space-available event fires
    /// Default: 0.8
    pub queue_low_watermark: f64,

    /// Cooperative delay between consecutive batches (milliseconds)
    /// Default: 10
    pub flush_interval_ms: u64,

    /// Initial reconnect backoff (milliseconds)
    /// Default: 100
    pub reconnect_backoff_ms: u64,

    /// Reconnect backoff cap (milliseconds)
    /// Default: 5,000
    pub reconnect_backoff_max_ms: u64,

    /// Connection establishment timeout (seconds)
    /// Default: 10
    pub connection_timeout_secs: u64,

    /// Per-batch write timeout (seconds)
    /// Default: 5
    pub write_timeout_secs: u64,

    /// TCP keep-alive enabled
    /// Default: true
    pub tcp_keepalive: bool,

    /// TCP keep-alive interval (seconds)
    /// Default: 30
    pub tcp_keepalive_secs: u64,

    /// Connection quality monitor
    pub quality: QualityConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            max_batch_size: 500,
            queue_low_watermark: 0.8,
            flush_interval_ms: 10,
            reconnect_backoff_ms: 100,
            reconnect_backoff_max_ms: 5_000,
            connection_timeout_secs: 10,
            write_timeout_secs: 5,
            tcp_keepalive: true,
            tcp_keepalive_secs: 30,
            quality: QualityConfig::default(),
        }
    }
}

impl DeliveryConfig {
    /// Cooperative delay between consecutive batches
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Initial reconnect backoff
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    /// Reconnect backoff cap
    pub fn reconnect_backoff_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_max_ms)
    }

    /// Connection establishment timeout
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Per-batch write timeout
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// TCP keep-alive interval
    pub fn tcp_keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.tcp_keepalive_secs)
    }

    /// Absolute queue low-watermark size, derived from the fraction
    pub fn queue_low_watermark_size(&self) -> usize {
        (self.max_queue_size as f64 * self.queue_low_watermark) as usize
    }
}

/// Connection quality monitor configuration
///
/// Detects a downstream that accepts connections but drains too slowly:
/// when system-wide received volume passes `min_sample` in a flush interval
/// and this channel's sent/received ratio falls below `min_ratio`, the
/// channel force-disconnects itself (at most once per `reset_interval`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Whether the monitor is active
    /// Default: false
    pub enabled: bool,

    /// Minimum system-wide received datapoints per interval before the
    /// ratio is meaningful
    /// Default: 1,000
    pub min_sample: u64,

    /// Minimum acceptable sent/received ratio
    /// Default: 0.9
    pub min_ratio: f64,

    /// Cool-down between forced resets (seconds)
    /// Default: 120
    pub reset_interval_secs: u64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_sample: 1_000,
            min_ratio: 0.9,
            reset_interval_secs: 120,
        }
    }
}

impl QualityConfig {
    /// Cool-down between forced resets
    pub fn reset_interval(&self) -> Duration {
        Duration::from_secs(self.reset_interval_secs)
    }
}
