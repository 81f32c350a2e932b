//! Per-channel delivery metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one delivery channel
///
/// All methods are safe to call from multiple threads concurrently.
#[derive(Debug, Default)]
pub struct ChannelMetrics {
    /// Batches written to the destination
    batches_sent: AtomicU64,

    /// Datapoints written to the destination
    datapoints_sent: AtomicU64,

    /// Datapoints dropped at the queue bound
    datapoints_dropped: AtomicU64,

    /// Payload bytes written, length prefixes included
    bytes_sent: AtomicU64,

    /// Failed batch writes
    send_errors: AtomicU64,

    /// Connections re-established after a loss; the initial connect does
    /// not count
    reconnects: AtomicU64,
}

impl ChannelMetrics {
    /// Create new metrics, all at zero
    pub const fn new() -> Self {
        Self {
            batches_sent: AtomicU64::new(0),
            datapoints_sent: AtomicU64::new(0),
            datapoints_dropped: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }

    /// Record a successfully written batch
    #[inline]
    pub fn record_sent(&self, datapoint_count: u64, byte_count: u64) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.datapoints_sent
            .fetch_add(datapoint_count, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a datapoint dropped at the queue bound
    #[inline]
    pub fn record_dropped(&self) {
        self.datapoints_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed batch write
    #[inline]
    pub fn record_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection re-establishment
    #[inline]
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Datapoints written so far
    #[inline]
    pub fn datapoints_sent(&self) -> u64 {
        self.datapoints_sent.load(Ordering::Relaxed)
    }

    /// Get a point-in-time snapshot
    pub fn snapshot(&self) -> ChannelMetricsSnapshot {
        ChannelMetricsSnapshot {
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            datapoints_sent: self.datapoints_sent.load(Ordering::Relaxed),
            datapoints_dropped: self.datapoints_dropped.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of channel metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelMetricsSnapshot {
    pub batches_sent: u64,
    pub datapoints_sent: u64,
    pub datapoints_dropped: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
    pub reconnects: u64,
}
