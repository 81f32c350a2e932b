//! Global relay counters
//!
//! Relaxed atomic counters for high-rate signals. Eventually consistent,
//! not real-time - readers take point-in-time snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

/// System-wide datapoint counters shared across the relay
///
/// All methods are safe to call from multiple threads concurrently.
#[derive(Debug, Default)]
pub struct RelayCounters {
    /// Datapoints accepted from the intake boundary
    metrics_received: AtomicU64,

    /// Datapoints produced by the aggregation engine
    metrics_generated: AtomicU64,
}

impl RelayCounters {
    /// Create new counters, all at zero
    pub const fn new() -> Self {
        Self {
            metrics_received: AtomicU64::new(0),
            metrics_generated: AtomicU64::new(0),
        }
    }

    /// Record one datapoint received from intake
    #[inline]
    pub fn record_received(&self) {
        self.metrics_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one datapoint generated by aggregation
    #[inline]
    pub fn record_generated(&self) {
        self.metrics_generated.fetch_add(1, Ordering::Relaxed);
    }

    /// Total datapoints received so far
    #[inline]
    pub fn received(&self) -> u64 {
        self.metrics_received.load(Ordering::Relaxed)
    }

    /// Total datapoints generated so far
    #[inline]
    pub fn generated(&self) -> u64 {
        self.metrics_generated.load(Ordering::Relaxed)
    }

    /// Get a point-in-time snapshot of all counters
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            metrics_received: self.received(),
            metrics_generated: self.generated(),
        }
    }
}

/// Point-in-time snapshot of the relay counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Datapoints accepted from the intake boundary
    pub metrics_received: u64,

    /// Datapoints produced by the aggregation engine
    pub metrics_generated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let counters = RelayCounters::new();

        counters.record_received();
        counters.record_received();
        counters.record_generated();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.metrics_received, 2);
        assert_eq!(snapshot.metrics_generated, 1);
    }
}
