//! The ingest cache

use std::collections::HashMap;

use metro_events::{EventBus, RelayEvent};
use metro_protocol::{Datapoint, MetricName};
use parking_lot::Mutex;

use crate::{CacheError, Result};

/// Map plus counter, mutated only together under the cache lock
#[derive(Debug, Default)]
struct CacheInner {
    /// Pending datapoints per metric, in arrival order
    queues: HashMap<MetricName, Vec<Datapoint>>,

    /// Total queued datapoints across all metrics
    size: usize,

    /// Whether we are inside an overflow episode
    ///
    /// Set when `size` reaches the cap, cleared when it drains back under
    /// the low watermark. Gates the full/space-available events to exactly
    /// one per episode.
    overflowed: bool,
}

/// Holds datapoints awaiting first dispatch, keyed by metric name
///
/// Safe to call from any thread; this is the hand-off point from producer
/// threads into the relay.
///
/// # Example
///
/// ```
/// use metro_cache::IngestCache;
/// use metro_events::EventBus;
/// use metro_protocol::{Datapoint, MetricName};
///
/// let cache = IngestCache::new(1000, 900, EventBus::new());
/// let metric = MetricName::new("hosts.web01.cpu");
///
/// cache.store(metric.clone(), Datapoint::new(1.0, 0.5));
/// assert_eq!(cache.size(), 1);
///
/// let taken = cache.take(&metric).unwrap();
/// assert_eq!(taken.len(), 1);
/// assert_eq!(cache.size(), 0);
/// ```
#[derive(Debug)]
pub struct IngestCache {
    inner: Mutex<CacheInner>,

    /// Size cap at which intake is asked to pause
    max_size: usize,

    /// Size the cache must drain below before intake resumes
    low_watermark: usize,

    /// Where overflow and recovery events are published
    events: EventBus,
}

impl IngestCache {
    /// Create a cache with the given cap and low watermark
    pub fn new(max_size: usize, low_watermark: usize, events: EventBus) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            max_size,
            low_watermark: low_watermark.min(max_size),
            events,
        }
    }

    /// Append a datapoint to its metric's pending queue
    ///
    /// When the resulting size reaches the cap, `CacheFull` and
    /// `PauseReceiving` fire exactly once for the episode; the datapoint
    /// itself is still stored (overflow drops happen at the queue bound of
    /// delivery channels, not here).
    pub fn store(&self, metric: MetricName, datapoint: Datapoint) {
        let filled = {
            let mut inner = self.inner.lock();
            inner.queues.entry(metric).or_default().push(datapoint);
            inner.size += 1;

            if inner.size >= self.max_size && !inner.overflowed {
                inner.overflowed = true;
                true
            } else {
                false
            }
        };

        // Events fire outside the lock so slow subscribers never block
        // producers.
        if filled {
            tracing::warn!(size = self.size(), "ingest cache full, pausing intake");
            self.events.emit(RelayEvent::CacheFull);
            self.events.emit(RelayEvent::PauseReceiving);
        }
    }

    /// Atomically remove and return all pending datapoints for a metric
    ///
    /// # Errors
    ///
    /// Returns `CacheError::UnknownMetric` when the metric has no pending
    /// queue at all - deliberately distinct from returning an empty list.
    pub fn take(&self, metric: &MetricName) -> Result<Vec<Datapoint>> {
        let (datapoints, recovered) = {
            let mut inner = self.inner.lock();
            let datapoints = inner
                .queues
                .remove(metric)
                .ok_or_else(|| CacheError::UnknownMetric(metric.clone()))?;
            inner.size -= datapoints.len();

            let recovered = inner.overflowed && inner.size < self.low_watermark;
            if recovered {
                inner.overflowed = false;
            }
            (datapoints, recovered)
        };

        if recovered {
            tracing::info!(size = self.size(), "ingest cache drained, resuming intake");
            self.events.emit(RelayEvent::CacheSpaceAvailable);
            self.events.emit(RelayEvent::ResumeReceiving);
        }

        Ok(datapoints)
    }

    /// Point-in-time snapshot of per-metric queue depths
    ///
    /// Dispatch loops drain the deepest queues first to maximize batch
    /// efficiency. The lock is held only for the duration of the copy.
    pub fn counts(&self) -> Vec<(MetricName, usize)> {
        self.inner
            .lock()
            .queues
            .iter()
            .map(|(metric, queue)| (metric.clone(), queue.len()))
            .collect()
    }

    /// Total queued datapoints across all metrics
    pub fn size(&self) -> usize {
        self.inner.lock().size
    }

    /// Number of metrics with a pending queue
    pub fn metric_count(&self) -> usize {
        self.inner.lock().queues.len()
    }

    /// Whether the cache is inside an overflow episode
    pub fn is_full(&self) -> bool {
        self.inner.lock().overflowed
    }
}
