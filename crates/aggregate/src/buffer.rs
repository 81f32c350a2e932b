//! Interval buckets and per-output buffers
//!
//! One [`MetricBuffer`] exists per resolved output name. It holds a small
//! window of interval buckets; the compute cycle collapses each active
//! bucket into one emitted datapoint and evicts buckets that have aged out
//! of the retention window.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use metro_protocol::{Datapoint, MetricName, QueueEntry};
use tracing::debug;

use crate::rules::{AggregationMethod, AggregationRule};

/// Values observed for one time interval
#[derive(Debug)]
pub struct Bucket {
    /// Interval start, seconds since epoch, aligned to the frequency
    pub interval_start: u64,

    /// Raw values received for this interval
    pub values: Vec<f64>,

    /// Whether the bucket has unemitted data
    ///
    /// Set on every value added, cleared by compute. Late arrivals after a
    /// compute re-set it, so the bucket is re-emitted with the same
    /// interval-start timestamp on the next cycle.
    pub active: bool,
}

impl Bucket {
    fn new(interval_start: u64) -> Self {
        Self {
            interval_start,
            values: Vec::new(),
            active: false,
        }
    }

    fn add(&mut self, value: f64) {
        self.values.push(value);
        self.active = true;
    }
}

/// Buckets and compute schedule for one aggregate output series
#[derive(Debug)]
pub struct MetricBuffer {
    output_name: MetricName,
    frequency: u64,
    method: AggregationMethod,
    max_retained_intervals: u64,
    buckets: BTreeMap<u64, Bucket>,
    next_compute_at: u64,
}

impl MetricBuffer {
    fn new(
        output_name: MetricName,
        rule: &AggregationRule,
        max_retained_intervals: u32,
        now: u64,
    ) -> Self {
        let frequency = u64::from(rule.frequency);
        Self {
            output_name,
            frequency,
            method: rule.method,
            max_retained_intervals: u64::from(max_retained_intervals),
            buckets: BTreeMap::new(),
            // First compute lands one full interval after creation so the
            // initial bucket gets a chance to fill.
            next_compute_at: now + frequency,
        }
    }

    /// The output series this buffer emits
    pub fn output_name(&self) -> &MetricName {
        &self.output_name
    }

    /// Bucket width in seconds
    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    /// Whether the buffer holds no buckets at all
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Whether this buffer's compute deadline has passed
    pub fn is_due(&self, now: u64) -> bool {
        now >= self.next_compute_at
    }

    /// Route one datapoint's value into its interval bucket
    ///
    /// The bucket is keyed by the datapoint's own timestamp, not arrival
    /// time, so late data lands in (and reactivates) its original interval.
    pub fn input(&mut self, datapoint: Datapoint) {
        let ts = datapoint.timestamp as u64;
        let interval_start = ts - ts % self.frequency;
        self.buckets
            .entry(interval_start)
            .or_insert_with(|| Bucket::new(interval_start))
            .add(datapoint.value);
    }

    /// Emit every active bucket, deactivate them, and evict aged buckets
    ///
    /// Each emission carries the bucket's interval start as its timestamp.
    /// A reactivated bucket therefore re-emits under the same timestamp and
    /// downstream storage overwrites rather than double-counts.
    pub fn compute(&mut self, now: u64) -> Vec<Datapoint> {
        let mut emitted = Vec::new();

        for bucket in self.buckets.values_mut() {
            if !bucket.active {
                continue;
            }
            let value = self.method.apply(&bucket.values);
            emitted.push(Datapoint::new(bucket.interval_start as f64, value));
            bucket.active = false;
        }

        let horizon = (self.frequency * self.max_retained_intervals).min(now);
        let cutoff = now - horizon;
        self.buckets.retain(|start, _| *start >= cutoff);

        self.next_compute_at = now + self.frequency;
        emitted
    }

    #[cfg(test)]
    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[cfg(test)]
    pub(crate) fn bucket(&self, interval_start: u64) -> Option<&Bucket> {
        self.buckets.get(&interval_start)
    }
}

/// All live buffers, keyed by output name
///
/// Buffers are created on first matching datapoint and destroyed once a
/// compute cycle leaves them with no buckets.
#[derive(Debug)]
pub struct BufferManager {
    buffers: HashMap<MetricName, MetricBuffer>,
    max_retained_intervals: u32,
}

impl BufferManager {
    /// Create a manager retaining at most `max_retained_intervals` buckets
    /// of history per buffer
    pub fn new(max_retained_intervals: u32) -> Self {
        Self {
            buffers: HashMap::new(),
            max_retained_intervals,
        }
    }

    /// Number of live buffers
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether no buffers are live
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Feed one datapoint into the buffer for `output`, creating it if needed
    pub fn observe(
        &mut self,
        rule: &Arc<AggregationRule>,
        output: MetricName,
        datapoint: Datapoint,
        now: u64,
    ) {
        let buffer = self.buffers.entry(output).or_insert_with_key(|name| {
            debug!(output = %name, frequency = rule.frequency, "creating aggregation buffer");
            MetricBuffer::new(name.clone(), rule, self.max_retained_intervals, now)
        });
        buffer.input(datapoint);
    }

    /// Run the compute cycle over every due buffer
    ///
    /// Returns the emitted aggregates as queue entries. Buffers left empty
    /// after eviction are destroyed.
    pub fn compute_due(&mut self, now: u64) -> Vec<QueueEntry> {
        let mut entries = Vec::new();

        for buffer in self.buffers.values_mut() {
            if !buffer.is_due(now) {
                continue;
            }
            for datapoint in buffer.compute(now) {
                entries.push(QueueEntry::new(buffer.output_name().clone(), datapoint));
            }
        }

        self.buffers.retain(|name, buffer| {
            let keep = !buffer.is_empty();
            if !keep {
                debug!(output = %name, "destroying drained aggregation buffer");
            }
            keep
        });

        entries
    }

    /// Drop every buffer and all buffered data
    ///
    /// Called on rule reload; buffered but unemitted values are lost.
    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    #[cfg(test)]
    pub(crate) fn buffer(&self, output: &MetricName) -> Option<&MetricBuffer> {
        self.buffers.get(output)
    }
}
