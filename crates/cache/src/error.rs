//! Cache error types

use metro_protocol::MetricName;
use thiserror::Error;

/// Errors from ingest cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// `take` was called for a metric with no pending queue
    ///
    /// Distinct from an empty queue: callers use key presence to decide
    /// whether a new on-disk series must be created downstream.
    #[error("no pending datapoints for metric '{0}'")]
    UnknownMetric(MetricName),
}
