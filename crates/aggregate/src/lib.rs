//! Metro Aggregate - Time-window aggregation engine
//!
//! Converts a high-cardinality datapoint stream into lower-cardinality,
//! time-windowed summaries. Metrics matching a rule's input pattern are
//! bucketed by interval; a periodic compute cycle applies the rule's method
//! (sum, avg, min, max) over each active bucket and emits the result back
//! into the pipeline as a new datapoint.
//!
//! # Rule File Format
//!
//! Lines of the shape `output.pattern (frequency_seconds) = method
//! input.pattern`; `#`-prefixed comments and blank lines are ignored:
//!
//! ```text
//! # Roll every host's cpu up to one series per minute.
//! all.cpu.<kind> (60) = avg hosts.<host>.cpu.<kind>
//! ```
//!
//! Input pattern segments:
//! - `<name>` captures one dot-delimited segment
//! - `<<name>>` captures greedily across segments
//! - `*` matches one segment without capturing
//!
//! The output template substitutes each placeholder with its capture;
//! `<name>` and `<<name>>` are interchangeable there, so a greedily
//! captured name can be re-emitted as written. Patterns are fully
//! anchored, so textually overlapping rules (`.p99` vs `.p999`) never
//! both match one metric.
//!
//! # Re-emission Contract
//!
//! A bucket that receives late-arriving values is reactivated and re-emitted
//! on the next cycle with the *same* interval-start timestamp. Downstream
//! consumers must treat a repeated (name, timestamp) pair as an idempotent
//! overwrite, never as an additional sample.

mod buffer;
mod engine;
mod error;
mod rules;

pub use buffer::{Bucket, BufferManager, MetricBuffer};
pub use engine::{AggregationEngine, EngineSettings, SharedRules};
pub use error::AggregateError;
pub use rules::{AggregationMethod, AggregationRule, RuleSet};

/// Result type for aggregation operations
pub type Result<T> = std::result::Result<T, AggregateError>;

// Test modules - only compiled during testing
#[cfg(test)]
mod buffer_test;
