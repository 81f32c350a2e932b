//! Aggregation error types

use std::io;
use thiserror::Error;

/// Errors from aggregation rule loading
///
/// All of these surface at rule-parse time; the compute path never fails.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Failed to read the aggregation-rules file
    #[error("failed to read rules file '{path}': {source}")]
    RuleFileIo {
        /// Path to the file
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// A rule line did not match `output (frequency) = method input`
    #[error("invalid rule on line {line}: {message}")]
    InvalidRuleLine {
        /// 1-based line number
        line: usize,
        /// What was wrong
        message: String,
    },

    /// The method name is not one of sum, avg, min, max
    #[error("unknown aggregation method '{method}' on line {line}")]
    UnknownMethod {
        /// The offending method name
        method: String,
        /// 1-based line number
        line: usize,
    },

    /// The compiled input pattern was rejected by the regex engine
    #[error("invalid input pattern on line {line}: {source}")]
    InvalidPattern {
        /// 1-based line number
        line: usize,
        /// Regex compile error
        #[source]
        source: regex::Error,
    },
}
