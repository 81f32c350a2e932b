//! Metro Cache - Ingest buffering between arrival and dispatch
//!
//! The [`IngestCache`] absorbs bursts between the intake boundary and the
//! dispatch loop. It is the hand-off point from arbitrary producer threads
//! into the relay's tasks and therefore the one component guarded by an
//! explicit mutex: the size counter and the per-metric queues are only ever
//! mutated together under that lock, so the counter always equals the sum
//! of queued datapoints.
//!
//! Overflow is observable, never fatal: reaching the size cap fires
//! `CacheFull` and `PauseReceiving` once per episode; draining back under
//! the low watermark fires `CacheSpaceAvailable` and `ResumeReceiving`
//! exactly once.

mod cache;
mod error;

pub use cache::IngestCache;
pub use error::CacheError;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
