//! Metro Delivery - Outbound delivery to downstream destinations
//!
//! One [`DeliveryChannel`] exists per destination: a bounded dual-lane queue
//! in front of a reconnecting TCP connection, drained by a batch flush loop.
//! The [`DeliveryManager`] owns the channels, consults the router for every
//! datapoint, and fans entries out to the resolved destinations.
//!
//! # Backpressure
//!
//! Normal enqueues beyond the queue bound drop the newest entry and raise a
//! queue-full event once per episode; priority enqueues (the relay's own
//! operational series) insert at the head and are never dropped. Refilling
//! below the low watermark raises the matching space-available event, again
//! once per episode.

mod channel;
mod error;
mod manager;
mod metrics;
mod queue;

pub use channel::{ChannelState, DeliveryChannel};
pub use error::{DeliveryError, Result};
pub use manager::DeliveryManager;
pub use metrics::{ChannelMetrics, ChannelMetricsSnapshot};

// Test modules - only compiled during testing
#[cfg(test)]
mod channel_test;
#[cfg(test)]
mod manager_test;
