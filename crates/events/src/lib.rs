//! Metro Events - Relay event bus and global counters
//!
//! The relay core does not publish instrumentation itself; it emits events
//! that an external publisher (or the intake boundary) consumes:
//!
//! - Edge-triggered conditions (`CacheFull`, `QueueFull`, `PauseReceiving`,
//!   ...) go through a broadcast [`EventBus`] with explicit subscribers.
//! - High-rate signals (datapoints received / generated) are relaxed atomic
//!   counters on [`RelayCounters`], read as point-in-time snapshots. Pushing
//!   one broadcast event per datapoint would swamp the bus.
//!
//! The delivery layer's connection quality monitor reads the received
//! counter to compare a channel's throughput against system-wide intake.

mod bus;
mod counters;

pub use bus::{EventBus, RelayEvent, EVENT_BUS_CAPACITY};
pub use counters::{CounterSnapshot, RelayCounters};
