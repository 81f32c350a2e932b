//! Broadcast event bus for edge-triggered relay conditions

use tokio::sync::broadcast;

/// Default broadcast channel capacity
///
/// Events are edge-triggered (at most one per episode), so a small buffer
/// is plenty. Slow subscribers that lag simply miss old events.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// An observable relay condition
///
/// All variants are edge-triggered: each fires once per episode, not once
/// per datapoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// The ingest cache reached its size cap; newest stores may be dropped
    CacheFull,

    /// The ingest cache drained back under its low watermark
    CacheSpaceAvailable,

    /// A delivery channel's queue reached its bound (destination attached)
    QueueFull {
        /// Display form of the affected destination
        destination: String,
    },

    /// A delivery channel's queue drained back under its low watermark
    QueueSpaceAvailable {
        /// Display form of the affected destination
        destination: String,
    },

    /// The intake boundary should pause accepting new datapoints
    PauseReceiving,

    /// The intake boundary may resume accepting datapoints
    ResumeReceiving,
}

/// Broadcast bus connecting relay components to their observers
///
/// Cloning the bus is cheap; all clones share one underlying channel.
/// Emitting with no subscribers is a no-op, so components can fire events
/// unconditionally.
///
/// # Example
///
/// ```
/// use metro_events::{EventBus, RelayEvent};
///
/// let bus = EventBus::new();
/// let mut rx = bus.subscribe();
///
/// bus.emit(RelayEvent::CacheFull);
/// assert_eq!(rx.try_recv().unwrap(), RelayEvent::CacheFull);
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RelayEvent>,
}

impl EventBus {
    /// Create a new event bus with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(EVENT_BUS_CAPACITY)
    }

    /// Create a new event bus with an explicit capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.sender.subscribe()
    }

    /// Emit an event to all current subscribers
    ///
    /// Returns the number of subscribers that received it. Zero subscribers
    /// is not an error.
    pub fn emit(&self, event: RelayEvent) -> usize {
        tracing::trace!(event = ?event, "relay event");
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_all_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.emit(RelayEvent::PauseReceiving), 2);

        assert_eq!(rx1.recv().await.unwrap(), RelayEvent::PauseReceiving);
        assert_eq!(rx2.recv().await.unwrap(), RelayEvent::PauseReceiving);
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let bus = EventBus::new();
        assert_eq!(bus.emit(RelayEvent::CacheFull), 0);
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let bus = EventBus::new();
        let clone = bus.clone();
        let mut rx = bus.subscribe();

        clone.emit(RelayEvent::QueueFull {
            destination: "host1:2004".into(),
        });

        assert!(matches!(
            rx.recv().await.unwrap(),
            RelayEvent::QueueFull { .. }
        ));
    }
}
