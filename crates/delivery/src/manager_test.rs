//! Tests for the delivery manager

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metro_config::DeliveryConfig;
use metro_events::{EventBus, RelayCounters};
use metro_protocol::{BatchCodec, BincodeCodec, Datapoint, Destination, MetricName, QueueEntry};
use metro_routing::{ConsistentHashRouter, Router};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::{DeliveryError, DeliveryManager};

fn entry(name: &str) -> QueueEntry {
    QueueEntry::new(MetricName::new(name), Datapoint::new(100.0, 1.0))
}

fn fast_config() -> DeliveryConfig {
    DeliveryConfig {
        flush_interval_ms: 1,
        reconnect_backoff_ms: 10,
        reconnect_backoff_max_ms: 50,
        ..DeliveryConfig::default()
    }
}

fn manager() -> DeliveryManager {
    DeliveryManager::new(
        Arc::new(ConsistentHashRouter::new(1)),
        fast_config(),
        EventBus::new(),
        Arc::new(RelayCounters::new()),
    )
}

async fn spawn_frame_server() -> (SocketAddr, mpsc::UnboundedReceiver<QueueEntry>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                loop {
                    let mut len_buf = [0u8; 4];
                    if socket.read_exact(&mut len_buf).await.is_err() {
                        return;
                    }
                    let len = u32::from_be_bytes(len_buf) as usize;
                    let mut payload = vec![0u8; len];
                    if socket.read_exact(&mut payload).await.is_err() {
                        return;
                    }
                    for entry in BincodeCodec.decode(&payload).unwrap() {
                        let _ = tx.send(entry);
                    }
                }
            });
        }
    });

    (addr, rx)
}

// =============================================================================
// Destination lifecycle
// =============================================================================

#[tokio::test]
async fn test_duplicate_start_is_error() {
    let manager = manager();
    let dest = Destination::new("127.0.0.1", 19001);

    manager.start_destination(dest.clone()).unwrap();
    let err = manager.start_destination(dest).unwrap_err();
    assert!(matches!(err, DeliveryError::DuplicateDestination { .. }));

    manager.stop_all(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_stop_unknown_destination_is_error() {
    let manager = manager();
    let err = manager
        .stop_destination("nowhere", Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::UnknownDestination { .. }));
}

#[tokio::test]
async fn test_stop_removes_destination_from_routing() {
    let (addr, _rx) = spawn_frame_server().await;
    let manager = manager();
    let dest = Destination::new(addr.ip().to_string(), addr.port());
    let key = dest.routing_key();

    manager.start_destination(dest).unwrap();
    assert_eq!(manager.destination_count(), 1);
    assert_eq!(manager.resolve(&MetricName::new("any.metric")).len(), 1);

    manager
        .stop_destination(&key, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(manager.destination_count(), 0);
    assert!(manager.resolve(&MetricName::new("any.metric")).is_empty());
    assert_eq!(manager.send(entry("any.metric")), 0);
}

// =============================================================================
// Routed fan-out
// =============================================================================

#[tokio::test]
async fn test_send_delivers_via_resolved_channel() {
    let (addr, mut rx) = spawn_frame_server().await;
    let manager = manager();
    manager
        .start_destination(Destination::new(addr.ip().to_string(), addr.port()))
        .unwrap();

    assert_eq!(manager.send(entry("hosts.web01.cpu")), 1);

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("entry never delivered")
        .unwrap();
    assert_eq!(received.metric.as_str(), "hosts.web01.cpu");

    manager.stop_all(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_send_skips_destinations_without_channels() {
    // Router resolves a destination the manager never started.
    struct FixedRouter(Destination);
    impl Router for FixedRouter {
        fn add_destination(&self, _: Destination) -> metro_routing::Result<()> {
            Ok(())
        }
        fn remove_destination(&self, _: &Destination) -> metro_routing::Result<()> {
            Ok(())
        }
        fn resolve(&self, _: &MetricName) -> Vec<Destination> {
            vec![self.0.clone()]
        }
    }

    let manager = DeliveryManager::new(
        Arc::new(FixedRouter(Destination::new("10.0.0.1", 2004))),
        fast_config(),
        EventBus::new(),
        Arc::new(RelayCounters::new()),
    );

    // Silently skipped, not an error.
    assert_eq!(manager.send(entry("hosts.web01.cpu")), 0);
    assert_eq!(manager.send_priority(entry("hosts.web01.cpu")), 0);
}

#[tokio::test]
async fn test_send_priority_delivers() {
    let (addr, mut rx) = spawn_frame_server().await;
    let manager = manager();
    manager
        .start_destination(Destination::new(addr.ip().to_string(), addr.port()))
        .unwrap();

    assert_eq!(manager.send_priority(entry("metro.self.queue_depth")), 1);

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("entry never delivered")
        .unwrap();
    assert_eq!(received.metric.as_str(), "metro.self.queue_depth");

    manager.stop_all(Duration::from_secs(2)).await;
}
