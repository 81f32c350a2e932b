//! Tests for the delivery channel

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metro_config::DeliveryConfig;
use metro_events::{EventBus, RelayCounters, RelayEvent};
use metro_protocol::{BatchCodec, BincodeCodec, Datapoint, Destination, MetricName, QueueEntry};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::{ChannelState, DeliveryChannel};

fn entry(name: &str, value: f64) -> QueueEntry {
    QueueEntry::new(MetricName::new(name), Datapoint::new(100.0, value))
}

fn fast_config() -> DeliveryConfig {
    DeliveryConfig {
        flush_interval_ms: 1,
        reconnect_backoff_ms: 10,
        reconnect_backoff_max_ms: 50,
        connection_timeout_secs: 2,
        ..DeliveryConfig::default()
    }
}

fn channel_to(addr: SocketAddr, config: DeliveryConfig) -> (Arc<DeliveryChannel>, EventBus) {
    let events = EventBus::new();
    let channel = DeliveryChannel::new(
        Destination::new(addr.ip().to_string(), addr.port()),
        config,
        events.clone(),
        Arc::new(RelayCounters::new()),
    );
    (Arc::new(channel), events)
}

/// Accepts connections and decodes every length-prefixed batch it reads
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

async fn recv_entry(rx: &mut mpsc::UnboundedReceiver<QueueEntry>) -> QueueEntry {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no entry delivered")
        .expect("server closed")
}

// =============================================================================
// Flush loop
// =============================================================================

#[tokio::test]
async fn test_enqueued_entries_are_delivered_in_order() {
    let (addr, mut rx) = spawn_frame_server().await;
    let (channel, _events) = channel_to(addr, fast_config());

    assert!(channel.enqueue(entry("a", 1.0)));
    assert!(channel.enqueue(entry("b", 2.0)));
    assert!(channel.enqueue(entry("c", 3.0)));

    let task = tokio::spawn(Arc::clone(&channel).run());

    assert_eq!(recv_entry(&mut rx).await.metric.as_str(), "a");
    assert_eq!(recv_entry(&mut rx).await.metric.as_str(), "b");
    assert_eq!(recv_entry(&mut rx).await.metric.as_str(), "c");

    let snapshot = channel.metrics().snapshot();
    assert!(snapshot.batches_sent >= 1);
    assert_eq!(snapshot.datapoints_sent, 3);
    // A single uninterrupted connection is not a reconnect.
    assert_eq!(snapshot.reconnects, 0);

    channel.abort();
    let _ = task.await;
}

#[tokio::test]
async fn test_priority_entries_jump_the_queue() {
    let (addr, mut rx) = spawn_frame_server().await;
    let (channel, _events) = channel_to(addr, fast_config());

    channel.enqueue(entry("a", 1.0));
    channel.enqueue(entry("b", 2.0));
    channel.enqueue_priority(entry("urgent1", 8.0));
    channel.enqueue_priority(entry("urgent2", 9.0));

    let task = tokio::spawn(Arc::clone(&channel).run());

    // Priority entries lead, in their own enqueue order.
    assert_eq!(recv_entry(&mut rx).await.metric.as_str(), "urgent1");
    assert_eq!(recv_entry(&mut rx).await.metric.as_str(), "urgent2");
    assert_eq!(recv_entry(&mut rx).await.metric.as_str(), "a");
    assert_eq!(recv_entry(&mut rx).await.metric.as_str(), "b");

    channel.abort();
    let _ = task.await;
}

// =============================================================================
// Backpressure events
// =============================================================================

#[tokio::test]
async fn test_queue_full_emits_once_per_episode() {
    let config = DeliveryConfig {
        max_queue_size: 2,
        queue_low_watermark: 0.5,
        ..fast_config()
    };
    // No flush loop running: the queue fills and stays full.
    let (channel, events) = channel_to("127.0.0.1:1".parse().unwrap(), config);
    let mut rx = events.subscribe();

    assert!(channel.enqueue(entry("a", 1.0)));
    assert!(channel.enqueue(entry("b", 2.0)));
    assert!(!channel.enqueue(entry("c", 3.0)));
    assert!(!channel.enqueue(entry("d", 4.0)));

    assert!(matches!(rx.try_recv().unwrap(), RelayEvent::QueueFull { .. }));
    assert_eq!(rx.try_recv().unwrap(), RelayEvent::PauseReceiving);
    // Second drop of the same episode emits nothing further.
    assert!(rx.try_recv().is_err());

    assert_eq!(channel.dropped_total(), 2);
    assert_eq!(channel.metrics().snapshot().datapoints_dropped, 2);
}

#[tokio::test]
async fn test_space_available_after_drain() {
    let (addr, mut server_rx) = spawn_frame_server().await;
    let config = DeliveryConfig {
        max_queue_size: 2,
        queue_low_watermark: 0.5,
        ..fast_config()
    };
    let (channel, events) = channel_to(addr, config);
    let mut rx = events.subscribe();

    channel.enqueue(entry("a", 1.0));
    channel.enqueue(entry("b", 2.0));
    assert!(!channel.enqueue(entry("c", 3.0)));

    let task = tokio::spawn(Arc::clone(&channel).run());

    // Both queued entries drain, ending the full episode.
    recv_entry(&mut server_rx).await;
    recv_entry(&mut server_rx).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut saw_space = false;
    let mut saw_resume = false;
    while tokio::time::Instant::now() < deadline && !(saw_space && saw_resume) {
        match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            Ok(Ok(RelayEvent::QueueSpaceAvailable { .. })) => saw_space = true,
            Ok(Ok(RelayEvent::ResumeReceiving)) => saw_resume = true,
            Ok(Ok(_)) => {}
            _ => {}
        }
    }
    assert!(saw_space && saw_resume);

    channel.abort();
    let _ = task.await;
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_stop_drains_before_stopping() {
    let (addr, mut rx) = spawn_frame_server().await;
    let (channel, _events) = channel_to(addr, fast_config());

    channel.enqueue(entry("a", 1.0));
    channel.enqueue(entry("b", 2.0));

    let task = tokio::spawn(Arc::clone(&channel).run());

    tokio::time::timeout(Duration::from_secs(5), channel.stop())
        .await
        .expect("drain did not finish");

    assert_eq!(channel.state(), ChannelState::Stopped);
    assert_eq!(recv_entry(&mut rx).await.metric.as_str(), "a");
    assert_eq!(recv_entry(&mut rx).await.metric.as_str(), "b");

    // Stopped channels refuse new sends.
    assert!(!channel.enqueue(entry("late", 1.0)));
    assert!(!channel.enqueue_priority(entry("late", 1.0)));

    let _ = task.await;
}

#[tokio::test]
async fn test_abort_stops_an_unconnectable_channel() {
    // Port 1 on loopback refuses connections, so the run loop sits in
    // reconnect backoff until aborted.
    let (channel, _events) = channel_to("127.0.0.1:1".parse().unwrap(), fast_config());
    let task = tokio::spawn(Arc::clone(&channel).run());

    tokio::time::sleep(Duration::from_millis(50)).await;
    channel.abort();

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("run loop did not exit after abort")
        .unwrap();
    assert_eq!(channel.state(), ChannelState::Stopped);
}
