//! Per-destination delivery channel
//!
//! A channel owns one TCP connection to its destination and the dual-lane
//! queue in front of it. The flush loop pops bounded batches, encodes them
//! with the configured codec, and sends them length-prefixed; failures
//! requeue the batch at the head and enter a capped-backoff reconnect.

use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use metro_config::{DeliveryConfig, QualityConfig};
use metro_events::{EventBus, RelayCounters, RelayEvent};
use metro_protocol::{frame, BatchCodec, BincodeCodec, Destination, QueueEntry};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, trace, warn};

use crate::metrics::ChannelMetrics;
use crate::queue::{DeliveryQueue, PushOutcome};
use crate::{DeliveryError, Result};

/// Lifecycle of a delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection; the flush loop will reconnect before sending
    Disconnected,
    /// A connection attempt is in flight
    Connecting,
    /// Connected and flushing
    Connected,
    /// Stop requested; flushing the remaining queue, refusing new sends
    Draining,
    /// Flush loop exited; the channel is dead
    Stopped,
}

/// Delivery channel for one destination
///
/// `enqueue` is called synchronously from the dispatch path; the async
/// [`run`](Self::run) loop owns the connection and the flush schedule.
pub struct DeliveryChannel {
    destination: Destination,
    config: DeliveryConfig,
    codec: Arc<dyn BatchCodec>,
    queue: parking_lot::Mutex<DeliveryQueue>,
    state: parking_lot::Mutex<ChannelState>,
    connection: tokio::sync::Mutex<Option<TcpStream>>,
    events: EventBus,
    counters: Arc<RelayCounters>,
    metrics: ChannelMetrics,
    accepting: AtomicBool,
    /// Set after the first successful connect; later ones are reconnects
    ever_connected: AtomicBool,
    stopped: Notify,
}

impl DeliveryChannel {
    /// Create a channel with the default bincode codec
    pub fn new(
        destination: Destination,
        config: DeliveryConfig,
        events: EventBus,
        counters: Arc<RelayCounters>,
    ) -> Self {
        Self::with_codec(destination, config, events, counters, Arc::new(BincodeCodec))
    }

    /// Create a channel with an explicit payload codec
    pub fn with_codec(
        destination: Destination,
        config: DeliveryConfig,
        events: EventBus,
        counters: Arc<RelayCounters>,
        codec: Arc<dyn BatchCodec>,
    ) -> Self {
        let queue = DeliveryQueue::new(config.max_queue_size, config.queue_low_watermark_size());
        Self {
            destination,
            config,
            codec,
            queue: parking_lot::Mutex::new(queue),
            state: parking_lot::Mutex::new(ChannelState::Disconnected),
            connection: tokio::sync::Mutex::new(None),
            events,
            counters,
            metrics: ChannelMetrics::new(),
            accepting: AtomicBool::new(true),
            ever_connected: AtomicBool::new(false),
            stopped: Notify::new(),
        }
    }

    /// The destination this channel delivers to
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Current lifecycle state
    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    /// Entries currently queued
    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Channel metrics
    pub fn metrics(&self) -> &ChannelMetrics {
        &self.metrics
    }

    /// Queue a datapoint on the normal lane
    ///
    /// Returns false when the entry was dropped, either because the queue
    /// is at its bound or because the channel is stopping. The first drop
    /// of a full episode emits [`RelayEvent::QueueFull`] and the global
    /// pause signal.
    pub fn enqueue(&self, entry: QueueEntry) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            return false;
        }

        let outcome = self.queue.lock().push(entry);
        match outcome {
            PushOutcome::Queued => true,
            PushOutcome::Dropped { first_of_episode } => {
                self.metrics.record_dropped();
                if first_of_episode {
                    warn!(
                        destination = %self.destination.routing_key(),
                        max_queue_size = self.config.max_queue_size,
                        "delivery queue full, dropping newest entries"
                    );
                    self.events.emit(RelayEvent::QueueFull {
                        destination: self.destination.routing_key(),
                    });
                    self.events.emit(RelayEvent::PauseReceiving);
                }
                false
            }
        }
    }

    /// Queue a datapoint on the priority lane
    ///
    /// Goes ahead of every normal entry, FIFO behind earlier priority
    /// entries, and is exempt from the queue bound. Only refused once the
    /// channel is stopping.
    pub fn enqueue_priority(&self, entry: QueueEntry) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            return false;
        }
        self.queue.lock().push_priority(entry);
        true
    }

    /// Request a stop and wait for the flush loop to drain and exit
    ///
    /// New sends are refused immediately; already-queued entries are
    /// flushed best-effort. This waits without bound, so callers cap it
    /// with a timeout and fall back to [`abort`](Self::abort).
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == ChannelState::Stopped {
                return;
            }
            *state = ChannelState::Draining;
        }
        self.accepting.store(false, Ordering::Release);

        loop {
            if self.state() == ChannelState::Stopped {
                return;
            }
            self.stopped.notified().await;
        }
    }

    /// Stop immediately, abandoning any queued entries
    pub fn abort(&self) {
        self.accepting.store(false, Ordering::Release);
        *self.state.lock() = ChannelState::Stopped;
        self.stopped.notify_one();
    }

    /// Drive the flush loop until stopped
    pub async fn run(self: Arc<Self>) {
        info!(
            destination = %self.destination.routing_key(),
            target = %self.destination.address(),
            "delivery channel starting"
        );

        let quality = self.config.quality.clone();
        let mut window = QualityWindow::new(&self.counters, &self.metrics);

        if !self.connect_with_backoff().await {
            self.finish().await;
            return;
        }

        loop {
            if self.state() == ChannelState::Stopped {
                break;
            }

            let (batch, episode_ended) =
                self.queue.lock().pop_batch(self.config.max_batch_size);
            if episode_ended {
                debug!(
                    destination = %self.destination.routing_key(),
                    "delivery queue drained below watermark"
                );
                self.events.emit(RelayEvent::QueueSpaceAvailable {
                    destination: self.destination.routing_key(),
                });
                self.events.emit(RelayEvent::ResumeReceiving);
            }

            if batch.is_empty() {
                if self.state() == ChannelState::Draining {
                    break;
                }
                tokio::time::sleep(self.config.flush_interval()).await;
                if self.quality_violation(&quality, &mut window) {
                    self.force_disconnect().await;
                    if !self.connect_with_backoff().await {
                        break;
                    }
                }
                continue;
            }

            match self.send_batch(&batch).await {
                Ok(bytes) => {
                    self.metrics.record_sent(batch.len() as u64, bytes as u64);
                    trace!(
                        destination = %self.destination.routing_key(),
                        datapoints = batch.len(),
                        bytes,
                        "batch sent"
                    );
                }
                Err(e) => {
                    self.metrics.record_error();
                    warn!(
                        destination = %self.destination.routing_key(),
                        error = %e,
                        datapoints = batch.len(),
                        "batch send failed, requeueing"
                    );
                    self.queue.lock().requeue_front(batch);
                    if !self.connect_with_backoff().await {
                        break;
                    }
                    continue;
                }
            }

            if self.quality_violation(&quality, &mut window) {
                self.force_disconnect().await;
                if !self.connect_with_backoff().await {
                    break;
                }
            }

            // Cooperative pause between consecutive batches
            if !self.queue.lock().is_empty() {
                tokio::time::sleep(self.config.flush_interval()).await;
            }
        }

        self.finish().await;
    }

    async fn finish(&self) {
        {
            let mut conn = self.connection.lock().await;
            *conn = None;
        }
        *self.state.lock() = ChannelState::Stopped;
        self.stopped.notify_one();

        let snapshot = self.metrics.snapshot();
        let abandoned = self.queue.lock().len();
        info!(
            destination = %self.destination.routing_key(),
            batches_sent = snapshot.batches_sent,
            datapoints_sent = snapshot.datapoints_sent,
            datapoints_dropped = snapshot.datapoints_dropped,
            send_errors = snapshot.send_errors,
            reconnects = snapshot.reconnects,
            abandoned,
            "delivery channel stopped"
        );
    }

    /// Reconnect with capped exponential backoff
    ///
    /// Returns false only when the channel was stopped while retrying.
    async fn connect_with_backoff(&self) -> bool {
        let mut backoff = self.config.reconnect_backoff();

        loop {
            if self.state() == ChannelState::Stopped {
                return false;
            }

            match self.connect().await {
                Ok(()) => {
                    let mut state = self.state.lock();
                    if matches!(
                        *state,
                        ChannelState::Disconnected | ChannelState::Connecting
                    ) {
                        *state = ChannelState::Connected;
                    }
                    return true;
                }
                Err(e) => {
                    debug!(
                        destination = %self.destination.routing_key(),
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "connection attempt failed"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.reconnect_backoff_max());
                }
            }
        }
    }

    /// Establish a fresh connection, replacing any existing one
    async fn connect(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if matches!(*state, ChannelState::Disconnected) {
                *state = ChannelState::Connecting;
            }
        }

        let target = self.destination.address();
        let mut conn = self.connection.lock().await;
        *conn = None;

        let stream = match timeout(
            self.config.connection_timeout(),
            TcpStream::connect(&target),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(DeliveryError::ConnectionFailed { target, source: e });
            }
            Err(_) => {
                return Err(DeliveryError::ConnectionFailed {
                    target,
                    source: std::io::Error::new(ErrorKind::TimedOut, "connection timed out"),
                });
            }
        };

        // TCP_NODELAY, non-fatal if it fails
        if let Err(e) = stream.set_nodelay(true) {
            debug!(
                destination = %self.destination.routing_key(),
                error = %e,
                "failed to set TCP_NODELAY, continuing with default buffering"
            );
        }

        if self.config.tcp_keepalive {
            let sock_ref = SockRef::from(&stream);
            let keepalive = TcpKeepalive::new().with_time(self.config.tcp_keepalive_interval());

            // On Linux, also set the interval between probes
            #[cfg(target_os = "linux")]
            let keepalive = keepalive.with_interval(self.config.tcp_keepalive_interval());

            if let Err(e) = sock_ref.set_tcp_keepalive(&keepalive) {
                debug!(
                    destination = %self.destination.routing_key(),
                    error = %e,
                    "failed to set TCP keep-alive, continuing without keep-alive"
                );
            }
        }

        if self.ever_connected.swap(true, Ordering::Relaxed) {
            self.metrics.record_reconnect();
        }
        debug!(
            destination = %self.destination.routing_key(),
            target = %self.destination.address(),
            "connected to destination"
        );

        *conn = Some(stream);
        Ok(())
    }

    /// Encode, frame, and write one batch
    ///
    /// A write error or timeout invalidates the connection so the next
    /// attempt reconnects rather than writing into a dead socket.
    async fn send_batch(&self, batch: &[QueueEntry]) -> Result<usize> {
        let payload = self.codec.encode(batch)?;
        let framed = frame(&payload)?;

        let mut conn = self.connection.lock().await;
        let stream = conn.as_mut().ok_or(DeliveryError::NoConnection)?;

        let write_result = timeout(self.config.write_timeout(), async {
            stream.write_all(&framed).await?;
            stream.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await;

        match write_result {
            Ok(Ok(())) => Ok(framed.len()),
            Ok(Err(e)) => {
                *conn = None;
                self.mark_disconnected();
                Err(DeliveryError::WriteFailed(e))
            }
            Err(_) => {
                *conn = None;
                self.mark_disconnected();
                Err(DeliveryError::WriteTimeout)
            }
        }
    }

    fn mark_disconnected(&self) {
        let mut state = self.state.lock();
        if *state == ChannelState::Connected {
            *state = ChannelState::Disconnected;
        }
    }

    async fn force_disconnect(&self) {
        warn!(
            destination = %self.destination.routing_key(),
            "connection quality below threshold, forcing reconnect"
        );
        {
            let mut conn = self.connection.lock().await;
            *conn = None;
        }
        self.mark_disconnected();
    }

    /// Evaluate the quality monitor over the interval since the last check
    ///
    /// The ratio compares this channel's sent datapoints against the
    /// system-wide received volume; a destination accepting connections but
    /// draining too slowly shows up as a low ratio while everyone else
    /// keeps pace.
    fn quality_violation(&self, quality: &QualityConfig, window: &mut QualityWindow) -> bool {
        if !quality.enabled {
            return false;
        }

        let received = self.counters.received();
        let sent = self.metrics.datapoints_sent();
        let received_delta = received.saturating_sub(window.received);
        let sent_delta = sent.saturating_sub(window.sent);
        window.received = received;
        window.sent = sent;

        if received_delta < quality.min_sample {
            return false;
        }
        let ratio = sent_delta as f64 / received_delta as f64;
        if ratio >= quality.min_ratio {
            return false;
        }
        if window.last_forced.elapsed() < quality.reset_interval() {
            return false;
        }

        window.last_forced = Instant::now();
        debug!(
            destination = %self.destination.routing_key(),
            ratio,
            min_ratio = quality.min_ratio,
            received_delta,
            sent_delta,
            "quality violation detected"
        );
        true
    }

    #[cfg(test)]
    pub(crate) fn dropped_total(&self) -> u64 {
        self.queue.lock().dropped_total()
    }
}

/// Interval sampling state for the quality monitor
struct QualityWindow {
    received: u64,
    sent: u64,
    last_forced: Instant,
}

impl QualityWindow {
    fn new(counters: &RelayCounters, metrics: &ChannelMetrics) -> Self {
        Self {
            received: counters.received(),
            sent: metrics.datapoints_sent(),
            // Start cold so a violation in the very first interval after
            // startup does not immediately bounce the connection.
            last_forced: Instant::now(),
        }
    }
}
