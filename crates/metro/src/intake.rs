//! Plaintext line-protocol intake
//!
//! Accepts `name value timestamp\n` lines over TCP and stores validated
//! datapoints into the ingest cache. A timestamp of `-1` means "now".
//! Pause/resume events from the relay core gate reading: paused
//! connections stay open but stop pulling bytes, pushing backpressure
//! onto the senders' sockets.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use metro_cache::IngestCache;
use metro_config::IntakeConfig;
use metro_events::{EventBus, RelayCounters, RelayEvent};
use metro_protocol::{Datapoint, MetricName};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, trace, warn};

/// How long a paused connection sleeps before re-checking the gate
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Line-protocol TCP listener
pub struct LineListener {
    config: IntakeConfig,
    cache: Arc<IngestCache>,
    counters: Arc<RelayCounters>,
    events: EventBus,
    paused: Arc<AtomicBool>,
    malformed: Arc<AtomicU64>,
}

impl LineListener {
    pub fn new(
        config: IntakeConfig,
        cache: Arc<IngestCache>,
        counters: Arc<RelayCounters>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            cache,
            counters,
            events,
            paused: Arc::new(AtomicBool::new(false)),
            malformed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Bind and accept connections until the task is cancelled
    pub async fn run(self) -> Result<()> {
        let bind_address = format!("{}:{}", self.config.address, self.config.port);
        let listener = TcpListener::bind(&bind_address)
            .await
            .with_context(|| format!("binding intake listener on {bind_address}"))?;
        info!(address = %bind_address, "intake listening");

        self.spawn_pause_watcher();

        loop {
            let (socket, peer) = listener.accept().await.context("intake accept failed")?;
            debug!(peer = %peer, "intake connection opened");

            let cache = Arc::clone(&self.cache);
            let counters = Arc::clone(&self.counters);
            let paused = Arc::clone(&self.paused);
            let malformed = Arc::clone(&self.malformed);
            tokio::spawn(async move {
                if let Err(e) =
                    handle_connection(socket, peer, cache, counters, paused, malformed).await
                {
                    debug!(peer = %peer, error = %e, "intake connection closed with error");
                }
            });
        }
    }

    /// Track pause/resume events on a dedicated task
    fn spawn_pause_watcher(&self) {
        let paused = Arc::clone(&self.paused);
        let mut rx = self.events.subscribe();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(RelayEvent::PauseReceiving) => {
                        if !paused.swap(true, Ordering::AcqRel) {
                            warn!("intake paused, relay is backed up");
                        }
                    }
                    Ok(RelayEvent::ResumeReceiving) => {
                        if paused.swap(false, Ordering::AcqRel) {
                            info!("intake resumed");
                        }
                    }
                    Ok(_) => {}
                    // Missing an edge event here is recovered by the next
                    // one; resume always follows pause eventually.
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return,
                }
            }
        });
    }
}

async fn handle_connection(
    socket: TcpStream,
    peer: SocketAddr,
    cache: Arc<IngestCache>,
    counters: Arc<RelayCounters>,
    paused: Arc<AtomicBool>,
    malformed: Arc<AtomicU64>,
) -> Result<()> {
    let mut lines = BufReader::new(socket).lines();

    while let Some(line) = lines.next_line().await? {
        while paused.load(Ordering::Acquire) {
            tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
        }

        match parse_line(&line) {
            Some((metric, datapoint)) => {
                cache.store(metric, datapoint);
                counters.record_received();
            }
            None => {
                if !line.trim().is_empty() {
                    malformed.fetch_add(1, Ordering::Relaxed);
                    trace!(peer = %peer, line = %line, "malformed intake line");
                }
            }
        }
    }

    debug!(peer = %peer, "intake connection closed");
    Ok(())
}

/// Parse one `name value timestamp` line
///
/// Rejects empty names, non-finite values, extra fields, and negative
/// timestamps other than the `-1` "now" sentinel.
fn parse_line(line: &str) -> Option<(MetricName, Datapoint)> {
    let mut parts = line.split_whitespace();
    let name = parts.next()?;
    let value: f64 = parts.next()?.parse().ok()?;
    let timestamp: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || name.is_empty() {
        return None;
    }
    if !value.is_finite() || !timestamp.is_finite() {
        return None;
    }

    let timestamp = if timestamp == -1.0 {
        now_secs()
    } else if timestamp < 0.0 {
        return None;
    } else {
        timestamp
    };

    Some((MetricName::new(name), Datapoint::new(timestamp, value)))
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
