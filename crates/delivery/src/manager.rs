//! Destination lifecycle and routed fan-out

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metro_config::DeliveryConfig;
use metro_events::{EventBus, RelayCounters};
use metro_protocol::{Destination, MetricName, QueueEntry};
use metro_routing::Router;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::DeliveryChannel;
use crate::{DeliveryError, Result};

/// Owns every delivery channel and routes datapoints onto them
///
/// The router decides *where* a metric goes; the manager owns the channels
/// that get it there. Destinations the router resolves but the manager does
/// not know are skipped silently, which keeps a mid-reconfiguration window
/// (rule file mentions a host before it is started) from failing sends.
pub struct DeliveryManager {
    router: Arc<dyn Router>,
    config: DeliveryConfig,
    events: EventBus,
    counters: Arc<RelayCounters>,
    channels: parking_lot::RwLock<HashMap<String, Arc<DeliveryChannel>>>,
    tasks: parking_lot::Mutex<HashMap<String, JoinHandle<()>>>,
}

impl DeliveryManager {
    /// Create a manager over a router
    pub fn new(
        router: Arc<dyn Router>,
        config: DeliveryConfig,
        events: EventBus,
        counters: Arc<RelayCounters>,
    ) -> Self {
        Self {
            router,
            config,
            events,
            counters,
            channels: parking_lot::RwLock::new(HashMap::new()),
            tasks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Number of started destinations
    pub fn destination_count(&self) -> usize {
        self.channels.read().len()
    }

    /// The channel for a routing key, if started
    pub fn channel(&self, key: &str) -> Option<Arc<DeliveryChannel>> {
        self.channels.read().get(key).cloned()
    }

    /// Start a destination: register it with the router and spawn its channel
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::DuplicateDestination`] when a channel for
    /// the same `(host, instance)` key is already running, and propagates
    /// router registration failures.
    pub fn start_destination(&self, destination: Destination) -> Result<()> {
        let key = destination.routing_key();

        {
            let channels = self.channels.read();
            if channels.contains_key(&key) {
                return Err(DeliveryError::DuplicateDestination { key });
            }
        }

        self.router.add_destination(destination.clone())?;

        let channel = Arc::new(DeliveryChannel::new(
            destination,
            self.config.clone(),
            self.events.clone(),
            Arc::clone(&self.counters),
        ));
        let task = tokio::spawn(Arc::clone(&channel).run());

        self.channels.write().insert(key.clone(), channel);
        self.tasks.lock().insert(key.clone(), task);

        info!(destination = %key, "destination started");
        Ok(())
    }

    /// Stop a destination: deregister, drain, disconnect
    ///
    /// The drain wait is bounded by `drain_timeout`; a channel still busy
    /// after that is aborted, abandoning whatever remains queued.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::UnknownDestination`] when no channel is
    /// running under this key.
    pub async fn stop_destination(&self, key: &str, drain_timeout: Duration) -> Result<()> {
        let channel = self
            .channels
            .write()
            .remove(key)
            .ok_or_else(|| DeliveryError::UnknownDestination {
                key: key.to_string(),
            })?;
        let task = self.tasks.lock().remove(key);

        // Deregister first so no new entries are routed here while draining.
        if let Err(e) = self.router.remove_destination(channel.destination()) {
            warn!(destination = %key, error = %e, "router deregistration failed");
        }

        if tokio::time::timeout(drain_timeout, channel.stop())
            .await
            .is_err()
        {
            warn!(
                destination = %key,
                queued = channel.queue_len(),
                "drain timeout elapsed, aborting channel"
            );
            channel.abort();
        }

        if let Some(task) = task {
            let _ = task.await;
        }

        info!(destination = %key, "destination stopped");
        Ok(())
    }

    /// Stop every destination, draining each within `drain_timeout`
    pub async fn stop_all(&self, drain_timeout: Duration) {
        let keys: Vec<String> = self.channels.read().keys().cloned().collect();
        for key in keys {
            if let Err(e) = self.stop_destination(&key, drain_timeout).await {
                warn!(destination = %key, error = %e, "stop failed");
            }
        }
    }

    /// Route one entry and enqueue it on every resolved destination
    ///
    /// Returns how many channels accepted it. Resolved destinations without
    /// a started channel are skipped.
    pub fn send(&self, entry: QueueEntry) -> usize {
        self.fan_out(entry, false)
    }

    /// Route one entry onto the priority lane of every resolved destination
    pub fn send_priority(&self, entry: QueueEntry) -> usize {
        self.fan_out(entry, true)
    }

    fn fan_out(&self, entry: QueueEntry, priority: bool) -> usize {
        let destinations = self.router.resolve(&entry.metric);
        if destinations.is_empty() {
            debug!(metric = %entry.metric, "no destinations resolved");
            return 0;
        }

        let channels = self.channels.read();
        let mut accepted = 0;
        for destination in &destinations {
            let Some(channel) = channels.get(&destination.routing_key()) else {
                continue;
            };
            let ok = if priority {
                channel.enqueue_priority(entry.clone())
            } else {
                channel.enqueue(entry.clone())
            };
            if ok {
                accepted += 1;
            }
        }
        accepted
    }

    /// Resolve a metric without sending, for diagnostics
    pub fn resolve(&self, metric: &MetricName) -> Vec<Destination> {
        self.router.resolve(metric)
    }
}
