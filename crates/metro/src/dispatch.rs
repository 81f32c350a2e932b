//! Cache-to-delivery dispatch loop
//!
//! Drains the ingest cache largest-queues-first, feeds each datapoint
//! through the aggregation engine, and hands it to the delivery manager
//! for routed fan-out. Largest-first keeps the hottest metrics from
//! monopolizing cache space during bursts.

use std::sync::Arc;
use std::time::Duration;

use metro_aggregate::AggregationEngine;
use metro_cache::IngestCache;
use metro_delivery::DeliveryManager;
use metro_protocol::QueueEntry;
use tracing::trace;

/// How often the dispatch loop scans a quiet cache
const DISPATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Drive dispatch until the task is cancelled
pub async fn run(
    cache: Arc<IngestCache>,
    engine: Option<Arc<AggregationEngine>>,
    manager: Arc<DeliveryManager>,
) {
    let mut ticker = tokio::time::interval(DISPATCH_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let dispatched = drain_once(&cache, engine.as_deref(), &manager);
        if dispatched > 0 {
            trace!(dispatched, "dispatch cycle");
        }
    }
}

/// Drain every queued datapoint once, largest queues first
///
/// Returns the number of datapoints dispatched. Also used for the final
/// flush during shutdown.
pub fn drain_once(
    cache: &IngestCache,
    engine: Option<&AggregationEngine>,
    manager: &DeliveryManager,
) -> usize {
    let mut counts = cache.counts();
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let mut dispatched = 0;
    for (metric, len) in counts {
        if len == 0 {
            continue;
        }
        // A concurrent take by another drain is fine; skip and move on.
        let Ok(datapoints) = cache.take(&metric) else {
            continue;
        };
        for datapoint in datapoints {
            if let Some(engine) = engine {
                engine.observe(&metric, datapoint);
            }
            manager.send(QueueEntry::new(metric.clone(), datapoint));
            dispatched += 1;
        }
    }
    dispatched
}
