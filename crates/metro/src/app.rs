//! Relay assembly and lifecycle

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metro_aggregate::{AggregationEngine, EngineSettings};
use metro_cache::IngestCache;
use metro_config::{Config, RoutingConfig, RoutingMethod};
use metro_delivery::DeliveryManager;
use metro_events::{EventBus, RelayCounters};
use metro_protocol::Destination;
use metro_routing::{
    spawn_rules_reload, AggregatingHashRouter, ConsistentHashRouter, Router, RuleBasedRouter,
};
use tokio::sync::mpsc;
use tracing::info;

use crate::dispatch;
use crate::intake::LineListener;

/// Capacity of the aggregate-output channel between engine and delivery
const AGGREGATE_CHANNEL_CAPACITY: usize = 1024;

/// How long shutdown waits for each delivery queue to drain
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Assemble the relay from config and run it until interrupted
pub async fn run(config: Config) -> Result<()> {
    let events = EventBus::new();
    let counters = Arc::new(RelayCounters::new());
    let cache = Arc::new(IngestCache::new(
        config.cache.max_size,
        config.cache.low_watermark_size(),
        events.clone(),
    ));

    let (aggregate_tx, mut aggregate_rx) = mpsc::channel(AGGREGATE_CHANNEL_CAPACITY);
    let engine = match &config.aggregation.rules_path {
        Some(path) => {
            let mut settings = EngineSettings::new(path);
            settings.max_retained_intervals = config.aggregation.max_retained_intervals;
            settings.reload_interval = Duration::from_secs(config.aggregation.rules_reload_secs);
            if let Some(secs) = config.aggregation.compute_interval_override_secs {
                settings.compute_interval = Duration::from_secs(secs);
            }
            let engine = AggregationEngine::new(settings, Arc::clone(&counters), aggregate_tx)
                .context("loading aggregation rules")?;
            Some(Arc::new(engine))
        }
        None => None,
    };

    let router = build_router(&config.routing, engine.as_deref())?;
    let manager = Arc::new(DeliveryManager::new(
        router,
        config.delivery.clone(),
        events.clone(),
        Arc::clone(&counters),
    ));

    for address in &config.routing.destinations {
        let destination: Destination = address
            .parse()
            .with_context(|| format!("invalid destination '{address}'"))?;
        manager
            .start_destination(destination)
            .with_context(|| format!("starting destination '{address}'"))?;
    }

    if let Some(engine) = &engine {
        tokio::spawn(Arc::clone(engine).run());
    }

    // Aggregates re-enter the pipeline as ordinary routed datapoints.
    let aggregate_forward = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            while let Some(entry) = aggregate_rx.recv().await {
                manager.send(entry);
            }
        })
    };

    let dispatch_task = tokio::spawn(dispatch::run(
        Arc::clone(&cache),
        engine.clone(),
        Arc::clone(&manager),
    ));

    let listener = LineListener::new(
        config.intake.clone(),
        Arc::clone(&cache),
        Arc::clone(&counters),
        events.clone(),
    );
    let intake_task = tokio::spawn(listener.run());

    info!(
        destinations = manager.destination_count(),
        aggregation = engine.is_some(),
        "metro relay started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("shutdown signal received");

    // Stop taking new data, flush what is already in the cache, then let
    // the delivery queues drain.
    intake_task.abort();
    dispatch_task.abort();
    aggregate_forward.abort();

    let flushed = dispatch::drain_once(&cache, engine.as_deref(), &manager);
    if flushed > 0 {
        info!(flushed, "final cache flush");
    }
    manager.stop_all(DRAIN_TIMEOUT).await;

    let snapshot = counters.snapshot();
    info!(
        received = snapshot.metrics_received,
        generated = snapshot.metrics_generated,
        "metro relay stopped"
    );
    Ok(())
}

/// Build the router variant the config asks for
fn build_router(
    routing: &RoutingConfig,
    engine: Option<&AggregationEngine>,
) -> Result<Arc<dyn Router>> {
    match routing.method {
        RoutingMethod::ConsistentHashing => Ok(Arc::new(ConsistentHashRouter::new(
            routing.replication_factor,
        ))),
        RoutingMethod::Rules => {
            let router = Arc::new(
                RuleBasedRouter::from_file(&routing.relay_rules_path)
                    .context("loading relay rules")?,
            );
            spawn_rules_reload(
                Arc::clone(&router),
                Duration::from_secs(routing.rules_reload_secs),
            );
            Ok(router)
        }
        RoutingMethod::AggregatedConsistentHashing => {
            let engine = engine.ok_or_else(|| {
                anyhow::anyhow!(
                    "routing method 'aggregated-consistent-hashing' requires \
                     [aggregation] rules_path"
                )
            })?;
            Ok(Arc::new(AggregatingHashRouter::new(
                Arc::new(engine.rules_handle()),
                routing.replication_factor,
            )))
        }
    }
}
