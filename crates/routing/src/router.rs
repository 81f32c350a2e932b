//! Router contract and hash-based variants
//!
//! All routers share one contract: destinations must be explicitly added
//! before `resolve` may return them, and resolution never yields a
//! destination that was removed. Mutation and resolution are safe from any
//! task; state lives behind internal locks.

use std::collections::HashMap;
use std::sync::Arc;

use metro_protocol::{Destination, MetricName};
use parking_lot::RwLock;

use crate::{HashRing, Result, RoutingError, DEFAULT_REPLICA_COUNT};

/// Maps a metric name to the destination set it must be sent to
pub trait Router: Send + Sync {
    /// Register a destination so resolution may return it
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::DuplicateDestination` if a destination with
    /// the same `(host, instance)` identity is already registered.
    fn add_destination(&self, destination: Destination) -> Result<()>;

    /// Unregister a destination
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::UnknownDestination` if it was never added.
    fn remove_destination(&self, destination: &Destination) -> Result<()>;

    /// Resolve a metric to the destinations it must be sent to
    fn resolve(&self, metric: &MetricName) -> Vec<Destination>;
}

/// Resolves a metric to the aggregate output name(s) it would produce
///
/// Implemented by the aggregation rule set; the [`AggregatingHashRouter`]
/// uses it to hash aggregated series by their output name so raw datapoints
/// pass through to the same destination that will hold the aggregate.
pub trait AggregateResolver: Send + Sync {
    /// Output names `metric` would produce, empty if no rule matches
    fn resolve_outputs(&self, metric: &MetricName) -> Vec<MetricName>;
}

#[derive(Debug, Default)]
struct HashRouterState {
    /// Ring of `(host, instance)` routing keys
    ring: HashRing,

    /// Side table re-attaching the full destination (port included) to a key
    destinations: HashMap<String, Destination>,
}

/// Consistent-hash router with a configurable replication factor
///
/// # Example
///
/// ```
/// use metro_protocol::{Destination, MetricName};
/// use metro_routing::{ConsistentHashRouter, Router};
///
/// let router = ConsistentHashRouter::new(2);
/// router.add_destination(Destination::with_instance("host1", 2004, "a")).unwrap();
/// router.add_destination(Destination::with_instance("host2", 2004, "a")).unwrap();
///
/// let picked = router.resolve(&MetricName::new("hosts.web01.cpu"));
/// assert_eq!(picked.len(), 2);
/// ```
#[derive(Debug)]
pub struct ConsistentHashRouter {
    state: RwLock<HashRouterState>,

    /// Distinct destinations each key resolves to
    replication_factor: usize,
}

impl ConsistentHashRouter {
    /// Create a router with the default replica count per destination
    #[must_use]
    pub fn new(replication_factor: usize) -> Self {
        Self::with_replicas(replication_factor, DEFAULT_REPLICA_COUNT)
    }

    /// Create a router with an explicit ring replica count
    #[must_use]
    pub fn with_replicas(replication_factor: usize, replica_count: usize) -> Self {
        Self {
            state: RwLock::new(HashRouterState {
                ring: HashRing::with_replicas(replica_count),
                destinations: HashMap::new(),
            }),
            replication_factor: replication_factor.max(1),
        }
    }

    /// Number of registered destinations
    pub fn destination_count(&self) -> usize {
        self.state.read().destinations.len()
    }

    /// Resolve an arbitrary hashing key (not necessarily a metric name)
    ///
    /// Used by the aggregating wrapper, which hashes aggregate output names.
    pub fn resolve_key(&self, key: &str) -> Vec<Destination> {
        let state = self.state.read();
        if state.ring.is_empty() {
            return Vec::new();
        }

        state
            .ring
            .nodes_for(key, self.replication_factor)
            .filter_map(|node| state.destinations.get(node).cloned())
            .collect()
    }
}

impl Router for ConsistentHashRouter {
    fn add_destination(&self, destination: Destination) -> Result<()> {
        let key = destination.routing_key();
        let mut state = self.state.write();

        if state.destinations.contains_key(&key) {
            return Err(RoutingError::DuplicateDestination { key });
        }

        state.ring.add(&key);
        state.destinations.insert(key.clone(), destination);
        tracing::debug!(destination = %key, "destination added to hash ring");
        Ok(())
    }

    fn remove_destination(&self, destination: &Destination) -> Result<()> {
        let key = destination.routing_key();
        let mut state = self.state.write();

        if state.destinations.remove(&key).is_none() {
            return Err(RoutingError::UnknownDestination { key });
        }

        state.ring.remove(&key);
        tracing::debug!(destination = %key, "destination removed from hash ring");
        Ok(())
    }

    fn resolve(&self, metric: &MetricName) -> Vec<Destination> {
        self.resolve_key(metric.as_str())
    }
}

/// Consistent-hash router keyed by aggregate output names
///
/// Wraps a [`ConsistentHashRouter`]. Resolution first asks the aggregation
/// rule set which output name(s) the metric would produce; if none, the raw
/// metric name is the sole hashing key, so un-aggregated metrics still get
/// a deterministic destination. The union of destinations over all resolved
/// keys is returned, deduplicated.
pub struct AggregatingHashRouter {
    inner: ConsistentHashRouter,
    resolver: Arc<dyn AggregateResolver>,
}

impl AggregatingHashRouter {
    /// Create an aggregating router over the given rule resolver
    pub fn new(resolver: Arc<dyn AggregateResolver>, replication_factor: usize) -> Self {
        Self {
            inner: ConsistentHashRouter::new(replication_factor),
            resolver,
        }
    }

    /// Access the wrapped hash router
    pub fn inner(&self) -> &ConsistentHashRouter {
        &self.inner
    }
}

impl Router for AggregatingHashRouter {
    fn add_destination(&self, destination: Destination) -> Result<()> {
        self.inner.add_destination(destination)
    }

    fn remove_destination(&self, destination: &Destination) -> Result<()> {
        self.inner.remove_destination(destination)
    }

    fn resolve(&self, metric: &MetricName) -> Vec<Destination> {
        let mut keys = self.resolver.resolve_outputs(metric);
        if keys.is_empty() {
            keys.push(metric.clone());
        }

        let mut resolved = Vec::new();
        for key in &keys {
            for destination in self.inner.resolve_key(key.as_str()) {
                if !resolved.contains(&destination) {
                    resolved.push(destination);
                }
            }
        }
        resolved
    }
}

impl std::fmt::Debug for AggregatingHashRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatingHashRouter")
            .field("destinations", &self.inner.destination_count())
            .finish()
    }
}
