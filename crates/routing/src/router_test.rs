//! Tests for the hash-based router variants

use std::sync::Arc;

use metro_protocol::{Destination, MetricName};

use crate::{AggregateResolver, AggregatingHashRouter, ConsistentHashRouter, Router, RoutingError};

fn dest(host: &str, instance: &str) -> Destination {
    Destination::with_instance(host, 2004, instance)
}

// =============================================================================
// ConsistentHashRouter
// =============================================================================

#[test]
fn test_resolve_replicates_across_distinct_destinations() {
    let router = ConsistentHashRouter::new(2);
    let a = dest("host-a", "0");
    let b = dest("host-b", "0");
    router.add_destination(a.clone()).unwrap();
    router.add_destination(b.clone()).unwrap();

    let picked = router.resolve(&MetricName::new("metric.x"));

    assert_eq!(picked.len(), 2);
    assert!(picked.contains(&a));
    assert!(picked.contains(&b));
    assert_ne!(picked[0], picked[1]);
}

#[test]
fn test_resolve_after_removal_returns_remaining() {
    let router = ConsistentHashRouter::new(2);
    let a = dest("host-a", "0");
    let b = dest("host-b", "0");
    router.add_destination(a.clone()).unwrap();
    router.add_destination(b.clone()).unwrap();

    router.remove_destination(&a).unwrap();

    let picked = router.resolve(&MetricName::new("metric.x"));
    assert_eq!(picked, vec![b]);
}

#[test]
fn test_duplicate_add_is_error() {
    let router = ConsistentHashRouter::new(1);
    router.add_destination(dest("host-a", "0")).unwrap();

    // Same (host, instance), different port: still a duplicate identity.
    let twin = Destination::with_instance("host-a", 2104, "0");
    let err = router.add_destination(twin).unwrap_err();
    assert!(matches!(err, RoutingError::DuplicateDestination { key } if key == "host-a:0"));
}

#[test]
fn test_remove_unknown_is_error() {
    let router = ConsistentHashRouter::new(1);
    let err = router.remove_destination(&dest("ghost", "0")).unwrap_err();
    assert!(matches!(err, RoutingError::UnknownDestination { .. }));
}

#[test]
fn test_resolve_empty_router_returns_nothing() {
    let router = ConsistentHashRouter::new(2);
    assert!(router.resolve(&MetricName::new("metric.x")).is_empty());
}

#[test]
fn test_resolve_reattaches_port() {
    let router = ConsistentHashRouter::new(1);
    let destination = Destination::with_instance("host-a", 2104, "0");
    router.add_destination(destination.clone()).unwrap();

    let picked = router.resolve(&MetricName::new("metric.x"));
    assert_eq!(picked, vec![destination]);
    assert_eq!(picked[0].port, 2104);
}

#[test]
fn test_resolution_is_deterministic() {
    let router = ConsistentHashRouter::new(1);
    for i in 0..4 {
        router.add_destination(dest(&format!("host-{i}"), "0")).unwrap();
    }

    let metric = MetricName::new("hosts.web01.cpu");
    assert_eq!(router.resolve(&metric), router.resolve(&metric));
}

// =============================================================================
// AggregatingHashRouter
// =============================================================================

/// Fixed-table resolver standing in for the aggregation rule set
struct TableResolver(Vec<(&'static str, Vec<&'static str>)>);

impl AggregateResolver for TableResolver {
    fn resolve_outputs(&self, metric: &MetricName) -> Vec<MetricName> {
        self.0
            .iter()
            .filter(|(input, _)| *input == metric.as_str())
            .flat_map(|(_, outputs)| outputs.iter().map(|o| MetricName::new(*o)))
            .collect()
    }
}

#[test]
fn test_aggregating_router_hashes_by_output_name() {
    let resolver = Arc::new(TableResolver(vec![(
        "hosts.web01.cpu",
        vec!["all.cpu"],
    )]));
    let router = AggregatingHashRouter::new(resolver, 1);
    for i in 0..4 {
        router.add_destination(dest(&format!("host-{i}"), "0")).unwrap();
    }

    // The raw metric routes wherever its aggregate output routes.
    let via_metric = router.resolve(&MetricName::new("hosts.web01.cpu"));
    let via_output = router.inner().resolve_key("all.cpu");
    assert_eq!(via_metric, via_output);
}

#[test]
fn test_aggregating_router_falls_back_to_raw_name() {
    let resolver = Arc::new(TableResolver(vec![]));
    let router = AggregatingHashRouter::new(resolver, 1);
    for i in 0..4 {
        router.add_destination(dest(&format!("host-{i}"), "0")).unwrap();
    }

    // No matching rule: the raw metric name is the sole hashing key.
    let via_metric = router.resolve(&MetricName::new("hosts.web01.cpu"));
    let direct = router.inner().resolve_key("hosts.web01.cpu");
    assert_eq!(via_metric, direct);
}

#[test]
fn test_aggregating_router_unions_and_dedups() {
    let resolver = Arc::new(TableResolver(vec![(
        "hosts.web01.cpu",
        vec!["all.cpu", "dc1.cpu"],
    )]));
    let router = AggregatingHashRouter::new(resolver, 2);
    for i in 0..3 {
        router.add_destination(dest(&format!("host-{i}"), "0")).unwrap();
    }

    let picked = router.resolve(&MetricName::new("hosts.web01.cpu"));

    // Union of both keys' destination sets, without duplicates.
    for (i, a) in picked.iter().enumerate() {
        for b in picked.iter().skip(i + 1) {
            assert_ne!(a, b);
        }
    }
    assert!(!picked.is_empty());
    assert!(picked.len() <= 3);
}
