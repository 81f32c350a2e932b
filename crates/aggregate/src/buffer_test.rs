//! Tests for interval buckets and the buffer manager

use std::sync::Arc;

use metro_protocol::{Datapoint, MetricName};

use crate::rules::{AggregationRule, RuleSet};
use crate::BufferManager;

fn rule(line: &str) -> Arc<AggregationRule> {
    let rules = RuleSet::parse(line).unwrap();
    let rule = Arc::clone(rules.iter().next().unwrap());
    rule
}

fn sum_rule_60s() -> Arc<AggregationRule> {
    rule("all.req (60) = sum hosts.<h>.req\n")
}

fn output() -> MetricName {
    MetricName::new("all.req")
}

// =============================================================================
// Bucketing
// =============================================================================

#[test]
fn test_values_land_in_aligned_intervals() {
    let mut manager = BufferManager::new(5);
    let rule = sum_rule_60s();

    manager.observe(&rule, output(), Datapoint::new(125.0, 1.0), 125);
    manager.observe(&rule, output(), Datapoint::new(130.0, 2.0), 130);
    manager.observe(&rule, output(), Datapoint::new(185.0, 4.0), 185);

    let buffer = manager.buffer(&output()).unwrap();
    assert_eq!(buffer.bucket_count(), 2);
    assert_eq!(buffer.bucket(120).unwrap().values, vec![1.0, 2.0]);
    assert_eq!(buffer.bucket(180).unwrap().values, vec![4.0]);
}

#[test]
fn test_bucket_keyed_by_datapoint_time_not_arrival() {
    let mut manager = BufferManager::new(5);
    let rule = sum_rule_60s();

    // Arrives "now" at t=200 but carries a t=65 timestamp.
    manager.observe(&rule, output(), Datapoint::new(65.0, 9.0), 200);

    let buffer = manager.buffer(&output()).unwrap();
    assert!(buffer.bucket(60).is_some());
}

// =============================================================================
// Compute cycle
// =============================================================================

#[test]
fn test_compute_emits_aggregate_at_interval_start() {
    let mut manager = BufferManager::new(5);
    let rule = sum_rule_60s();

    manager.observe(&rule, output(), Datapoint::new(125.0, 1.0), 125);
    manager.observe(&rule, output(), Datapoint::new(130.0, 2.0), 130);

    // Buffer created at 125 is due at 185.
    assert!(manager.compute_due(130).is_empty());

    let entries = manager.compute_due(185);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].metric.as_str(), "all.req");
    assert_eq!(entries[0].datapoint.timestamp, 120.0);
    assert_eq!(entries[0].datapoint.value, 3.0);
}

#[test]
fn test_emitted_bucket_goes_quiet() {
    let mut manager = BufferManager::new(5);
    let rule = sum_rule_60s();

    manager.observe(&rule, output(), Datapoint::new(125.0, 1.0), 125);
    assert_eq!(manager.compute_due(185).len(), 1);

    // Nothing new arrived, so the next cycle emits nothing.
    assert!(manager.compute_due(245).is_empty());
}

#[test]
fn test_late_data_reemits_same_interval() {
    let mut manager = BufferManager::new(5);
    let rule = sum_rule_60s();

    manager.observe(&rule, output(), Datapoint::new(125.0, 1.0), 125);
    assert_eq!(manager.compute_due(185)[0].datapoint.value, 1.0);

    // A straggler for the already-emitted interval reactivates the bucket.
    manager.observe(&rule, output(), Datapoint::new(130.0, 2.0), 190);

    let entries = manager.compute_due(245);
    assert_eq!(entries.len(), 1);
    // Same interval-start timestamp, updated value: an overwrite downstream.
    assert_eq!(entries[0].datapoint.timestamp, 120.0);
    assert_eq!(entries[0].datapoint.value, 3.0);
}

#[test]
fn test_methods_flow_through_compute() {
    let mut manager = BufferManager::new(5);
    let rule = rule("peak.req (60) = max hosts.<h>.req\n");
    let out = MetricName::new("peak.req");

    manager.observe(&rule, out.clone(), Datapoint::new(10.0, 3.0), 10);
    manager.observe(&rule, out.clone(), Datapoint::new(20.0, 7.0), 20);
    manager.observe(&rule, out, Datapoint::new(30.0, 5.0), 30);

    let entries = manager.compute_due(70);
    assert_eq!(entries[0].datapoint.value, 7.0);
}

// =============================================================================
// Eviction and lifecycle
// =============================================================================

#[test]
fn test_old_buckets_evicted_after_retention_window() {
    let mut manager = BufferManager::new(2);
    let rule = rule("all.req (10) = sum hosts.<h>.req\n");
    let out = MetricName::new("all.req");

    manager.observe(&rule, out.clone(), Datapoint::new(900.0, 1.0), 1000);
    manager.observe(&rule, out.clone(), Datapoint::new(995.0, 1.0), 1000);

    // Retention is 2 intervals of 10s: cutoff at 990 drops the 900 bucket.
    manager.compute_due(1010);
    let buffer = manager.buffer(&out).unwrap();
    assert!(buffer.bucket(900).is_none());
    assert!(buffer.bucket(990).is_some());
}

#[test]
fn test_fully_drained_buffer_is_destroyed() {
    let mut manager = BufferManager::new(2);
    let rule = rule("all.req (10) = sum hosts.<h>.req\n");
    let out = MetricName::new("all.req");

    manager.observe(&rule, out.clone(), Datapoint::new(995.0, 1.0), 1000);
    manager.compute_due(1010);
    assert_eq!(manager.len(), 1);

    // One more cycle evicts the last bucket and the empty buffer with it.
    manager.compute_due(1020);
    assert!(manager.buffer(&out).is_none());
    assert!(manager.is_empty());
}

#[test]
fn test_clear_drops_everything() {
    let mut manager = BufferManager::new(5);
    let rule = sum_rule_60s();

    manager.observe(&rule, output(), Datapoint::new(125.0, 1.0), 125);
    assert_eq!(manager.len(), 1);

    manager.clear();
    assert!(manager.is_empty());
    assert!(manager.compute_due(185).is_empty());
}
