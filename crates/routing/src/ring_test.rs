//! Tests for the consistent hash ring

use std::collections::HashSet;

use crate::HashRing;

fn ring_of(nodes: &[&str]) -> HashRing {
    let mut ring = HashRing::new();
    for node in nodes {
        ring.add(node);
    }
    ring
}

// =============================================================================
// Membership
// =============================================================================

#[test]
fn test_add_inserts_replica_positions() {
    let mut ring = HashRing::with_replicas(100);
    ring.add("host1:a");

    assert_eq!(ring.len(), 1);
    assert_eq!(ring.entry_count(), 100);
    assert!(ring.contains("host1:a"));
}

#[test]
fn test_re_add_is_noop() {
    let mut ring = HashRing::with_replicas(100);
    ring.add("host1:a");
    ring.add("host1:a");

    assert_eq!(ring.entry_count(), 100);
}

#[test]
fn test_remove_drops_all_entries() {
    let mut ring = ring_of(&["host1:a", "host2:a"]);
    ring.remove("host1:a");

    assert_eq!(ring.len(), 1);
    assert_eq!(ring.entry_count(), 100);
    assert!(!ring.contains("host1:a"));
}

#[test]
fn test_remove_unknown_is_noop() {
    let mut ring = ring_of(&["host1:a"]);
    ring.remove("never-added");
    assert_eq!(ring.len(), 1);
}

#[test]
fn test_positions_are_unique_and_sorted() {
    // Ten members at 100 replicas each forces 16-bit collisions that must
    // be resolved by forward probing, never by dropping an entry.
    let ring = ring_of(&[
        "host1:a", "host2:a", "host3:a", "host4:a", "host5:a", "host6:a", "host7:a", "host8:a",
        "host9:a", "host10:a",
    ]);

    let positions = ring.positions();
    assert_eq!(positions.len(), 1000);

    let unique: HashSet<u16> = positions.iter().copied().collect();
    assert_eq!(unique.len(), positions.len());

    let mut sorted = positions.clone();
    sorted.sort_unstable();
    assert_eq!(positions, sorted);
}

// =============================================================================
// Lookup
// =============================================================================

#[test]
fn test_nodes_for_yields_distinct_members() {
    let ring = ring_of(&["host1:a", "host2:a", "host3:a"]);

    let picked: Vec<&str> = ring.nodes_for("hosts.web01.cpu", 3).collect();
    assert_eq!(picked.len(), 3);

    let unique: HashSet<&str> = picked.iter().copied().collect();
    assert_eq!(unique.len(), 3);
}

#[test]
fn test_nodes_for_respects_limit() {
    let ring = ring_of(&["host1:a", "host2:a", "host3:a"]);

    for limit in 0..=3 {
        assert_eq!(ring.nodes_for("some.metric", limit).count(), limit);
    }
}

#[test]
fn test_limit_beyond_member_count_yields_all_once() {
    let ring = ring_of(&["host1:a", "host2:a"]);

    let picked: Vec<&str> = ring.nodes_for("some.metric", 10).collect();
    assert_eq!(picked.len(), 2);
}

#[test]
fn test_single_node_always_wins() {
    let ring = ring_of(&["only:a"]);

    for key in ["a", "some.metric", "hosts.web01.cpu.really.long.name"] {
        let picked: Vec<&str> = ring.nodes_for(key, 1).collect();
        assert_eq!(picked, vec!["only:a"]);
    }
}

#[test]
fn test_lookup_is_deterministic() {
    let ring = ring_of(&["host1:a", "host2:a", "host3:a", "host4:a"]);

    let first: Vec<&str> = ring.nodes_for("hosts.web01.cpu", 3).collect();
    let second: Vec<&str> = ring.nodes_for("hosts.web01.cpu", 3).collect();
    assert_eq!(first, second);
}

#[test]
fn test_empty_ring_yields_nothing() {
    let ring = HashRing::new();
    assert_eq!(ring.nodes_for("some.metric", 5).count(), 0);
}

#[test]
fn test_membership_change_only_moves_affected_keys() {
    let ring_before = ring_of(&["host1:a", "host2:a", "host3:a"]);
    let mut ring_after = ring_of(&["host1:a", "host2:a", "host3:a"]);
    ring_after.remove("host3:a");

    // Keys that did not map to the removed node keep their assignment.
    let mut stable = 0;
    let mut total = 0;
    for i in 0..200 {
        let key = format!("hosts.web{i:02}.cpu");
        let before: Vec<&str> = ring_before.nodes_for(&key, 1).collect();
        if before != ["host3:a"] {
            total += 1;
            let after: Vec<&str> = ring_after.nodes_for(&key, 1).collect();
            if before == after {
                stable += 1;
            }
        }
    }

    assert_eq!(stable, total);
}
