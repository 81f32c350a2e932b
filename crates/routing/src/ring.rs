//! Consistent hash ring with virtual replicas
//!
//! Maps arbitrary string keys to an ordered, deduplicated sequence of member
//! nodes, tolerant of membership changes. Each member occupies
//! `replica_count` virtual positions so keys spread evenly; positions are
//! 16-bit hash truncations with forward probing on collision, so the ring
//! never holds two entries at the same position.
//!
//! # Example
//!
//! ```
//! use metro_routing::HashRing;
//!
//! let mut ring = HashRing::new();
//! ring.add("host1:a");
//! ring.add("host2:a");
//!
//! let picked: Vec<&str> = ring.nodes_for("hosts.web01.cpu", 2).collect();
//! assert_eq!(picked.len(), 2);
//! assert_ne!(picked[0], picked[1]);
//! ```

use std::collections::HashSet;
use std::hash::Hasher;

use fnv::FnvHasher;

/// Default number of virtual positions per member
pub const DEFAULT_REPLICA_COUNT: usize = 100;

/// One virtual position on the ring
#[derive(Debug, Clone)]
struct RingEntry {
    /// 16-bit ring position (unique across the ring)
    position: u16,

    /// The member node occupying this position
    node: String,
}

/// Consistent hash ring over string member keys
///
/// Lookups and iteration are undefined for a ring with zero members -
/// callers must guard empty rings.
#[derive(Debug, Clone, Default)]
pub struct HashRing {
    /// Entries sorted by position
    entries: Vec<RingEntry>,

    /// Distinct member nodes
    members: HashSet<String>,

    /// Virtual positions inserted per member
    replica_count: usize,
}

/// Hash a key to its 16-bit ring position
///
/// 16 bits is sufficient width: collisions are probed rather than averaged
/// away, so width only affects skew.
fn ring_position(key: &str) -> u16 {
    let mut hasher = FnvHasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() & 0xffff) as u16
}

impl HashRing {
    /// Create a ring with the default replica count
    #[must_use]
    pub fn new() -> Self {
        Self::with_replicas(DEFAULT_REPLICA_COUNT)
    }

    /// Create a ring with an explicit replica count
    #[must_use]
    pub fn with_replicas(replica_count: usize) -> Self {
        Self {
            entries: Vec::new(),
            members: HashSet::new(),
            replica_count: replica_count.max(1),
        }
    }

    /// Number of distinct member nodes
    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the ring has no members
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether the given node is a member
    #[inline]
    pub fn contains(&self, node: &str) -> bool {
        self.members.contains(node)
    }

    /// Insert a member at `replica_count` virtual positions
    ///
    /// Each position is `hash("{node}:{i}")` truncated to 16 bits; on
    /// collision the position is probed forward by +1 (wrapping) until a
    /// free slot is found. Re-adding an existing member is a no-op.
    pub fn add(&mut self, node: &str) {
        if !self.members.insert(node.to_string()) {
            return;
        }

        for i in 0..self.replica_count {
            let mut position = ring_position(&format!("{node}:{i}"));

            // Probe forward until the slot is free. The ring holds at most
            // members * replicas entries, far below the 65536 slots, so the
            // probe always terminates.
            loop {
                match self.index_of(position) {
                    Ok(_) => position = position.wrapping_add(1),
                    Err(insert_at) => {
                        self.entries.insert(
                            insert_at,
                            RingEntry {
                                position,
                                node: node.to_string(),
                            },
                        );
                        break;
                    }
                }
            }
        }
    }

    /// Remove a member and all its virtual positions
    ///
    /// Removing a non-member is a no-op.
    pub fn remove(&mut self, node: &str) {
        if self.members.remove(node) {
            self.entries.retain(|entry| entry.node != node);
        }
    }

    /// Walk the ring from `key`'s position, yielding distinct members
    ///
    /// Locates the first entry at or after `hash(key)` (wrapping to the
    /// start if none), then walks forward, yielding each distinct node the
    /// first time it is encountered, until `limit` nodes have been yielded
    /// or every member has been seen once. Each call starts a fresh walk;
    /// with unchanged ring state the sequence is deterministic.
    pub fn nodes_for<'a>(&'a self, key: &str, limit: usize) -> NodesFor<'a> {
        let start = match self.index_of(ring_position(key)) {
            Ok(exact) => exact,
            Err(after) => after,
        };

        NodesFor {
            ring: self,
            cursor: start,
            steps_left: self.entries.len(),
            limit,
            seen: HashSet::new(),
        }
    }

    /// Binary search for a position among the sorted entries
    fn index_of(&self, position: u16) -> std::result::Result<usize, usize> {
        self.entries
            .binary_search_by_key(&position, |entry| entry.position)
    }

    #[cfg(test)]
    pub(crate) fn entry_count(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn positions(&self) -> Vec<u16> {
        self.entries.iter().map(|entry| entry.position).collect()
    }
}

/// Lazy, finite walk over distinct ring members for one key
///
/// Returned by [`HashRing::nodes_for`]. Never yields the same node twice.
#[derive(Debug)]
pub struct NodesFor<'a> {
    ring: &'a HashRing,
    cursor: usize,
    steps_left: usize,
    limit: usize,
    seen: HashSet<&'a str>,
}

impl<'a> Iterator for NodesFor<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.seen.len() >= self.limit {
            return None;
        }

        while self.steps_left > 0 {
            self.steps_left -= 1;

            let entry = &self.ring.entries[self.cursor % self.ring.entries.len()];
            self.cursor += 1;

            if self.seen.insert(entry.node.as_str()) {
                return Some(entry.node.as_str());
            }
        }

        None
    }
}
