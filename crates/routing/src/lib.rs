//! Metro Routing - Metric-to-destination resolution
//!
//! This crate decides which downstream destination(s) each metric belongs
//! to. Three router variants share one [`Router`] contract:
//!
//! - [`ConsistentHashRouter`] - hash ring over `(host, instance)` keys with
//!   virtual replicas and a configurable replication factor
//! - [`RuleBasedRouter`] - ordered regex rules from a relay-rules file,
//!   first match wins unless a rule sets `continue`
//! - [`AggregatingHashRouter`] - consistent hashing keyed by the aggregate
//!   output name(s) a metric would produce, so raw and aggregated forms of
//!   one series land on the same destination
//!
//! Routers never return a destination that was not explicitly added, even
//! if ring or rule state transiently references one.

mod error;
mod ring;
mod router;
mod rules;

pub use error::{Result, RoutingError};
pub use ring::{HashRing, DEFAULT_REPLICA_COUNT};
pub use router::{AggregateResolver, AggregatingHashRouter, ConsistentHashRouter, Router};
pub use rules::{spawn_rules_reload, RelayRule, RuleBasedRouter, RuleMatcher};

// Test modules - only compiled during testing
#[cfg(test)]
mod ring_test;
#[cfg(test)]
mod router_test;
