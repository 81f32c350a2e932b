//! Tests for core relay types
//!
//! Covers destination address parsing, routing-key identity, and display
//! round-trips.

use crate::{Datapoint, Destination, MetricName, ProtocolError};

// =============================================================================
// Destination parsing
// =============================================================================

#[test]
fn test_parse_host_port() {
    let dest: Destination = "graphite01:2004".parse().unwrap();
    assert_eq!(dest.host, "graphite01");
    assert_eq!(dest.port, 2004);
    assert_eq!(dest.instance, None);
}

#[test]
fn test_parse_host_port_instance() {
    let dest: Destination = "10.0.0.1:2004:a".parse().unwrap();
    assert_eq!(dest.host, "10.0.0.1");
    assert_eq!(dest.port, 2004);
    assert_eq!(dest.instance.as_deref(), Some("a"));
}

#[test]
fn test_parse_missing_port() {
    let err = "graphite01".parse::<Destination>().unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::InvalidDestination {
            reason: "missing port",
            ..
        }
    ));
}

#[test]
fn test_parse_bad_port() {
    let err = "graphite01:notaport".parse::<Destination>().unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::InvalidDestination {
            reason: "invalid port",
            ..
        }
    ));
}

#[test]
fn test_parse_empty_host() {
    let err = ":2004".parse::<Destination>().unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::InvalidDestination {
            reason: "missing host",
            ..
        }
    ));
}

// =============================================================================
// Routing identity
// =============================================================================

#[test]
fn test_routing_key_excludes_port() {
    let a = Destination::new("host1", 2004);
    let b = Destination::new("host1", 2104);
    assert_eq!(a.routing_key(), b.routing_key());
}

#[test]
fn test_routing_key_distinguishes_instances() {
    // Same host and port, different instance labels: distinct targets.
    let a = Destination::with_instance("host1", 2004, "a");
    let b = Destination::with_instance("host1", 2004, "b");
    assert_ne!(a.routing_key(), b.routing_key());
    assert_ne!(a, b);
}

#[test]
fn test_display_round_trip() {
    for addr in ["host1:2004", "host1:2004:a"] {
        let dest: Destination = addr.parse().unwrap();
        assert_eq!(dest.to_string(), addr);
    }
}

#[test]
fn test_address_is_host_port() {
    let dest = Destination::with_instance("host1", 2004, "a");
    assert_eq!(dest.address(), "host1:2004");
}

// =============================================================================
// Metric names and datapoints
// =============================================================================

#[test]
fn test_metric_name_verbatim() {
    let metric = MetricName::new("Hosts.Web01.cpu");
    assert_eq!(metric.as_str(), "Hosts.Web01.cpu");
    // Case-sensitive: different case is a different metric.
    assert_ne!(metric, MetricName::new("hosts.web01.cpu"));
}

#[test]
fn test_datapoint_construction() {
    let point = Datapoint::new(1_700_000_000.0, 42.5);
    assert_eq!(point.timestamp, 1_700_000_000.0);
    assert_eq!(point.value, 42.5);
}
