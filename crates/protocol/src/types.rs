//! Core relay data types
//!
//! These types are assumed already validated by the listener boundary:
//! datapoint values are never NaN and metric names are non-empty. The relay
//! core does not re-validate them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// One validated sample: seconds since epoch plus a value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    /// Seconds since the Unix epoch
    pub timestamp: f64,

    /// The sample value (never NaN by listener contract)
    pub value: f64,
}

impl Datapoint {
    /// Create a new datapoint
    #[inline]
    pub const fn new(timestamp: f64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Opaque, case-sensitive, dot-delimited metric identifier
///
/// Used verbatim as both a cache key and a hashing key - the relay never
/// interprets the segments itself.
///
/// # Example
///
/// ```
/// use metro_protocol::MetricName;
///
/// let metric = MetricName::new("hosts.web01.cpu.load");
/// assert_eq!(metric.as_str(), "hosts.web01.cpu.load");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricName(String);

impl MetricName {
    /// Create a new metric name
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the metric name as a string slice
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MetricName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for MetricName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for MetricName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One downstream delivery target
///
/// Uniqueness for routing purposes is `(host, instance)` - two destinations
/// sharing host and port but carrying different instance labels are distinct
/// targets. The port is transport detail only and never participates in
/// hashing.
///
/// # Address Syntax
///
/// ```text
/// host:port
/// host:port:instance
/// ```
///
/// # Example
///
/// ```
/// use metro_protocol::Destination;
///
/// let dest: Destination = "10.0.0.1:2004:a".parse().unwrap();
/// assert_eq!(dest.host, "10.0.0.1");
/// assert_eq!(dest.port, 2004);
/// assert_eq!(dest.instance.as_deref(), Some("a"));
/// assert_eq!(dest.routing_key(), "10.0.0.1:a");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    /// Hostname or IP address
    pub host: String,

    /// TCP port
    pub port: u16,

    /// Optional instance label distinguishing multiple targets on one host
    pub instance: Option<String>,
}

impl Destination {
    /// Create a new destination without an instance label
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            instance: None,
        }
    }

    /// Create a new destination with an instance label
    pub fn with_instance(host: impl Into<String>, port: u16, instance: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            instance: Some(instance.into()),
        }
    }

    /// The `(host, instance)` identity used for routing and hashing
    ///
    /// Formatted as `host` or `host:instance`. The port is deliberately
    /// excluded so a destination can move ports without reshuffling the ring.
    pub fn routing_key(&self) -> String {
        match &self.instance {
            Some(instance) => format!("{}:{}", self.host, instance),
            None => self.host.clone(),
        }
    }

    /// The `host:port` address to connect to
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{}:{}:{}", self.host, self.port, instance),
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

impl FromStr for Destination {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');

        let host = parts
            .next()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProtocolError::InvalidDestination {
                address: s.into(),
                reason: "missing host",
            })?;

        let port_str = parts
            .next()
            .ok_or_else(|| ProtocolError::InvalidDestination {
                address: s.into(),
                reason: "missing port",
            })?;

        let port = port_str
            .parse::<u16>()
            .map_err(|_| ProtocolError::InvalidDestination {
                address: s.into(),
                reason: "invalid port",
            })?;

        let instance = parts.next().filter(|i| !i.is_empty()).map(String::from);

        Ok(Self {
            host: host.into(),
            port,
            instance,
        })
    }
}

/// A (metric, datapoint) pair queued for delivery
///
/// Queues are FIFO except for a high-priority lane that inserts at the front
/// (used for the relay's own operational metrics).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// The metric this sample belongs to
    pub metric: MetricName,

    /// The sample itself
    pub datapoint: Datapoint,
}

impl QueueEntry {
    /// Create a new queue entry
    #[inline]
    pub fn new(metric: MetricName, datapoint: Datapoint) -> Self {
        Self { metric, datapoint }
    }
}
