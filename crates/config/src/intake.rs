//! Line-protocol intake configuration

use serde::Deserialize;

/// Plaintext line-protocol listener
///
/// Accepts `name value timestamp\n` lines over TCP. The listener is a
/// boundary collaborator - validated datapoints are handed to the relay
/// core via the ingest cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Bind address
    /// Default: "0.0.0.0"
    pub address: String,

    /// Listen port
    /// Default: 2003
    pub port: u16,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".into(),
            port: 2003,
        }
    }
}
