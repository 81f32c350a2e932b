//! Configuration validation
//!
//! Validates config consistency:
//! - Destination addresses parse and carry unique (host, instance) identities
//! - Watermark fractions are in (0, 1]
//! - Sizes and factors are non-zero

use std::collections::HashSet;

use metro_protocol::Destination;

use crate::error::{ConfigError, Result};
use crate::Config;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_destinations(config)?;
    validate_cache(config)?;
    validate_delivery(config)?;
    validate_routing(config)?;
    Ok(())
}

fn validate_destinations(config: &Config) -> Result<()> {
    let mut seen = HashSet::new();

    for addr in &config.routing.destinations {
        let dest: Destination = addr.parse()?;
        let key = dest.routing_key();
        if !seen.insert(key.clone()) {
            return Err(ConfigError::DuplicateDestination { key });
        }
    }

    Ok(())
}

fn validate_cache(config: &Config) -> Result<()> {
    if config.cache.max_size == 0 {
        return Err(ConfigError::InvalidValue {
            field: "cache.max_size",
            message: "must be greater than zero".into(),
        });
    }

    check_fraction("cache.low_watermark", config.cache.low_watermark)
}

fn validate_delivery(config: &Config) -> Result<()> {
    let delivery = &config.delivery;

    if delivery.max_queue_size == 0 {
        return Err(ConfigError::InvalidValue {
            field: "delivery.max_queue_size",
            message: "must be greater than zero".into(),
        });
    }

    if delivery.max_batch_size == 0 {
        return Err(ConfigError::InvalidValue {
            field: "delivery.max_batch_size",
            message: "must be greater than zero".into(),
        });
    }

    check_fraction("delivery.queue_low_watermark", delivery.queue_low_watermark)?;
    check_fraction("delivery.quality.min_ratio", delivery.quality.min_ratio)
}

fn validate_routing(config: &Config) -> Result<()> {
    if config.routing.replication_factor == 0 {
        return Err(ConfigError::InvalidValue {
            field: "routing.replication_factor",
            message: "must be at least 1".into(),
        });
    }

    Ok(())
}

fn check_fraction(field: &'static str, value: f64) -> Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(ConfigError::InvalidValue {
            field,
            message: format!("{value} is not in (0, 1]"),
        });
    }
    Ok(())
}
