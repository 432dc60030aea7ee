// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use std::collections::HashSet;

use anyhow::{Context, Result};
use log::{debug, warn};

use super::{Config, TargetConfig, CONFIG_SCHEMA};
use crate::sensor::adxl345::{DataRate, Range};
use crate::sensor::SensorKind;

/// Highest valid 7-bit I2C address
const MAX_I2C_ADDRESS: u8 = 0x7F;

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./rust_sensorstream --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// The schema only checks a file on disk, these rules also hold for a
/// configuration built in code or modified by command line overrides.
///
/// # Validation Rules
///
/// - **Interval**: `acquisition.delay_ms` must be at least 1
/// - **Read timeout**: `acquisition.read_timeout_ms`, when set, must be at least 1
/// - **Address**: `sensor.address` must fit in 7 bits
/// - **Handlers**: at least one handler, ids non-empty and unique
/// - **HTTP targets**: the URL must use the http or https scheme
///
/// Unknown sensitivity or data rate selectors only produce a warning, the
/// driver resolves them to its defaults.
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if config.acquisition.delay_ms == 0 {
        anyhow::bail!("Invalid acquisition delay: delay_ms must be greater than zero");
    }

    if config.acquisition.read_timeout_ms == Some(0) {
        anyhow::bail!("Invalid read timeout: read_timeout_ms must be greater than zero");
    }

    if let Some(address) = config.sensor.address {
        if address > MAX_I2C_ADDRESS {
            anyhow::bail!(
                "Invalid sensor address 0x{:02X}: I2C addresses are 7-bit",
                address
            );
        }
    }

    if config.sensor.kind == SensorKind::Adxl345 {
        if !Range::is_supported(config.sensor.sensitivity) {
            warn!(
                "Unsupported sensitivity {} g, the sensor will use ±16 g",
                config.sensor.sensitivity
            );
        }
        if !DataRate::is_supported(config.sensor.data_rate) {
            warn!(
                "Unsupported data rate {} Hz, the sensor will use 400 Hz",
                config.sensor.data_rate
            );
        }
    }

    if config.handlers.is_empty() {
        anyhow::bail!("At least one handler must be configured");
    }

    let mut ids = HashSet::new();
    for handler in &config.handlers {
        if handler.id.trim().is_empty() {
            anyhow::bail!("Handler id must not be empty");
        }
        if !ids.insert(handler.id.as_str()) {
            anyhow::bail!("Duplicate handler id: {}", handler.id);
        }

        if let TargetConfig::Http { url, .. } = &handler.target {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!(
                    "Invalid URL for handler {}: must start with http:// or https://",
                    handler.id
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HandlerConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_specific_rules(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_delay_is_rejected() {
        let mut config = Config::default();
        config.acquisition.delay_ms = 0;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_duplicate_handler_ids_are_rejected() {
        let mut config = Config::default();
        config.handlers = vec![HandlerConfig::log("a"), HandlerConfig::log("a")];

        let err = validate_specific_rules(&config).unwrap_err();
        assert_eq!(err.to_string(), "Duplicate handler id: a");
    }

    #[test]
    fn test_http_url_scheme() {
        let mut config = Config::default();
        config.handlers = vec![HandlerConfig {
            id: "hook".to_string(),
            target: TargetConfig::Http {
                url: "ftp://example.com".to_string(),
                timeout_seconds: 10,
                retry_count: 3,
                auth_token: None,
            },
        }];
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_unknown_selectors_are_accepted() {
        let mut config = Config::default();
        config.sensor.sensitivity = 3;
        config.sensor.data_rate = 790.0;
        assert!(validate_specific_rules(&config).is_ok());
    }

    #[test]
    fn test_address_out_of_range() {
        let mut config = Config::default();
        config.sensor.address = Some(0x80);
        assert!(validate_specific_rules(&config).is_err());
    }
}
