// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the sensor stream application
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema before being deserialized.
//!
//! ## Configuration Structure
//!
//! - `bus`: transport used to reach the sensor (native `/dev/i2c-*` or mock)
//! - `sensor`: sensor family, address and measurement settings
//! - `acquisition`: acquisition cadence and read timeout
//! - `handlers`: one entry per endpoint receiving the samples
//!
//! ## Usage
//!
//! ```no_run
//! use rust_sensorstream::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some(100),                       // Delay between samples in ms
//!     Some(4),                         // Sensitivity in g
//!     Some(800.0),                     // Data rate in Hz
//!     Some("/dev/i2c-0".to_string()),  // I2C device
//!     false,                           // Mock bus
//! );
//!
//! println!("Sampling every {} ms", config.acquisition.delay_ms);
//! ```

pub mod acquisition;
pub mod bus;
pub mod handler;
pub mod sensor;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

// Re-export all types for public API
pub use acquisition::AcquisitionConfig;
pub use bus::{BusConfig, BusType};
pub use handler::{HandlerConfig, TargetConfig};
pub use sensor::SensorConfig;
pub use utils::output_config_schema;

/// Embedded JSON schema every configuration file is validated against
pub const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Root configuration structure.
///
/// Each section uses default values when not explicitly specified in the
/// configuration file, so an empty file (or one holding only comments)
/// yields a working configuration sampling an ADXL345 on `/dev/i2c-1` every
/// 500 ms into the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Bus transport settings
    #[serde(default)]
    pub bus: BusConfig,

    /// Sensor attached to the bus
    #[serde(default)]
    pub sensor: SensorConfig,

    /// Acquisition cadence.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Endpoints receiving the samples, one acquisition job each
    #[serde(default = "default_handlers")]
    pub handlers: Vec<HandlerConfig>,
}

fn default_handlers() -> Vec<HandlerConfig> {
    vec![HandlerConfig::log("log")]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            sensor: SensorConfig::default(),
            acquisition: AcquisitionConfig::default(),
            handlers: default_handlers(),
        }
    }
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        // Create parent directories if they don't exist
        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Parse a raw YAML document and validate it against the embedded JSON schema
    ///
    /// An empty document is read as an empty mapping.
    fn validate_schema(contents: &str, path: &Path) -> Result<serde_yml::Value> {
        // First step: convert YAML to a generic Value
        let yaml_value: serde_yml::Value = match serde_yml::from_str(contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?
        {
            serde_yml::Value::Null => serde_yml::Value::Mapping(serde_yml::Mapping::new()),
            value => value,
        };

        // Convert to JSON Value for validation
        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        let schema: serde_json::Value =
            serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)
            .context("Failed to build JSON schema validator")?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            anyhow::bail!("Configuration validation failed: {}", error);
        }
        Ok(yaml_value)
    }

    /// Load configuration from a file.
    ///
    /// A missing file is created with default values. A file failing schema
    /// validation, deserialization or the domain rules is rejected, and a
    /// `*.sample.yaml` file with default values is written next to it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        let document = match Self::validate_schema(&contents, path) {
            Ok(document) => document,
            Err(err) => {
                error!("Configuration validation error before deserialization");
                Self::create_sample_config(path)?;
                return Err(err);
            }
        };

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = match serde_yml::from_value(document) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        // Perform additional specific validations
        if let Err(err) = config.validate() {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Check the rules the JSON schema cannot express
    pub fn validate(&self) -> Result<()> {
        utils::validate_specific_rules(self)
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only explicitly provided values override the existing configuration.
    ///
    /// # Parameters
    ///
    /// * `delay_ms` - Interval between two samples in milliseconds
    /// * `sensitivity` - ADXL345 full-scale range in g
    /// * `data_rate` - ADXL345 output data rate in Hz
    /// * `i2c_device` - Device node of the native bus
    /// * `mock_bus` - If true, switch to the in-memory mock bus
    pub fn apply_args(
        &mut self,
        delay_ms: Option<u64>,
        sensitivity: Option<u8>,
        data_rate: Option<f64>,
        i2c_device: Option<String>,
        mock_bus: bool,
    ) {
        if let Some(delay_ms) = delay_ms {
            debug!("Overriding delay from command line: {} ms", delay_ms);
            self.acquisition.delay_ms = delay_ms;
        }
        if let Some(sensitivity) = sensitivity {
            debug!("Overriding sensitivity from command line: {}", sensitivity);
            self.sensor.sensitivity = sensitivity;
        }
        if let Some(data_rate) = data_rate {
            debug!("Overriding data rate from command line: {} Hz", data_rate);
            self.sensor.data_rate = data_rate;
        }
        if let Some(device) = i2c_device {
            debug!("Overriding I2C device from command line: {}", device);
            self.bus.device = device;
        }
        if mock_bus {
            debug!("Using mock bus from command line");
            self.bus.bus_type = BusType::Mock;
        }
    }
}
