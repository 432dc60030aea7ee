// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! I2C bus configuration

use serde::{Deserialize, Serialize};

/// Bus transport selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusType {
    /// Linux `/dev/i2c-*` character device
    Native,
    /// In-memory emulation with an ADXL345 and a BME280 attached
    Mock,
}

/// Configuration of the bus every sensor is wired to.
///
/// # Example
///
/// ```yaml
/// bus:
///   type: native
///   device: /dev/i2c-1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Transport used to reach the devices
    #[serde(rename = "type", default = "default_bus_type")]
    pub bus_type: BusType,

    /// Device node of the native bus, ignored by the mock transport
    #[serde(default = "default_device")]
    pub device: String,
}

fn default_bus_type() -> BusType {
    BusType::Native
}

fn default_device() -> String {
    "/dev/i2c-1".to_string()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bus_type: default_bus_type(),
            device: default_device(),
        }
    }
}
