// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sensor configuration
//!
//! This module defines which sensor is attached to the bus and how it is
//! configured when opened.

use serde::{Deserialize, Serialize};

use crate::sensor::SensorKind;

/// Settings of the sensor sampled by the acquisition scheduler.
///
/// `sensitivity` and `data_rate` only apply to the ADXL345, `oversampling`
/// only applies to the BME280. Unknown selector values are not an error: the
/// driver falls back to the widest range (±16 g), the 400 Hz rate or x1
/// oversampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Sensor family
    #[serde(default = "default_kind")]
    pub kind: SensorKind,

    /// 7-bit bus address. The sensor's default address is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<u8>,

    /// ADXL345 full-scale range in g (2, 4, 8 or 16)
    #[serde(default = "default_sensitivity")]
    pub sensitivity: u8,

    /// ADXL345 output data rate in Hz
    #[serde(default = "default_data_rate")]
    pub data_rate: f64,

    /// BME280 oversampling ratio (1, 2, 4, 8 or 16)
    #[serde(default = "default_oversampling")]
    pub oversampling: u8,
}

fn default_kind() -> SensorKind {
    SensorKind::Adxl345
}

fn default_sensitivity() -> u8 {
    16
}

fn default_data_rate() -> f64 {
    400.0
}

fn default_oversampling() -> u8 {
    1
}

impl SensorConfig {
    /// Configured address, or the default address of the sensor family
    pub fn resolved_address(&self) -> u8 {
        self.address.unwrap_or_else(|| self.kind.default_address())
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            address: None,
            sensitivity: default_sensitivity(),
            data_rate: default_data_rate(),
            oversampling: default_oversampling(),
        }
    }
}
