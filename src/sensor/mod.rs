// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sensor drivers
//!
//! Each driver owns the byte-level contract with one physical sensor: the
//! power-up sequence, identity verification, range/rate encoding and the
//! conversion from raw register bytes to physical units.
//!
//! - [`adxl345`]: 3-axis accelerometer, outputs `X`, `Y`, `Z` in milli-g
//! - [`bme280`]: environment sensor, outputs `Temperature` (°C), `Pressure` (hPa)
//!   and `Humidity` (%RH)

pub mod adxl345;
pub mod bme280;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::bus::SharedBus;
use crate::config::SensorConfig;
use crate::error::SensorError;

pub use adxl345::{Acceleration, Adxl345, Adxl345Options};
pub use bme280::{Bme280, Bme280Options, EnvironmentReading};

/// Named physical outputs of one sample
pub type Outputs = BTreeMap<String, f64>;

/// Supported sensor families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Analog Devices ADXL345 accelerometer
    Adxl345,
    /// Bosch BME280 temperature/pressure/humidity sensor
    Bme280,
}

impl SensorKind {
    /// Output names emitted for every sample of this sensor
    pub fn output_names(self) -> &'static [&'static str] {
        match self {
            SensorKind::Adxl345 => &["X", "Y", "Z"],
            SensorKind::Bme280 => &["Temperature", "Pressure", "Humidity"],
        }
    }

    /// Default 7-bit bus address of this sensor
    pub fn default_address(self) -> u8 {
        match self {
            SensorKind::Adxl345 => adxl345::DEFAULT_ADDRESS,
            SensorKind::Bme280 => bme280::DEFAULT_ADDRESS,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Adxl345 => write!(f, "ADXL345"),
            SensorKind::Bme280 => write!(f, "BME280"),
        }
    }
}

/// An immutable reading in physical units
pub trait Sample {
    /// Named outputs of this reading
    fn outputs(&self) -> Outputs;

    /// Instant the reading was produced
    fn timestamp(&self) -> DateTime<Utc>;
}

/// An opened and configured sensor, as seen by the acquisition scheduler
#[async_trait]
pub trait Sensor: Send {
    /// Sensor family
    fn kind(&self) -> SensorKind;

    /// Read a fresh sample and return its named outputs
    async fn sample(&mut self) -> Result<Outputs, SensorError>;

    /// Release the handle, every later read fails with [`SensorError::Closed`]
    async fn close(&mut self);
}

/// Device handle shared by every acquisition job bound to it
pub type SharedSensor = Arc<Mutex<Box<dyn Sensor>>>;

/// Wrap an opened sensor into a [`SharedSensor`]
pub fn share<S: Sensor + 'static>(sensor: S) -> SharedSensor {
    let sensor: Box<dyn Sensor> = Box::new(sensor);
    Arc::new(Mutex::new(sensor))
}

/// Open the sensor described by the configuration on the given bus
pub async fn open_sensor(bus: SharedBus, config: &SensorConfig) -> Result<SharedSensor, SensorError> {
    let address = config.resolved_address();
    info!("Opening {} at address 0x{:02X}", config.kind, address);

    match config.kind {
        SensorKind::Adxl345 => {
            let options = Adxl345Options::new(config.sensitivity, config.data_rate);
            Ok(share(Adxl345::open(bus, address, options).await?))
        }
        SensorKind::Bme280 => {
            let options = Bme280Options::from_oversampling(config.oversampling);
            Ok(share(Bme280::open(bus, address, options).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{self, MockI2cBus};

    #[test]
    fn test_output_names() {
        assert_eq!(SensorKind::Adxl345.output_names(), &["X", "Y", "Z"]);
        assert_eq!(
            SensorKind::Bme280.output_names(),
            &["Temperature", "Pressure", "Humidity"]
        );
    }

    #[tokio::test]
    async fn test_open_sensor_from_config() {
        let bus = bus::share(MockI2cBus::with_default_devices());

        for kind in [SensorKind::Adxl345, SensorKind::Bme280] {
            let config = SensorConfig {
                kind,
                ..SensorConfig::default()
            };
            let sensor = open_sensor(bus.clone(), &config).await.unwrap();
            let mut sensor = sensor.lock().await;
            assert_eq!(sensor.kind(), kind);

            let outputs = sensor.sample().await.unwrap();
            let names: Vec<&str> = outputs.keys().map(String::as_str).collect();
            let mut expected = kind.output_names().to_vec();
            expected.sort_unstable();
            assert_eq!(names, expected);
        }
    }
}
