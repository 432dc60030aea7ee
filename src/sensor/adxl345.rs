// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! ADXL345 3-axis accelerometer driver
//!
//! See <https://www.sparkfun.com/datasheets/Sensors/Accelerometer/ADXL345.pdf>
//!
//! The driver writes the data format, bandwidth and power-control registers at
//! open time, after checking the device identity. Each read selects `DATAX0`
//! and fetches the six consecutive axis registers in one transaction; every
//! axis is a signed 16-bit little-endian value scaled to milli-g.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use super::{Outputs, Sample, Sensor, SensorKind};
use crate::bus::{BusError, SharedBus};
use crate::error::SensorError;

/// Expected content of the `DEVID` register
pub const DEVICE_ID: u8 = 0xE5;
/// Bus address with the ALT ADDRESS pin low
pub const DEFAULT_ADDRESS: u8 = 0x53;
/// Bus address with the ALT ADDRESS pin high
pub const ALTERNATE_ADDRESS: u8 = 0x1D;
/// Length of one axis data burst (`DATAX0`..=`DATAZ1`)
pub const AXES_PAYLOAD_LEN: usize = 6;

/// Register map
pub mod registers {
    pub const DEVID: u8 = 0x00;
    pub const THRESH_TAP: u8 = 0x1D;
    pub const OFSX: u8 = 0x1E;
    pub const OFSY: u8 = 0x1F;
    pub const OFSZ: u8 = 0x20;
    pub const DUR: u8 = 0x21;
    pub const LATENT: u8 = 0x22;
    pub const WINDOW: u8 = 0x23;
    pub const THRESH_ACT: u8 = 0x24;
    pub const THRESH_INACT: u8 = 0x25;
    pub const TIME_INACT: u8 = 0x26;
    pub const ACT_INACT_CTL: u8 = 0x27;
    pub const THRESH_FF: u8 = 0x28;
    pub const TIME_FF: u8 = 0x29;
    pub const TAP_AXES: u8 = 0x2A;
    pub const ACT_TAP_STATUS: u8 = 0x2B;
    pub const BW_RATE: u8 = 0x2C;
    pub const POWER_CTL: u8 = 0x2D;
    pub const INT_ENABLE: u8 = 0x2E;
    pub const INT_MAP: u8 = 0x2F;
    pub const INT_SOURCE: u8 = 0x30;
    pub const DATA_FORMAT: u8 = 0x31;
    pub const DATAX0: u8 = 0x32;
    pub const DATAX1: u8 = 0x33;
    pub const DATAY0: u8 = 0x34;
    pub const DATAY1: u8 = 0x35;
    pub const DATAZ0: u8 = 0x36;
    pub const DATAZ1: u8 = 0x37;
    pub const FIFO_CTL: u8 = 0x38;
    pub const FIFO_STATUS: u8 = 0x39;
}

/// `POWER_CTL` bits
pub mod power_ctl {
    pub const SLEEP: u8 = 0x04;
    pub const MEASURE: u8 = 0x08;
    pub const AUTO_SLEEP: u8 = 0x10;
    pub const LINK: u8 = 0x20;
}

/// `DATA_FORMAT` bits
pub mod data_format {
    pub const RANGE_2G: u8 = 0x00;
    pub const RANGE_4G: u8 = 0x01;
    pub const RANGE_8G: u8 = 0x02;
    pub const RANGE_16G: u8 = 0x03;
    pub const JUSTIFY: u8 = 0x04;
    pub const FULL_RES: u8 = 0x08;
    pub const INT_INVERT: u8 = 0x20;
    pub const SPI: u8 = 0x40;
    pub const SELF_TEST: u8 = 0x80;
}

/// Measurement full-scale range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Range {
    G2,
    G4,
    G8,
    G16,
}

impl Range {
    /// Resolve a full-scale selector in g. Unknown selectors fall back to ±16 g.
    pub fn from_sensitivity(sensitivity: u8) -> Self {
        match sensitivity {
            2 => Range::G2,
            4 => Range::G4,
            8 => Range::G8,
            16 => Range::G16,
            other => {
                warn!("Unsupported ADXL345 sensitivity {} g, using ±16 g", other);
                Range::G16
            }
        }
    }

    /// Whether `sensitivity` selects a range without falling back
    pub fn is_supported(sensitivity: u8) -> bool {
        matches!(sensitivity, 2 | 4 | 8 | 16)
    }

    /// Range bits of the `DATA_FORMAT` register
    pub fn format_bits(self) -> u8 {
        match self {
            Range::G2 => data_format::RANGE_2G,
            Range::G4 => data_format::RANGE_4G,
            Range::G8 => data_format::RANGE_8G,
            Range::G16 => data_format::RANGE_16G,
        }
    }

    /// Scale factor in milli-g per LSB
    pub fn resolution_factor(self) -> f64 {
        match self {
            Range::G2 => 3.9,
            Range::G4 => 7.8,
            Range::G8 => 15.6,
            Range::G16 => 31.2,
        }
    }

    /// Full-scale value in g
    pub fn sensitivity(self) -> u8 {
        match self {
            Range::G2 => 2,
            Range::G4 => 4,
            Range::G8 => 8,
            Range::G16 => 16,
        }
    }
}

/// Output data rate, encoded in `BW_RATE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataRate {
    Hz6_25,
    Hz12_5,
    Hz25,
    Hz50,
    Hz100,
    Hz200,
    Hz400,
    Hz800,
    Hz1600,
    Hz3200,
}

impl DataRate {
    const TABLE: [(f64, DataRate, u8); 10] = [
        (6.25, DataRate::Hz6_25, 0x06),
        (12.5, DataRate::Hz12_5, 0x07),
        (25.0, DataRate::Hz25, 0x08),
        (50.0, DataRate::Hz50, 0x09),
        (100.0, DataRate::Hz100, 0x0A),
        (200.0, DataRate::Hz200, 0x0B),
        (400.0, DataRate::Hz400, 0x0C),
        (800.0, DataRate::Hz800, 0x0D),
        (1600.0, DataRate::Hz1600, 0x0E),
        (3200.0, DataRate::Hz3200, 0x0F),
    ];

    /// Resolve a rate in Hz by exact match. Anything else falls back to 400 Hz.
    pub fn from_hz(hz: f64) -> Self {
        match Self::TABLE.iter().find(|(rate, _, _)| *rate == hz) {
            Some((_, data_rate, _)) => *data_rate,
            None => {
                warn!("Unsupported ADXL345 data rate {} Hz, using 400 Hz", hz);
                DataRate::Hz400
            }
        }
    }

    /// Whether `hz` is one of the rates of the table
    pub fn is_supported(hz: f64) -> bool {
        Self::TABLE.iter().any(|(rate, _, _)| *rate == hz)
    }

    fn entry(self) -> &'static (f64, DataRate, u8) {
        // Every variant has exactly one table row
        Self::TABLE
            .iter()
            .find(|(_, data_rate, _)| *data_rate == self)
            .unwrap_or(&Self::TABLE[6])
    }

    /// `BW_RATE` register code
    pub fn code(self) -> u8 {
        self.entry().2
    }

    /// Rate in Hz
    pub fn hz(self) -> f64 {
        self.entry().0
    }
}

/// Map a full-scale selector to its (`DATA_FORMAT` range bits, milli-g per LSB) pair
pub fn resolve_range(sensitivity: u8) -> (u8, f64) {
    let range = Range::from_sensitivity(sensitivity);
    (range.format_bits(), range.resolution_factor())
}

/// Map a rate in Hz to its `BW_RATE` code
pub fn resolve_rate(hz: f64) -> u8 {
    DataRate::from_hz(hz).code()
}

/// Device configuration
///
/// The scale factor is always derived from the range, the two cannot be set
/// independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Adxl345Options {
    range: Range,
    data_rate: DataRate,
}

impl Adxl345Options {
    pub fn new(sensitivity: u8, data_rate_hz: f64) -> Self {
        Self {
            range: Range::from_sensitivity(sensitivity),
            data_rate: DataRate::from_hz(data_rate_hz),
        }
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub fn data_rate(&self) -> DataRate {
        self.data_rate
    }

    pub fn resolution_factor(&self) -> f64 {
        self.range.resolution_factor()
    }

    /// Value written to `DATA_FORMAT`: range bits with full resolution enabled
    pub fn data_format(&self) -> u8 {
        self.range.format_bits() | data_format::FULL_RES
    }
}

impl Default for Adxl345Options {
    fn default() -> Self {
        Self {
            range: Range::G16,
            data_rate: DataRate::Hz400,
        }
    }
}

/// Acceleration sample in milli-g
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Acceleration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: DateTime<Utc>,
}

impl Acceleration {
    /// Decode a `DATAX0`..=`DATAZ1` burst and scale it
    pub fn from_payload(payload: &[u8; AXES_PAYLOAD_LEN], resolution_factor: f64) -> Self {
        let [x, y, z] = decode_axes(payload);
        Self {
            x: f64::from(x) * resolution_factor,
            y: f64::from(y) * resolution_factor,
            z: f64::from(z) * resolution_factor,
            timestamp: Utc::now(),
        }
    }
}

impl Sample for Acceleration {
    fn outputs(&self) -> Outputs {
        Outputs::from([
            ("X".to_string(), self.x),
            ("Y".to_string(), self.y),
            ("Z".to_string(), self.z),
        ])
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Decode three signed 16-bit little-endian axis values
fn decode_axes(payload: &[u8; AXES_PAYLOAD_LEN]) -> [i16; 3] {
    [
        i16::from_le_bytes([payload[0], payload[1]]),
        i16::from_le_bytes([payload[2], payload[3]]),
        i16::from_le_bytes([payload[4], payload[5]]),
    ]
}

/// Opened and configured ADXL345
pub struct Adxl345 {
    bus: SharedBus,
    address: u8,
    options: Adxl345Options,
    closed: bool,
}

impl Adxl345 {
    /// Check the device identity, then configure and start measuring
    ///
    /// Fails with [`SensorError::IdentityMismatch`] if `DEVID` does not read
    /// back `0xE5`, and with [`SensorError::Io`] on any bus failure.
    pub async fn open(
        bus: SharedBus,
        address: u8,
        options: Adxl345Options,
    ) -> Result<Self, SensorError> {
        let device = Self {
            bus,
            address,
            options,
            closed: false,
        };

        device.check_device_id().await?;
        device.configure().await?;

        debug!(
            "ADXL345 at 0x{:02X} configured: range ±{} g, {} Hz",
            address,
            options.range.sensitivity(),
            options.data_rate.hz()
        );
        Ok(device)
    }

    async fn check_device_id(&self) -> Result<(), SensorError> {
        let mut bus = self.bus.lock().await;
        bus.write_byte(self.address, registers::DEVID).await?;
        let found = bus.read_byte(self.address).await?;

        if found != DEVICE_ID {
            return Err(SensorError::IdentityMismatch {
                sensor: SensorKind::Adxl345,
                address: self.address,
                expected: DEVICE_ID,
                found,
            });
        }

        debug!("ADXL345 device id is correct");
        Ok(())
    }

    async fn configure(&self) -> Result<(), SensorError> {
        let mut bus = self.bus.lock().await;
        bus.write_byte_to_reg(
            self.address,
            registers::DATA_FORMAT,
            self.options.data_format(),
        )
        .await?;
        bus.write_byte_to_reg(self.address, registers::BW_RATE, self.options.data_rate.code())
            .await?;
        bus.write_byte_to_reg(self.address, registers::POWER_CTL, power_ctl::MEASURE)
            .await?;
        Ok(())
    }

    /// Read one acceleration sample
    pub async fn read(&mut self) -> Result<Acceleration, SensorError> {
        if self.closed {
            return Err(SensorError::Closed);
        }

        let payload = {
            let mut bus = self.bus.lock().await;
            bus.write_byte(self.address, registers::DATAX0).await?;
            bus.read_bytes(self.address, AXES_PAYLOAD_LEN).await?
        };

        let payload: [u8; AXES_PAYLOAD_LEN] =
            payload
                .as_slice()
                .try_into()
                .map_err(|_| BusError::ShortRead {
                    address: self.address,
                    expected: AXES_PAYLOAD_LEN,
                    received: payload.len(),
                })?;

        Ok(Acceleration::from_payload(
            &payload,
            self.options.resolution_factor(),
        ))
    }

    /// Release the handle. The device keeps measuring.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn options(&self) -> &Adxl345Options {
        &self.options
    }
}

#[async_trait]
impl Sensor for Adxl345 {
    fn kind(&self) -> SensorKind {
        SensorKind::Adxl345
    }

    async fn sample(&mut self) -> Result<Outputs, SensorError> {
        Ok(self.read().await?.outputs())
    }

    async fn close(&mut self) {
        Adxl345::close(self);
    }
}
