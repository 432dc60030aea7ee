// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! BME280 temperature, pressure and humidity sensor driver
//!
//! Open sequence: chip id check, soft reset, wait for the NVM copy to finish,
//! read the factory calibration, then program humidity/measurement control and
//! start normal mode. A read fetches the 8-byte burst `0xF7..=0xFE` and applies
//! the double-precision compensation formulas of the Bosch datasheet.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use super::{Outputs, Sample, Sensor, SensorKind};
use crate::bus::{BusError, SharedBus};
use crate::error::SensorError;

/// Expected content of the `CHIP_ID` register
pub const CHIP_ID: u8 = 0x60;
/// Bus address with SDO tied to ground
pub const DEFAULT_ADDRESS: u8 = 0x76;
/// Bus address with SDO tied to VDDIO
pub const ALTERNATE_ADDRESS: u8 = 0x77;

const SOFT_RESET_COMMAND: u8 = 0xB6;
const STATUS_IM_UPDATE: u8 = 0x01;
const MODE_NORMAL: u8 = 0b11;
const CALIB_TP_LEN: usize = 26;
const CALIB_H_LEN: usize = 7;
const MEASUREMENT_LEN: usize = 8;
const RESET_POLL_INTERVAL: Duration = Duration::from_millis(2);
const RESET_POLL_ATTEMPTS: u32 = 10;

/// Register map
pub mod registers {
    pub const CALIB_TP: u8 = 0x88;
    pub const CHIP_ID: u8 = 0xD0;
    pub const RESET: u8 = 0xE0;
    pub const CALIB_H: u8 = 0xE1;
    pub const CTRL_HUM: u8 = 0xF2;
    pub const STATUS: u8 = 0xF3;
    pub const CTRL_MEAS: u8 = 0xF4;
    pub const CONFIG: u8 = 0xF5;
    pub const PRESS_MSB: u8 = 0xF7;
    pub const TEMP_MSB: u8 = 0xFA;
    pub const HUM_MSB: u8 = 0xFD;
}

/// Oversampling setting shared by the three measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Oversampling {
    X1,
    X2,
    X4,
    X8,
    X16,
}

impl Oversampling {
    /// Resolve an oversampling ratio. Unknown ratios fall back to x1.
    pub fn from_ratio(ratio: u8) -> Self {
        match ratio {
            1 => Oversampling::X1,
            2 => Oversampling::X2,
            4 => Oversampling::X4,
            8 => Oversampling::X8,
            16 => Oversampling::X16,
            other => {
                warn!("Unsupported BME280 oversampling x{}, using x1", other);
                Oversampling::X1
            }
        }
    }

    /// 3-bit register encoding
    pub fn bits(self) -> u8 {
        match self {
            Oversampling::X1 => 0b001,
            Oversampling::X2 => 0b010,
            Oversampling::X4 => 0b011,
            Oversampling::X8 => 0b100,
            Oversampling::X16 => 0b101,
        }
    }
}

/// Device configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bme280Options {
    pub oversampling: Oversampling,
}

impl Bme280Options {
    pub fn from_oversampling(ratio: u8) -> Self {
        Self {
            oversampling: Oversampling::from_ratio(ratio),
        }
    }

    /// `CTRL_HUM` value
    pub fn ctrl_hum(&self) -> u8 {
        self.oversampling.bits()
    }

    /// `CTRL_MEAS` value: temperature and pressure oversampling, normal mode
    pub fn ctrl_meas(&self) -> u8 {
        self.oversampling.bits() << 5 | self.oversampling.bits() << 2 | MODE_NORMAL
    }
}

impl Default for Bme280Options {
    fn default() -> Self {
        Self {
            oversampling: Oversampling::X1,
        }
    }
}

/// Factory trimming parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
    pub h1: u8,
    pub h2: i16,
    pub h3: u8,
    pub h4: i16,
    pub h5: i16,
    pub h6: i8,
}

impl Calibration {
    /// Parse the `0x88..=0xA1` and `0xE1..=0xE7` calibration blocks
    pub fn from_registers(tp: &[u8; CALIB_TP_LEN], h: &[u8; CALIB_H_LEN]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([tp[i], tp[i + 1]]);
        let i16_at = |i: usize| i16::from_le_bytes([tp[i], tp[i + 1]]);

        Self {
            t1: u16_at(0),
            t2: i16_at(2),
            t3: i16_at(4),
            p1: u16_at(6),
            p2: i16_at(8),
            p3: i16_at(10),
            p4: i16_at(12),
            p5: i16_at(14),
            p6: i16_at(16),
            p7: i16_at(18),
            p8: i16_at(20),
            p9: i16_at(22),
            h1: tp[25],
            h2: i16::from_le_bytes([h[0], h[1]]),
            h3: h[2],
            // dig_H4 and dig_H5 are 12-bit signed values sharing register 0xE5
            h4: (i16::from(h[3] as i8) << 4) | i16::from(h[4] & 0x0F),
            h5: (i16::from(h[5] as i8) << 4) | i16::from(h[4] >> 4),
            h6: h[6] as i8,
        }
    }

    /// Compensated temperature in °C and the shared `t_fine` term
    fn temperature(&self, adc_t: i32) -> (f64, f64) {
        let adc_t = f64::from(adc_t);
        let t1 = f64::from(self.t1);
        let var1 = (adc_t / 16384.0 - t1 / 1024.0) * f64::from(self.t2);
        let var2 = (adc_t / 131072.0 - t1 / 8192.0).powi(2) * f64::from(self.t3);
        let t_fine = var1 + var2;
        (t_fine / 5120.0, t_fine)
    }

    /// Compensated pressure in Pa
    fn pressure(&self, adc_p: i32, t_fine: f64) -> f64 {
        let mut var1 = t_fine / 2.0 - 64000.0;
        let mut var2 = var1 * var1 * f64::from(self.p6) / 32768.0;
        var2 += var1 * f64::from(self.p5) * 2.0;
        var2 = var2 / 4.0 + f64::from(self.p4) * 65536.0;
        var1 = (f64::from(self.p3) * var1 * var1 / 524288.0 + f64::from(self.p2) * var1)
            / 524288.0;
        var1 = (1.0 + var1 / 32768.0) * f64::from(self.p1);
        if var1 == 0.0 {
            // Avoid a division by zero on an unconfigured device
            return 0.0;
        }

        let mut pressure = 1048576.0 - f64::from(adc_p);
        pressure = (pressure - var2 / 4096.0) * 6250.0 / var1;
        var1 = f64::from(self.p9) * pressure * pressure / 2147483648.0;
        var2 = pressure * f64::from(self.p8) / 32768.0;
        pressure + (var1 + var2 + f64::from(self.p7)) / 16.0
    }

    /// Compensated relative humidity in %RH, clamped to 0..=100
    fn humidity(&self, adc_h: i32, t_fine: f64) -> f64 {
        let mut humidity = t_fine - 76800.0;
        humidity = (f64::from(adc_h)
            - (f64::from(self.h4) * 64.0 + f64::from(self.h5) / 16384.0 * humidity))
            * (f64::from(self.h2) / 65536.0
                * (1.0
                    + f64::from(self.h6) / 67108864.0
                        * humidity
                        * (1.0 + f64::from(self.h3) / 67108864.0 * humidity)));
        humidity *= 1.0 - f64::from(self.h1) * humidity / 524288.0;
        humidity.clamp(0.0, 100.0)
    }

    /// Convert a raw `0xF7..=0xFE` burst into physical units
    pub fn compensate(&self, burst: &[u8; MEASUREMENT_LEN]) -> EnvironmentReading {
        let adc_p = raw_20bit(burst[0], burst[1], burst[2]);
        let adc_t = raw_20bit(burst[3], burst[4], burst[5]);
        let adc_h = i32::from(u16::from_be_bytes([burst[6], burst[7]]));

        let (temperature, t_fine) = self.temperature(adc_t);
        EnvironmentReading {
            temperature,
            pressure: self.pressure(adc_p, t_fine) / 100.0,
            humidity: self.humidity(adc_h, t_fine),
            timestamp: Utc::now(),
        }
    }
}

fn raw_20bit(msb: u8, lsb: u8, xlsb: u8) -> i32 {
    (i32::from(msb) << 12) | (i32::from(lsb) << 4) | (i32::from(xlsb) >> 4)
}

/// Environment sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnvironmentReading {
    /// Temperature in °C
    pub temperature: f64,
    /// Pressure in hPa
    pub pressure: f64,
    /// Relative humidity in %RH
    pub humidity: f64,
    pub timestamp: DateTime<Utc>,
}

impl Sample for EnvironmentReading {
    fn outputs(&self) -> Outputs {
        Outputs::from([
            ("Temperature".to_string(), self.temperature),
            ("Pressure".to_string(), self.pressure),
            ("Humidity".to_string(), self.humidity),
        ])
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Opened and configured BME280
pub struct Bme280 {
    bus: SharedBus,
    address: u8,
    options: Bme280Options,
    calibration: Calibration,
    closed: bool,
}

impl Bme280 {
    /// Check the chip id, reset, load calibration and start normal mode
    pub async fn open(
        bus: SharedBus,
        address: u8,
        options: Bme280Options,
    ) -> Result<Self, SensorError> {
        {
            let mut bus = bus.lock().await;

            bus.write_byte(address, registers::CHIP_ID).await?;
            let found = bus.read_byte(address).await?;
            if found != CHIP_ID {
                return Err(SensorError::IdentityMismatch {
                    sensor: SensorKind::Bme280,
                    address,
                    expected: CHIP_ID,
                    found,
                });
            }

            bus.write_byte_to_reg(address, registers::RESET, SOFT_RESET_COMMAND)
                .await?;
        }

        // The bus stays free for other devices while the NVM copy runs
        let mut ready = false;
        for _ in 0..RESET_POLL_ATTEMPTS {
            tokio::time::sleep(RESET_POLL_INTERVAL).await;
            let mut bus = bus.lock().await;
            bus.write_byte(address, registers::STATUS).await?;
            if bus.read_byte(address).await? & STATUS_IM_UPDATE == 0 {
                ready = true;
                break;
            }
        }
        if !ready {
            return Err(SensorError::Timeout {
                timeout_ms: RESET_POLL_INTERVAL.as_millis() as u64
                    * u64::from(RESET_POLL_ATTEMPTS),
            });
        }

        let calibration = {
            let mut bus = bus.lock().await;

            let tp = read_block::<CALIB_TP_LEN>(&mut **bus, address, registers::CALIB_TP).await?;
            let h = read_block::<CALIB_H_LEN>(&mut **bus, address, registers::CALIB_H).await?;
            let calibration = Calibration::from_registers(&tp, &h);

            // ctrl_hum only takes effect after a write to ctrl_meas
            bus.write_byte_to_reg(address, registers::CTRL_HUM, options.ctrl_hum())
                .await?;
            bus.write_byte_to_reg(address, registers::CTRL_MEAS, options.ctrl_meas())
                .await?;
            bus.write_byte_to_reg(address, registers::CONFIG, 0x00)
                .await?;

            calibration
        };

        debug!(
            "BME280 at 0x{:02X} configured with oversampling {:?}",
            address, options.oversampling
        );

        Ok(Self {
            bus,
            address,
            options,
            calibration,
            closed: false,
        })
    }

    /// Read one compensated environment sample
    pub async fn read(&mut self) -> Result<EnvironmentReading, SensorError> {
        if self.closed {
            return Err(SensorError::Closed);
        }

        let burst = {
            let mut bus = self.bus.lock().await;
            read_block::<MEASUREMENT_LEN>(&mut **bus, self.address, registers::PRESS_MSB).await?
        };
        Ok(self.calibration.compensate(&burst))
    }

    /// Release the handle. The device stays in normal mode.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn options(&self) -> &Bme280Options {
        &self.options
    }
}

async fn read_block<const N: usize>(
    bus: &mut dyn crate::bus::I2cBus,
    address: u8,
    register: u8,
) -> Result<[u8; N], BusError> {
    bus.write_byte(address, register).await?;
    let bytes = bus.read_bytes(address, N).await?;
    let received = bytes.len();
    bytes.try_into().map_err(|_| BusError::ShortRead {
        address,
        expected: N,
        received,
    })
}

#[async_trait]
impl Sensor for Bme280 {
    fn kind(&self) -> SensorKind {
        SensorKind::Bme280
    }

    async fn sample(&mut self) -> Result<Outputs, SensorError> {
        Ok(self.read().await?.outputs())
    }

    async fn close(&mut self) {
        Bme280::close(self);
    }
}
