// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Domain errors shared by the sensor drivers and the acquisition scheduler

use thiserror::Error;

use crate::sensor::SensorKind;

pub use crate::bus::BusError;
pub use crate::dispatch::DispatchError;

/// Errors raised while opening or reading a sensor
#[derive(Error, Debug)]
pub enum SensorError {
    /// The identity register did not hold the expected value
    #[error(
        "{sensor} identity mismatch at address 0x{address:02X}: expected 0x{expected:02X}, found 0x{found:02X}"
    )]
    IdentityMismatch {
        sensor: SensorKind,
        address: u8,
        expected: u8,
        found: u8,
    },

    #[error("Bus error: {0}")]
    Io(#[from] BusError),

    #[error("Sensor did not answer within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Sensor handle is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_mismatch_message() {
        let err = SensorError::IdentityMismatch {
            sensor: SensorKind::Adxl345,
            address: 0x53,
            expected: 0xE5,
            found: 0x00,
        };
        assert_eq!(
            err.to_string(),
            "ADXL345 identity mismatch at address 0x53: expected 0xE5, found 0x00"
        );
    }

    #[test]
    fn test_bus_error_conversion() {
        let err: SensorError = BusError::NoDevice { address: 0x1D }.into();
        assert!(matches!(err, SensorError::Io(BusError::NoDevice { address: 0x1D })));
    }
}
