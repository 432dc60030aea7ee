// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Mock I2C bus
//!
//! An in-memory register file emulating devices on an I2C bus. Each emulated
//! device holds 256 registers and a register pointer: a plain byte write moves
//! the pointer, reads start at the pointer and auto-increment it, the same way
//! register-addressed sensors behave on a real bus.
//!
//! The mock is cheaply cloneable; clones share the same state, so a test can keep
//! a handle to inspect register writes or inject faults after moving the bus
//! into a [`SharedBus`](super::SharedBus).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use log::debug;

use super::{BusError, I2cBus};
use crate::sensor::{adxl345, bme280};

/// Raw ADXL345 axis payload served by the default mock device (X=100, Y=-56, Z=256)
pub const MOCK_ADXL345_AXES: [u8; 6] = [0x64, 0x00, 0xC8, 0xFF, 0x00, 0x01];

/// BME280 calibration block 0x88..=0xA1 (datasheet reference coefficients)
pub const MOCK_BME280_CALIBRATION_TP: [u8; 26] = [
    0x70, 0x6B, 0x43, 0x67, 0x18, 0xFC, 0x7D, 0x8E, 0x43, 0xD6, 0xD0, 0x0B, 0x27, 0x0B, 0x8C,
    0x00, 0xF9, 0xFF, 0x8C, 0x3C, 0xF8, 0xC6, 0x70, 0x17, 0x00, 0x4B,
];

/// BME280 humidity calibration block 0xE1..=0xE7
pub const MOCK_BME280_CALIBRATION_H: [u8; 7] = [0x6A, 0x01, 0x00, 0x13, 0x29, 0x03, 0x1E];

/// BME280 raw measurement burst 0xF7..=0xFE (press 415148, temp 519888, hum 30000)
pub const MOCK_BME280_MEASUREMENT: [u8; 8] = [0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x75, 0x30];

/// Emulated device on the mock bus
#[derive(Debug, Clone)]
pub struct MockDevice {
    registers: [u8; 256],
    pointer: u8,
}

impl MockDevice {
    fn new() -> Self {
        Self {
            registers: [0; 256],
            pointer: 0,
        }
    }

    fn next_byte(&mut self) -> u8 {
        let value = self.registers[self.pointer as usize];
        self.pointer = self.pointer.wrapping_add(1);
        value
    }
}

/// Register write recorded by the mock bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    pub address: u8,
    pub register: u8,
    pub value: u8,
}

#[derive(Debug, Default)]
struct MockBusState {
    devices: HashMap<u8, MockDevice>,
    writes: Vec<RegisterWrite>,
    fail_reads: bool,
    fail_writes: bool,
    read_transactions: u64,
}

/// Mock I2C bus backed by emulated register files
#[derive(Debug, Clone, Default)]
pub struct MockI2cBus {
    state: Arc<Mutex<MockBusState>>,
}

impl MockI2cBus {
    /// Create an empty mock bus with no devices attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock bus with an ADXL345 at 0x53 and a BME280 at 0x76
    pub fn with_default_devices() -> Self {
        let bus = Self::new();

        bus.add_device(adxl345::DEFAULT_ADDRESS);
        bus.set_registers(
            adxl345::DEFAULT_ADDRESS,
            adxl345::registers::DEVID,
            &[adxl345::DEVICE_ID],
        );
        bus.set_registers(
            adxl345::DEFAULT_ADDRESS,
            adxl345::registers::DATAX0,
            &MOCK_ADXL345_AXES,
        );

        bus.add_device(bme280::DEFAULT_ADDRESS);
        bus.set_registers(
            bme280::DEFAULT_ADDRESS,
            bme280::registers::CHIP_ID,
            &[bme280::CHIP_ID],
        );
        bus.set_registers(
            bme280::DEFAULT_ADDRESS,
            bme280::registers::CALIB_TP,
            &MOCK_BME280_CALIBRATION_TP,
        );
        bus.set_registers(
            bme280::DEFAULT_ADDRESS,
            bme280::registers::CALIB_H,
            &MOCK_BME280_CALIBRATION_H,
        );
        bus.set_registers(
            bme280::DEFAULT_ADDRESS,
            bme280::registers::PRESS_MSB,
            &MOCK_BME280_MEASUREMENT,
        );

        bus
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockBusState>, BusError> {
        self.state.lock().map_err(|_| BusError::Transaction {
            address: 0,
            reason: "mock bus state poisoned".to_string(),
        })
    }

    /// Attach an emulated device with zeroed registers
    pub fn add_device(&self, address: u8) {
        if let Ok(mut state) = self.lock() {
            state.devices.entry(address).or_insert_with(MockDevice::new);
        }
    }

    /// Overwrite consecutive registers of an attached device
    pub fn set_registers(&self, address: u8, start: u8, values: &[u8]) {
        if let Ok(mut state) = self.lock() {
            if let Some(device) = state.devices.get_mut(&address) {
                for (offset, value) in values.iter().enumerate() {
                    let register = start.wrapping_add(offset as u8);
                    device.registers[register as usize] = *value;
                }
            }
        }
    }

    /// Current content of a register, `None` if no device is attached there
    pub fn register(&self, address: u8, register: u8) -> Option<u8> {
        self.lock()
            .ok()?
            .devices
            .get(&address)
            .map(|device| device.registers[register as usize])
    }

    /// Register writes performed on `address`, in order
    pub fn register_writes(&self, address: u8) -> Vec<RegisterWrite> {
        self.lock()
            .map(|state| {
                state
                    .writes
                    .iter()
                    .filter(|write| write.address == address)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of read transactions attempted on the bus, failed ones included
    pub fn read_transactions(&self) -> u64 {
        self.lock().map(|state| state.read_transactions).unwrap_or(0)
    }

    /// Make every subsequent read fail
    pub fn set_fail_reads(&self, fail: bool) {
        if let Ok(mut state) = self.lock() {
            state.fail_reads = fail;
        }
    }

    /// Make every subsequent write fail
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut state) = self.lock() {
            state.fail_writes = fail;
        }
    }
}

fn device_mut(state: &mut MockBusState, address: u8) -> Result<&mut MockDevice, BusError> {
    state
        .devices
        .get_mut(&address)
        .ok_or(BusError::NoDevice { address })
}

#[async_trait]
impl I2cBus for MockI2cBus {
    async fn write_byte_to_reg(
        &mut self,
        address: u8,
        register: u8,
        value: u8,
    ) -> Result<(), BusError> {
        let mut state = self.lock()?;
        if state.fail_writes {
            return Err(BusError::Transaction {
                address,
                reason: "injected write failure".to_string(),
            });
        }

        debug!(
            "Mock write 0x{:02X} -> register 0x{:02X} of device 0x{:02X}",
            value, register, address
        );
        device_mut(&mut state, address)?.registers[register as usize] = value;
        state.writes.push(RegisterWrite {
            address,
            register,
            value,
        });
        Ok(())
    }

    async fn write_byte(&mut self, address: u8, value: u8) -> Result<(), BusError> {
        let mut state = self.lock()?;
        if state.fail_writes {
            return Err(BusError::Transaction {
                address,
                reason: "injected write failure".to_string(),
            });
        }

        device_mut(&mut state, address)?.pointer = value;
        Ok(())
    }

    async fn read_byte(&mut self, address: u8) -> Result<u8, BusError> {
        let mut state = self.lock()?;
        state.read_transactions += 1;
        if state.fail_reads {
            return Err(BusError::Transaction {
                address,
                reason: "injected read failure".to_string(),
            });
        }

        Ok(device_mut(&mut state, address)?.next_byte())
    }

    async fn read_bytes(&mut self, address: u8, count: usize) -> Result<Vec<u8>, BusError> {
        let mut state = self.lock()?;
        state.read_transactions += 1;
        if state.fail_reads {
            return Err(BusError::Transaction {
                address,
                reason: "injected read failure".to_string(),
            });
        }

        let device = device_mut(&mut state, address)?;
        Ok((0..count).map(|_| device.next_byte()).collect())
    }
}
