// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Native I2C driver for Linux hardware
//!
//! This module provides a native I2C driver that communicates directly
//! with the I2C controller through /dev/i2c-* devices. One kernel handle is
//! opened lazily per slave address and kept for the lifetime of the bus.
//!
//! Every transaction is a blocking ioctl, so it runs on the tokio blocking
//! pool. A caller that gives up on a stuck transaction (read timeout, stop
//! request) gets control back immediately while the ioctl finishes in the
//! background, holding only its own device handle.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use i2cdev::core::I2CDevice;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};
use log::debug;

use super::{BusError, I2cBus};

type DeviceHandle = Arc<Mutex<LinuxI2CDevice>>;

/// Native I2C driver backed by the Linux i2c-dev interface
pub struct NativeI2cBus {
    device_path: String,
    devices: HashMap<u8, DeviceHandle>,
}

impl NativeI2cBus {
    /// Create a new native I2C driver for the given device node (e.g. "/dev/i2c-1")
    pub fn new(device_path: &str) -> Result<Self, BusError> {
        if !Path::new(device_path).exists() {
            return Err(BusError::Unavailable {
                device: device_path.to_string(),
                reason: "device node does not exist".to_string(),
            });
        }

        Ok(Self {
            device_path: device_path.to_string(),
            devices: HashMap::new(),
        })
    }

    fn device(&mut self, address: u8) -> Result<DeviceHandle, BusError> {
        match self.devices.entry(address) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                debug!(
                    "Opening {} for slave address 0x{:02X}",
                    self.device_path, address
                );
                let device = LinuxI2CDevice::new(&self.device_path, u16::from(address))
                    .map_err(|err| transaction_error(address, err))?;
                Ok(entry.insert(Arc::new(Mutex::new(device))).clone())
            }
        }
    }
}

fn transaction_error(address: u8, err: LinuxI2CError) -> BusError {
    BusError::Transaction {
        address,
        reason: err.to_string(),
    }
}

/// Run one blocking transaction on `device` off the async worker threads
async fn blocking_transaction<D, T, F>(
    address: u8,
    device: Arc<Mutex<D>>,
    transaction: F,
) -> Result<T, BusError>
where
    D: Send + 'static,
    T: Send + 'static,
    F: FnOnce(&mut D) -> Result<T, BusError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut device = device.lock().map_err(|_| BusError::Transaction {
            address,
            reason: "device handle poisoned".to_string(),
        })?;
        transaction(&mut *device)
    })
    .await
    .map_err(|err| BusError::Transaction {
        address,
        reason: format!("blocking transaction aborted: {}", err),
    })?
}

#[async_trait]
impl I2cBus for NativeI2cBus {
    async fn write_byte_to_reg(
        &mut self,
        address: u8,
        register: u8,
        value: u8,
    ) -> Result<(), BusError> {
        let device = self.device(address)?;
        blocking_transaction(address, device, move |device| {
            device
                .smbus_write_byte_data(register, value)
                .map_err(|err| transaction_error(address, err))
        })
        .await
    }

    async fn write_byte(&mut self, address: u8, value: u8) -> Result<(), BusError> {
        let device = self.device(address)?;
        blocking_transaction(address, device, move |device| {
            device
                .smbus_write_byte(value)
                .map_err(|err| transaction_error(address, err))
        })
        .await
    }

    async fn read_byte(&mut self, address: u8) -> Result<u8, BusError> {
        let device = self.device(address)?;
        blocking_transaction(address, device, move |device| {
            device
                .smbus_read_byte()
                .map_err(|err| transaction_error(address, err))
        })
        .await
    }

    async fn read_bytes(&mut self, address: u8, count: usize) -> Result<Vec<u8>, BusError> {
        let device = self.device(address)?;
        blocking_transaction(address, device, move |device| {
            let mut buffer = vec![0u8; count];
            device
                .read(&mut buffer)
                .map_err(|err| transaction_error(address, err))?;
            Ok(buffer)
        })
        .await
    }
}
