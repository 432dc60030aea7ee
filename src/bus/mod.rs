// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! I2C bus transport
//!
//! This module provides the hardware abstraction used by every sensor driver:
//! - Native: direct access to Linux `/dev/i2c-*` devices (Raspberry Pi and friends)
//! - Mock: an in-memory register file emulating devices, for tests and dry runs
//!
//! A bus is shared between every device wired to it, so drivers hold a
//! [`SharedBus`] and lock it for the whole duration of a register transaction.

pub mod mock;
#[cfg(target_os = "linux")]
pub mod native;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::{BusConfig, BusType};

pub use mock::{MockI2cBus, RegisterWrite};
#[cfg(target_os = "linux")]
pub use native::NativeI2cBus;

/// Errors raised by a bus transport
#[derive(Error, Debug)]
pub enum BusError {
    #[error("I2C transaction with device 0x{address:02X} failed: {reason}")]
    Transaction { address: u8, reason: String },

    #[error("No device acknowledged at address 0x{address:02X}")]
    NoDevice { address: u8 },

    #[error("Short read from device 0x{address:02X}: expected {expected} bytes, got {received}")]
    ShortRead {
        address: u8,
        expected: usize,
        received: usize,
    },

    #[error("I2C bus '{device}' is not available: {reason}")]
    Unavailable { device: String, reason: String },
}

/// Register-addressed serial bus transport
#[async_trait]
pub trait I2cBus: Send {
    /// Write `value` into `register` of the device at `address`
    async fn write_byte_to_reg(&mut self, address: u8, register: u8, value: u8)
        -> Result<(), BusError>;

    /// Write a single byte to the device, typically to select a register
    async fn write_byte(&mut self, address: u8, value: u8) -> Result<(), BusError>;

    /// Read a single byte from the currently selected register
    async fn read_byte(&mut self, address: u8) -> Result<u8, BusError>;

    /// Read `count` consecutive bytes starting at the currently selected register
    async fn read_bytes(&mut self, address: u8, count: usize) -> Result<Vec<u8>, BusError>;
}

/// Bus handle shared by every device on the same physical bus
pub type SharedBus = Arc<Mutex<Box<dyn I2cBus>>>;

/// Wrap a bus driver into a [`SharedBus`]
pub fn share<B: I2cBus + 'static>(bus: B) -> SharedBus {
    let driver: Box<dyn I2cBus> = Box::new(bus);
    Arc::new(Mutex::new(driver))
}

/// Create the bus driver described by the configuration
pub fn create_bus(config: &BusConfig) -> Result<SharedBus> {
    debug!("Creating I2C bus with config: {:?}", config);
    match config.bus_type {
        BusType::Native => create_native_bus(&config.device),
        BusType::Mock => {
            info!("Using mock I2C bus, no hardware will be accessed");
            Ok(share(MockI2cBus::with_default_devices()))
        }
    }
}

#[cfg(target_os = "linux")]
fn create_native_bus(device: &str) -> Result<SharedBus> {
    info!("Opening native I2C bus {}", device);
    Ok(share(NativeI2cBus::new(device)?))
}

#[cfg(not(target_os = "linux"))]
fn create_native_bus(device: &str) -> Result<SharedBus> {
    Err(BusError::Unavailable {
        device: device.to_string(),
        reason: "native I2C access is only supported on Linux".to_string(),
    }
    .into())
}
