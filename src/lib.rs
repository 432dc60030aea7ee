// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust sensor stream library
//!
//! Periodic acquisition of I2C sensors (ADXL345 accelerometer, BME280
//! environment sensor) with every sample forwarded to configurable dispatch
//! targets.

pub mod acquisition;
pub mod bus;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod error;
pub mod sensor;

pub use error::SensorError;
