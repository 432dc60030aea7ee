// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sensor acquisition module
//!
//! This module drives the periodic sampling of an opened sensor:
//!
//! - [`scheduler`]: the acquisition cadence, one job per configured handler
//! - [`shared_state`]: per-job statistics shared with the rest of the program
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use rust_sensorstream::acquisition::{AcquisitionScheduler, AcquisitionSettings, Endpoint};
//! use rust_sensorstream::bus::{self, MockI2cBus};
//! use rust_sensorstream::config::SensorConfig;
//! use rust_sensorstream::dispatch::LogTarget;
//! use rust_sensorstream::sensor;
//!
//! async fn run() -> anyhow::Result<()> {
//!     let bus = bus::share(MockI2cBus::with_default_devices());
//!     let device = sensor::open_sensor(bus, &SensorConfig::default()).await?;
//!
//!     let mut scheduler = AcquisitionScheduler::new(
//!         AcquisitionSettings::default(),
//!         device,
//!         vec![Endpoint::new("console", Arc::new(LogTarget::new()))],
//!     );
//!     scheduler.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     scheduler.stop().await
//! }
//! ```

pub mod scheduler;
pub mod shared_state;

pub use scheduler::{
    AcquisitionJob, AcquisitionScheduler, AcquisitionSettings, Endpoint, JobCommand,
    SchedulerState, TickOutcome, DEFAULT_INTERVAL,
};
pub use shared_state::{
    create_shared_acquisition_state, AcquisitionState, JobStatistics, JobStatus,
    SharedAcquisitionState,
};
