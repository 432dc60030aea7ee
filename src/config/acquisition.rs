// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Data acquisition configuration
//!
//! This module defines the structures for configuring the periodic
//! acquisition scheduler.

use serde::{Deserialize, Serialize};

/// Configuration for the data acquisition process.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AcquisitionConfig {
    /// Flag to enable or disable data acquisition.
    ///
    /// When disabled the daemon opens the sensor but never starts the
    /// scheduler.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Time interval in milliseconds between two ticks.
    ///
    /// Read once when the scheduler is built. Must be greater than zero.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Upper bound for one sensor read, in milliseconds.
    ///
    /// A read exceeding it counts as a read failure. No bound when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

fn default_delay_ms() -> u64 {
    500
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            delay_ms: default_delay_ms(), // 500ms between two samples
            read_timeout_ms: None,
        }
    }
}
