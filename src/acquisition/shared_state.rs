// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Shared state for the acquisition scheduler
//!
//! Every acquisition job records its counters here after each tick, so the
//! daemon heartbeat and embedding programs can observe the cadence without
//! touching the jobs themselves.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::sensor::Outputs;

/// Current status of an acquisition job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Registered, first tick not fired yet
    Pending,
    /// Last tick produced and dispatched a sample
    Running,
    /// Last tick failed to read or dispatch
    Error { message: String },
    /// Job has been stopped
    Stopped,
}

/// Counters of one acquisition job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatistics {
    pub handler_id: String,
    pub status: JobStatus,
    /// Ticks fired since start
    pub ticks: u64,
    /// Samples successfully read
    pub samples: u64,
    pub read_failures: u64,
    pub dispatch_failures: u64,
    pub last_error: Option<String>,
    /// Time of the last successful dispatch
    pub last_dispatch: Option<DateTime<Utc>>,
    /// Outputs of the last sample read
    pub last_outputs: Option<Outputs>,
}

impl JobStatistics {
    fn new(handler_id: String) -> Self {
        Self {
            handler_id,
            status: JobStatus::Pending,
            ticks: 0,
            samples: 0,
            read_failures: 0,
            dispatch_failures: 0,
            last_error: None,
            last_dispatch: None,
            last_outputs: None,
        }
    }
}

/// Statistics of every registered job
#[derive(Debug, Default)]
pub struct AcquisitionState {
    jobs: HashMap<String, JobStatistics>,
}

impl AcquisitionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job, resetting its counters if it already exists
    pub fn register_job(&mut self, handler_id: &str) {
        self.jobs.insert(
            handler_id.to_string(),
            JobStatistics::new(handler_id.to_string()),
        );
    }

    fn job_mut(&mut self, handler_id: &str) -> Result<&mut JobStatistics> {
        self.jobs
            .get_mut(handler_id)
            .ok_or_else(|| anyhow::anyhow!("Acquisition job '{}' not found", handler_id))
    }

    /// Count a fired tick
    pub fn record_tick(&mut self, handler_id: &str) -> Result<()> {
        self.job_mut(handler_id)?.ticks += 1;
        Ok(())
    }

    /// Record a sample read from the sensor
    pub fn record_sample(&mut self, handler_id: &str, outputs: &Outputs) -> Result<()> {
        let job = self.job_mut(handler_id)?;
        job.samples += 1;
        job.last_outputs = Some(outputs.clone());
        Ok(())
    }

    pub fn record_read_failure(&mut self, handler_id: &str, message: String) -> Result<()> {
        let job = self.job_mut(handler_id)?;
        job.read_failures += 1;
        job.last_error = Some(message.clone());
        job.status = JobStatus::Error { message };
        Ok(())
    }

    pub fn record_dispatch(&mut self, handler_id: &str, at: DateTime<Utc>) -> Result<()> {
        let job = self.job_mut(handler_id)?;
        job.last_dispatch = Some(at);
        job.status = JobStatus::Running;
        Ok(())
    }

    pub fn record_dispatch_failure(&mut self, handler_id: &str, message: String) -> Result<()> {
        let job = self.job_mut(handler_id)?;
        job.dispatch_failures += 1;
        job.last_error = Some(message.clone());
        job.status = JobStatus::Error { message };
        Ok(())
    }

    pub fn mark_stopped(&mut self, handler_id: &str) -> Result<()> {
        self.job_mut(handler_id)?.status = JobStatus::Stopped;
        Ok(())
    }

    pub fn get_job(&self, handler_id: &str) -> Option<&JobStatistics> {
        self.jobs.get(handler_id)
    }

    /// Statistics of every job, sorted by handler id
    pub fn get_all_jobs(&self) -> Vec<JobStatistics> {
        let mut jobs: Vec<JobStatistics> = self.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.handler_id.cmp(&b.handler_id));
        jobs
    }
}

/// Type alias for shared acquisition state
pub type SharedAcquisitionState = Arc<RwLock<AcquisitionState>>;

/// Create a new shared acquisition state
pub fn create_shared_acquisition_state() -> SharedAcquisitionState {
    Arc::new(RwLock::new(AcquisitionState::new()))
}
