// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::acquisition::{
    create_shared_acquisition_state, AcquisitionScheduler, AcquisitionSettings, Endpoint,
    SharedAcquisitionState,
};
use crate::bus;
use crate::config::Config;
use crate::sensor::{self, SharedSensor};

const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Represents a daemon task that can be started and managed
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    shutdown_signal: watch::Sender<bool>,
    heartbeat_interval: Duration,
    state: SharedAcquisitionState,
    sensor: Option<SharedSensor>,
    scheduler: Option<AcquisitionScheduler>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new() -> Self {
        let (shutdown_signal, _) = watch::channel(false);
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            shutdown_signal,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            state: create_shared_acquisition_state(),
            sensor: None,
            scheduler: None,
        }
    }

    /// Period of the statistics heartbeat
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Statistics of the acquisition jobs
    pub fn acquisition_state(&self) -> SharedAcquisitionState {
        self.state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Launch all configured tasks based on configuration
    ///
    /// Opening the sensor failing (wrong identity, bus error) aborts the launch.
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let bus = bus::create_bus(&config.bus).context("Failed to open I2C bus")?;

        let sensor = sensor::open_sensor(bus, &config.sensor)
            .await
            .with_context(|| format!("Failed to open {} sensor", config.sensor.kind))?;
        self.sensor = Some(sensor.clone());

        let endpoints: Vec<Endpoint> = config.handlers.iter().map(Endpoint::from_config).collect();
        let mut scheduler = AcquisitionScheduler::new(
            AcquisitionSettings::from_config(&config.acquisition),
            sensor,
            endpoints,
        )
        .with_state(self.state.clone());

        // Start data acquisition if enabled
        if config.acquisition.enabled {
            scheduler.start().await?;
        } else {
            info!("Data acquisition disabled by configuration");
        }
        self.scheduler = Some(scheduler);

        // Start heartbeat task for monitoring
        self.start_heartbeat();

        Ok(())
    }

    /// Start a heartbeat task that logs acquisition statistics periodically
    fn start_heartbeat(&mut self) {
        debug!("Starting heartbeat monitor");

        let running = self.running.clone();
        let state = self.state.clone();
        let period = self.heartbeat_interval;
        let mut shutdown = self.shutdown_signal.subscribe();
        let task = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(period) => {}
                }

                for job in state.read().await.get_all_jobs() {
                    info!(
                        "Daemon heartbeat: job '{}' {:?}, {} ticks, {} samples, {} read failures, {} dispatch failures",
                        job.handler_id,
                        job.status,
                        job.ticks,
                        job.samples,
                        job.read_failures,
                        job.dispatch_failures
                    );
                }
            }
            Ok(())
        });

        self.tasks.push(task);
    }

    /// Stop the scheduler, close the sensor and signal every task to terminate
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
        // Receivers may already be gone
        let _ = self.shutdown_signal.send(true);

        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.stop().await?;
        }
        if let Some(sensor) = self.sensor.take() {
            sensor.lock().await.close().await;
        }
        Ok(())
    }

    /// Wait for all tasks to complete
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match task.await {
                Ok(Err(e)) => error!("Task failed: {}", e),
                Err(e) => error!("Task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        Ok(())
    }
}
