// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Periodic acquisition scheduler
//!
//! One tokio task per endpoint samples the shared sensor on a fixed interval
//! and hands every sample to the endpoint's dispatch target. Read and dispatch
//! failures are logged and counted, they never stop the cadence.
//!
//! Each task is single-flight: the next tick is only awaited once the current
//! one has completed, and missed ticks are skipped rather than bursted. The
//! first tick fires one full interval after [`AcquisitionScheduler::start`].
//! A stop request cancels a tick still in progress, so a stuck read or a long
//! dispatch retry chain never holds up teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::shared_state::{
    create_shared_acquisition_state, AcquisitionState, SharedAcquisitionState,
};
use crate::config::{AcquisitionConfig, HandlerConfig};
use crate::dispatch::{self, DispatchContext, DispatchTarget, OutputMetadata};
use crate::error::SensorError;
use crate::sensor::{Outputs, SensorKind, SharedSensor};

/// Default interval between two ticks
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Timing of the acquisition cadence, fixed once the scheduler is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionSettings {
    interval: Duration,
    read_timeout: Option<Duration>,
}

impl AcquisitionSettings {
    /// Zero durations are raised to one millisecond
    pub fn new(interval: Duration, read_timeout: Option<Duration>) -> Self {
        let min = Duration::from_millis(1);
        Self {
            interval: interval.max(min),
            read_timeout: read_timeout.map(|timeout| timeout.max(min)),
        }
    }

    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self::new(
            Duration::from_millis(config.delay_ms),
            config.read_timeout_ms.map(Duration::from_millis),
        )
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL, None)
    }
}

/// A handler bound to its dispatch target
#[derive(Clone)]
pub struct Endpoint {
    pub handler_id: String,
    pub target: Arc<dyn DispatchTarget>,
}

impl Endpoint {
    pub fn new(handler_id: impl Into<String>, target: Arc<dyn DispatchTarget>) -> Self {
        Self {
            handler_id: handler_id.into(),
            target,
        }
    }

    pub fn from_config(config: &HandlerConfig) -> Self {
        Self::new(config.id.clone(), dispatch::create_target(config))
    }
}

/// Commands accepted by a running job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobCommand {
    Stop,
}

/// Result of one tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Sample read and accepted by the target, with the target's result
    Dispatched(Value),
    /// The sensor read failed, nothing was dispatched
    ReadFailed,
    /// The sample was read but the target failed
    DispatchFailed,
}

/// Periodic sampling of one sensor into one endpoint
pub struct AcquisitionJob {
    handler_id: String,
    sensor_kind: SensorKind,
    sensor: SharedSensor,
    metadata: OutputMetadata,
    target: Arc<dyn DispatchTarget>,
    settings: AcquisitionSettings,
    state: SharedAcquisitionState,
    running: Arc<AtomicBool>,
}

impl AcquisitionJob {
    pub fn new(
        endpoint: Endpoint,
        sensor_kind: SensorKind,
        sensor: SharedSensor,
        settings: AcquisitionSettings,
        state: SharedAcquisitionState,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            handler_id: endpoint.handler_id,
            sensor_kind,
            sensor,
            metadata: OutputMetadata::for_sensor(sensor_kind),
            target: endpoint.target,
            settings,
            state,
            running,
        }
    }

    pub fn handler_id(&self) -> &str {
        &self.handler_id
    }

    /// Spawn the job on the tokio runtime
    pub fn spawn(self, commands: mpsc::Receiver<JobCommand>) -> JoinHandle<()> {
        tokio::spawn(self.run(commands))
    }

    async fn run(self, mut commands: mpsc::Receiver<JobCommand>) {
        let period = self.settings.interval();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(
            "Acquisition job '{}' repeating every {} ms",
            self.handler_id,
            period.as_millis()
        );

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(JobCommand::Stop) | None => break,
                },
                _ = ticker.tick() => {
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }

                    // A stop request cancels the tick in progress
                    tokio::select! {
                        biased;

                        command = commands.recv() => match command {
                            Some(JobCommand::Stop) | None => {
                                warn!(
                                    "Acquisition job '{}' cancelled during a tick",
                                    self.handler_id
                                );
                                break;
                            }
                        },
                        _ = self.execute_tick() => {}
                    }
                }
            }
        }

        self.record(|state, id| state.mark_stopped(id)).await;
        debug!("Acquisition job '{}' stopped", self.handler_id);
    }

    async fn record<F>(&self, update: F)
    where
        F: FnOnce(&mut AcquisitionState, &str) -> Result<()>,
    {
        let mut state = self.state.write().await;
        if let Err(err) = update(&mut state, &self.handler_id) {
            warn!("Failed to update acquisition statistics: {}", err);
        }
    }

    async fn read_sensor(&self) -> Result<Outputs, SensorError> {
        let read = async {
            let mut sensor = self.sensor.lock().await;
            sensor.sample().await
        };

        match self.settings.read_timeout() {
            Some(timeout) => time::timeout(timeout, read)
                .await
                .unwrap_or(Err(SensorError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })),
            None => read.await,
        }
    }

    /// Run one tick: read the sensor, then dispatch the sample
    pub async fn execute_tick(&self) -> TickOutcome {
        self.record(|state, id| state.record_tick(id)).await;

        let outputs = match self.read_sensor().await {
            Ok(outputs) => outputs,
            Err(err) => {
                error!(
                    "[{}] Error while reading sensor data: {}",
                    self.handler_id, err
                );
                let message = err.to_string();
                self.record(|state, id| state.record_read_failure(id, message))
                    .await;
                return TickOutcome::ReadFailed;
            }
        };

        debug!(
            "[{}] {} sample: {:?}",
            self.handler_id, self.sensor_kind, outputs
        );
        self.record(|state, id| state.record_sample(id, &outputs)).await;

        let timestamp = Utc::now();
        let result = match self.metadata.outputs_to_attrs(&outputs) {
            Ok(attributes) => {
                let context = DispatchContext {
                    handler_id: self.handler_id.clone(),
                    sensor: self.sensor_kind,
                    timestamp,
                    attributes,
                };
                self.target.dispatch(&context).await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(value) => {
                info!(
                    "[{}] Dispatched to {} target: {}",
                    self.handler_id,
                    self.target.name(),
                    value
                );
                self.record(|state, id| state.record_dispatch(id, timestamp))
                    .await;
                TickOutcome::Dispatched(value)
            }
            Err(err) => {
                error!(
                    "[{}] Dispatch to {} target failed: {}",
                    self.handler_id,
                    self.target.name(),
                    err
                );
                let message = err.to_string();
                self.record(|state, id| state.record_dispatch_failure(id, message))
                    .await;
                TickOutcome::DispatchFailed
            }
        }
    }
}

/// Lifecycle of an [`AcquisitionScheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    /// Terminal
    Stopped,
}

struct JobHandle {
    handler_id: String,
    commands: mpsc::Sender<JobCommand>,
    task: JoinHandle<()>,
}

/// Owns one acquisition job per endpoint
pub struct AcquisitionScheduler {
    settings: AcquisitionSettings,
    sensor: SharedSensor,
    endpoints: Vec<Endpoint>,
    state: SharedAcquisitionState,
    running: Arc<AtomicBool>,
    lifecycle: SchedulerState,
    jobs: Vec<JobHandle>,
}

impl AcquisitionScheduler {
    pub fn new(
        settings: AcquisitionSettings,
        sensor: SharedSensor,
        endpoints: Vec<Endpoint>,
    ) -> Self {
        Self {
            settings,
            sensor,
            endpoints,
            state: create_shared_acquisition_state(),
            running: Arc::new(AtomicBool::new(false)),
            lifecycle: SchedulerState::Idle,
            jobs: Vec::new(),
        }
    }

    /// Record statistics into an existing shared state
    pub fn with_state(mut self, state: SharedAcquisitionState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.lifecycle
    }

    pub fn shared_state(&self) -> SharedAcquisitionState {
        self.state.clone()
    }

    pub fn settings(&self) -> AcquisitionSettings {
        self.settings
    }

    /// Spawn one job per endpoint. Only valid from [`SchedulerState::Idle`].
    pub async fn start(&mut self) -> Result<()> {
        if self.lifecycle != SchedulerState::Idle {
            anyhow::bail!(
                "Cannot start acquisition scheduler in state {:?}",
                self.lifecycle
            );
        }

        if self.endpoints.is_empty() {
            warn!("Acquisition scheduler started without any endpoint");
        }

        let sensor_kind = self.sensor.lock().await.kind();
        {
            let mut state = self.state.write().await;
            for endpoint in &self.endpoints {
                state.register_job(&endpoint.handler_id);
            }
        }

        self.running.store(true, Ordering::SeqCst);
        for endpoint in self.endpoints.clone() {
            let handler_id = endpoint.handler_id.clone();
            let (commands, receiver) = mpsc::channel(1);
            let job = AcquisitionJob::new(
                endpoint,
                sensor_kind,
                self.sensor.clone(),
                self.settings,
                self.state.clone(),
                self.running.clone(),
            );

            debug!("Processing handler: {}", handler_id);
            self.jobs.push(JobHandle {
                handler_id,
                commands,
                task: job.spawn(receiver),
            });
        }

        self.lifecycle = SchedulerState::Running;
        info!(
            "Acquisition scheduler started: {} job(s) on {} every {} ms",
            self.jobs.len(),
            sensor_kind,
            self.settings.interval().as_millis()
        );
        Ok(())
    }

    /// Stop every job and wait for them to finish.
    ///
    /// A tick still in progress is cancelled, its sample is never dispatched.
    /// Once this returns no tick fires again. Stopping an idle scheduler
    /// moves it straight to [`SchedulerState::Stopped`].
    pub async fn stop(&mut self) -> Result<()> {
        match self.lifecycle {
            SchedulerState::Stopped => return Ok(()),
            SchedulerState::Idle => {
                self.lifecycle = SchedulerState::Stopped;
                info!("Acquisition scheduler stopped before start");
                return Ok(());
            }
            SchedulerState::Running => {}
        }

        info!("Stopping acquisition scheduler");
        self.running.store(false, Ordering::SeqCst);

        for job in &self.jobs {
            // A job that already exited has dropped its receiver
            if job.commands.send(JobCommand::Stop).await.is_err() {
                debug!("Acquisition job '{}' already finished", job.handler_id);
            }
        }

        for job in self.jobs.drain(..) {
            if let Err(err) = job.task.await {
                error!("Acquisition job '{}' panicked: {}", job.handler_id, err);
            }
        }

        self.lifecycle = SchedulerState::Stopped;
        info!("Acquisition scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{JobStatistics, JobStatus};
    use crate::bus::{self, MockI2cBus};
    use crate::dispatch::ChannelTarget;
    use crate::sensor::{self, adxl345, Adxl345, Adxl345Options, Sensor};
    use async_trait::async_trait;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn setup() {
        INIT.call_once(|| {
            let _ = env_logger::builder()
                .filter_level(log::LevelFilter::Debug)
                .is_test(true)
                .try_init();
        });
    }

    /// Sensor whose every read takes `delay`
    struct SlowSensor {
        delay: Duration,
    }

    #[async_trait]
    impl Sensor for SlowSensor {
        fn kind(&self) -> SensorKind {
            SensorKind::Adxl345
        }

        async fn sample(&mut self) -> Result<Outputs, SensorError> {
            time::sleep(self.delay).await;
            Ok(Outputs::from([
                ("X".to_string(), 0.0),
                ("Y".to_string(), 0.0),
                ("Z".to_string(), 1000.0),
            ]))
        }

        async fn close(&mut self) {}
    }

    async fn mock_accelerometer() -> (MockI2cBus, SharedSensor) {
        let mock = MockI2cBus::with_default_devices();
        let device = Adxl345::open(
            bus::share(mock.clone()),
            adxl345::DEFAULT_ADDRESS,
            Adxl345Options::new(2, 400.0),
        )
        .await
        .unwrap();
        (mock, sensor::share(device))
    }

    fn settings(interval_ms: u64, read_timeout_ms: Option<u64>) -> AcquisitionSettings {
        AcquisitionSettings::new(
            Duration::from_millis(interval_ms),
            read_timeout_ms.map(Duration::from_millis),
        )
    }

    async fn job_stats(scheduler: &AcquisitionScheduler, id: &str) -> JobStatistics {
        scheduler
            .shared_state()
            .read()
            .await
            .get_job(id)
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_settings_from_config() {
        let config = AcquisitionConfig {
            enabled: true,
            delay_ms: 0,
            read_timeout_ms: Some(250),
        };
        let settings = AcquisitionSettings::from_config(&config);
        assert_eq!(settings.interval(), Duration::from_millis(1));
        assert_eq!(settings.read_timeout(), Some(Duration::from_millis(250)));

        assert_eq!(AcquisitionSettings::default().interval(), DEFAULT_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_device_never_dispatches() {
        setup();
        let (mock, sensor) = mock_accelerometer().await;
        mock.set_fail_reads(true);
        let reads_before = mock.read_transactions();

        let (target, mut receiver) = ChannelTarget::channel();
        let mut scheduler = AcquisitionScheduler::new(
            settings(100, None),
            sensor,
            vec![Endpoint::new("failing", Arc::new(target))],
        );

        scheduler.start().await.unwrap();
        time::sleep(Duration::from_millis(50)).await;

        // Every tick records its own failure before the next one fires
        for tick in 1..=5 {
            time::sleep(Duration::from_millis(100)).await;
            let stats = job_stats(&scheduler, "failing").await;
            assert_eq!(stats.ticks, tick);
            assert_eq!(stats.read_failures, tick);
            assert!(matches!(
                &stats.status,
                JobStatus::Error { message } if message.contains("injected read failure")
            ));
        }
        scheduler.stop().await.unwrap();

        let stats = job_stats(&scheduler, "failing").await;
        assert_eq!(stats.ticks, 5);
        assert_eq!(stats.read_failures, 5);
        assert_eq!(stats.samples, 0);
        assert_eq!(stats.dispatch_failures, 0);
        assert!(stats
            .last_error
            .as_deref()
            .is_some_and(|message| message.contains("injected read failure")));

        // The device is read again on every tick
        assert_eq!(mock.read_transactions() - reads_before, 5);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_interval() {
        setup();
        let (_mock, sensor) = mock_accelerometer().await;
        let (target, mut receiver) = ChannelTarget::channel();
        let mut scheduler = AcquisitionScheduler::new(
            settings(100, None),
            sensor,
            vec![Endpoint::new("vibration", Arc::new(target))],
        );

        scheduler.start().await.unwrap();
        time::sleep(Duration::from_millis(99)).await;
        assert_eq!(job_stats(&scheduler, "vibration").await.ticks, 0);

        time::sleep(Duration::from_millis(2)).await;
        let context = receiver.recv().await.unwrap();
        assert_eq!(context.handler_id, "vibration");
        assert_eq!(context.sensor, SensorKind::Adxl345);
        assert_eq!(context.attribute("X"), Some(&serde_json::json!(390.0)));
        assert_eq!(context.attribute("Z"), Some(&serde_json::json!(998.4)));

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_further_ticks() {
        setup();
        let (_mock, sensor) = mock_accelerometer().await;
        let (target, mut receiver) = ChannelTarget::channel();
        let mut scheduler = AcquisitionScheduler::new(
            settings(100, None),
            sensor,
            vec![Endpoint::new("vibration", Arc::new(target))],
        );

        scheduler.start().await.unwrap();
        time::sleep(Duration::from_millis(250)).await;
        scheduler.stop().await.unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);

        time::sleep(Duration::from_millis(1000)).await;
        let stats = job_stats(&scheduler, "vibration").await;
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.status, JobStatus::Stopped);

        let mut delivered = 0;
        while receiver.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(delivered, 2);

        assert!(scheduler.start().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoints_share_the_device() {
        setup();
        let (_mock, sensor) = mock_accelerometer().await;
        let (first, mut first_rx) = ChannelTarget::channel();
        let (second, mut second_rx) = ChannelTarget::channel();
        let mut scheduler = AcquisitionScheduler::new(
            settings(100, None),
            sensor,
            vec![
                Endpoint::new("first", Arc::new(first)),
                Endpoint::new("second", Arc::new(second)),
            ],
        );

        scheduler.start().await.unwrap();
        time::sleep(Duration::from_millis(350)).await;
        scheduler.stop().await.unwrap();

        for rx in [&mut first_rx, &mut second_rx] {
            let mut delivered = 0;
            while rx.try_recv().is_ok() {
                delivered += 1;
            }
            assert_eq!(delivered, 3);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_counts_as_failure() {
        setup();
        let sensor = sensor::share(SlowSensor {
            delay: Duration::from_secs(3600),
        });
        let (target, mut receiver) = ChannelTarget::channel();
        let mut scheduler = AcquisitionScheduler::new(
            settings(100, Some(50)),
            sensor,
            vec![Endpoint::new("stuck", Arc::new(target))],
        );

        scheduler.start().await.unwrap();
        time::sleep(Duration::from_millis(520)).await;
        scheduler.stop().await.unwrap();

        let stats = job_stats(&scheduler, "stuck").await;
        assert_eq!(stats.ticks, 5);
        assert_eq!(stats.read_failures, 5);
        assert_eq!(
            stats.last_error.as_deref(),
            Some("Sensor did not answer within 50 ms")
        );
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_a_stuck_tick() {
        setup();
        let sensor = sensor::share(SlowSensor {
            delay: Duration::from_secs(3600),
        });
        let (target, mut receiver) = ChannelTarget::channel();
        let mut scheduler = AcquisitionScheduler::new(
            settings(100, None),
            sensor,
            vec![Endpoint::new("stuck", Arc::new(target))],
        );

        scheduler.start().await.unwrap();
        time::sleep(Duration::from_millis(150)).await;

        let stopped = time::timeout(Duration::from_secs(5), scheduler.stop()).await;
        assert!(stopped.is_ok(), "stop must not wait for the stuck read");
        assert_eq!(scheduler.state(), SchedulerState::Stopped);

        let stats = job_stats(&scheduler, "stuck").await;
        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.samples, 0);
        assert_eq!(stats.status, JobStatus::Stopped);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_reads_skip_missed_ticks() {
        setup();
        let sensor = sensor::share(SlowSensor {
            delay: Duration::from_millis(250),
        });
        let (target, _receiver) = ChannelTarget::channel();
        let mut scheduler = AcquisitionScheduler::new(
            settings(100, None),
            sensor,
            vec![Endpoint::new("slow", Arc::new(target))],
        );

        scheduler.start().await.unwrap();
        time::sleep(Duration::from_millis(1000)).await;
        scheduler.stop().await.unwrap();

        // Ticks at 100, 350, 600 and 850 ms: overdue ticks collapse into one
        let stats = job_stats(&scheduler, "slow").await;
        assert!(stats.ticks >= 3 && stats.ticks <= 4, "ticks: {}", stats.ticks);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_failure_does_not_stop_cadence() {
        setup();
        let (_mock, sensor) = mock_accelerometer().await;
        let (target, receiver) = ChannelTarget::channel();
        drop(receiver);
        let mut scheduler = AcquisitionScheduler::new(
            settings(100, None),
            sensor,
            vec![Endpoint::new("closed", Arc::new(target))],
        );

        scheduler.start().await.unwrap();
        time::sleep(Duration::from_millis(350)).await;
        scheduler.stop().await.unwrap();

        let stats = job_stats(&scheduler, "closed").await;
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.dispatch_failures, 3);
        assert!(stats.last_dispatch.is_none());
    }

    #[tokio::test]
    async fn test_stop_idle_scheduler() {
        let (_mock, sensor) = mock_accelerometer().await;
        let mut scheduler =
            AcquisitionScheduler::new(AcquisitionSettings::default(), sensor, Vec::new());

        scheduler.stop().await.unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(scheduler.start().await.is_err());
    }
}
