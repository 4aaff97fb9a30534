// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Solwatch.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Stateful polling and reconciliation loop.
//!
//! Every tick samples telemetry. Once the slow-poll deadline passes the loop
//! also reads configuration and warnings, pushes pinned settings back to the
//! device when it has drifted, and records what was active. Only a run of
//! device failures that exhausts the failure policy ends the loop.

use std::convert::Infallible;
use std::time::Duration;

use solwatch_types::{
    DeviceCommand, DeviceConfig, FieldError, NormalizedRecord, Snapshot, SnapshotKind, Warnings,
};
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};

use crate::errors::{DeviceError, LoopError};
use crate::mapper::FieldMapper;
use crate::policy::{FailureAction, FailurePolicy};
use crate::resolver::{Overrides, resolve};
use crate::sink::write_with_recovery;
use crate::traits::{DeviceReader, TimeSeriesSink};

const DEFAULT_TICK: Duration = Duration::from_secs(1);
const DEFAULT_SLOW_POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);
const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_secs(30);

/// Loop cadence and failure handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub tick: Duration,
    pub slow_poll_interval: Duration,
    /// Upper bound for every device read and apply
    pub device_timeout: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            slow_poll_interval: DEFAULT_SLOW_POLL_INTERVAL,
            device_timeout: DEFAULT_DEVICE_TIMEOUT,
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Everything the loop needs from configuration, fixed for the process
/// lifetime
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub device_id: String,
    pub overrides: Overrides,
    pub settings: LoopSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Bootstrapping,
    Steady,
}

/// A snapshot together with its decoded view
#[derive(Debug, Clone, PartialEq)]
pub struct Observed<T> {
    pub snapshot: Snapshot,
    pub value: T,
}

impl<T> Observed<T> {
    pub fn decode(
        snapshot: Snapshot,
        decode: impl FnOnce(&Snapshot) -> Result<T, FieldError>,
    ) -> Result<Self, FieldError> {
        let value = decode(&snapshot)?;
        Ok(Self { snapshot, value })
    }
}

/// Loop memory. Rebuilt from a fresh device read on every start.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Configuration most recently recorded as active on the device
    pub last_applied_config: Option<Observed<DeviceConfig>>,
    pub last_warnings: Option<Observed<Warnings>>,
    /// Earliest instant the next slow-poll is due
    pub next_config_deadline: Instant,
    /// Failed device reads since the last successful telemetry read
    pub consecutive_failures: u32,
}

#[derive(Debug, Error)]
enum SlowPollError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Decode(#[from] FieldError),
}

struct SlowPoll {
    warnings: Observed<Warnings>,
    config: Observed<DeviceConfig>,
}

#[derive(Debug)]
pub struct Reconciler<R, S> {
    reader: R,
    sink: S,
    mapper: FieldMapper,
    overrides: Overrides,
    settings: LoopSettings,
    state: SessionState,
    phase: LoopPhase,
}

impl<R, S> Reconciler<R, S>
where
    R: DeviceReader,
    S: TimeSeriesSink,
{
    pub fn new(reader: R, sink: S, startup: StartupConfig) -> Self {
        let StartupConfig {
            device_id,
            overrides,
            settings,
        } = startup;

        Self {
            reader,
            sink,
            mapper: FieldMapper::new(device_id),
            overrides,
            settings,
            state: SessionState {
                last_applied_config: None,
                last_warnings: None,
                next_config_deadline: Instant::now(),
                consecutive_failures: 0,
            },
            phase: LoopPhase::Bootstrapping,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Bootstrap, then tick forever. Returns only when the failure policy
    /// gives up on the device.
    pub async fn run(&mut self) -> Result<Infallible, LoopError> {
        self.bootstrap().await;

        let mut ticker = tokio::time::interval(self.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.tick().await?;
        }
    }

    /// Seed session state from one read of warnings and configuration.
    ///
    /// A failed read is logged and leaves the slow-poll due immediately, so
    /// the first tick tries again.
    pub async fn bootstrap(&mut self) {
        self.phase = LoopPhase::Bootstrapping;
        tracing::info!("Reading initial device configuration and warnings");

        match self.read_slow().await {
            Ok(SlowPoll { warnings, config }) => {
                let records = [self.config_record(&config), self.warnings_record(&warnings)];
                self.forward(&records).await;

                self.state.next_config_deadline = Instant::now() + self.settings.slow_poll_interval;
                self.state.last_applied_config = Some(config);
                self.state.last_warnings = Some(warnings);
            }
            Err(e) => tracing::error!("Initial device read failed, continuing: {e}"),
        }

        self.phase = LoopPhase::Steady;
    }

    /// One loop iteration: telemetry, then the slow-poll when it is due
    pub async fn tick(&mut self) -> Result<(), LoopError> {
        let now = Instant::now();

        match self.read(SnapshotKind::Telemetry).await {
            Ok(snapshot) => {
                self.state.consecutive_failures = 0;
                match self.mapper.telemetry(&snapshot) {
                    Ok(records) => self.forward(&records).await,
                    Err(e) => tracing::error!("Dropping telemetry sample: {e}"),
                }
            }
            Err(e) => self.record_failure(SnapshotKind::Telemetry, &e)?,
        }

        if now >= self.state.next_config_deadline {
            match self.read_slow().await {
                Ok(poll) => self.reconcile(poll, now).await,
                Err(SlowPollError::Device(e)) => self.record_failure(SnapshotKind::Config, &e)?,
                Err(SlowPollError::Decode(e)) => {
                    // The device answered; retrying before the next deadline
                    // would only repeat the same payload
                    tracing::error!("Dropping configuration poll: {e}");
                    self.state.next_config_deadline = now + self.settings.slow_poll_interval;
                }
            }
        }

        Ok(())
    }

    async fn reconcile(&mut self, poll: SlowPoll, now: Instant) {
        self.state.next_config_deadline = now + self.settings.slow_poll_interval;
        let SlowPoll { warnings, config } = poll;

        // Recorded on every slow-poll, drift or not
        self.forward(&[self.config_record(&config)]).await;

        let changed = self
            .state
            .last_applied_config
            .as_ref()
            .is_some_and(|last| last.value != config.value);
        if changed {
            tracing::info!("Device configuration changed since last poll");
        }

        let resolution = resolve(&config.value, &self.overrides);
        let mut active = config;
        if !resolution.is_converged() {
            tracing::info!(
                "Device is not at desired configuration, applying {} command(s)",
                resolution.commands.len()
            );
            if self.apply_commands(&resolution.commands).await > 0
                && let Some(post_apply) = self.reread_config().await
            {
                active = post_apply;
            }
        }

        // Post-change record: the re-read when the device took a command,
        // otherwise the fresh reading again
        if changed || !resolution.is_converged() {
            self.forward(&[self.config_record(&active)]).await;
        }
        self.state.last_applied_config = Some(active);

        if self
            .state
            .last_warnings
            .as_ref()
            .is_none_or(|last| last.value != warnings.value)
        {
            tracing::info!(active = %warnings.value.describe(), "Warning state changed");
        }
        self.forward(&[self.warnings_record(&warnings)]).await;
        self.state.last_warnings = Some(warnings);
    }

    /// Best effort: a refused command is logged and the rest still run.
    /// Returns how many commands the device accepted.
    async fn apply_commands(&self, commands: &[DeviceCommand]) -> usize {
        let mut accepted = 0;
        for command in commands {
            let result = tokio::time::timeout(self.settings.device_timeout, self.reader.apply(command))
                .await
                .unwrap_or_else(|_| Err(DeviceError::Timeout(self.settings.device_timeout)));

            match result {
                Ok(()) => {
                    tracing::info!(command = %command, "Applied device setting");
                    accepted += 1;
                }
                Err(e) => tracing::warn!(command = %command, "Device setting not applied: {e}"),
            }
        }
        accepted
    }

    async fn reread_config(&self) -> Option<Observed<DeviceConfig>> {
        let result = match self.read(SnapshotKind::Config).await {
            Ok(snapshot) => {
                Observed::decode(snapshot, DeviceConfig::from_snapshot).map_err(SlowPollError::from)
            }
            Err(e) => Err(SlowPollError::from(e)),
        };

        match result {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Could not re-read configuration after applying settings: {e}");
                None
            }
        }
    }

    async fn read(&self, kind: SnapshotKind) -> Result<Snapshot, DeviceError> {
        tokio::time::timeout(self.settings.device_timeout, self.reader.read(kind))
            .await
            .unwrap_or_else(|_| Err(DeviceError::Timeout(self.settings.device_timeout)))
    }

    async fn read_slow(&self) -> Result<SlowPoll, SlowPollError> {
        let warnings = self.read(SnapshotKind::Warnings).await?;
        let config = self.read(SnapshotKind::Config).await?;

        Ok(SlowPoll {
            warnings: Observed::decode(warnings, Warnings::from_snapshot)?,
            config: Observed::decode(config, DeviceConfig::from_snapshot)?,
        })
    }

    fn record_failure(&mut self, kind: SnapshotKind, error: &DeviceError) -> Result<(), LoopError> {
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        let failures = self.state.consecutive_failures;

        match self.settings.failure_policy.on_failure(failures) {
            FailureAction::Continue if error.is_invalid_response() => {
                tracing::warn!(failures, "{kind} read rejected by device: {error}");
            }
            FailureAction::Continue => tracing::warn!(failures, "{kind} read failed: {error}"),
            FailureAction::Report => {
                tracing::error!(failures, "{kind} read failing repeatedly: {error}");
            }
            FailureAction::Terminate => {
                tracing::error!(failures, "Giving up on device: {error}");
                return Err(LoopError::DeviceLinkLost {
                    consecutive_failures: failures,
                });
            }
        }
        Ok(())
    }

    async fn forward(&self, records: &[NormalizedRecord]) {
        if let Err(e) = write_with_recovery(&self.sink, records).await {
            tracing::error!("Dropping {} record(s): {e}", records.len());
        }
    }

    fn config_record(&self, config: &Observed<DeviceConfig>) -> NormalizedRecord {
        self.mapper
            .config_record(&config.value, config.snapshot.captured_at)
    }

    fn warnings_record(&self, warnings: &Observed<Warnings>) -> NormalizedRecord {
        self.mapper
            .warnings_record(&warnings.value, warnings.snapshot.captured_at)
    }
}
