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

//! Solwatch - inverter polling and reconciliation daemon
//!
//! Samples an mpp-solar compatible inverter, keeps pinned settings applied
//! and writes measurements to InfluxDB. Exits non-zero when the device link
//! is lost so a process supervisor can restart it.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::AppConfig;
use solwatch_adapters::{InfluxSink, MppSolarReader};
use solwatch_core::{FailurePolicy, Reconciler, StartupConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Parser)]
#[command(name = "solwatch", version, about)]
struct Cli {
    /// Configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = AppConfig::locate(cli.config.as_deref())?;
    let config = AppConfig::load(&config_path)?;

    init_tracing(&config.system.log_level)?;
    info!("Starting Solwatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from {}", config_path.display());

    let (startup, rejected) = config.startup();
    for e in &rejected {
        warn!("Ignoring override: {e}");
    }
    log_summary(&config, &startup);

    let mut reader = MppSolarReader::new(&config.device.poller, &config.device.port);
    if let Some(interpreter) = &config.device.interpreter {
        reader = reader.with_interpreter(interpreter);
    }

    let mut sink = InfluxSink::new(
        &config.influx.url,
        &config.influx.database,
        Duration::from_secs(config.influx.timeout_secs),
    );
    if let Some(username) = &config.influx.username {
        sink = sink.with_credentials(username, config.influx.password.as_deref().unwrap_or_default());
    }

    let mut reconciler = Reconciler::new(reader, sink, startup);

    tokio::select! {
        outcome = reconciler.run() => match outcome {
            Ok(never) => match never {},
            Err(e) => {
                error!("{e}");
                return Err(e).context("Stopping so the supervisor can restart the poller");
            }
        },
        () = shutdown_signal() => {
            info!("Shutdown signal received, stopping");
        }
    }

    Ok(())
}

fn init_tracing(default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")
}

fn log_summary(config: &AppConfig, startup: &StartupConfig) {
    info!(
        "Device {}: {} on {} (timeout {}s)",
        startup.device_id,
        config.device.poller.display(),
        config.device.port,
        config.device.timeout_secs
    );
    info!(
        "Sink: {} database {}{}",
        config.influx.url,
        config.influx.database,
        if config.influx.username.is_some() { " (authenticated)" } else { "" }
    );
    info!(
        "Cadence: telemetry every {}s, configuration every {}s",
        startup.settings.tick.as_secs(),
        startup.settings.slow_poll_interval.as_secs()
    );
    match startup.settings.failure_policy {
        FailurePolicy::Exit { threshold } => {
            info!("Failure policy: exit after {threshold} consecutive failures");
        }
        FailurePolicy::Retry { report_every } => {
            info!("Failure policy: retry forever, report every {report_every} failures");
        }
    }
    if startup.overrides.is_empty() {
        info!("No setting overrides; device configuration is only recorded");
    } else {
        info!("Pinned settings: {}", startup.overrides.summary().join(", "));
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
