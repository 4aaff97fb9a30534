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

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use solwatch_core::{
    ConfigValueError, FailurePolicy, LoopSettings, Overrides, RawOverrides, StartupConfig,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

const TOML_CONFIG: &str = "config.toml";
const JSON_CONFIG: &str = "config.json";

/// Overrides `[influx] password` so it can stay out of the config file
pub const INFLUX_PASSWORD_ENV: &str = "INFLUX_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub device: DeviceConfig,

    #[serde(default)]
    pub influx: InfluxConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub failure: FailurePolicy,

    /// Settings pinned on the device; values are checked when the loop starts
    #[serde(default)]
    pub overrides: RawOverrides,

    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Value of the `id` tag on every record
    #[serde(default = "default_device_id")]
    pub id: String,

    /// Path to the mpp-solar utility
    pub poller: PathBuf,

    /// Optional interpreter the poller runs under (e.g. a virtualenv python)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<PathBuf>,

    #[serde(default = "default_port")]
    pub port: String,

    #[serde(default = "default_device_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    #[serde(default = "default_influx_url")]
    pub url: String,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default = "default_influx_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Configuration and warnings cadence
    #[serde(default = "default_slow_poll_secs")]
    pub slow_poll_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Default log filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_device_id() -> String {
    "1".to_owned()
}

fn default_port() -> String {
    "/dev/hidraw0".to_owned()
}

fn default_device_timeout_secs() -> u64 {
    30
}

fn default_influx_url() -> String {
    "http://localhost:8086".to_owned()
}

fn default_database() -> String {
    "inverter".to_owned()
}

fn default_influx_timeout_secs() -> u64 {
    10
}

fn default_tick_secs() -> u64 {
    1
}

fn default_slow_poll_secs() -> u64 {
    15 * 60
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: default_influx_url(),
            database: default_database(),
            username: None,
            password: None,
            timeout_secs: default_influx_timeout_secs(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            slow_poll_secs: default_slow_poll_secs(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Pick the configuration file: the explicit path, else `config.toml`,
    /// else `config.json` in the working directory
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        [TOML_CONFIG, JSON_CONFIG]
            .into_iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
            .with_context(|| {
                format!("No configuration file given and neither {TOML_CONFIG} nor {JSON_CONFIG} found")
            })
    }

    /// Read, apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::from_file(path)?
            .with_password_override(std::env::var(INFLUX_PASSWORD_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a file as JSON when its extension is `.json`, as TOML otherwise
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
        }
    }

    #[must_use]
    pub fn with_password_override(mut self, password: Option<String>) -> Self {
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            self.influx.password = Some(password);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.id.trim().is_empty() {
            anyhow::bail!("device.id cannot be empty");
        }
        if self.device.poller.as_os_str().is_empty() {
            anyhow::bail!("device.poller cannot be empty");
        }
        if self.device.port.trim().is_empty() {
            anyhow::bail!("device.port cannot be empty");
        }
        if self.device.timeout_secs == 0 {
            anyhow::bail!("device.timeout_secs must be at least 1");
        }

        if self.influx.url.trim().is_empty() {
            anyhow::bail!("influx.url cannot be empty");
        }
        if self.influx.database.trim().is_empty() {
            anyhow::bail!("influx.database cannot be empty");
        }
        if self.influx.timeout_secs == 0 {
            anyhow::bail!("influx.timeout_secs must be at least 1");
        }
        if self.influx.password.is_some() && self.influx.username.is_none() {
            anyhow::bail!("influx.password is set but influx.username is missing");
        }

        if self.polling.tick_secs == 0 {
            anyhow::bail!("polling.tick_secs must be at least 1");
        }
        if self.polling.slow_poll_secs < self.polling.tick_secs {
            anyhow::bail!(
                "polling.slow_poll_secs ({}) must not be shorter than polling.tick_secs ({})",
                self.polling.slow_poll_secs,
                self.polling.tick_secs
            );
        }

        match self.failure {
            FailurePolicy::Exit { threshold: 0 } => {
                anyhow::bail!("failure.threshold must be at least 1");
            }
            FailurePolicy::Retry { report_every: 0 } => {
                anyhow::bail!("failure.report_every must be at least 1");
            }
            FailurePolicy::Exit { .. } | FailurePolicy::Retry { .. } => {}
        }

        Ok(())
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            tick: Duration::from_secs(self.polling.tick_secs),
            slow_poll_interval: Duration::from_secs(self.polling.slow_poll_secs),
            device_timeout: Duration::from_secs(self.device.timeout_secs),
            failure_policy: self.failure,
        }
    }

    /// Freeze into the loop's startup value. Override values that could not
    /// be decoded are returned separately and left unset.
    pub fn startup(&self) -> (StartupConfig, Vec<ConfigValueError>) {
        let (overrides, rejected) = Overrides::from_raw(&self.overrides);
        let startup = StartupConfig {
            device_id: self.device.id.clone(),
            overrides,
            settings: self.loop_settings(),
        };
        (startup, rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solwatch_core::BatteryType;
    use std::io::Write;

    const MINIMAL: &str = r#"
[device]
poller = "/usr/local/bin/mpp-solar"
"#;

    /// Like `AppConfig::load` without consulting the environment
    fn load_checked(path: &Path) -> Result<AppConfig> {
        let config = AppConfig::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = write_config(".toml", MINIMAL);
        let config = load_checked(file.path()).unwrap();

        assert_eq!(config.device.id, "1");
        assert_eq!(config.device.port, "/dev/hidraw0");
        assert_eq!(config.influx.url, "http://localhost:8086");
        assert_eq!(config.influx.database, "inverter");
        assert_eq!(config.polling.tick_secs, 1);
        assert_eq!(config.polling.slow_poll_secs, 900);
        assert_eq!(config.failure, FailurePolicy::Retry { report_every: 10 });
        assert_eq!(config.system.log_level, "info");
        assert_eq!(config.overrides, RawOverrides::default());
    }

    #[test]
    fn test_full_toml_config() {
        let file = write_config(
            ".toml",
            r#"
[device]
id = "garage"
poller = "/opt/mpp-solar/bin/mpp-solar"
interpreter = "/opt/mpp-solar/bin/python"
port = "/dev/hidraw1"
timeout_secs = 20

[influx]
url = "http://influx:8086"
database = "solar"
username = "writer"

[polling]
tick_secs = 2
slow_poll_secs = 600

[failure]
policy = "exit"
threshold = 5

[overrides]
battery_type = "Flooded"
output_source_priority = "SBU first"
buzzer = false
"#,
        );
        let config = AppConfig::from_file(file.path()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.failure, FailurePolicy::Exit { threshold: 5 });
        let settings = config.loop_settings();
        assert_eq!(settings.tick, Duration::from_secs(2));
        assert_eq!(settings.slow_poll_interval, Duration::from_secs(600));
        assert_eq!(settings.device_timeout, Duration::from_secs(20));

        let (startup, rejected) = config.startup();
        assert!(rejected.is_empty());
        assert_eq!(startup.device_id, "garage");
        assert_eq!(startup.overrides.battery_type, Some(BatteryType::Flooded));
        assert_eq!(startup.overrides.toggles.buzzer, Some(false));
    }

    #[test]
    fn test_exit_policy_default_threshold() {
        let file = write_config(".toml", &format!("{MINIMAL}\n[failure]\npolicy = \"exit\"\n"));
        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.failure, FailurePolicy::Exit { threshold: 3 });
    }

    #[test]
    fn test_json_config() {
        let file = write_config(
            ".json",
            r#"{"device": {"poller": "/usr/bin/mpp-solar", "port": "/dev/hidraw2"},
                "overrides": {"charger_source_priority": "Solar first"}}"#,
        );
        let config = load_checked(file.path()).unwrap();
        assert_eq!(config.device.port, "/dev/hidraw2");
        assert_eq!(
            config.overrides.charger_source_priority.as_deref(),
            Some("Solar first")
        );
    }

    #[test]
    fn test_unknown_override_is_reported_not_fatal() {
        let file = write_config(
            ".toml",
            &format!("{MINIMAL}\n[overrides]\nbattery_type = \"Lithium\"\npower_saving = true\n"),
        );
        let config = load_checked(file.path()).unwrap();
        let (startup, rejected) = config.startup();

        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].key, "battery_type");
        assert_eq!(startup.overrides.battery_type, None);
        assert_eq!(startup.overrides.toggles.power_saving, Some(true));
    }

    #[test]
    fn test_missing_device_section_fails() {
        let file = write_config(".toml", "[influx]\ndatabase = \"x\"\n");
        assert!(AppConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_cadence() {
        let file = write_config(
            ".toml",
            &format!("{MINIMAL}\n[polling]\ntick_secs = 30\nslow_poll_secs = 10\n"),
        );
        let err = load_checked(file.path()).unwrap_err();
        assert!(err.to_string().contains("slow_poll_secs"));
    }

    #[test]
    fn test_validation_rejects_zero_report_period() {
        let file = write_config(
            ".toml",
            &format!("{MINIMAL}\n[failure]\npolicy = \"retry\"\nreport_every = 0\n"),
        );
        assert!(load_checked(file.path()).is_err());
    }

    #[test]
    fn test_password_override() {
        let file = write_config(
            ".toml",
            &format!("{MINIMAL}\n[influx]\nusername = \"writer\"\npassword = \"from-file\"\n"),
        );
        let config = AppConfig::from_file(file.path()).unwrap();

        let kept = config.clone().with_password_override(None);
        assert_eq!(kept.influx.password.as_deref(), Some("from-file"));

        let replaced = config.with_password_override(Some("from-env".to_owned()));
        assert_eq!(replaced.influx.password.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_locate_prefers_explicit_path() {
        let path = AppConfig::locate(Some(Path::new("/etc/solwatch/config.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/etc/solwatch/config.toml"));
    }
}
