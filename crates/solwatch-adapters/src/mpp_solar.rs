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

//! Device reader backed by the `mpp-solar` command line utility.
//!
//! Each facet is one utility invocation printing a flat JSON object:
//! telemetry is `QPIGS`, warnings `QPIWS`, and configuration is the merge of
//! `QPIRI` (ratings) and `QFLAG` (feature toggles).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use solwatch_core::{DeviceCommand, DeviceError, DeviceReader, FieldValue, Snapshot, SnapshotKind};
use tokio::process::Command;

const TELEMETRY_COMMAND: &str = "QPIGS";
const WARNINGS_COMMAND: &str = "QPIWS";
const RATINGS_COMMAND: &str = "QPIRI";
const FLAGS_COMMAND: &str = "QFLAG";

/// Key the utility emits when the device answer failed its CRC/shape check
const VALIDITY_KEY: &str = "validity_check";
const NEGATIVE_ACK: &str = "NAK";

#[derive(Debug, Clone)]
pub struct MppSolarReader {
    interpreter: Option<PathBuf>,
    poller: PathBuf,
    port: String,
}

impl MppSolarReader {
    pub fn new(poller: impl Into<PathBuf>, port: impl Into<String>) -> Self {
        Self {
            interpreter: None,
            poller: poller.into(),
            port: port.into(),
        }
    }

    /// Run the poller through an interpreter, e.g. a virtualenv python
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    fn command(&self, code: &str) -> Command {
        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(&self.poller);
                command
            }
            None => Command::new(&self.poller),
        };
        command
            .args(["-p", self.port.as_str(), "-o", "json", "-c", code])
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, code: &str) -> Result<String, DeviceError> {
        tracing::debug!("Running {} {code}", self.poller.display());

        let output = self.command(code).output().await.map_err(|e| {
            DeviceError::Transport(format!("failed to start {}: {e}", self.poller.display()))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeviceError::Transport(format!(
                "{code} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| DeviceError::Decode(format!("{code} output is not UTF-8: {e}")))
    }

    async fn query(&self, code: &str) -> Result<BTreeMap<String, FieldValue>, DeviceError> {
        let stdout = self.run(code).await?;
        parse_output(code, &stdout)
    }
}

#[async_trait]
impl DeviceReader for MppSolarReader {
    async fn read(&self, kind: SnapshotKind) -> Result<Snapshot, DeviceError> {
        let fields = match kind {
            SnapshotKind::Telemetry => self.query(TELEMETRY_COMMAND).await?,
            SnapshotKind::Warnings => self.query(WARNINGS_COMMAND).await?,
            SnapshotKind::Config => {
                let mut fields = self.query(RATINGS_COMMAND).await?;
                fields.extend(self.query(FLAGS_COMMAND).await?);
                fields
            }
        };
        Ok(Snapshot::new(kind, fields))
    }

    async fn apply(&self, command: &DeviceCommand) -> Result<(), DeviceError> {
        let code = command.code();
        let stdout = self.run(&code).await?;

        if stdout.contains(NEGATIVE_ACK) {
            return Err(DeviceError::InvalidResponse(format!("{code} was refused (NAK)")));
        }
        // Validates the payload shape and the validity marker
        parse_output(&code, &stdout)?;
        Ok(())
    }
}

/// Turn the utility's JSON object into snapshot fields.
///
/// Keys are normalized to snake case. Keys starting with `_` are command
/// metadata and skipped. A `[value, unit]` pair keeps its value; any other
/// nested or null value is dropped.
pub fn parse_output(code: &str, stdout: &str) -> Result<BTreeMap<String, FieldValue>, DeviceError> {
    let value: Value = serde_json::from_str(stdout.trim())
        .map_err(|e| DeviceError::Decode(format!("{code} output is not JSON: {e}")))?;

    let Value::Object(object) = value else {
        return Err(DeviceError::Decode(format!("{code} output is not a JSON object")));
    };

    if let Some(reason) = object.get(VALIDITY_KEY) {
        return Err(DeviceError::InvalidResponse(format!("{code}: {reason}")));
    }

    let mut fields = BTreeMap::new();
    for (key, value) in object {
        if key.starts_with('_') {
            continue;
        }
        match scalar(&value) {
            Some(field) => {
                fields.insert(normalize_key(&key), field);
            }
            None => tracing::debug!("{code}: dropping non-scalar field `{key}`"),
        }
    }
    Ok(fields)
}

fn scalar(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Bool(b) => Some(FieldValue::Bool(*b)),
        Value::Number(n) => n.as_f64().map(FieldValue::Number),
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        Value::Array(items) => match items.as_slice() {
            [first, Value::String(_)] if !first.is_array() => scalar(first),
            _ => None,
        },
        Value::Null | Value::Object(_) => None,
    }
}

fn normalize_key(key: &str) -> String {
    let mut normalized = String::with_capacity(key.len());
    for c in key.trim().chars() {
        if c.is_ascii_alphanumeric() {
            normalized.push(c.to_ascii_lowercase());
        } else if !normalized.ends_with('_') {
            normalized.push('_');
        }
    }
    normalized.trim_end_matches('_').to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use solwatch_core::{BatteryType, DeviceConfig};
    use std::io::Write;

    #[test]
    fn test_parse_flat_object() {
        let fields = parse_output(
            "QPIGS",
            r#"{"_command": "QPIGS", "battery_voltage": 52.1, "is_load_on": 1, "note": "ok"}"#,
        )
        .unwrap();

        assert_eq!(fields.len(), 3);
        assert_eq!(fields["battery_voltage"], FieldValue::Number(52.1));
        assert_eq!(fields["is_load_on"], FieldValue::Number(1.0));
        assert_eq!(fields["note"], FieldValue::from("ok"));
    }

    #[test]
    fn test_parse_drops_nested_and_null() {
        let fields = parse_output(
            "QPIRI",
            r#"{"battery_type": "AGM", "raw": {"a": 1}, "missing": null, "ac_input_voltage": [230.0, "V"]}"#,
        )
        .unwrap();

        assert_eq!(fields.len(), 2);
        assert_eq!(fields["ac_input_voltage"], FieldValue::Number(230.0));
    }

    #[test]
    fn test_parse_normalizes_keys() {
        let fields = parse_output("QFLAG", r#"{"Overload Bypass": "disabled", "Buzzer": "enabled"}"#)
            .unwrap();
        assert!(fields.contains_key("overload_bypass"));
        assert!(fields.contains_key("buzzer"));
    }

    #[test]
    fn test_validity_check_is_invalid_response() {
        let err = parse_output("QPIGS", r#"{"validity_check": ["Error: CRC error", ""]}"#)
            .unwrap_err();
        assert!(err.is_invalid_response());
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(
            parse_output("QPIGS", "Traceback (most recent call last):"),
            Err(DeviceError::Decode(_))
        ));
        assert!(matches!(parse_output("QPIGS", "[1, 2]"), Err(DeviceError::Decode(_))));
    }

    /// Fake poller: a shell script answering by command code (the sixth
    /// argument), run through `sh` as interpreter
    fn fake_poller(script: &str) -> (tempfile::NamedTempFile, MppSolarReader) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(script.as_bytes()).unwrap();
        let reader = MppSolarReader::new(file.path(), "/dev/hidraw0").with_interpreter("sh");
        (file, reader)
    }

    const POLLER: &str = r#"
case "$6" in
  QPIGS) echo '{"_command": "QPIGS", "battery_voltage": 52.1}' ;;
  QPIWS) echo '{"warnings": "00000000000000000000000000000000"}' ;;
  QPIRI) echo '{"battery_type": "AGM", "max_charging_current": 60}' ;;
  QFLAG) echo '{"Buzzer": "enabled", "Power Saving": "disabled"}' ;;
  PBT01) echo '{"_command": "PBT01", "PBT01": ["ACK", ""]}' ;;
  PBT02) echo '{"_command": "PBT02", "PBT02": ["NAK", ""]}' ;;
  *) echo "unsupported command $6" >&2; exit 2 ;;
esac
"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reads_through_external_poller() {
        let (_script, reader) = fake_poller(POLLER);

        let telemetry = reader.read(SnapshotKind::Telemetry).await.unwrap();
        assert_eq!(telemetry.kind, SnapshotKind::Telemetry);
        assert_eq!(telemetry.get("battery_voltage"), Some(&FieldValue::Number(52.1)));

        let config = reader.read(SnapshotKind::Config).await.unwrap();
        assert_eq!(config.text("battery_type").unwrap(), "AGM");
        assert!(config.flag("buzzer").unwrap());
        assert!(!config.flag("power_saving").unwrap());
        assert!(DeviceConfig::from_snapshot(&config).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_apply_acknowledged_and_refused() {
        let (_script, reader) = fake_poller(POLLER);

        reader
            .apply(&DeviceCommand::SetBatteryType(BatteryType::Flooded))
            .await
            .unwrap();

        let err = reader
            .apply(&DeviceCommand::SetBatteryType(BatteryType::User))
            .await
            .unwrap_err();
        assert!(err.is_invalid_response());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_poller_is_transport_error() {
        let (_script, reader) = fake_poller(POLLER);
        let err = reader
            .apply(&DeviceCommand::DisableToggles(vec![solwatch_core::Toggle::Buzzer]))
            .await
            .unwrap_err();
        match err {
            DeviceError::Transport(message) => assert!(message.contains("unsupported command PDa")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_poller_is_transport_error() {
        let reader = MppSolarReader::new("/nonexistent/mpp-solar", "/dev/hidraw0");
        assert!(matches!(
            reader.read(SnapshotKind::Telemetry).await,
            Err(DeviceError::Transport(_))
        ));
    }
}
