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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::FieldError;

/// Which facet of device state a snapshot describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    /// Fast-changing measurements, sampled every tick
    Telemetry,
    /// Reported device configuration, sampled on the slow cadence
    Config,
    /// Fault and warning flags, sampled on the slow cadence
    Warnings,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry",
            Self::Config => "config",
            Self::Warnings => "warnings",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar value of a single decoded field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric reading of the value. Numeric text is accepted since some
    /// firmware revisions quote their numbers.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    /// Boolean reading of the value (device flags come as bools, 0/1 or
    /// enabled/disabled depending on the command)
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(n) => Some(*n != 0.0),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" | "enabled" => Some(true),
                "0" | "false" | "no" | "off" | "disabled" => Some(false),
                _ => None,
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Bool(_) | Self::Number(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// One decoded read of device state. Produced fresh on every poll and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub kind: SnapshotKind,
    pub captured_at: DateTime<Utc>,
    fields: BTreeMap<String, FieldValue>,
}

impl Snapshot {
    /// Create a snapshot captured now
    pub fn new(kind: SnapshotKind, fields: BTreeMap<String, FieldValue>) -> Self {
        Self::captured(kind, Utc::now(), fields)
    }

    pub fn captured(
        kind: SnapshotKind,
        captured_at: DateTime<Utc>,
        fields: BTreeMap<String, FieldValue>,
    ) -> Self {
        Self {
            kind,
            captured_at,
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Required field, any scalar type
    pub fn value(&self, field: &str) -> Result<&FieldValue, FieldError> {
        self.fields.get(field).ok_or_else(|| FieldError::MissingField {
            kind: self.kind,
            field: field.to_owned(),
        })
    }

    pub fn number(&self, field: &str) -> Result<f64, FieldError> {
        self.value(field)?
            .as_number()
            .ok_or_else(|| self.invalid(field, "number"))
    }

    pub fn flag(&self, field: &str) -> Result<bool, FieldError> {
        self.value(field)?
            .as_flag()
            .ok_or_else(|| self.invalid(field, "flag"))
    }

    /// Optional flag: absent is `None`, present but malformed is an error
    pub fn optional_flag(&self, field: &str) -> Result<Option<bool>, FieldError> {
        if self.contains(field) {
            self.flag(field).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn text(&self, field: &str) -> Result<&str, FieldError> {
        self.value(field)?
            .as_text()
            .ok_or_else(|| self.invalid(field, "text value"))
    }

    fn invalid(&self, field: &str, expected: &'static str) -> FieldError {
        FieldError::InvalidField {
            kind: self.kind,
            field: field.to_owned(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pairs: &[(&str, FieldValue)]) -> Snapshot {
        let fields = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect();
        Snapshot::new(SnapshotKind::Telemetry, fields)
    }

    #[test]
    fn test_missing_field_names_the_field() {
        let snap = snapshot(&[("bus_voltage", FieldValue::Number(380.0))]);
        let err = snap.number("battery_voltage").unwrap_err();
        assert_eq!(err.field(), "battery_voltage");
        assert!(err.to_string().contains("telemetry"));
        assert!(err.to_string().contains("battery_voltage"));
    }

    #[test]
    fn test_numeric_text_is_accepted() {
        let snap = snapshot(&[("ac_input_voltage", FieldValue::from("230.4"))]);
        assert_eq!(snap.number("ac_input_voltage").unwrap(), 230.4);
    }

    #[test]
    fn test_flag_representations() {
        let snap = snapshot(&[
            ("a", FieldValue::Bool(true)),
            ("b", FieldValue::Number(0.0)),
            ("c", FieldValue::from("enabled")),
            ("d", FieldValue::from("Disabled")),
            ("e", FieldValue::from("maybe")),
        ]);
        assert!(snap.flag("a").unwrap());
        assert!(!snap.flag("b").unwrap());
        assert!(snap.flag("c").unwrap());
        assert!(!snap.flag("d").unwrap());
        assert!(matches!(
            snap.flag("e"),
            Err(FieldError::InvalidField { expected: "flag", .. })
        ));
        assert_eq!(snap.optional_flag("missing").unwrap(), None);
    }

    #[test]
    fn test_untagged_json_values() {
        let value: FieldValue = serde_json::from_str("12.5").unwrap();
        assert_eq!(value, FieldValue::Number(12.5));
        let value: FieldValue = serde_json::from_str("true").unwrap();
        assert_eq!(value, FieldValue::Bool(true));
        let value: FieldValue = serde_json::from_str("\"SBU first\"").unwrap();
        assert_eq!(value, FieldValue::from("SBU first"));
    }
}
