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

//! Closed vocabularies for the device settings a user may pin, and the
//! apply-commands that move the device to them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigValueError;

/// An enumerated device setting that can be overridden and applied
pub trait DeviceSetting: Copy + PartialEq + fmt::Debug + 'static {
    /// Override key and reported config field name
    const KEY: &'static str;

    /// Every accepted value, in device code order
    fn all() -> &'static [Self];

    /// Human-readable value as the device reports it
    fn label(self) -> &'static str;

    fn command(self) -> DeviceCommand;

    /// Exact lookup by label
    fn parse_label(raw: &str) -> Result<Self, ConfigValueError> {
        Self::all()
            .iter()
            .copied()
            .find(|setting| setting.label() == raw)
            .ok_or_else(|| ConfigValueError {
                key: Self::KEY,
                value: raw.to_owned(),
                allowed: Self::all()
                    .iter()
                    .map(|s| format!("'{}'", s.label()))
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

// ============= Battery Type =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatteryType {
    Agm,
    Flooded,
    User,
}

impl DeviceSetting for BatteryType {
    const KEY: &'static str = "battery_type";

    fn all() -> &'static [Self] {
        &[Self::Agm, Self::Flooded, Self::User]
    }

    fn label(self) -> &'static str {
        match self {
            Self::Agm => "AGM",
            Self::Flooded => "Flooded",
            Self::User => "User",
        }
    }

    fn command(self) -> DeviceCommand {
        DeviceCommand::SetBatteryType(self)
    }
}

// ============= Source Priorities =============

/// Which source charges the battery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargerSourcePriority {
    UtilityFirst,
    SolarFirst,
    SolarAndUtility,
    OnlySolar,
}

impl DeviceSetting for ChargerSourcePriority {
    const KEY: &'static str = "charger_source_priority";

    fn all() -> &'static [Self] {
        &[
            Self::UtilityFirst,
            Self::SolarFirst,
            Self::SolarAndUtility,
            Self::OnlySolar,
        ]
    }

    fn label(self) -> &'static str {
        match self {
            Self::UtilityFirst => "Utility first",
            Self::SolarFirst => "Solar first",
            Self::SolarAndUtility => "Solar + utility",
            Self::OnlySolar => "Only solar charging permitted",
        }
    }

    fn command(self) -> DeviceCommand {
        DeviceCommand::SetChargerPriority(self)
    }
}

/// Which source feeds the AC output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputSourcePriority {
    UtilityFirst,
    SolarFirst,
    /// Solar, then battery, then utility
    SbuFirst,
}

impl DeviceSetting for OutputSourcePriority {
    const KEY: &'static str = "output_source_priority";

    fn all() -> &'static [Self] {
        &[Self::UtilityFirst, Self::SolarFirst, Self::SbuFirst]
    }

    fn label(self) -> &'static str {
        match self {
            Self::UtilityFirst => "Utility first",
            Self::SolarFirst => "Solar first",
            Self::SbuFirst => "SBU first",
        }
    }

    fn command(self) -> DeviceCommand {
        DeviceCommand::SetOutputPriority(self)
    }
}

macro_rules! impl_from_str_via_label {
    ($($ty:ty),*) => {
        $(
            impl FromStr for $ty {
                type Err = ConfigValueError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    Self::parse_label(s)
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.label())
                }
            }
        )*
    };
}

impl_from_str_via_label!(BatteryType, ChargerSourcePriority, OutputSourcePriority);

// ============= Boolean Toggles =============

/// Device feature that is switched with the enable/disable group commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Toggle {
    Buzzer,
    OverloadBypass,
    PowerSaving,
    OverloadRestart,
    OverTemperatureRestart,
}

impl Toggle {
    /// Canonical order; group commands always list suffixes in this order
    pub fn all() -> &'static [Toggle] {
        &[
            Self::Buzzer,
            Self::OverloadBypass,
            Self::PowerSaving,
            Self::OverloadRestart,
            Self::OverTemperatureRestart,
        ]
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Buzzer => "buzzer",
            Self::OverloadBypass => "overload_bypass",
            Self::PowerSaving => "power_saving",
            Self::OverloadRestart => "overload_restart",
            Self::OverTemperatureRestart => "over_temperature_restart",
        }
    }

    pub fn suffix(self) -> char {
        match self {
            Self::Buzzer => 'a',
            Self::OverloadBypass => 'b',
            Self::PowerSaving => 'j',
            Self::OverloadRestart => 'u',
            Self::OverTemperatureRestart => 'v',
        }
    }
}

// ============= Reported Values =============

/// A setting as the device reports it. Firmware may report labels outside
/// the known vocabulary; those are kept verbatim rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reported<T> {
    Known(T),
    Unrecognized(String),
}

impl<T: DeviceSetting> Reported<T> {
    pub fn parse(raw: &str) -> Self {
        T::parse_label(raw).map_or_else(|_| Self::Unrecognized(raw.to_owned()), Self::Known)
    }

    pub fn known(&self) -> Option<T> {
        match self {
            Self::Known(value) => Some(*value),
            Self::Unrecognized(_) => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Known(value) => value.label(),
            Self::Unrecognized(raw) => raw,
        }
    }

    pub fn is(&self, value: T) -> bool {
        self.known() == Some(value)
    }
}

// ============= Apply Commands =============

/// Device instruction that changes one or more settings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceCommand {
    SetBatteryType(BatteryType),
    SetChargerPriority(ChargerSourcePriority),
    SetOutputPriority(OutputSourcePriority),
    /// Enable every listed toggle; holds at least one toggle
    EnableToggles(Vec<Toggle>),
    /// Disable every listed toggle; holds at least one toggle
    DisableToggles(Vec<Toggle>),
}

impl DeviceCommand {
    /// Wire code understood by the device (e.g. `PBT01`, `PEaj`)
    pub fn code(&self) -> String {
        match self {
            Self::SetBatteryType(t) => format!("PBT{:02}", setting_index(*t)),
            Self::SetChargerPriority(p) => format!("PCP{:02}", setting_index(*p)),
            Self::SetOutputPriority(p) => format!("POP{:02}", setting_index(*p)),
            Self::EnableToggles(toggles) => group_code("PE", toggles),
            Self::DisableToggles(toggles) => group_code("PD", toggles),
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

fn setting_index<T: DeviceSetting>(value: T) -> usize {
    T::all().iter().position(|v| *v == value).unwrap_or_default()
}

fn group_code(prefix: &str, toggles: &[Toggle]) -> String {
    let mut ordered = toggles.to_vec();
    ordered.sort_unstable();
    ordered.dedup();
    ordered
        .into_iter()
        .fold(prefix.to_owned(), |mut code, toggle| {
            code.push(toggle.suffix());
            code
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_type_codes() {
        assert_eq!(DeviceCommand::SetBatteryType(BatteryType::Agm).code(), "PBT00");
        assert_eq!(
            DeviceCommand::SetBatteryType(BatteryType::Flooded).code(),
            "PBT01"
        );
        assert_eq!(DeviceCommand::SetBatteryType(BatteryType::User).code(), "PBT02");
    }

    #[test]
    fn test_priority_codes() {
        assert_eq!(
            ChargerSourcePriority::OnlySolar.command().code(),
            "PCP03"
        );
        assert_eq!(
            ChargerSourcePriority::SolarAndUtility.command().code(),
            "PCP02"
        );
        assert_eq!(OutputSourcePriority::SbuFirst.command().code(), "POP02");
        assert_eq!(OutputSourcePriority::UtilityFirst.command().code(), "POP00");
    }

    #[test]
    fn test_group_code_uses_canonical_order() {
        let command = DeviceCommand::EnableToggles(vec![
            Toggle::OverTemperatureRestart,
            Toggle::Buzzer,
            Toggle::PowerSaving,
        ]);
        assert_eq!(command.code(), "PEajv");

        let command = DeviceCommand::DisableToggles(vec![Toggle::OverloadRestart, Toggle::OverloadBypass]);
        assert_eq!(command.code(), "PDbu");
    }

    #[test]
    fn test_parse_labels_exactly() {
        assert_eq!("AGM".parse::<BatteryType>().unwrap(), BatteryType::Agm);
        assert_eq!(
            "Solar + utility".parse::<ChargerSourcePriority>().unwrap(),
            ChargerSourcePriority::SolarAndUtility
        );
        assert_eq!(
            "SBU first".parse::<OutputSourcePriority>().unwrap(),
            OutputSourcePriority::SbuFirst
        );

        assert!("agm".parse::<BatteryType>().is_err());
        assert!(" Flooded".parse::<BatteryType>().is_err());
        assert!("sbu first".parse::<OutputSourcePriority>().is_err());
    }

    #[test]
    fn test_unknown_label_is_config_error() {
        let err = "Lithium".parse::<BatteryType>().unwrap_err();
        assert_eq!(err.key, "battery_type");
        assert_eq!(err.value, "Lithium");
        assert!(err.allowed.contains("'Flooded'"));
    }

    #[test]
    fn test_reported_keeps_unrecognized_labels() {
        let reported = Reported::<BatteryType>::parse("Pylontech");
        assert_eq!(reported, Reported::Unrecognized("Pylontech".to_owned()));
        assert_eq!(reported.label(), "Pylontech");
        assert!(!reported.is(BatteryType::User));

        let reported = Reported::<BatteryType>::parse("User");
        assert!(reported.is(BatteryType::User));
        assert_eq!(reported.label(), "User");
    }
}
