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

use serde::{Deserialize, Serialize};
use solwatch_types::{
    BatteryType, ChargerSourcePriority, ConfigValueError, DeviceCommand, DeviceConfig,
    DeviceSetting, DeviceToggles, OutputSourcePriority, Reported, Toggle,
};

/// Overrides exactly as written in the configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOverrides {
    pub battery_type: Option<String>,
    pub charger_source_priority: Option<String>,
    pub output_source_priority: Option<String>,
    pub buzzer: Option<bool>,
    pub overload_bypass: Option<bool>,
    pub power_saving: Option<bool>,
    pub overload_restart: Option<bool>,
    pub over_temperature_restart: Option<bool>,
}

/// Operator-pinned settings. Unset entries follow whatever the device
/// reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub battery_type: Option<BatteryType>,
    pub charger_source_priority: Option<ChargerSourcePriority>,
    pub output_source_priority: Option<OutputSourcePriority>,
    pub toggles: DeviceToggles,
}

impl Overrides {
    /// Decode raw overrides. Values outside the known vocabulary are returned
    /// as errors and left unset; the remaining overrides still apply.
    pub fn from_raw(raw: &RawOverrides) -> (Self, Vec<ConfigValueError>) {
        let mut errors = Vec::new();
        let overrides = Self {
            battery_type: decode(raw.battery_type.as_deref(), &mut errors),
            charger_source_priority: decode(raw.charger_source_priority.as_deref(), &mut errors),
            output_source_priority: decode(raw.output_source_priority.as_deref(), &mut errors),
            toggles: DeviceToggles {
                buzzer: raw.buzzer,
                overload_bypass: raw.overload_bypass,
                power_saving: raw.power_saving,
                overload_restart: raw.overload_restart,
                over_temperature_restart: raw.over_temperature_restart,
            },
        };
        (overrides, errors)
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// `key=value` pairs of every set override, for the startup summary
    pub fn summary(&self) -> Vec<String> {
        let mut entries = Vec::new();
        if let Some(v) = self.battery_type {
            entries.push(format!("{}={}", BatteryType::KEY, v.label()));
        }
        if let Some(v) = self.charger_source_priority {
            entries.push(format!("{}={}", ChargerSourcePriority::KEY, v.label()));
        }
        if let Some(v) = self.output_source_priority {
            entries.push(format!("{}={}", OutputSourcePriority::KEY, v.label()));
        }
        for toggle in Toggle::all() {
            if let Some(enabled) = self.toggles.get(*toggle) {
                entries.push(format!("{}={enabled}", toggle.key()));
            }
        }
        entries
    }
}

fn decode<T: DeviceSetting>(raw: Option<&str>, errors: &mut Vec<ConfigValueError>) -> Option<T> {
    match T::parse_label(raw?) {
        Ok(value) => Some(value),
        Err(e) => {
            errors.push(e);
            None
        }
    }
}

/// Outcome of merging overrides into a reported configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The reported configuration with every override applied
    pub desired: DeviceConfig,
    /// Commands that move the device from reported to desired, in apply order
    pub commands: Vec<DeviceCommand>,
}

impl Resolution {
    pub fn is_converged(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Compute the desired configuration and the commands needed to reach it.
///
/// Commands are ordered: battery type, charger priority, output priority,
/// then one enable group and one disable group. A toggle the device did not
/// report but that is overridden counts as drift.
pub fn resolve(reported: &DeviceConfig, overrides: &Overrides) -> Resolution {
    let mut desired = reported.clone();
    let mut commands = Vec::new();

    pin(&mut desired.battery_type, overrides.battery_type, &mut commands);
    pin(
        &mut desired.charger_source_priority,
        overrides.charger_source_priority,
        &mut commands,
    );
    pin(
        &mut desired.output_source_priority,
        overrides.output_source_priority,
        &mut commands,
    );

    let mut enable = Vec::new();
    let mut disable = Vec::new();
    for toggle in Toggle::all() {
        let Some(wanted) = overrides.toggles.get(*toggle) else {
            continue;
        };
        if reported.toggles.get(*toggle) != Some(wanted) {
            if wanted {
                enable.push(*toggle);
            } else {
                disable.push(*toggle);
            }
        }
        desired.toggles.set(*toggle, Some(wanted));
    }
    if !enable.is_empty() {
        commands.push(DeviceCommand::EnableToggles(enable));
    }
    if !disable.is_empty() {
        commands.push(DeviceCommand::DisableToggles(disable));
    }

    Resolution { desired, commands }
}

fn pin<T: DeviceSetting>(
    slot: &mut Reported<T>,
    wanted: Option<T>,
    commands: &mut Vec<DeviceCommand>,
) {
    let Some(wanted) = wanted else {
        return;
    };
    if !slot.is(wanted) {
        commands.push(wanted.command());
        *slot = Reported::Known(wanted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solwatch_types::FieldValue;

    fn reported() -> DeviceConfig {
        DeviceConfig {
            ac_input_voltage_v: 230.0,
            ac_input_current_a: 21.7,
            ac_output_voltage_v: 230.0,
            ac_output_frequency_hz: 50.0,
            ac_output_apparent_power_va: 5000.0,
            ac_output_active_power_w: 5000.0,
            battery_voltage_v: 48.0,
            battery_type: Reported::Known(BatteryType::Agm),
            battery_recharge_voltage_v: 46.0,
            battery_under_voltage_v: 42.0,
            battery_bulk_charge_voltage_v: 56.4,
            battery_float_charge_voltage_v: 54.0,
            battery_redischarge_voltage_v: 54.0,
            input_voltage_range: FieldValue::from("Appliance"),
            output_source_priority: Reported::Known(OutputSourcePriority::SbuFirst),
            charger_source_priority: Reported::Known(ChargerSourcePriority::SolarFirst),
            max_parallel_units: FieldValue::Number(9.0),
            max_ac_charging_current_a: 30.0,
            max_charging_current_a: 60.0,
            machine_type: FieldValue::from("Off Grid"),
            topology: FieldValue::from("transformerless"),
            output_mode: FieldValue::from("single machine output"),
            pv_ok_condition: FieldValue::Number(0.0),
            pv_power_balance: FieldValue::Number(1.0),
            toggles: DeviceToggles {
                buzzer: Some(true),
                overload_bypass: Some(false),
                power_saving: Some(false),
                overload_restart: None,
                over_temperature_restart: Some(true),
            },
        }
    }

    #[test]
    fn test_no_overrides_is_converged() {
        let config = reported();
        let resolution = resolve(&config, &Overrides::default());
        assert!(resolution.is_converged());
        assert_eq!(resolution.desired, config);
    }

    #[test]
    fn test_battery_type_override_emits_single_command() {
        let overrides = Overrides {
            battery_type: Some(BatteryType::Flooded),
            ..Overrides::default()
        };
        let resolution = resolve(&reported(), &overrides);

        assert_eq!(
            resolution.commands,
            vec![DeviceCommand::SetBatteryType(BatteryType::Flooded)]
        );
        assert_eq!(resolution.commands[0].code(), "PBT01");
        assert!(resolution.desired.battery_type.is(BatteryType::Flooded));
    }

    #[test]
    fn test_matching_override_is_noop() {
        let overrides = Overrides {
            output_source_priority: Some(OutputSourcePriority::SbuFirst),
            toggles: DeviceToggles {
                buzzer: Some(true),
                ..DeviceToggles::default()
            },
            ..Overrides::default()
        };
        assert!(resolve(&reported(), &overrides).is_converged());
    }

    #[test]
    fn test_toggles_grouped_by_direction() {
        let overrides = Overrides {
            toggles: DeviceToggles {
                buzzer: Some(false),
                overload_bypass: Some(true),
                power_saving: Some(true),
                overload_restart: Some(true),
                over_temperature_restart: Some(true),
            },
            ..Overrides::default()
        };
        let codes: Vec<String> = resolve(&reported(), &overrides)
            .commands
            .iter()
            .map(DeviceCommand::code)
            .collect();

        // overload_restart was not reported, so it is pinned too
        assert_eq!(codes, vec!["PEbju", "PDa"]);
    }

    #[test]
    fn test_command_order() {
        let overrides = Overrides {
            battery_type: Some(BatteryType::User),
            charger_source_priority: Some(ChargerSourcePriority::OnlySolar),
            output_source_priority: Some(OutputSourcePriority::UtilityFirst),
            toggles: DeviceToggles {
                buzzer: Some(false),
                ..DeviceToggles::default()
            },
        };
        let codes: Vec<String> = resolve(&reported(), &overrides)
            .commands
            .iter()
            .map(DeviceCommand::code)
            .collect();
        assert_eq!(codes, vec!["PBT02", "PCP03", "POP00", "PDa"]);
    }

    #[test]
    fn test_unrecognized_reported_value_is_overridden() {
        let mut config = reported();
        config.battery_type = Reported::Unrecognized("Lithium".to_owned());
        let overrides = Overrides {
            battery_type: Some(BatteryType::Agm),
            ..Overrides::default()
        };
        assert_eq!(
            resolve(&config, &overrides).commands,
            vec![DeviceCommand::SetBatteryType(BatteryType::Agm)]
        );
    }

    #[test]
    fn test_from_raw_skips_invalid_values() {
        let raw = RawOverrides {
            battery_type: Some("Flooded".to_owned()),
            charger_source_priority: Some("solar first".to_owned()),
            output_source_priority: Some("Battery first".to_owned()),
            buzzer: Some(false),
            ..RawOverrides::default()
        };
        let (overrides, errors) = Overrides::from_raw(&raw);

        assert_eq!(overrides.battery_type, Some(BatteryType::Flooded));
        assert_eq!(overrides.charger_source_priority, None);
        assert_eq!(overrides.output_source_priority, None);
        assert_eq!(overrides.toggles.buzzer, Some(false));
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].key, "charger_source_priority");
        assert_eq!(errors[0].value, "solar first");
        assert_eq!(errors[1].key, "output_source_priority");
        assert_eq!(errors[1].value, "Battery first");
    }

    #[test]
    fn test_summary_lists_set_overrides() {
        let (overrides, _) = Overrides::from_raw(&RawOverrides {
            charger_source_priority: Some("Solar + utility".to_owned()),
            power_saving: Some(true),
            ..RawOverrides::default()
        });
        assert_eq!(
            overrides.summary(),
            vec!["charger_source_priority=Solar + utility", "power_saving=true"]
        );
        assert!(Overrides::default().is_empty());
    }
}
