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

//! Typed views of telemetry and configuration snapshots

use serde::{Deserialize, Serialize};

use crate::errors::FieldError;
use crate::settings::{
    BatteryType, ChargerSourcePriority, OutputSourcePriority, Reported, Toggle,
};
use crate::snapshot::{FieldValue, Snapshot};

// ============= Telemetry =============

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatteryReading {
    pub voltage_v: f64,
    pub scc_voltage_v: f64,
    pub charging_current_a: f64,
    pub discharge_current_a: f64,
    pub capacity_percent: f64,
    pub voltage_steady_while_charging: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PvReading {
    pub voltage_v: f64,
    pub current_a: f64,
    pub power_w: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GridReading {
    pub voltage_v: f64,
    pub frequency_hz: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputReading {
    pub voltage_v: f64,
    pub frequency_hz: f64,
    pub active_power_w: f64,
    pub load_percent: f64,
    pub apparent_power_va: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InverterReading {
    pub bus_voltage_v: f64,
    pub heat_sink_temperature_c: f64,
    pub load_on: bool,
    pub scc_charging_on: bool,
    pub ac_charging_on: bool,
    pub charging_on: bool,
    pub charging_to_float: bool,
    pub configuration_changed: bool,
    pub switched_on: bool,
}

/// One telemetry sample, grouped the way it is recorded
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Telemetry {
    pub battery: BatteryReading,
    pub pv: PvReading,
    pub grid: GridReading,
    pub output: OutputReading,
    pub inverter: InverterReading,
}

impl Telemetry {
    pub fn from_snapshot(s: &Snapshot) -> Result<Self, FieldError> {
        Ok(Self {
            battery: BatteryReading {
                voltage_v: s.number("battery_voltage")?,
                scc_voltage_v: s.number("battery_voltage_from_scc")?,
                charging_current_a: s.number("battery_charging_current")?,
                discharge_current_a: s.number("battery_discharge_current")?,
                capacity_percent: s.number("battery_capacity")?,
                voltage_steady_while_charging: s
                    .flag("is_battery_voltage_to_steady_while_charging")?,
            },
            pv: PvReading {
                voltage_v: s.number("pv_input_voltage")?,
                current_a: s.number("pv_input_current_for_battery")?,
                power_w: s.number("pv_input_power")?,
            },
            grid: GridReading {
                voltage_v: s.number("ac_input_voltage")?,
                frequency_hz: s.number("ac_input_frequency")?,
            },
            output: OutputReading {
                voltage_v: s.number("ac_output_voltage")?,
                frequency_hz: s.number("ac_output_frequency")?,
                active_power_w: s.number("ac_output_active_power")?,
                load_percent: s.number("ac_output_load")?,
                apparent_power_va: s.number("ac_output_apparent_power")?,
            },
            inverter: InverterReading {
                bus_voltage_v: s.number("bus_voltage")?,
                heat_sink_temperature_c: s.number("inverter_heat_sink_temperature")?,
                load_on: s.flag("is_load_on")?,
                scc_charging_on: s.flag("is_scc_charging_on")?,
                ac_charging_on: s.flag("is_ac_charging_on")?,
                charging_on: s.flag("is_charging_on")?,
                charging_to_float: s.flag("is_charging_to_float")?,
                configuration_changed: s.flag("is_configuration_changed")?,
                switched_on: s.flag("is_switched_on")?,
            },
        })
    }
}

// ============= Configuration =============

/// Boolean features as reported by the device flag query. `None` when the
/// device did not report the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceToggles {
    pub buzzer: Option<bool>,
    pub overload_bypass: Option<bool>,
    pub power_saving: Option<bool>,
    pub overload_restart: Option<bool>,
    pub over_temperature_restart: Option<bool>,
}

impl DeviceToggles {
    pub fn get(&self, toggle: Toggle) -> Option<bool> {
        match toggle {
            Toggle::Buzzer => self.buzzer,
            Toggle::OverloadBypass => self.overload_bypass,
            Toggle::PowerSaving => self.power_saving,
            Toggle::OverloadRestart => self.overload_restart,
            Toggle::OverTemperatureRestart => self.over_temperature_restart,
        }
    }

    pub fn set(&mut self, toggle: Toggle, value: Option<bool>) {
        let slot = match toggle {
            Toggle::Buzzer => &mut self.buzzer,
            Toggle::OverloadBypass => &mut self.overload_bypass,
            Toggle::PowerSaving => &mut self.power_saving,
            Toggle::OverloadRestart => &mut self.overload_restart,
            Toggle::OverTemperatureRestart => &mut self.over_temperature_restart,
        };
        *slot = value;
    }

    fn from_snapshot(s: &Snapshot) -> Result<Self, FieldError> {
        let mut toggles = Self::default();
        for toggle in Toggle::all() {
            toggles.set(*toggle, s.optional_flag(toggle.key())?);
        }
        Ok(toggles)
    }
}

/// Reported device configuration. Equality is field-by-field on typed
/// values, which is what drift detection compares.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub ac_input_voltage_v: f64,
    pub ac_input_current_a: f64,
    pub ac_output_voltage_v: f64,
    pub ac_output_frequency_hz: f64,
    pub ac_output_apparent_power_va: f64,
    pub ac_output_active_power_w: f64,
    pub battery_voltage_v: f64,
    pub battery_type: Reported<BatteryType>,
    pub battery_recharge_voltage_v: f64,
    pub battery_under_voltage_v: f64,
    pub battery_bulk_charge_voltage_v: f64,
    pub battery_float_charge_voltage_v: f64,
    pub battery_redischarge_voltage_v: f64,
    pub input_voltage_range: FieldValue,
    pub output_source_priority: Reported<OutputSourcePriority>,
    pub charger_source_priority: Reported<ChargerSourcePriority>,
    pub max_parallel_units: FieldValue,
    pub max_ac_charging_current_a: f64,
    pub max_charging_current_a: f64,
    pub machine_type: FieldValue,
    pub topology: FieldValue,
    pub output_mode: FieldValue,
    pub pv_ok_condition: FieldValue,
    pub pv_power_balance: FieldValue,
    pub toggles: DeviceToggles,
}

impl DeviceConfig {
    pub fn from_snapshot(s: &Snapshot) -> Result<Self, FieldError> {
        Ok(Self {
            ac_input_voltage_v: s.number("ac_input_voltage")?,
            ac_input_current_a: s.number("ac_input_current")?,
            ac_output_voltage_v: s.number("ac_output_voltage")?,
            ac_output_frequency_hz: s.number("ac_output_frequency")?,
            ac_output_apparent_power_va: s.number("ac_output_apparent_power")?,
            ac_output_active_power_w: s.number("ac_output_active_power")?,
            battery_voltage_v: s.number("battery_voltage")?,
            battery_type: Reported::parse(s.text("battery_type")?),
            battery_recharge_voltage_v: s.number("battery_recharge_voltage")?,
            battery_under_voltage_v: s.number("battery_under_voltage")?,
            battery_bulk_charge_voltage_v: s.number("battery_bulk_charge_voltage")?,
            battery_float_charge_voltage_v: s.number("battery_float_charge_voltage")?,
            battery_redischarge_voltage_v: s.number("battery_redischarge_voltage")?,
            input_voltage_range: s.value("input_voltage_range")?.clone(),
            output_source_priority: Reported::parse(s.text("output_source_priority")?),
            charger_source_priority: Reported::parse(s.text("charger_source_priority")?),
            max_parallel_units: s.value("max_parallel_units")?.clone(),
            max_ac_charging_current_a: s.number("max_ac_charging_current")?,
            max_charging_current_a: s.number("max_charging_current")?,
            machine_type: s.value("machine_type")?.clone(),
            topology: s.value("topology")?.clone(),
            output_mode: s.value("output_mode")?.clone(),
            pv_ok_condition: s.value("pv_ok_condition")?.clone(),
            pv_power_balance: s.value("pv_power_balance")?.clone(),
            toggles: DeviceToggles::from_snapshot(s)?,
        })
    }
}
