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

//! Snapshot to record normalization.
//!
//! Every record carries the same tag set (the configured device identity).
//! Field names are part of the stored schema and must not change between
//! releases, dashboards query them directly.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use solwatch_types::{
    DeviceConfig, FieldError, FieldValue, NormalizedRecord, Snapshot, Telemetry, Toggle, Warnings,
};

pub const BATTERY_MEASUREMENT: &str = "battery";
pub const PV_MEASUREMENT: &str = "pv";
pub const GRID_MEASUREMENT: &str = "grid";
pub const OUTPUT_MEASUREMENT: &str = "out";
pub const INVERTER_MEASUREMENT: &str = "inverter";
pub const CONFIG_MEASUREMENT: &str = "config";
pub const WARNING_MEASUREMENT: &str = "warning";

/// Text summary of active warnings, stored next to the individual flags
pub const ACTIVE_WARNINGS_FIELD: &str = "active_warnings";

/// Tag key carrying the device identity
pub const DEVICE_TAG: &str = "id";

#[derive(Debug, Clone)]
pub struct FieldMapper {
    tags: BTreeMap<String, String>,
}

impl FieldMapper {
    pub fn new(device_id: impl Into<String>) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(DEVICE_TAG.to_owned(), device_id.into());
        Self { tags }
    }

    fn record(&self, measurement: &str, timestamp: DateTime<Utc>) -> NormalizedRecord {
        NormalizedRecord::new(measurement, self.tags.clone(), timestamp)
    }

    /// Split one telemetry snapshot into its five measurement groups
    pub fn telemetry(&self, snapshot: &Snapshot) -> Result<Vec<NormalizedRecord>, FieldError> {
        let telemetry = Telemetry::from_snapshot(snapshot)?;
        Ok(self.telemetry_records(&telemetry, snapshot.captured_at))
    }

    pub fn telemetry_records(
        &self,
        t: &Telemetry,
        timestamp: DateTime<Utc>,
    ) -> Vec<NormalizedRecord> {
        vec![
            self.record(BATTERY_MEASUREMENT, timestamp)
                .field("DC_V", t.battery.voltage_v)
                .field("DC_V_scc", t.battery.scc_voltage_v)
                .field("charging_current", t.battery.charging_current_a)
                .field("discharge_current", t.battery.discharge_current_a)
                .field("soc", t.battery.capacity_percent)
                .field(
                    "battery_voltage_to_steady_while_charging",
                    t.battery.voltage_steady_while_charging,
                ),
            self.record(PV_MEASUREMENT, timestamp)
                .field("DC_V", t.pv.voltage_v)
                .field("A", t.pv.current_a)
                .field("W", t.pv.power_w),
            self.record(GRID_MEASUREMENT, timestamp)
                .field("AC_V", t.grid.voltage_v)
                .field("Hz", t.grid.frequency_hz),
            self.record(OUTPUT_MEASUREMENT, timestamp)
                .field("AC_V", t.output.voltage_v)
                .field("Hz", t.output.frequency_hz)
                .field("load_watt", t.output.active_power_w)
                .field("load_percent", t.output.load_percent)
                .field("load_va", t.output.apparent_power_va),
            self.record(INVERTER_MEASUREMENT, timestamp)
                .field("bus_voltage", t.inverter.bus_voltage_v)
                .field("heat_sink_temperature", t.inverter.heat_sink_temperature_c)
                .field("load_status_on", t.inverter.load_on)
                .field("scc_charge_on", t.inverter.scc_charging_on)
                .field("ac_charge_on", t.inverter.ac_charging_on)
                .field("charging_on", t.inverter.charging_on)
                .field("charging_to_float", t.inverter.charging_to_float)
                .field("configuration_changed", t.inverter.configuration_changed)
                .field("switched_on", t.inverter.switched_on),
        ]
    }

    /// Config record keeps the device's own setting names. Toggles the device
    /// did not report are left out.
    pub fn config_record(&self, c: &DeviceConfig, timestamp: DateTime<Utc>) -> NormalizedRecord {
        let mut record = self
            .record(CONFIG_MEASUREMENT, timestamp)
            .field("ac_input_voltage", c.ac_input_voltage_v)
            .field("ac_input_current", c.ac_input_current_a)
            .field("ac_output_voltage", c.ac_output_voltage_v)
            .field("ac_output_frequency", c.ac_output_frequency_hz)
            .field("ac_output_apparent_power", c.ac_output_apparent_power_va)
            .field("ac_output_active_power", c.ac_output_active_power_w)
            .field("battery_voltage", c.battery_voltage_v)
            .field("battery_type", c.battery_type.label())
            .field("battery_recharge_voltage", c.battery_recharge_voltage_v)
            .field("battery_under_voltage", c.battery_under_voltage_v)
            .field("battery_bulk_charge_voltage", c.battery_bulk_charge_voltage_v)
            .field("battery_float_charge_voltage", c.battery_float_charge_voltage_v)
            .field("battery_redischarge_voltage", c.battery_redischarge_voltage_v)
            .field("input_voltage_range", c.input_voltage_range.clone())
            .field("output_source_priority", c.output_source_priority.label())
            .field("charger_source_priority", c.charger_source_priority.label())
            .field("max_parallel_units", c.max_parallel_units.clone())
            .field("max_ac_charging_current", c.max_ac_charging_current_a)
            .field("max_charging_current", c.max_charging_current_a)
            .field("machine_type", c.machine_type.clone())
            .field("topology", c.topology.clone())
            .field("output_mode", c.output_mode.clone())
            .field("pv_ok_condition", c.pv_ok_condition.clone())
            .field("pv_power_balance", c.pv_power_balance.clone());

        for toggle in Toggle::all() {
            if let Some(enabled) = c.toggles.get(*toggle) {
                record = record.field(toggle.key(), enabled);
            }
        }
        record
    }

    pub fn warnings_record(&self, w: &Warnings, timestamp: DateTime<Utc>) -> NormalizedRecord {
        let record = w
            .named_flags()
            .into_iter()
            .fold(self.record(WARNING_MEASUREMENT, timestamp), |record, (key, set)| {
                record.field(key, set)
            });
        record.field(ACTIVE_WARNINGS_FIELD, FieldValue::Text(w.describe()))
    }
}
