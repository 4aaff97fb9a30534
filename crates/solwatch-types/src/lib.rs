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

//! Data model shared by the Solwatch crates: decoded device snapshots, their
//! typed views, user-declared setting overrides and the normalized records
//! handed to the time-series sink.

pub mod device;
pub mod errors;
pub mod record;
pub mod settings;
pub mod snapshot;
pub mod warnings;

pub use device::{
    BatteryReading, DeviceConfig, DeviceToggles, GridReading, InverterReading, OutputReading,
    PvReading, Telemetry,
};
pub use errors::{BitfieldError, ConfigValueError, FieldError};
pub use record::NormalizedRecord;
pub use settings::{
    BatteryType, ChargerSourcePriority, DeviceCommand, DeviceSetting, OutputSourcePriority,
    Reported, Toggle,
};
pub use snapshot::{FieldValue, Snapshot, SnapshotKind};
pub use warnings::{
    WARNING_BIT_COUNT, Warnings, decode_warning_bitfield, describe_warning_bitfield, warning_label,
};
