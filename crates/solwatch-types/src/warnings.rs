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

//! Fault and warning flags. The device reports them either as named flags or
//! as a 32-position bitfield string (position 0 first); both decode to the
//! same [`Warnings`] value.

use crate::errors::{BitfieldError, FieldError};
use crate::snapshot::{Snapshot, SnapshotKind};

pub const WARNING_BIT_COUNT: usize = 32;

/// Snapshot field carrying the raw bitfield form
const BITFIELD_FIELD: &str = "warnings";

/// Snapshot field of the named form that stands for all reserved positions
const RESERVED_FIELD: &str = "reserved";

const RESERVED: &str = "Reserved";

/// Named flag (if the position has one) and label, indexed by bit position
const WARNING_BITS: [(Option<&str>, &str); WARNING_BIT_COUNT] = [
    (None, RESERVED),
    (Some("inverter_fault"), "Fault : Inverter fault"),
    (Some("bus_over_fault"), "Fault : Bus Over"),
    (Some("bus_under_fault"), "Fault : Bus Under"),
    (Some("bus_soft_fail_fault"), "Fault : Bus Soft Fail"),
    (Some("line_fail_warning"), "Warning : LINE_FAIL"),
    (Some("opv_short_warning"), "Warning : OPVShort"),
    (Some("inverter_voltage_too_low_fault"), "Fault : Inverter voltage too low"),
    (Some("inverter_voltage_too_high_fault"), "Fault : Inverter voltage too high"),
    (Some("over_temperature_fault"), "Fault (with bit 1)/warning : Over temperature"),
    (Some("fan_locked_fault"), "Fault (with bit 1)/warning: Fan locked"),
    (Some("battery_voltage_to_high_fault"), "Fault (with bit 1)/warning: Battery voltage high"),
    (Some("battery_low_alarm_warning"), "Warning: Battery low alarm"),
    (None, RESERVED),
    (Some("battery_under_shutdown_warning"), "Battery under shutdown"),
    (None, RESERVED),
    (Some("overload_fault"), "Fault (with bit 1)/warning: Over load"),
    (Some("eeprom_fault"), "Warning: Eeprom fault"),
    (Some("inverter_over_current_fault"), "Fault: Inverter Over Current"),
    (Some("inverter_soft_fail_fault"), "Fault: Inverter Soft Fail"),
    (Some("self_test_fail_fault"), "Fault: Self Test Fail"),
    (Some("op_dc_voltage_over_fault"), "Fault: OP DC Voltage Over"),
    (Some("bat_open_fault"), "Fault: Bat Open"),
    (Some("current_sensor_fail_fault"), "Fault: Current Sensor Fail"),
    (Some("battery_short_fault"), "Fault: Battery Short"),
    (Some("power_limit_warning"), "Warning: Power limit"),
    (Some("pv_voltage_high_warning"), "Warning: PV voltage high"),
    (Some("mppt_overload_fault"), "Warning: MPPT overload fault"),
    (Some("mppt_overload_warning"), "Warning: MPPT overload warning"),
    (Some("battery_too_low_to_charge_warning"), "Warning: Battery too low to charge"),
    (None, RESERVED),
    (None, RESERVED),
];

/// Label of a bit position; positions without a documented meaning are "Reserved"
pub fn warning_label(bit: usize) -> &'static str {
    WARNING_BITS.get(bit).map_or(RESERVED, |(_, label)| *label)
}

/// Labels of every set bit, in ascending bit order
pub fn decode_warning_bitfield(bitfield: &str) -> Result<Vec<&'static str>, BitfieldError> {
    let warnings = Warnings::from_bitfield(bitfield)?;
    Ok(warnings.active_labels())
}

/// Comma-joined labels of every set bit; empty when nothing is set
pub fn describe_warning_bitfield(bitfield: &str) -> Result<String, BitfieldError> {
    Ok(decode_warning_bitfield(bitfield)?.join(", "))
}

/// Decoded warning state, one bit per position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Warnings {
    bits: u32,
}

impl Warnings {
    pub fn from_bits(bits: u32) -> Self {
        Self { bits }
    }

    pub fn is_set(&self, bit: usize) -> bool {
        bit < WARNING_BIT_COUNT && self.bits & (1 << bit) != 0
    }

    /// Parse the bitfield form, character `i` being bit `i`
    pub fn from_bitfield(bitfield: &str) -> Result<Self, BitfieldError> {
        let bitfield = bitfield.trim();
        let actual = bitfield.chars().count();
        if actual != WARNING_BIT_COUNT {
            return Err(BitfieldError::WrongLength {
                expected: WARNING_BIT_COUNT,
                actual,
            });
        }

        let mut bits = 0_u32;
        for (position, character) in bitfield.chars().enumerate() {
            match character {
                '1' => bits |= 1 << position,
                '0' => {}
                other => {
                    return Err(BitfieldError::InvalidCharacter {
                        position,
                        character: other,
                    });
                }
            }
        }
        Ok(Self { bits })
    }

    /// Decode either snapshot form. The named form requires every named flag.
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self, FieldError> {
        if snapshot.contains(BITFIELD_FIELD) {
            let raw = snapshot.text(BITFIELD_FIELD)?;
            return Self::from_bitfield(raw).map_err(|_| FieldError::InvalidField {
                kind: SnapshotKind::Warnings,
                field: BITFIELD_FIELD.to_owned(),
                expected: "32-position warning bitfield",
            });
        }

        let mut bits = 0_u32;
        for (bit, (key, _)) in WARNING_BITS.iter().enumerate() {
            if let Some(key) = key
                && snapshot.flag(key)?
            {
                bits |= 1 << bit;
            }
        }
        if snapshot.flag(RESERVED_FIELD)? {
            bits |= 1;
        }
        Ok(Self { bits })
    }

    /// Named flags in bit order, followed by the combined reserved flag
    pub fn named_flags(&self) -> Vec<(&'static str, bool)> {
        let mut flags: Vec<(&'static str, bool)> = WARNING_BITS
            .iter()
            .enumerate()
            .filter_map(|(bit, (key, _))| key.map(|k| (k, self.is_set(bit))))
            .collect();
        let reserved = WARNING_BITS
            .iter()
            .enumerate()
            .any(|(bit, (key, _))| key.is_none() && self.is_set(bit));
        flags.push((RESERVED_FIELD, reserved));
        flags
    }

    pub fn active_labels(&self) -> Vec<&'static str> {
        (0..WARNING_BIT_COUNT)
            .filter(|bit| self.is_set(*bit))
            .map(warning_label)
            .collect()
    }

    pub fn describe(&self) -> String {
        self.active_labels().join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::FieldValue;
    use std::collections::BTreeMap;

    #[test]
    fn test_first_and_last_bits() {
        let labels = decode_warning_bitfield("10000000000000000000000000000001").unwrap();
        assert_eq!(labels, vec!["Reserved", "Reserved"]);
    }

    #[test]
    fn test_all_zero_is_empty() {
        let labels = decode_warning_bitfield(&"0".repeat(32)).unwrap();
        assert!(labels.is_empty());
        assert_eq!(describe_warning_bitfield(&"0".repeat(32)).unwrap(), "");
    }

    #[test]
    fn test_labels_in_ascending_bit_order() {
        let mut bits = vec!['0'; 32];
        bits[26] = '1';
        bits[1] = '1';
        bits[12] = '1';
        let field: String = bits.into_iter().collect();

        assert_eq!(
            describe_warning_bitfield(&field).unwrap(),
            "Fault : Inverter fault, Warning: Battery low alarm, Warning: PV voltage high"
        );
        // decoding twice gives the same answer
        assert_eq!(
            decode_warning_bitfield(&field).unwrap(),
            decode_warning_bitfield(&field).unwrap()
        );
    }

    #[test]
    fn test_labels_match_device_wording() {
        assert_eq!(warning_label(2), "Fault : Bus Over");
        assert_eq!(warning_label(9), "Fault (with bit 1)/warning : Over temperature");
        assert_eq!(warning_label(13), "Reserved");
        assert_eq!(warning_label(14), "Battery under shutdown");
        assert_eq!(warning_label(22), "Fault: Bat Open");
        assert_eq!(warning_label(32), "Reserved");
    }

    #[test]
    fn test_rejects_malformed_bitfields() {
        assert_eq!(
            Warnings::from_bitfield("0101"),
            Err(BitfieldError::WrongLength {
                expected: 32,
                actual: 4
            })
        );
        let mut field = "0".repeat(31);
        field.push('x');
        assert_eq!(
            Warnings::from_bitfield(&field),
            Err(BitfieldError::InvalidCharacter {
                position: 31,
                character: 'x'
            })
        );
    }

    fn named_snapshot(set: &[&str]) -> Snapshot {
        let mut fields = BTreeMap::new();
        for (key, _) in WARNING_BITS.iter() {
            if let Some(key) = key {
                fields.insert((*key).to_owned(), FieldValue::Bool(set.contains(key)));
            }
        }
        fields.insert(
            RESERVED_FIELD.to_owned(),
            FieldValue::Bool(set.contains(&RESERVED_FIELD)),
        );
        Snapshot::new(SnapshotKind::Warnings, fields)
    }

    #[test]
    fn test_named_and_bitfield_forms_agree() {
        let named = Warnings::from_snapshot(&named_snapshot(&["fan_locked_fault", "line_fail_warning"]))
            .unwrap();

        let mut bits = vec!['0'; 32];
        bits[5] = '1';
        bits[10] = '1';
        let mut fields = BTreeMap::new();
        fields.insert(
            BITFIELD_FIELD.to_owned(),
            FieldValue::Text(bits.into_iter().collect()),
        );
        let from_bits = Warnings::from_snapshot(&Snapshot::new(SnapshotKind::Warnings, fields)).unwrap();

        assert_eq!(named, from_bits);
        assert_eq!(
            named.active_labels(),
            vec!["Warning : LINE_FAIL", "Fault (with bit 1)/warning: Fan locked"]
        );
    }

    #[test]
    fn test_named_form_requires_every_flag() {
        let mut snapshot = named_snapshot(&[]);
        let mut fields = snapshot.fields().clone();
        fields.remove("eeprom_fault");
        snapshot = Snapshot::new(SnapshotKind::Warnings, fields);

        let err = Warnings::from_snapshot(&snapshot).unwrap_err();
        assert_eq!(err.field(), "eeprom_fault");
    }

    #[test]
    fn test_named_flags_schema() {
        let flags = Warnings::default().named_flags();
        assert_eq!(flags.len(), 28);
        assert_eq!(flags.last(), Some(&("reserved", false)));
        assert!(flags.iter().all(|(_, set)| !set));

        let flags = Warnings::from_bits(1 << 30).named_flags();
        assert_eq!(flags.last(), Some(&("reserved", true)));
    }
}
