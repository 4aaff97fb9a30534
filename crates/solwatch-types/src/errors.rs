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

use thiserror::Error;

use crate::snapshot::SnapshotKind;

/// A snapshot could not be decoded into its typed view
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("{kind} snapshot is missing required field `{field}`")]
    MissingField { kind: SnapshotKind, field: String },

    #[error("{kind} snapshot field `{field}` is not a valid {expected}")]
    InvalidField {
        kind: SnapshotKind,
        field: String,
        expected: &'static str,
    },
}

impl FieldError {
    /// Name of the offending field
    pub fn field(&self) -> &str {
        match self {
            Self::MissingField { field, .. } | Self::InvalidField { field, .. } => field,
        }
    }
}

/// An override value that does not name any known device setting
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized value '{value}' for `{key}` (expected one of: {allowed})")]
pub struct ConfigValueError {
    pub key: &'static str,
    pub value: String,
    pub allowed: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitfieldError {
    #[error("warning bitfield must have {expected} positions, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("warning bitfield has invalid character '{character}' at position {position}")]
    InvalidCharacter { position: usize, character: char },
}
