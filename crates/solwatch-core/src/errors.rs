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

use std::time::Duration;
use thiserror::Error;

/// Failure talking to the device. Every variant counts as a link failure for
/// the failure policy; they differ only in how they are logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("device reader failed: {0}")]
    Transport(String),

    #[error("device returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("device did not answer within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("device output could not be decoded: {0}")]
    Decode(String),
}

impl DeviceError {
    /// The device answered, but flagged its own payload as invalid
    pub fn is_invalid_response(&self) -> bool {
        matches!(self, Self::InvalidResponse(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// Backing database does not exist yet; recoverable by creating it
    #[error("time-series storage missing: {0}")]
    MissingStorage(String),

    #[error("time-series write rejected: {0}")]
    Write(String),

    #[error("time-series sink unreachable: {0}")]
    Transport(String),
}

/// Fatal loop outcome
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoopError {
    #[error("device link lost after {consecutive_failures} consecutive failed polls")]
    DeviceLinkLost { consecutive_failures: u32 },
}
