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

use async_trait::async_trait;
use solwatch_types::{DeviceCommand, NormalizedRecord, Snapshot, SnapshotKind};

use crate::errors::{DeviceError, SinkError};

/// Source of decoded device snapshots
#[async_trait]
pub trait DeviceReader: Send + Sync {
    /// Read one facet of device state
    async fn read(&self, kind: SnapshotKind) -> Result<Snapshot, DeviceError>;

    /// Send one apply-command to the device
    async fn apply(&self, command: &DeviceCommand) -> Result<(), DeviceError>;
}

/// Append-only destination for normalized records
#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    async fn write_batch(&self, records: &[NormalizedRecord]) -> Result<(), SinkError>;

    /// Create the backing storage (database) if it is missing
    async fn create_storage(&self) -> Result<(), SinkError>;
}
