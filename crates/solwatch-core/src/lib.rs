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

//! Solwatch core: the polling-and-reconciliation loop that samples an
//! inverter, detects configuration and warning drift, re-applies pinned
//! settings and forwards normalized measurements to a time-series sink.

pub mod errors;
pub mod mapper;
pub mod policy;
pub mod reconciler;
pub mod resolver;
pub mod sink;
pub mod traits;

pub use errors::{DeviceError, LoopError, SinkError};
pub use mapper::FieldMapper;
pub use policy::{FailureAction, FailurePolicy};
pub use reconciler::{LoopPhase, LoopSettings, Observed, Reconciler, SessionState, StartupConfig};
pub use resolver::{Overrides, RawOverrides, Resolution, resolve};
pub use sink::write_with_recovery;
pub use traits::{DeviceReader, TimeSeriesSink};

// Re-export the data model so dependents need a single import path
pub use solwatch_types::*;
