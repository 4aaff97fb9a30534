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

/// What to do when device polls keep failing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Terminate once the consecutive failure count exceeds `threshold`
    Exit {
        #[serde(default = "default_threshold")]
        threshold: u32,
    },
    /// Never terminate; escalate to an error log on every `report_every`-th
    /// consecutive failure
    Retry {
        #[serde(default = "default_report_every")]
        report_every: u32,
    },
}

fn default_threshold() -> u32 {
    3
}

fn default_report_every() -> u32 {
    10
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::Retry {
            report_every: default_report_every(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Log at warn and keep polling
    Continue,
    /// Log at error and keep polling
    Report,
    Terminate,
}

impl FailurePolicy {
    /// Decide for the given (already incremented) consecutive failure count
    pub fn on_failure(&self, consecutive_failures: u32) -> FailureAction {
        match *self {
            Self::Exit { threshold } if consecutive_failures > threshold => {
                FailureAction::Terminate
            }
            Self::Exit { .. } => FailureAction::Continue,
            Self::Retry { report_every }
                if report_every > 0 && consecutive_failures.is_multiple_of(report_every) =>
            {
                FailureAction::Report
            }
            Self::Retry { .. } => FailureAction::Continue,
        }
    }
}
