// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Calibration State (SPEC_FULL.md §3) — per-queue gate on whether a
//! worker's tag output is trusted enough to persist.

use crate::macros::simple_display;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationState {
    Uncalibrated,
    Calibrating,
    Calibrated,
    /// Re-entered from `Calibrated` when the worker's adapter version changes
    /// underneath it; requires re-running `begin_calibration`.
    Stale,
}

simple_display! {
    CalibrationState {
        Uncalibrated => "uncalibrated",
        Calibrating => "calibrating",
        Calibrated => "calibrated",
        Stale => "stale",
    }
}

impl CalibrationState {
    /// Whether a job completing under this state may have its tags persisted
    /// immediately, as opposed to being held back for later review.
    pub fn allows_persist(self) -> bool {
        matches!(self, CalibrationState::Calibrated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uncalibrated => "uncalibrated",
            Self::Calibrating => "calibrating",
            Self::Calibrated => "calibrated",
            Self::Stale => "stale",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uncalibrated" => Some(Self::Uncalibrated),
            "calibrating" => Some(Self::Calibrating),
            "calibrated" => Some(Self::Calibrated),
            "stale" => Some(Self::Stale),
            _ => None,
        }
    }
}

/// The calibration gate's full state for one queue type, as read out of the
/// `calibration:<queue>:*` `worker_kv` namespace (SPEC_FULL.md §3). Pure
/// data + transition logic; `nomarr-worker` and `nomarr-control` own reading
/// and writing the underlying KV rows through [`crate::kv`]'s key builders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationRecord {
    pub state: CalibrationState,
    pub sample_count: u32,
    pub required_samples: u32,
    pub promoted_at: Option<u64>,
}

impl CalibrationRecord {
    pub fn fresh(required_samples: u32) -> Self {
        Self { state: CalibrationState::Uncalibrated, sample_count: 0, required_samples, promoted_at: None }
    }

    /// `begin_calibration`: `uncalibrated|stale -> calibrating`, resetting
    /// `sample_count` to 0.
    pub fn begin(&mut self) {
        self.state = CalibrationState::Calibrating;
        self.sample_count = 0;
        self.promoted_at = None;
    }

    /// Called once per `mark_done` on this queue. Only has an effect while
    /// `calibrating`; promotes to `calibrated` once `sample_count` reaches
    /// `required_samples`.
    pub fn record_sample(&mut self, now_ms: u64) {
        if self.state != CalibrationState::Calibrating {
            return;
        }
        self.sample_count += 1;
        if self.sample_count >= self.required_samples {
            self.state = CalibrationState::Calibrated;
            self.promoted_at = Some(now_ms);
        }
    }
}
