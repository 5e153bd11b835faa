// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart Policy entity (§3) — the persisted row backing
//! `nomarr-supervisor`'s `RestartTracker` state machine.
//!
//! This struct is pure data (the Storage row); the decision logic that reads
//! and advances it lives in `nomarr-supervisor` since it is supervisor
//! business logic, not shared domain state.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartPolicyRow {
    pub component: String,
    /// Window-scoped count used only for the rapid-failure threshold (§4.4
    /// step 3-4); legitimately resets to 0 on window rollover.
    pub restart_count: u32,
    /// Cumulative restart count since the last explicit admin reset. This is
    /// the counter mirrored into `HealthRecord.restart_count` (§3 invariant:
    /// "never decreases except via explicit admin reset") — it must never be
    /// touched by window rollover.
    pub lifetime_restart_count: u32,
    pub last_restart: u64,
    pub window_start: u64,
    pub locked_until: Option<u64>,
}

impl RestartPolicyRow {
    pub fn fresh(component: impl Into<String>, now_ms: u64) -> Self {
        Self {
            component: component.into(),
            restart_count: 0,
            lifetime_restart_count: 0,
            last_restart: 0,
            window_start: now_ms,
            locked_until: None,
        }
    }

    /// §3 invariant: `≥ N_RAPID` restarts within `WINDOW_MS` locks the
    /// component out forever (until an admin reset).
    pub fn is_locked(&self) -> bool {
        self.locked_until == Some(u64::MAX)
    }
}
