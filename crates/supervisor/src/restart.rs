// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart Policy state machine (§4.4), kept IO-free so it can be driven
//! entirely by parameters instead of a clock or a storage handle.
//!
//! The shape — mutate a persisted counter row, return a decision enum, no
//! internal clock access — is grounded on the wider retrieval set's
//! restart/backoff trackers (a `record_failure(now_ms) -> RestartDecision`
//! pure state machine with sliding-window failure pruning); we adapt it to
//! spec.md §4.4's fixed backoff ladder rather than an exponential multiplier,
//! since the schedule is given verbatim as a config array (§6).

use nomarr_core::{ExitCode, RestartPolicyRow};

/// What the caller should do after a worker is observed dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Wait `after_ms`, then spawn a replacement process.
    Restart { after_ms: u64 },
    /// `status=failed`; no further automatic restarts until an admin
    /// `reset_restart_count` (§4.4 restart policy steps 2 and 4).
    Lockout,
}

/// Pure decision logic over a [`RestartPolicyRow`] (§4.4 restart policy).
pub struct RestartTracker {
    backoff_schedule_ms: Vec<u64>,
    rapid_window_ms: u64,
    rapid_threshold: u32,
}

impl RestartTracker {
    pub fn new(backoff_schedule_ms: Vec<u64>, rapid_window_ms: u64, rapid_threshold: u32) -> Self {
        assert!(!backoff_schedule_ms.is_empty(), "backoff schedule must have at least one entry");
        Self { backoff_schedule_ms, rapid_window_ms, rapid_threshold }
    }

    /// Applies steps 1-5 of §4.4's restart policy to `row` in place and
    /// returns the resulting decision.
    ///
    /// `exit_code` is the dead worker's last reported exit code, or `None`
    /// for an OS-level crash with no orderly exit. Per DESIGN.md's Open
    /// Question 3 decision, both are folded into the same "failure" path —
    /// only `Some(FatalConfig | Unrecoverable)` takes the immediate-lockout
    /// branch (step 2).
    pub fn decide(&self, row: &mut RestartPolicyRow, now_ms: u64) -> RestartDecision {
        self.decide_with_exit(row, now_ms, None)
    }

    pub fn decide_with_exit(&self, row: &mut RestartPolicyRow, now_ms: u64, exit_code: Option<ExitCode>) -> RestartDecision {
        // Step 2: fatal exit codes lock out immediately, no window/threshold
        // accounting needed.
        if exit_code.is_some_and(ExitCode::is_terminal_for_restart) {
            row.locked_until = Some(u64::MAX);
            return RestartDecision::Lockout;
        }

        // Step 3: the rapid-failure window has rolled over; start fresh.
        if now_ms.saturating_sub(row.window_start) > self.rapid_window_ms {
            row.window_start = now_ms;
            row.restart_count = 0;
        }

        // Step 4: budget exhausted within the window.
        if row.restart_count >= self.rapid_threshold {
            row.locked_until = Some(u64::MAX);
            return RestartDecision::Lockout;
        }

        // Step 5: schedule the next attempt, clamped to the last ladder rung.
        let idx = (row.restart_count as usize).min(self.backoff_schedule_ms.len() - 1);
        let after_ms = self.backoff_schedule_ms[idx];
        row.restart_count += 1;
        row.lifetime_restart_count += 1;
        row.last_restart = now_ms;
        RestartDecision::Restart { after_ms }
    }
}
