// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health Record entity (§3) — per-component liveness row.

use crate::ids::{ComponentId, JobId};
use crate::macros::simple_display;
use serde::{Deserialize, Serialize};

/// Lifecycle states published to a component's own Health row (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Starting,
    Healthy,
    Stopping,
    Stopped,
    /// OS-level death with no orderly exit, detected by the supervisor.
    Crashed,
    /// Terminal administrative state — not auto-restarted until admin reset.
    Failed,
}

simple_display! {
    HealthStatus {
        Starting => "starting",
        Healthy => "healthy",
        Stopping => "stopping",
        Stopped => "stopped",
        Crashed => "crashed",
        Failed => "failed",
    }
}

impl HealthStatus {
    /// A component in `failed` is never auto-restarted (§3 invariant).
    pub fn is_failed(self) -> bool {
        matches!(self, HealthStatus::Failed)
    }
}

/// Worker process exit codes (§6): `0` normal, `1` recoverable (eligible for
/// restart), `2` fatal config (no restart), `3` unrecoverable (no restart).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCode {
    Ok,
    Recoverable,
    FatalConfig,
    Unrecoverable,
}

impl ExitCode {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::Recoverable),
            2 => Some(Self::FatalConfig),
            3 => Some(Self::Unrecoverable),
            _ => None,
        }
    }

    pub fn as_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Recoverable => 1,
            Self::FatalConfig => 2,
            Self::Unrecoverable => 3,
        }
    }

    /// `2` and `3` never trigger an automatic restart (§4.4 restart policy step 2).
    pub fn is_terminal_for_restart(self) -> bool {
        matches!(self, Self::FatalConfig | Self::Unrecoverable)
    }
}

/// Per-component liveness row, keyed by [`ComponentId`] (§3 Health Record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub component: ComponentId,
    pub last_heartbeat: u64,
    pub status: HealthStatus,
    pub pid: u32,
    pub current_job: Option<JobId>,
    pub restart_count: u32,
    pub last_restart: Option<u64>,
    pub exit_code: Option<ExitCode>,
    pub metadata: Option<String>,
}

impl HealthRecord {
    pub fn starting(component: ComponentId, pid: u32, now_ms: u64, restart_count: u32) -> Self {
        Self {
            component,
            last_heartbeat: now_ms,
            status: HealthStatus::Starting,
            pid,
            current_job: None,
            restart_count,
            last_restart: None,
            exit_code: None,
            metadata: None,
        }
    }

    /// Whether this row is stale relative to `now_ms` given `stale_after_ms`
    /// (§4.4 monitor tick: "last_heartbeat older than heartbeat_stale_ms").
    pub fn is_stale(&self, now_ms: u64, stale_after_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat) >= stale_after_ms
    }
}
