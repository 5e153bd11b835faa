// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Aggregated top-level error type, grounded on the teacher's
//! `LifecycleError` pattern of folding every subsystem's error into one enum
//! with `#[from]` conversions at the seams (§7 Expansion).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("failed to resolve state directory")]
    NoStateDir,

    #[error("failed to read config file {path}: {source}")]
    ConfigRead { path: String, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse { path: String, source: toml::de::Error },

    #[error("storage error: {0}")]
    Storage(#[from] nomarr_storage::StorageError),

    #[error("supervisor error: {0}")]
    Supervisor(#[from] nomarr_supervisor::SupervisorError),

    #[error("failed to install signal handler: {0}")]
    Signal(#[from] std::io::Error),

    #[error("another nmr-daemon instance already holds the lock on this state directory: {0}")]
    LockFailed(#[source] std::io::Error),
}
