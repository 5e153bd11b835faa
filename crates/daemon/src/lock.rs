// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-instance guard for the daemon's state directory (SPEC_FULL.md §5
//! Expansion). `FileStorage`'s WAL has no protection against two writers;
//! an exclusive advisory lock on `<state_dir>/nomarr.lock`, held for the
//! process's lifetime, is what the teacher's `ojd` lifecycle uses instead
//! of arbitrating multi-writer WAL access inside the storage layer itself.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use fs2::FileExt;

use crate::error::DaemonError;

/// Holds the lock file open and exclusively locked for as long as it's
/// alive; the OS releases the lock (and any stale PID it recorded becomes
/// irrelevant) when the process exits, even on a crash.
pub struct InstanceLock {
    file: File,
}

impl InstanceLock {
    /// Acquires the lock at `<state_dir>/nomarr.lock`, failing immediately
    /// rather than blocking if another daemon already holds it.
    pub fn acquire(state_dir: &Path) -> Result<Self, DaemonError> {
        let path = state_dir.join("nomarr.lock");
        let file = OpenOptions::new().write(true).create(true).truncate(false).open(&path).map_err(DaemonError::LockFailed)?;
        file.try_lock_exclusive().map_err(DaemonError::LockFailed)?;

        let mut file = file;
        file.set_len(0).map_err(DaemonError::LockFailed)?;
        let _ = write!(file, "{}", std::process::id());
        let _ = file.flush();

        Ok(Self { file })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
