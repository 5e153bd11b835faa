// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence for crash recovery (§4.1 `checkpoint()`).
//!
//! A snapshot stores the complete [`Tables`] at a point in time, identified
//! by the WAL sequence number it was taken at; recovery loads the snapshot
//! then replays WAL entries after that sequence.

use crate::tables::Tables;
use crate::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "v")]
    pub version: u32,
    pub seq: u64,
    pub tables: Tables,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(seq: u64, tables: Tables) -> Self {
        Self { version: CURRENT_SNAPSHOT_VERSION, seq, tables, created_at: Utc::now() }
    }

    /// Writes the snapshot as `zstd`-compressed JSON, rotating any existing
    /// file to `.bak` first rather than overwriting it destructively.
    pub fn write_to(&self, path: &Path) -> Result<(), StorageError> {
        if path.exists() {
            let _ = fs::rename(path, path.with_extension("snapshot.bak"));
        }
        let json = serde_json::to_vec(self)?;
        let compressed = zstd::encode_all(json.as_slice(), 0)?;
        fs::write(path, compressed)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Option<Self>, StorageError> {
        if !path.exists() {
            return Ok(None);
        }
        let compressed = fs::read(path)?;
        let json = zstd::decode_all(compressed.as_slice())?;
        let snapshot: Self = serde_json::from_slice(&json)?;
        if snapshot.version != CURRENT_SNAPSHOT_VERSION {
            return Err(StorageError::UnsupportedSnapshotVersion {
                found: snapshot.version,
                expected: CURRENT_SNAPSHOT_VERSION,
            });
        }
        Ok(Some(snapshot))
    }
}
