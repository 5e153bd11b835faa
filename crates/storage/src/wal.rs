// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only write-ahead log backing [`crate::FileStorage`].
//!
//! One physical WAL file for all five tables (not one per table, per
//! SPEC_FULL.md §4.1): the tables are small and either ephemeral (`health`,
//! `worker_kv`, `claims`) or append-mostly (`jobs`), so a single sequential
//! log is enough to reconstruct state without the per-table WAL fan-out the
//! teacher's event-sourced `MaterializedState` uses.

use crate::StorageError;
use nomarr_core::{Claim, HealthRecord, Job, RestartPolicyRow};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Flush after this many buffered appends even if nothing else triggers it.
const FLUSH_THRESHOLD: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalOp {
    InsertJob(Job),
    /// Full post-mutation row, logged after `update_job_if`/`delete_jobs` so
    /// replay doesn't need to re-run arbitrary closures.
    ReplaceJob(Job),
    DeleteJob(nomarr_core::JobId),
    UpsertHealth(HealthRecord),
    DeleteHealth(String),
    SetKv { key: String, value: String },
    DeleteKv(String),
    UpsertClaim(Claim),
    DeleteClaim(String),
    UpsertRestartPolicy(RestartPolicyRow),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub op: WalOp,
}

pub struct Wal {
    path: PathBuf,
    file: File,
    write_seq: u64,
    processed_seq: u64,
    unflushed: usize,
}

impl Wal {
    /// Opens (creating if absent) the WAL at `path`. `processed_seq` is the
    /// sequence number already captured by the most recent snapshot; entries
    /// at or below it are skipped by [`Self::next_unprocessed`].
    ///
    /// A corrupt trailing line (partial write from a crash mid-append) is
    /// rotated out to `<path>.bak` rather than failing the open — matches
    /// the teacher's recovery posture of preferring a truncated but valid
    /// log over refusing to start.
    pub fn open(path: &Path, processed_seq: u64) -> Result<Self, StorageError> {
        let (entries, corrupt) = Self::read_valid_prefix(path)?;
        if corrupt {
            let bak = path.with_extension("wal.bak");
            let _ = fs::rename(path, &bak);
            let mut rewritten = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
            for entry in &entries {
                writeln!(rewritten, "{}", serde_json::to_string(entry)?)?;
            }
            rewritten.flush()?;
        }

        let write_seq = entries.last().map(|e| e.seq).unwrap_or(0);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { path: path.to_path_buf(), file, write_seq, processed_seq, unflushed: 0 })
    }

    fn read_valid_prefix(path: &Path) -> Result<(Vec<WalEntry>, bool), StorageError> {
        if !path.exists() {
            return Ok((Vec::new(), false));
        }
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        let mut corrupt = false;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<WalEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(_) => {
                    corrupt = true;
                    break;
                }
            }
        }
        Ok((entries, corrupt))
    }

    pub fn append(&mut self, op: WalOp) -> Result<u64, StorageError> {
        self.write_seq += 1;
        let entry = WalEntry { seq: self.write_seq, op };
        writeln!(self.file, "{}", serde_json::to_string(&entry)?)?;
        self.unflushed += 1;
        if self.needs_flush() {
            self.flush()?;
        }
        Ok(entry.seq)
    }

    pub fn flush(&mut self) -> Result<(), StorageError> {
        self.file.flush()?;
        self.unflushed = 0;
        Ok(())
    }

    pub fn needs_flush(&self) -> bool {
        self.unflushed >= FLUSH_THRESHOLD
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    pub fn mark_processed(&mut self, seq: u64) {
        self.processed_seq = self.processed_seq.max(seq);
    }

    /// All entries with `seq > after`, in order, for replay since the last
    /// snapshot.
    pub fn entries_after(&self, after: u64) -> Result<Vec<WalEntry>, StorageError> {
        let (entries, _) = Self::read_valid_prefix(&self.path)?;
        Ok(entries.into_iter().filter(|e| e.seq > after).collect())
    }

    /// Drops entries at or below `seq`, called right after a checkpoint has
    /// captured them in a snapshot (§4.1 `checkpoint()`).
    pub fn truncate_before(&mut self, seq: u64) -> Result<(), StorageError> {
        let (entries, _) = Self::read_valid_prefix(&self.path)?;
        let keep: Vec<_> = entries.into_iter().filter(|e| e.seq >= seq).collect();
        let mut rewritten = OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
        for entry in &keep {
            writeln!(rewritten, "{}", serde_json::to_string(entry)?)?;
        }
        rewritten.flush()?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }
}
