// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("storage error: {0}")]
    Storage(#[from] nomarr_storage::StorageError),

    #[error("failed to spawn worker process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("no running worker found for component {0}")]
    UnknownComponent(String),
}
