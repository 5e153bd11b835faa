// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("unknown topic pattern: {0}")]
    UnknownTopic(String),
}
