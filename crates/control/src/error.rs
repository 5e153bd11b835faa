// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("supervisor error: {0}")]
    Supervisor(#[from] nomarr_supervisor::SupervisorError),

    #[error(transparent)]
    Broker(#[from] nomarr_broker::BrokerError),
}
