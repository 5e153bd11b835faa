// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `SIGINT`/`SIGTERM` routed onto the same [`CancellationToken`] the
//! Supervisor's shutdown sequence already watches (SPEC_FULL.md §5
//! Expansion), so `Ctrl-C` and a programmatic shutdown share one code path.
//! Grounded on the teacher's `ojd` main loop, which selects over
//! `signal(SignalKind::terminate())` and `tokio::signal::ctrl_c()` directly
//! rather than going through `nix`'s raw signal API (that crate is reserved
//! in this workspace for the supervisor's *outbound* `kill()` calls to its
//! children, a different direction of signal traffic).

use tokio_util::sync::CancellationToken;
use tracing::info;

pub fn spawn_shutdown_handler(cancel: CancellationToken) -> std::io::Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
        }
        cancel.cancel();
    });
    Ok(())
}
