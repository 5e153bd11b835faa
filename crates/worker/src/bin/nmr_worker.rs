// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `nmr-worker`: the OS process the supervisor execs once per pool slot
//! (§4.4). Parses the CLI flags `worker_args` builds, opens its own durable
//! storage handle, and hands off to [`nomarr_worker::run`] until it observes
//! a shutdown signal or `run` returns a terminal exit code.

use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;

use clap::Parser;
use nomarr_adapters::NullAdapter;
use nomarr_core::{QueueType, SystemClock};
use nomarr_storage::FileStorage;
use nomarr_worker::WorkerConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// CLI surface mirroring `nomarr_supervisor::process::worker_args` exactly —
/// the supervisor and this binary must agree on flag names independently of
/// each other, so both sides are checked against the same flag list in
/// `nomarr-specs`' integration tests.
#[derive(Parser, Debug)]
#[command(name = "nmr-worker")]
struct Args {
    #[arg(long)]
    queue_type: String,

    #[arg(long)]
    worker_id: u32,

    #[arg(long)]
    state_dir: String,

    #[arg(long, default_value_t = 2_000)]
    poll_interval_ms: u64,

    #[arg(long, default_value_t = 5_000)]
    heartbeat_interval_ms: u64,

    #[arg(long, default_value_t = 0)]
    restart_count: u32,
}

#[tokio::main]
async fn main() -> ProcessExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let queue_type = QueueType::new(&args.queue_type);
    let name = format!("worker:{}:{}", queue_type, args.worker_id);
    let mut config = WorkerConfig::new(name, queue_type, args.worker_id);
    config.poll_interval_ms = args.poll_interval_ms;
    config.heartbeat_interval_ms = args.heartbeat_interval_ms;
    config.restart_count = args.restart_count;

    let storage = match FileStorage::open(&args.state_dir) {
        Ok(storage) => Arc::new(storage),
        Err(err) => {
            tracing::error!(error = %err, state_dir = %args.state_dir, "failed to open storage");
            return ProcessExitCode::from(2);
        }
    };

    let cancel = CancellationToken::new();
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
        }
        shutdown_cancel.cancel();
    });

    let adapter = Arc::new(NullAdapter);
    let pid = std::process::id();
    let exit_code = nomarr_worker::run(config, storage, SystemClock, adapter, pid, cancel).await;

    ProcessExitCode::from(exit_code.as_code() as u8)
}
