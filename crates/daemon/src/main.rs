// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! refld: reflection manager daemon

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use refl_daemon::{logging, spawn_snapshotter, startup, Config, DaemonState, LifecycleError};
use refl_engine::WakeupService;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "refld", version, about = "Keeps reflections in sync with their datasets")]
struct Args {
    /// Config file with `[manager]` and `[daemon]` sections (default: $REFL_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Run a single reconciliation pass, save a snapshot and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "refld failed");
            eprintln!("refld: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), LifecycleError> {
    let config = Config::load(args.config.as_deref())?;
    let _guard = logging::init(&config.log_dir)?;
    let daemon = startup(&config)?;

    if args.once {
        daemon.manager.lock().await.run().await;
        return daemon.shutdown();
    }
    serve(daemon).await
}

async fn serve(daemon: DaemonState) -> Result<(), LifecycleError> {
    let cancel = CancellationToken::new();
    let (service, _handle) = WakeupService::new(
        Arc::clone(&daemon.manager),
        daemon.leadership(),
        daemon.config.sync_interval,
        cancel.clone(),
    );
    let service = tokio::spawn(service.run());
    let snapshots = spawn_snapshotter(
        daemon.stores.clone(),
        daemon.config.snapshot_path.clone(),
        daemon.config.snapshot_interval,
        cancel.clone(),
    );
    info!(interval_ms = daemon.config.sync_interval.as_millis() as u64, "refld ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown requested");
    cancel.cancel();
    for (name, task) in [("wakeup service", service), ("snapshotter", snapshots)] {
        if let Err(e) = task.await {
            error!(task = name, error = %e, "task ended abnormally");
        }
    }
    daemon.shutdown()
}
