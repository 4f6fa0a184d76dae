//! curfewd - the curfew monitor
//!
//! Wires together:
//! - The single-instance lock
//! - The file store and event log
//! - The Linux host (processes, notifications, sounds)
//! - The enforcer loop
//!
//! Exit code 0 means the monitor stopped on purpose (disabled, nothing to
//! monitor, or a signal); 1 means it could not start.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use curfew_core::{CoreError, CoreEvent, Enforcer, TICK_ERROR_BACKOFF, TickNext};
use curfew_host_linux::{DesktopNotifier, InstanceLock, LinuxHost, SoundPlayer};
use curfew_store::{FileStore, SqliteAuditLog, Store};
use curfew_util::{DataPaths, RunMode};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// curfewd - enforces daily app time limits and blocked hours
#[derive(Parser, Debug)]
#[command(name = "curfewd")]
#[command(about = "Enforces daily app time limits and blocked hours", long_about = None)]
struct Args {
    /// Data directory override (or set CURFEW_DATA_DIR env var)
    #[arg(short, long, env = "CURFEW_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

fn log_event(event: &CoreEvent) {
    match event {
        CoreEvent::Warning {
            kind,
            context,
            threshold,
        } => info!(%kind, context = %context, threshold, "Warning issued"),
        CoreEvent::EnforcementForced => info!("Enforcement forced on by protected mode"),
        other => debug!(event = ?other, "Tick event"),
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let paths = args
        .data_dir
        .clone()
        .map(DataPaths::new)
        .unwrap_or_else(DataPaths::from_env);
    let mode = RunMode::from_env();

    std::fs::create_dir_all(paths.root())
        .with_context(|| format!("Failed to create data directory {:?}", paths.root()))?;

    let _lock = match InstanceLock::acquire(paths.monitor_lock()) {
        Ok(lock) => lock,
        Err(e) => {
            error!(error = %e, "Another monitor is already running");
            return Ok(ExitCode::from(1));
        }
    };

    let store: Arc<dyn Store> = Arc::new(
        FileStore::open(paths.clone(), mode)
            .with_context(|| format!("Failed to open data directory {:?}", paths.root()))?,
    );
    info!(data_dir = %paths.root().display(), ?mode, "Store initialized");

    let host = Arc::new(LinuxHost::new());
    let mut enforcer = Enforcer::new(
        store,
        host,
        Arc::new(DesktopNotifier::new()),
        Arc::new(SoundPlayer::new(paths.sounds_dir())),
        mode,
        std::process::id(),
    );

    match SqliteAuditLog::open(paths.event_log()) {
        Ok(audit) => enforcer = enforcer.with_audit(Arc::new(audit)),
        Err(e) => warn!(error = %e, "Event log unavailable, continuing without it"),
    }

    let mut next = match enforcer.start(curfew_util::now()) {
        Ok(tick) => {
            tick.events.iter().for_each(log_event);
            tick.next
        }
        Err(CoreError::ConfigMissing) => {
            error!("No configuration available");
            return Ok(ExitCode::from(1));
        }
        Err(e) => {
            error!(error = %e, "Failed to start monitor");
            return Ok(ExitCode::from(1));
        }
    };

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

    let reason = loop {
        let wait = match next {
            TickNext::Stop(reason) => break reason.to_string(),
            TickNext::Sleep(wait) => wait,
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully");
                break "SIGTERM".to_string();
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully");
                break "SIGINT".to_string();
            }
            _ = tokio::time::sleep(wait) => {}
        }

        next = match enforcer.tick(curfew_util::now()) {
            Ok(tick) => {
                tick.events.iter().for_each(log_event);
                tick.next
            }
            Err(e) => {
                warn!(error = %e, backoff_secs = TICK_ERROR_BACKOFF.as_secs(), "Tick failed");
                TickNext::Sleep(TICK_ERROR_BACKOFF)
            }
        };
    };

    enforcer.shutdown(curfew_util::now(), &reason);
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    info!(version = env!("CARGO_PKG_VERSION"), "curfewd starting");

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = format!("{:#}", e), "curfewd failed");
            ExitCode::from(1)
        }
    }
}
