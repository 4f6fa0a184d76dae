//! curfewctl - supervise and configure curfew
//!
//! One-shot commands edit the shared data directory; `supervise` runs the
//! long-lived watchdog next to the monitor.

mod commands;
mod prompt;
mod supervise;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{Ctl, Preference};
use curfew_util::{DataPaths, RunMode};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn is_on(self) -> bool {
        self == Self::On
    }
}

/// curfewctl - control daily app time limits and blocked hours
#[derive(Parser, Debug)]
#[command(name = "curfewctl", version)]
#[command(about = "Control daily app time limits and blocked hours", long_about = None)]
struct Args {
    /// Data directory override (or set CURFEW_DATA_DIR env var)
    #[arg(short, long, global = true, env = "CURFEW_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, global = true, default_value = "warn")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show enforcement, usage, protected mode and pending changes
    Status,

    /// Enable enforcement and launch the monitor
    Start {
        /// Monitor binary (defaults to curfewd next to this binary)
        #[arg(long, env = "CURFEW_MONITOR_BIN")]
        monitor_bin: Option<PathBuf>,
    },

    /// Disable enforcement
    Stop,

    /// Edit per-app limits (applied after the update delay)
    Limit {
        #[command(subcommand)]
        action: LimitCommand,
    },

    /// Set the overall daily limit in minutes; 0 disables it
    Overall { minutes: u64 },

    /// Manage blocked hours
    Blocked {
        #[command(subcommand)]
        action: BlockedCommand,
    },

    /// Set warning thresholds, e.g. "10,5,1"
    Warnings { minutes: String },

    /// Set preferences
    Pref {
        #[command(subcommand)]
        action: PrefCommand,
    },

    /// Manage protected mode
    Protect {
        #[command(subcommand)]
        action: ProtectCommand,
    },

    /// Show recent events
    Log {
        /// Number of events to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Run the supervisor: keeps the monitor alive and enforces protected mode
    Supervise {
        /// Monitor binary (defaults to curfewd next to this binary)
        #[arg(long, env = "CURFEW_MONITOR_BIN")]
        monitor_bin: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum LimitCommand {
    /// Add an app or change its limit
    Set { app: String, minutes: u64 },
    /// Stop monitoring an app
    Remove { app: String },
    /// Rename an app, keeping its limit unless --minutes is given
    Rename {
        old: String,
        new: String,
        #[arg(long)]
        minutes: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum BlockedCommand {
    /// List blocked-hours ranges
    List,
    /// Add a range, e.g. `22:00 07:00`
    Add { start: String, end: String },
    /// Replace a range by its number in `list`
    Edit {
        index: usize,
        start: String,
        end: String,
    },
    /// Remove a range by its number in `list`
    Remove { index: usize },
}

#[derive(Subcommand, Debug)]
enum PrefCommand {
    /// Start monitoring at login
    Autostart {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Minimize to the tray instead of closing
    Tray {
        #[arg(value_enum)]
        state: Toggle,
    },
}

#[derive(Subcommand, Debug)]
enum ProtectCommand {
    /// Set the protected-mode password
    Setup,
    /// Lock with a random password nobody sees
    SetupHidden {
        #[arg(long)]
        days: i64,
    },
    /// Turn protected mode on
    Activate {
        #[arg(long)]
        days: i64,
    },
    /// Turn protected mode off (requires the password)
    Deactivate,
    /// Change the password
    ChangePassword,
    /// Show protected-mode state
    Status,
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let paths = args
        .data_dir
        .clone()
        .map(DataPaths::new)
        .unwrap_or_else(DataPaths::from_env);
    let ctl = Ctl::open(paths, RunMode::from_env())?;
    info!(data_dir = %ctl.paths().root().display(), mode = ?ctl.mode(), "curfewctl");

    match args.command {
        Command::Status => commands::status(&ctl),
        Command::Start { monitor_bin } => commands::start(&ctl, monitor_bin),
        Command::Stop => commands::stop(&ctl),
        Command::Limit { action } => match action {
            LimitCommand::Set { app, minutes } => commands::limit_set(&ctl, &app, minutes).map(drop),
            LimitCommand::Remove { app } => commands::limit_remove(&ctl, &app).map(drop),
            LimitCommand::Rename { old, new, minutes } => {
                commands::limit_rename(&ctl, &old, &new, minutes).map(drop)
            }
        },
        Command::Overall { minutes } => commands::overall(&ctl, minutes).map(drop),
        Command::Blocked { action } => match action {
            BlockedCommand::List => commands::blocked_list(&ctl),
            BlockedCommand::Add { start, end } => commands::blocked_add(&ctl, &start, &end),
            BlockedCommand::Edit { index, start, end } => {
                commands::blocked_edit(&ctl, index, &start, &end)
            }
            BlockedCommand::Remove { index } => commands::blocked_remove(&ctl, index),
        },
        Command::Warnings { minutes } => commands::warnings(&ctl, &minutes),
        Command::Pref { action } => match action {
            PrefCommand::Autostart { state } => {
                commands::set_preference(&ctl, Preference::Autostart, state.is_on())
            }
            PrefCommand::Tray { state } => {
                commands::set_preference(&ctl, Preference::MinimizeToTray, state.is_on())
            }
        },
        Command::Protect { action } => match action {
            ProtectCommand::Setup => commands::protect_setup(&ctl),
            ProtectCommand::SetupHidden { days } => commands::protect_setup_hidden(&ctl, days),
            ProtectCommand::Activate { days } => commands::protect_activate(&ctl, days),
            ProtectCommand::Deactivate => commands::protect_deactivate(&ctl),
            ProtectCommand::ChangePassword => commands::protect_change_password(&ctl),
            ProtectCommand::Status => commands::protect_status(&ctl),
        },
        Command::Log { limit } => commands::log(&ctl, limit),
        Command::Supervise { monitor_bin } => supervise::run(&ctl, monitor_bin).await,
    }
}
