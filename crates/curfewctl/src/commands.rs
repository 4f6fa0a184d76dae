//! One-shot commands against the data directory

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, Utc};
use curfew_api::{LimitChange, remaining};
use curfew_config::{
    BlockedRange, Config, NextBlock, minutes_until_next_block, validate_blocked_hours,
    validate_warning_thresholds,
};
use curfew_core::{DeferredQueue, ProtectedMode, ScheduleOutcome, detect_monitoring};
use curfew_host_api::MonitorLauncher;
use curfew_host_linux::{ChildMonitorLauncher, LinuxHost};
use curfew_store::{AuditEvent, AuditEventType, AuditLog, FileStore, SqliteAuditLog, Store};
use curfew_util::{AppName, CurfewError, DataPaths, RunMode, format_duration};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::prompt;

/// Monitor binary looked up next to `curfewctl`, then on `PATH`
pub const MONITOR_BIN: &str = "curfewd";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Handle on one data directory
pub struct Ctl {
    paths: DataPaths,
    mode: RunMode,
    store: Arc<dyn Store>,
}

impl Ctl {
    pub fn open(paths: DataPaths, mode: RunMode) -> Result<Self> {
        std::fs::create_dir_all(paths.root())
            .with_context(|| format!("Failed to create data directory {:?}", paths.root()))?;
        let store = FileStore::open(paths.clone(), mode)
            .with_context(|| format!("Failed to open data directory {:?}", paths.root()))?;
        Ok(Self {
            paths,
            mode,
            store: Arc::new(store),
        })
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn protected(&self) -> ProtectedMode {
        ProtectedMode::new(self.store.clone())
    }

    pub fn load_config(&self) -> Result<Config> {
        self.store
            .load_config()?
            .ok_or_else(|| CurfewError::ConfigMissing.into())
    }

    /// Save and refresh the integrity fingerprint
    pub fn save_config(&self, config: &Config) -> Result<()> {
        self.store.save_config(config)?;
        self.protected().update_config_hash(config)?;
        Ok(())
    }

    pub fn audit(&self, config: &Config, event: AuditEventType) {
        if !config.event_log_enabled {
            return;
        }
        let result = SqliteAuditLog::open(self.paths.event_log())
            .and_then(|log| log.append_audit(AuditEvent::new(event)));
        if let Err(e) = result {
            warn!(error = %e, "Failed to append to event log");
        }
    }

    fn ensure_unprotected(&self, action: &str) -> Result<()> {
        if self.protected().is_active(curfew_util::now_utc())? {
            bail!(CurfewError::protected(action));
        }
        Ok(())
    }

    /// Launcher for the monitor, pointed at this data directory
    pub fn monitor_launcher(&self, monitor_bin: Option<PathBuf>) -> ChildMonitorLauncher {
        let program = monitor_bin.unwrap_or_else(default_monitor_bin);
        ChildMonitorLauncher::new(program)
            .arg("--data-dir")
            .arg(self.paths.root().to_string_lossy())
    }

    pub fn is_monitoring(&self, config: &Config, host: &LinuxHost) -> bool {
        let heartbeat = self.store.read_heartbeat().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read heartbeat");
            None
        });
        detect_monitoring(config, heartbeat.as_ref(), host, curfew_util::now_utc())
    }
}

fn default_monitor_bin() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(MONITOR_BIN)))
        .filter(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from(MONITOR_BIN))
}

fn local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(TIME_FORMAT).to_string()
}

fn secs(value: u64) -> String {
    format_duration(Duration::from_secs(value))
}

fn app_name(name: &str) -> Result<AppName> {
    let app = AppName::new(name.trim());
    if app.is_empty() {
        bail!(CurfewError::invalid("Application names cannot be empty"));
    }
    Ok(app)
}

fn minutes_to_secs(minutes: u64) -> Result<u64> {
    minutes
        .checked_mul(60)
        .ok_or_else(|| CurfewError::invalid(format!("{} minutes is out of range", minutes)).into())
}

pub fn status(ctl: &Ctl) -> Result<()> {
    let now = curfew_util::now();
    let now_utc = now.with_timezone(&Utc);
    let today = now.date_naive();
    let config = ctl.load_config()?;
    let host = LinuxHost::new();

    println!(
        "Enforcement: {}",
        if config.enabled { "enabled" } else { "disabled" }
    );
    println!(
        "Monitor:     {}",
        if ctl.is_monitoring(&config, &host) {
            "running"
        } else {
            "not running"
        }
    );
    if let Ok(Some(heartbeat)) = ctl.store.read_heartbeat() {
        let age = heartbeat.age(now_utc).to_std().unwrap_or_default();
        println!(
            "  Last heartbeat {} ago ({:?}, pid {})",
            format_duration(age),
            heartbeat.status,
            heartbeat.pid
        );
    }

    let protected = ctl.protected().status(now_utc)?;
    match protected.expires_at {
        Some(expires_at) if protected.active => {
            println!("Protected:   active until {}", local(expires_at))
        }
        _ => println!("Protected:   inactive"),
    }

    let usage = ctl.store.load_usage().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to read usage log");
        Default::default()
    });

    println!();
    if config.has_apps() {
        println!("Apps (today):");
        for app in config.monitored_apps() {
            let used = usage.used(today, app);
            match config.dedicated_limit(app).filter(|limit| *limit > 0) {
                Some(limit) => println!(
                    "  {:<24} {} of {} ({} left)",
                    app.as_str(),
                    secs(used),
                    secs(limit),
                    secs(remaining(limit, used).max(0).unsigned_abs())
                ),
                None => println!("  {:<24} {} (no dedicated limit)", app.as_str(), secs(used)),
            }
        }
    } else {
        println!("No apps are monitored");
    }

    if let Some(limit) = config.overall_limit() {
        let total = usage.total_used(today, config.monitored_apps());
        println!(
            "Overall: {} of {} ({} left)",
            secs(total),
            secs(limit),
            secs(remaining(limit, total).max(0).unsigned_abs())
        );
    }

    if !config.blocked_hours.is_empty() {
        match minutes_until_next_block(&now, &config.blocked_hours) {
            NextBlock::AlreadyBlocked => println!("Blocked hours: in effect now"),
            NextBlock::Upcoming { minutes, start } => {
                println!("Blocked hours: next at {} (in {} min)", start, minutes)
            }
            NextBlock::NoneScheduled => println!("Blocked hours: none valid"),
        }
    }

    let pending = DeferredQueue::new(ctl.store(), ctl.mode).pending(now_utc)?;
    if !pending.is_empty() {
        println!();
        println!("Pending changes:");
        for update in pending {
            println!("  {} at {}", update.change, local(update.apply_at));
        }
    }

    Ok(())
}

pub fn start(ctl: &Ctl, monitor_bin: Option<PathBuf>) -> Result<()> {
    let mut config = ctl.load_config()?;
    if !config.has_apps() {
        bail!("No apps are monitored; add one with `curfewctl limit set`");
    }
    if !config.enabled {
        config.enabled = true;
        ctl.save_config(&config)?;
        info!("Enforcement enabled");
    }

    if ctl.is_monitoring(&config, &LinuxHost::new()) {
        println!("Monitoring enabled; the monitor is already running");
        return Ok(());
    }

    let handle = ctl
        .monitor_launcher(monitor_bin)
        .launch()
        .context("Failed to launch the monitor")?;
    println!("Monitoring enabled (monitor pid {})", handle.pid());
    Ok(())
}

pub fn stop(ctl: &Ctl) -> Result<()> {
    ctl.ensure_unprotected("stop monitoring")?;
    let mut config = ctl.load_config()?;
    if !config.enabled {
        println!("Monitoring is already disabled");
        return Ok(());
    }
    config.enabled = false;
    ctl.save_config(&config)?;
    println!("Monitoring disabled; the monitor exits at its next check");
    Ok(())
}

/// Queue a limit change, or apply it now in development mode
pub fn schedule(ctl: &Ctl, change: LimitChange) -> Result<ScheduleOutcome> {
    let config = ctl.load_config()?;
    let queue = DeferredQueue::new(ctl.store(), ctl.mode);

    let outcome = queue.schedule(
        change.clone(),
        config.time_limit_update_delay_hours,
        curfew_util::now_utc(),
    )?;

    match &outcome {
        ScheduleOutcome::Scheduled { apply_at } => {
            ctl.audit(
                &config,
                AuditEventType::UpdateScheduled {
                    change: change.clone(),
                    apply_at: *apply_at,
                },
            );
            println!("Scheduled: {} (takes effect {})", change, local(*apply_at));
        }
        ScheduleOutcome::AppliedNow => {
            let config = ctl.load_config()?;
            ctl.protected().update_config_hash(&config)?;
            ctl.audit(&config, AuditEventType::UpdateApplied { change: change.clone() });
            println!("Applied: {}", change);
        }
    }
    Ok(outcome)
}

pub fn limit_set(ctl: &Ctl, app: &str, minutes: u64) -> Result<ScheduleOutcome> {
    let change = LimitChange::SetLimit {
        app: app_name(app)?,
        limit: minutes_to_secs(minutes)?,
    };
    schedule(ctl, change)
}

pub fn limit_remove(ctl: &Ctl, app: &str) -> Result<ScheduleOutcome> {
    let app = app_name(app)?;
    if ctl.load_config()?.dedicated_limit(&app).is_none() {
        bail!(CurfewError::AppNotMonitored(app));
    }
    schedule(ctl, LimitChange::RemoveApp { app })
}

/// Rename an app's key, keeping its limit unless `minutes` is given
pub fn limit_rename(ctl: &Ctl, old: &str, new: &str, minutes: Option<u64>) -> Result<ScheduleOutcome> {
    let old_app = app_name(old)?;
    let new_app = app_name(new)?;
    let current = ctl.load_config()?.dedicated_limit(&old_app);

    let limit = match (minutes, current) {
        (Some(minutes), _) => minutes_to_secs(minutes)?,
        (None, Some(limit)) => limit,
        (None, None) => bail!(CurfewError::AppNotMonitored(old_app)),
    };

    schedule(
        ctl,
        LimitChange::ReplaceApp {
            old_app: Some(old_app),
            new_app,
            limit,
        },
    )
}

pub fn overall(ctl: &Ctl, minutes: u64) -> Result<ScheduleOutcome> {
    let limit = minutes_to_secs(minutes)?;
    schedule(ctl, LimitChange::SetOverall { limit })
}

pub fn blocked_list(ctl: &Ctl) -> Result<()> {
    let config = ctl.load_config()?;
    if config.blocked_hours.is_empty() {
        println!("No blocked hours configured");
        return Ok(());
    }
    for (i, range) in config.blocked_hours.iter().enumerate() {
        let note = match range.window() {
            Ok(window) if window.wraps_midnight() => " (overnight)",
            Ok(_) => "",
            Err(_) => " (invalid, ignored)",
        };
        println!("  {}. {} - {}{}", i + 1, range.start, range.end, note);
    }
    Ok(())
}

pub fn blocked_add(ctl: &Ctl, start: &str, end: &str) -> Result<()> {
    let mut config = ctl.load_config()?;
    let mut ranges = config.blocked_hours.clone();
    ranges.push(BlockedRange::new(start.trim(), end.trim()));
    validate_blocked_hours(&ranges, None).map_err(CurfewError::invalid)?;

    config.blocked_hours = ranges;
    ctl.save_config(&config)?;
    println!("Blocked hours added: {} - {}", start.trim(), end.trim());
    Ok(())
}

/// Replace range `index` (1-based)
pub fn blocked_edit(ctl: &Ctl, index: usize, start: &str, end: &str) -> Result<()> {
    ctl.ensure_unprotected("edit blocked hours")?;
    let mut config = ctl.load_config()?;
    let slot = blocked_index(&config, index)?;

    let mut ranges = config.blocked_hours.clone();
    ranges[slot] = BlockedRange::new(start.trim(), end.trim());
    validate_blocked_hours(&ranges, None).map_err(CurfewError::invalid)?;

    config.blocked_hours = ranges;
    ctl.save_config(&config)?;
    println!("Blocked hours {} set to {} - {}", index, start.trim(), end.trim());
    Ok(())
}

pub fn blocked_remove(ctl: &Ctl, index: usize) -> Result<()> {
    ctl.ensure_unprotected("remove blocked hours")?;
    let mut config = ctl.load_config()?;
    let slot = blocked_index(&config, index)?;

    let removed = config.blocked_hours.remove(slot);
    ctl.save_config(&config)?;
    println!("Blocked hours removed: {} - {}", removed.start, removed.end);
    Ok(())
}

fn blocked_index(config: &Config, index: usize) -> Result<usize> {
    if index == 0 || index > config.blocked_hours.len() {
        bail!(CurfewError::invalid(format!(
            "No blocked-hours range {} ({} configured)",
            index,
            config.blocked_hours.len()
        )));
    }
    Ok(index - 1)
}

pub fn warnings(ctl: &Ctl, text: &str) -> Result<()> {
    validate_warning_thresholds(text).map_err(CurfewError::invalid)?;
    let mut config = ctl.load_config()?;
    config.notification_warning_minutes = text.trim().to_string();
    ctl.save_config(&config)?;

    let thresholds: Vec<String> = config
        .warning_thresholds()
        .iter()
        .map(u32::to_string)
        .collect();
    println!("Warnings at {} minutes", thresholds.join(", "));
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    Autostart,
    MinimizeToTray,
}

pub fn set_preference(ctl: &Ctl, preference: Preference, on: bool) -> Result<()> {
    ctl.ensure_unprotected("change preferences")?;
    let mut config = ctl.load_config()?;
    match preference {
        Preference::Autostart => config.autostart = on,
        Preference::MinimizeToTray => config.minimize_to_tray = on,
    }
    ctl.save_config(&config)?;
    println!("{:?} {}", preference, if on { "on" } else { "off" });
    Ok(())
}

pub fn protect_setup(ctl: &Ctl) -> Result<()> {
    let protected = ctl.protected();
    if protected.is_password_set()? && !prompt::confirm("A password is already set. Replace it?")? {
        bail!("Cancelled");
    }
    let password = prompt::new_password("New password")?;
    protected.setup_password(&password, curfew_util::now_utc())?;
    println!("Password set. Activate with `curfewctl protect activate --days N`");
    Ok(())
}

/// Set a password nobody sees, then lock for `days`
pub fn protect_setup_hidden(ctl: &Ctl, days: i64) -> Result<()> {
    if !prompt::confirm(&format!(
        "Protected mode cannot be ended early with a hidden password. Lock for {} day(s)?",
        days
    ))? {
        bail!("Cancelled");
    }
    let protected = ctl.protected();
    let now = curfew_util::now_utc();
    protected.setup_generated_password(now)?;
    activate(ctl, &protected, days, now)
}

pub fn protect_activate(ctl: &Ctl, days: i64) -> Result<()> {
    let protected = ctl.protected();
    if !protected.is_password_set()? {
        bail!("Set a password first with `curfewctl protect setup`");
    }
    if !prompt::confirm(&format!(
        "Monitoring cannot be stopped without the password for {} day(s). Continue?",
        days
    ))? {
        bail!("Cancelled");
    }
    activate(ctl, &protected, days, curfew_util::now_utc())
}

fn activate(ctl: &Ctl, protected: &ProtectedMode, days: i64, now: DateTime<Utc>) -> Result<()> {
    let expires_at = protected.activate(days, now)?;

    let mut config = ctl.load_config()?;
    if !config.enabled {
        config.enabled = true;
        ctl.save_config(&config)?;
    }
    ctl.audit(&config, AuditEventType::ProtectedModeActivated { expires_at });
    println!("Protected mode active until {}", local(expires_at));
    Ok(())
}

pub fn protect_deactivate(ctl: &Ctl) -> Result<()> {
    let protected = ctl.protected();
    let status = protected.status(curfew_util::now_utc())?;
    if !status.active {
        bail!("Protected mode is not active");
    }
    if status.hidden_password {
        bail!("Protected mode was set up with a hidden password and ends on its own");
    }

    prompt::with_attempts("Password", |password| {
        Ok(protected
            .deactivate(password, curfew_util::now_utc())?
            .then_some(()))
    })?;

    ctl.audit(&ctl.load_config()?, AuditEventType::ProtectedModeDeactivated);
    println!("Protected mode deactivated");
    Ok(())
}

pub fn protect_change_password(ctl: &Ctl) -> Result<()> {
    let protected = ctl.protected();
    if !protected.is_password_set()? {
        bail!("No password is set");
    }

    let old = prompt::with_attempts("Current password", |password| {
        Ok(protected
            .verify_password(password)?
            .then(|| password.to_string()))
    })?;
    let new = prompt::new_password("New password")?;

    if !protected.change_password(&old, &new, curfew_util::now_utc())? {
        bail!("Incorrect password");
    }
    ctl.audit(&ctl.load_config()?, AuditEventType::PasswordChanged);
    println!("Password changed");
    Ok(())
}

pub fn protect_status(ctl: &Ctl) -> Result<()> {
    let protected = ctl.protected();
    let status = protected.status(curfew_util::now_utc())?;

    println!(
        "Password: {}",
        if !protected.is_password_set()? {
            "not set"
        } else if status.hidden_password {
            "hidden"
        } else {
            "set"
        }
    );
    match status.expires_at {
        Some(expires_at) if status.active => println!("Active until {}", local(expires_at)),
        _ => println!("Inactive"),
    }

    let config = ctl.load_config()?;
    if !protected.verify_config_integrity(&config)? {
        println!("Configuration changed outside curfewctl since it was last saved");
    }
    Ok(())
}

pub fn log(ctl: &Ctl, limit: usize) -> Result<()> {
    let log = SqliteAuditLog::open(ctl.paths.event_log())
        .with_context(|| format!("Failed to open event log {:?}", ctl.paths.event_log()))?;
    let events = log.get_recent_audits(limit)?;
    if events.is_empty() {
        println!("No events recorded");
    }
    for event in events {
        println!("{}  {}", event.timestamp.format("%Y-%m-%d %H:%M:%S"), event.event);
    }
    Ok(())
}
