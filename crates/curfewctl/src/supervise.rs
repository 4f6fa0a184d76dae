//! Supervisor loop
//!
//! Runs alongside the monitor: keeps it alive through the watchdog, holds
//! enforcement on while protected mode is active, and reports state changes.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use curfew_api::StateEvent;
use curfew_core::{
    EventBus, ProtectedMode, StateSync, Watchdog, WatchdogAction, started_near_boot,
};
use curfew_host_api::{Notifier, ProcessHost};
use curfew_host_linux::{DesktopNotifier, LinuxHost};
use curfew_store::AuditEventType;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tracing::{debug, info, warn};

use crate::commands::Ctl;

/// How often persisted state is polled for changes
pub const STATE_SYNC_INTERVAL: Duration = Duration::from_secs(2);

struct Supervisor<'a> {
    ctl: &'a Ctl,
    host: Arc<LinuxHost>,
    protected: ProtectedMode,
    watchdog: Watchdog,
    notifier: DesktopNotifier,
    /// The watchdog gave up; only protected mode relaunches until re-enabled
    gave_up: bool,
}

impl Supervisor<'_> {
    fn notify(&self, title: &str, message: &str) {
        if let Err(e) = self.notifier.show(title, message) {
            warn!(error = %e, "Failed to show notification");
        }
    }

    /// One watchdog tick. Returns the interval the next tick should use.
    fn watch(&mut self, now: DateTime<Utc>) -> Option<Duration> {
        let mut config = match self.ctl.load_config() {
            Ok(config) => config,
            Err(e) => {
                warn!(error = format!("{:#}", e), "Failed to load configuration");
                return None;
            }
        };

        let mut protected_active = false;
        match self.protected.status(now) {
            Ok(status) => {
                protected_active = status.active;
                if status.just_expired {
                    info!("Protected mode expired");
                    self.ctl.audit(&config, AuditEventType::ProtectedModeExpired);
                }
                if status.active && !config.enabled {
                    warn!("Protected mode is active, re-enabling enforcement");
                    config.enabled = true;
                    if let Err(e) = self.ctl.save_config(&config) {
                        warn!(error = format!("{:#}", e), "Failed to save re-enabled configuration");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to read protected-mode state"),
        }

        if !config.enabled {
            self.gave_up = false;
            if self.watchdog.is_supervising() {
                info!("Enforcement disabled, stopping supervised monitor");
                self.watchdog.stop();
            }
            return Some(config.watchdog_interval());
        }

        if !config.has_apps() {
            if self.watchdog.is_supervising() {
                info!("No apps to monitor, stopping supervised monitor");
                self.watchdog.stop();
            }
            return Some(config.watchdog_interval());
        }

        if !self.watchdog.is_supervising() {
            let wanted = !self.gave_up || protected_active;
            if wanted && !self.ctl.is_monitoring(&config, &self.host) {
                match self.watchdog.start(now, config.heartbeat_ttl_seconds) {
                    Ok(pid) => {
                        info!(pid, "Monitor launched");
                        self.gave_up = false;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to launch monitor");
                        self.notify("Curfew", &format!("Could not start monitoring: {}", e));
                    }
                }
            }
            return Some(config.watchdog_interval());
        }

        let heartbeat = self.ctl.store().read_heartbeat().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read heartbeat");
            None
        });

        match self.watchdog.check(now, heartbeat.as_ref(), &config) {
            WatchdogAction::None => {}
            WatchdogAction::Exited { pid } => info!(pid, "Monitor exited on its own"),
            WatchdogAction::Restarted { pid } => {
                self.ctl.audit(&config, AuditEventType::WatchdogRestart { pid });
                self.notify("Curfew", "The monitor stopped responding and was restarted");
            }
            WatchdogAction::Stopped { reason } => {
                self.gave_up = true;
                self.ctl.audit(
                    &config,
                    AuditEventType::WatchdogStopped {
                        reason: reason.to_string(),
                    },
                );
                self.notify("Curfew", &format!("Monitoring stopped: {}", reason));
            }
        }

        Some(config.watchdog_interval())
    }

    fn on_state_event(&self, event: StateEvent) {
        match event {
            StateEvent::MonitoringChanged { active } => info!(active, "Monitoring changed"),
            StateEvent::ProtectedModeChanged { active, expires_at } => {
                info!(active, ?expires_at, "Protected mode changed");
                if !active {
                    self.notify("Curfew", "Protected mode has ended");
                }
            }
            StateEvent::ConfigChanged => info!("Configuration changed"),
            StateEvent::HeartbeatStatusChanged { fresh } => debug!(fresh, "Heartbeat changed"),
            StateEvent::MonitorHealthChanged { healthy } => {
                if healthy {
                    info!("Monitor healthy");
                } else {
                    warn!("Monitor unhealthy");
                }
            }
        }
    }
}

pub async fn run(ctl: &Ctl, monitor_bin: Option<PathBuf>) -> Result<()> {
    let host = Arc::new(LinuxHost::new());
    let config = ctl.load_config()?;

    if started_near_boot(host.uptime(), config.boot_start_window_seconds) {
        warn!(
            window_secs = config.boot_start_window_seconds,
            "Supervisor started shortly after boot"
        );
    }

    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let mut sync = StateSync::new(ctl.store(), host.clone(), ctl.protected(), bus);

    let mut supervisor = Supervisor {
        ctl,
        host,
        protected: ctl.protected(),
        watchdog: Watchdog::new(Box::new(ctl.monitor_launcher(monitor_bin))),
        notifier: DesktopNotifier::new(),
        gave_up: false,
    };

    let mut watchdog_period = config.watchdog_interval();
    let mut watchdog_timer = interval(watchdog_period);
    watchdog_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sync_timer = interval(STATE_SYNC_INTERVAL);
    sync_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

    info!(
        data_dir = %ctl.paths().root().display(),
        watchdog_secs = watchdog_period.as_secs(),
        "Supervisor running"
    );

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully");
                break;
            }
            _ = watchdog_timer.tick() => {
                match supervisor.watch(curfew_util::now_utc()) {
                    Some(period) if period != watchdog_period => {
                        debug!(secs = period.as_secs(), "Watchdog interval changed");
                        watchdog_period = period;
                        watchdog_timer = interval_at(Instant::now() + period, period);
                        watchdog_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    }
                    _ => {}
                }
            }
            _ = sync_timer.tick() => {
                if let Err(e) = sync.refresh(curfew_util::now_utc()) {
                    warn!(error = %e, "State refresh failed");
                }
            }
            Some(event) = events.recv() => supervisor.on_state_event(event),
        }
    }

    // The monitor runs in its own session and keeps enforcing after we exit
    if let Some(pid) = supervisor.watchdog.pid() {
        info!(pid, "Leaving monitor running");
    }
    Ok(())
}
