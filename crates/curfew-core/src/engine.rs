//! The enforcer: one monitor tick at a time

use chrono::{DateTime, Local, Utc};
use curfew_api::{Heartbeat, UsageLog, remaining};
use curfew_config::{Config, NextBlock, is_blocked, minutes_until_next_block};
use curfew_host_api::{AudioPlayer, Notifier, ProcessHost};
use curfew_store::{AuditEvent, AuditEventType, AuditLog, CloseReason, Store};
use curfew_util::{AppName, RunMode};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    CoreError, CoreEvent, CoreResult, DeferredQueue, NotificationEngine, ProtectedMode, StopReason,
    Warning,
};

/// Pause after a tick that failed before trying again
pub const TICK_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// What the loop should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickNext {
    Sleep(Duration),
    Stop(StopReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub events: Vec<CoreEvent>,
    pub next: TickNext,
}

impl Tick {
    fn stop(mut events: Vec<CoreEvent>, reason: StopReason) -> Self {
        events.push(CoreEvent::Stopping { reason });
        Self {
            events,
            next: TickNext::Stop(reason),
        }
    }
}

/// Whether a start at this uptime counts as "right after boot".
/// A zero window disables the check.
pub fn started_near_boot(uptime: Option<Duration>, window_secs: u64) -> bool {
    window_secs > 0 && uptime.is_some_and(|up| up.as_secs() <= window_secs)
}

fn stop_reason(config: &Config) -> Option<StopReason> {
    if !config.enabled {
        Some(StopReason::Disabled)
    } else if !config.has_apps() {
        Some(StopReason::NoApps)
    } else {
        None
    }
}

fn warning_event(warning: Warning) -> CoreEvent {
    CoreEvent::Warning {
        kind: warning.kind,
        context: warning.context,
        threshold: warning.threshold,
    }
}

/// Owns every piece of monitor-side state. Construct once per process.
pub struct Enforcer {
    store: Arc<dyn Store>,
    host: Arc<dyn ProcessHost>,
    audit: Option<Arc<dyn AuditLog>>,
    notifications: NotificationEngine,
    queue: DeferredQueue,
    protected: ProtectedMode,
    usage: UsageLog,
    pid: u32,
    event_log_enabled: bool,
}

impl Enforcer {
    pub fn new(
        store: Arc<dyn Store>,
        host: Arc<dyn ProcessHost>,
        notifier: Arc<dyn Notifier>,
        audio: Arc<dyn AudioPlayer>,
        mode: RunMode,
        pid: u32,
    ) -> Self {
        Self {
            queue: DeferredQueue::new(store.clone(), mode),
            protected: ProtectedMode::new(store.clone()),
            store,
            host,
            audit: None,
            notifications: NotificationEngine::new(notifier, audio),
            usage: UsageLog::new(),
            pid,
            event_log_enabled: false,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn usage(&self) -> &UsageLog {
        &self.usage
    }

    /// Load state and announce the monitor. Fails when there is no usable
    /// configuration.
    pub fn start(&mut self, now: DateTime<Local>) -> CoreResult<Tick> {
        let mut config = self.store.load_config()?.ok_or(CoreError::ConfigMissing)?;
        self.event_log_enabled = config.event_log_enabled;

        self.usage = match self.store.load_usage() {
            Ok(usage) => usage,
            Err(e) => {
                warn!(error = %e, "Failed to load usage log, starting fresh");
                UsageLog::new()
            }
        };

        self.beat(Heartbeat::running(self.pid, now.with_timezone(&Utc)));
        self.record(AuditEventType::MonitorStarted { pid: self.pid });
        info!(
            pid = self.pid,
            apps = config.time_limits.dedicated.len(),
            interval_secs = config.check_interval,
            "Monitor started"
        );

        if started_near_boot(self.host.uptime(), config.boot_start_window_seconds) {
            warn!(
                window_secs = config.boot_start_window_seconds,
                "Monitor started shortly after boot"
            );
        }

        match self.protected.verify_config_integrity(&config) {
            Ok(false) => info!("Configuration differs from the last recorded fingerprint"),
            Ok(true) => {}
            Err(e) => debug!(error = %e, "Could not check configuration fingerprint"),
        }

        let mut events = Vec::new();
        self.prepare(&mut config, now, &mut events);

        if let Some(reason) = stop_reason(&config) {
            info!(%reason, "Nothing to enforce");
            return Ok(Tick::stop(events, reason));
        }

        Ok(Tick {
            events,
            next: TickNext::Sleep(config.tick_interval()),
        })
    }

    /// One full pass: reload, apply due changes, enforce, persist.
    /// An `Err` is a transient failure; the caller backs off and retries.
    pub fn tick(&mut self, now: DateTime<Local>) -> CoreResult<Tick> {
        let Some(mut config) = self.store.load_config()? else {
            warn!("Configuration disappeared");
            return Ok(Tick::stop(Vec::new(), StopReason::ConfigMissing));
        };
        self.event_log_enabled = config.event_log_enabled;

        let mut events = Vec::new();
        self.prepare(&mut config, now, &mut events);

        if let Some(reason) = stop_reason(&config) {
            info!(%reason, "Stopping monitor");
            return Ok(Tick::stop(events, reason));
        }

        let today = now.date_naive();
        let apps: Vec<AppName> = config.monitored_apps().cloned().collect();
        self.usage.ensure_apps(today, &apps);

        let running = self.host.running_process_names()?;
        let running_apps: Vec<AppName> = apps
            .iter()
            .filter(|app| running.contains(app.as_str()))
            .cloned()
            .collect();
        let thresholds = config.warning_thresholds();

        if config.notifications_enabled
            && !config.blocked_hours.is_empty()
            && !running_apps.is_empty()
        {
            if let NextBlock::Upcoming { minutes, start } =
                minutes_until_next_block(&now, &config.blocked_hours)
            {
                if minutes > 0 {
                    events.extend(
                        self.notifications
                            .notify_blocked_hours(minutes, &start, &thresholds, today)
                            .map(warning_event),
                    );
                }
            }
        }

        if is_blocked(&now, &config.blocked_hours) {
            let closed: Vec<AppName> = running_apps
                .iter()
                .filter(|app| self.close(app, CloseReason::BlockedHours, &mut events))
                .cloned()
                .collect();
            if !closed.is_empty() {
                info!(count = closed.len(), "Blocked hours enforced");
                self.record(AuditEventType::BlockedHoursEnforced { apps: closed });
            }
            self.persist(now);
            return Ok(Tick {
                events,
                next: TickNext::Sleep(config.tick_interval()),
            });
        }

        let mut closed = HashSet::new();

        for app in &running_apps {
            let Some(limit) = config.dedicated_limit(app) else {
                continue;
            };
            let used = self.usage.record_usage(today, app, config.check_interval);
            let left = remaining(limit, used);
            debug!(app = %app, used_secs = used, remaining_secs = left, "Usage recorded");
            events.push(CoreEvent::UsageRecorded {
                app: app.clone(),
                used_secs: used,
                remaining_secs: left,
            });

            if config.notifications_enabled && left > 0 {
                events.extend(
                    self.notifications
                        .notify_dedicated(app.as_str(), left, &thresholds, today)
                        .map(warning_event),
                );
            }

            if used >= limit {
                info!(app = %app, used_secs = used, limit_secs = limit, "Dedicated limit reached");
                if self.close(app, CloseReason::DedicatedLimit, &mut events) {
                    self.record(AuditEventType::AppClosed {
                        app: app.clone(),
                        reason: CloseReason::DedicatedLimit,
                    });
                    closed.insert(app.clone());
                }
            }
        }

        if let Some(overall) = config.overall_limit() {
            let total = self.usage.total_used(today, &apps);
            let left = remaining(overall, total);

            if config.notifications_enabled && left > 0 && !running_apps.is_empty() {
                events.extend(
                    self.notifications
                        .notify_overall(left, &thresholds, today)
                        .map(warning_event),
                );
            }

            if total >= overall {
                for app in running_apps.iter().filter(|app| !closed.contains(*app)) {
                    info!(app = %app, total_secs = total, limit_secs = overall, "Overall limit reached");
                    if self.close(app, CloseReason::OverallLimit, &mut events) {
                        self.record(AuditEventType::AppClosed {
                            app: app.clone(),
                            reason: CloseReason::OverallLimit,
                        });
                    }
                }
            }
        }

        self.persist(now);
        Ok(Tick {
            events,
            next: TickNext::Sleep(config.tick_interval()),
        })
    }

    /// Final heartbeat and log entry. Never fails.
    pub fn shutdown(&mut self, now: DateTime<Local>, reason: &str) {
        self.beat(Heartbeat::stopped(self.pid, now.with_timezone(&Utc)));
        self.record(AuditEventType::MonitorStopped {
            reason: reason.to_string(),
        });
        info!(pid = self.pid, reason, "Monitor stopped");
    }

    /// Apply due deferred changes and the protected-mode override
    fn prepare(&mut self, config: &mut Config, now: DateTime<Local>, events: &mut Vec<CoreEvent>) {
        let now_utc = now.with_timezone(&Utc);

        match self.queue.apply_due(config, now_utc) {
            Ok(changes) if !changes.is_empty() => {
                for change in &changes {
                    if let Some(app) = change.removed_app() {
                        self.notifications.clear(app.as_str());
                    }
                    self.record(AuditEventType::UpdateApplied {
                        change: change.clone(),
                    });
                }
                if let Err(e) = self.protected.update_config_hash(config) {
                    warn!(error = %e, "Failed to update configuration fingerprint");
                }
                events.push(CoreEvent::UpdatesApplied { changes });
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to apply scheduled limit changes"),
        }

        match self.protected.status(now_utc) {
            Ok(status) => {
                if status.just_expired {
                    self.record(AuditEventType::ProtectedModeExpired);
                    events.push(CoreEvent::ProtectedModeExpired);
                }
                if status.active && !config.enabled {
                    warn!("Protected mode is active, re-enabling enforcement");
                    config.enabled = true;
                    if let Err(e) = self.store.save_config(config) {
                        warn!(error = %e, "Failed to save re-enabled configuration");
                    } else if let Err(e) = self.protected.update_config_hash(config) {
                        warn!(error = %e, "Failed to update configuration fingerprint");
                    }
                    events.push(CoreEvent::EnforcementForced);
                }
            }
            Err(e) => warn!(error = %e, "Failed to read protected-mode state"),
        }
    }

    fn close(&self, app: &AppName, reason: CloseReason, events: &mut Vec<CoreEvent>) -> bool {
        match self.host.kill_by_name(app.as_str()) {
            Ok(count) => {
                info!(app = %app, %reason, processes = count, "Closed app");
                events.push(CoreEvent::AppClosed {
                    app: app.clone(),
                    reason,
                });
                true
            }
            Err(e) => {
                warn!(app = %app, error = %e, "Failed to close app");
                false
            }
        }
    }

    fn persist(&self, now: DateTime<Local>) {
        if let Err(e) = self.store.save_usage(&self.usage) {
            warn!(error = %e, "Failed to save usage log");
        }
        self.beat(Heartbeat::running(self.pid, now.with_timezone(&Utc)));
    }

    fn beat(&self, heartbeat: Heartbeat) {
        if let Err(e) = self.store.write_heartbeat(&heartbeat) {
            warn!(error = %e, "Failed to write heartbeat");
        }
    }

    fn record(&self, event: AuditEventType) {
        if !self.event_log_enabled {
            return;
        }
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.append_audit(AuditEvent::new(event)) {
                warn!(error = %e, "Failed to append to event log");
            }
        }
    }
}
