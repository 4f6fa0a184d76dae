//! Monitor supervision
//!
//! Liveness is judged from two independent signals: the child handle and
//! the heartbeat file. A grace window after each (re)start keeps a slow
//! first tick from being mistaken for a hang.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use curfew_api::Heartbeat;
use curfew_config::Config;
use curfew_host_api::{HostResult, MonitorHandle, MonitorLauncher};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogStopReason {
    /// Exited while the watchdog is disabled
    MonitorExited,
    /// Dead or hung, and restarts are turned off
    RestartDisabled,
    /// Dead or hung, and relaunching failed
    RestartFailed(String),
}

impl fmt::Display for WatchdogStopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MonitorExited => write!(f, "monitor exited"),
            Self::RestartDisabled => write!(f, "monitor unresponsive and restart is disabled"),
            Self::RestartFailed(e) => write!(f, "monitor restart failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogAction {
    None,
    /// The monitor stopped itself and left a matching `stopped` heartbeat
    Exited { pid: u32 },
    Stopped { reason: WatchdogStopReason },
    Restarted { pid: u32 },
}

pub struct Watchdog {
    launcher: Box<dyn MonitorLauncher>,
    handle: Option<Box<dyn MonitorHandle>>,
    grace_until: Option<DateTime<Utc>>,
    /// Set by a relaunch, cleared once the new monitor heartbeats or its
    /// grace window runs out. No further restart is attempted meanwhile.
    restarting: bool,
}

fn grace_deadline(now: DateTime<Utc>, ttl_secs: u64) -> DateTime<Utc> {
    let ttl = ChronoDuration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX / 1000));
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl Watchdog {
    pub fn new(launcher: Box<dyn MonitorLauncher>) -> Self {
        Self {
            launcher,
            handle: None,
            grace_until: None,
            restarting: false,
        }
    }

    /// Launch the monitor if it is not already supervised
    pub fn start(&mut self, now: DateTime<Utc>, heartbeat_ttl: u64) -> HostResult<u32> {
        if let Some(handle) = self.handle.as_mut() {
            if handle.is_alive() {
                return Ok(handle.pid());
            }
        }

        let handle = self.launcher.launch()?;
        let pid = handle.pid();
        self.handle = Some(handle);
        self.grace_until = Some(grace_deadline(now, heartbeat_ttl));
        info!(pid, "Monitor started");
        Ok(pid)
    }

    /// Terminate the supervised monitor, if any
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            let pid = handle.pid();
            if let Err(e) = handle.terminate() {
                warn!(pid, error = %e, "Failed to terminate monitor");
            } else {
                info!(pid, "Monitor stopped");
            }
        }
        self.grace_until = None;
        self.restarting = false;
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(|h| h.pid())
    }

    pub fn is_supervising(&self) -> bool {
        self.handle.is_some()
    }

    pub fn in_grace(&self, now: DateTime<Utc>) -> bool {
        self.grace_until.is_some_and(|deadline| now < deadline)
    }

    /// One watchdog tick
    pub fn check(
        &mut self,
        now: DateTime<Utc>,
        heartbeat: Option<&Heartbeat>,
        config: &Config,
    ) -> WatchdogAction {
        let Some(handle) = self.handle.as_mut() else {
            return WatchdogAction::None;
        };

        let pid = handle.pid();
        let alive = handle.is_alive();
        let own = heartbeat.filter(|hb| hb.pid == pid);
        let fresh = heartbeat.is_some_and(|hb| hb.is_fresh(now, config.heartbeat_ttl_seconds));
        let in_grace = self.in_grace(now);

        if self.restarting {
            let settled = own.is_some_and(|hb| hb.is_fresh(now, config.heartbeat_ttl_seconds));
            if !settled && in_grace {
                debug!(pid, "Restart still settling");
                return WatchdogAction::None;
            }
            self.restarting = false;
        }

        if fresh && !in_grace && self.grace_until.is_some() {
            debug!(pid, "Grace window over, heartbeat fresh");
            self.grace_until = None;
        }

        let clean_exit = own.is_some_and(|hb| {
            !hb.is_running() && hb.is_fresh(now, config.heartbeat_ttl_seconds)
        });
        if !alive && clean_exit {
            info!(pid, "Monitor stopped itself");
            self.handle = None;
            self.grace_until = None;
            return WatchdogAction::Exited { pid };
        }

        if alive && (fresh || in_grace) {
            return WatchdogAction::None;
        }

        if !config.watchdog_enabled {
            if alive {
                return WatchdogAction::None;
            }
            info!(pid, "Monitor exited; watchdog disabled");
            self.handle = None;
            self.grace_until = None;
            return WatchdogAction::Stopped {
                reason: WatchdogStopReason::MonitorExited,
            };
        }

        warn!(pid, alive, fresh, "Monitor unhealthy");

        if !config.watchdog_restart {
            self.stop();
            return WatchdogAction::Stopped {
                reason: WatchdogStopReason::RestartDisabled,
            };
        }

        self.restart(now, config.heartbeat_ttl_seconds)
    }

    fn restart(&mut self, now: DateTime<Utc>, heartbeat_ttl: u64) -> WatchdogAction {
        self.stop();
        match self.start(now, heartbeat_ttl) {
            Ok(pid) => {
                info!(pid, "Watchdog restarted monitor");
                self.restarting = true;
                WatchdogAction::Restarted { pid }
            }
            Err(e) => {
                warn!(error = %e, "Watchdog failed to restart monitor");
                WatchdogAction::Stopped {
                    reason: WatchdogStopReason::RestartFailed(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use curfew_host_api::MockHost;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn config() -> Config {
        Config {
            enabled: true,
            heartbeat_ttl_seconds: 70,
            ..Default::default()
        }
    }

    fn started() -> (MockHost, Watchdog, u32) {
        let host = MockHost::new();
        let mut watchdog = Watchdog::new(Box::new(host.clone()));
        let pid = watchdog.start(t0(), 70).unwrap();
        (host, watchdog, pid)
    }

    #[test]
    fn test_fresh_and_alive_is_left_alone() {
        let (host, mut watchdog, pid) = started();
        let later = t0() + ChronoDuration::seconds(200);
        let hb = Heartbeat::running(pid, later - ChronoDuration::seconds(10));

        assert_eq!(watchdog.check(later, Some(&hb), &config()), WatchdogAction::None);
        assert_eq!(host.launches().len(), 1);
        assert!(host.terminations().is_empty());
    }

    #[test]
    fn test_grace_suppresses_missing_heartbeat() {
        let (host, mut watchdog, _pid) = started();
        let soon = t0() + ChronoDuration::seconds(30);

        assert_eq!(watchdog.check(soon, None, &config()), WatchdogAction::None);
        assert_eq!(host.launches().len(), 1);
    }

    #[test]
    fn test_stale_heartbeat_restarts_once() {
        let (host, mut watchdog, pid) = started();
        let later = t0() + ChronoDuration::seconds(300);
        let stale = Heartbeat::running(pid, t0());

        let action = watchdog.check(later, Some(&stale), &config());
        let WatchdogAction::Restarted { pid: new_pid } = action else {
            panic!("expected restart, got {:?}", action);
        };

        assert_ne!(new_pid, pid);
        assert_eq!(host.terminations(), vec![pid]);
        assert_eq!(host.launches(), vec![pid, new_pid]);
        assert!(watchdog.in_grace(later));
        assert!(!watchdog.in_grace(later + ChronoDuration::seconds(70)));

        // Same stale heartbeat, but the new monitor is in its grace window
        assert_eq!(watchdog.check(later, Some(&stale), &config()), WatchdogAction::None);
        assert_eq!(host.launches().len(), 2);
    }

    #[test]
    fn test_dead_process_restarts() {
        let (host, mut watchdog, pid) = started();
        host.crash_monitor(pid);

        let action = watchdog.check(t0() + ChronoDuration::seconds(1), None, &config());
        assert!(matches!(action, WatchdogAction::Restarted { .. }));
    }

    #[test]
    fn test_restart_disabled_stops() {
        let (host, mut watchdog, pid) = started();
        host.crash_monitor(pid);
        let config = Config {
            watchdog_restart: false,
            ..config()
        };

        let action = watchdog.check(t0() + ChronoDuration::seconds(1), None, &config);
        assert_eq!(
            action,
            WatchdogAction::Stopped {
                reason: WatchdogStopReason::RestartDisabled
            }
        );
        assert!(!watchdog.is_supervising());
        assert_eq!(host.launches().len(), 1);
    }

    #[test]
    fn test_watchdog_disabled_stops_on_exit() {
        let (host, mut watchdog, pid) = started();
        let config = Config {
            watchdog_enabled: false,
            ..config()
        };

        let later = t0() + ChronoDuration::seconds(300);
        assert_eq!(watchdog.check(later, None, &config), WatchdogAction::None);

        host.crash_monitor(pid);
        assert_eq!(
            watchdog.check(later, None, &config),
            WatchdogAction::Stopped {
                reason: WatchdogStopReason::MonitorExited
            }
        );
        assert!(host.terminations().is_empty());
    }

    #[test]
    fn test_failed_relaunch_stops() {
        let (host, mut watchdog, pid) = started();
        host.crash_monitor(pid);
        *host.fail_launch.lock().unwrap() = true;

        let action = watchdog.check(t0() + ChronoDuration::seconds(1), None, &config());
        assert!(matches!(
            action,
            WatchdogAction::Stopped {
                reason: WatchdogStopReason::RestartFailed(_)
            }
        ));
        assert!(!watchdog.is_supervising());
    }

    #[test]
    fn test_grace_cleared_by_fresh_heartbeat() {
        let (_host, mut watchdog, pid) = started();
        let after_grace = t0() + ChronoDuration::seconds(80);
        let hb = Heartbeat::running(pid, after_grace);

        assert_eq!(watchdog.check(after_grace, Some(&hb), &config()), WatchdogAction::None);
        assert!(!watchdog.in_grace(after_grace));
        assert!(watchdog.grace_until.is_none());
    }

    #[test]
    fn test_self_stopped_monitor_is_not_restarted() {
        let (host, mut watchdog, pid) = started();
        let now = t0() + ChronoDuration::seconds(300);
        let stopped = Heartbeat::stopped(pid, now - ChronoDuration::seconds(2));
        host.crash_monitor(pid);

        let config = Config {
            enabled: true,
            heartbeat_ttl_seconds: 70,
            ..Default::default()
        };
        assert!(!config.has_apps());
        assert_eq!(
            watchdog.check(now, Some(&stopped), &config),
            WatchdogAction::Exited { pid }
        );
        assert!(!watchdog.is_supervising());

        // Later ticks have nothing to supervise
        for secs in [30, 60, 90] {
            let later = now + ChronoDuration::seconds(secs);
            assert_eq!(watchdog.check(later, Some(&stopped), &config), WatchdogAction::None);
        }
        assert_eq!(host.launches(), vec![pid]);
        assert!(host.terminations().is_empty());
    }

    #[test]
    fn test_stopped_heartbeat_from_other_pid_still_restarts() {
        let (host, mut watchdog, pid) = started();
        let now = t0() + ChronoDuration::seconds(300);
        let foreign = Heartbeat::stopped(pid + 50, now);
        host.crash_monitor(pid);

        let action = watchdog.check(now, Some(&foreign), &config());
        assert!(matches!(action, WatchdogAction::Restarted { .. }));
        assert_eq!(host.launches().len(), 2);
    }

    #[test]
    fn test_no_second_restart_while_relaunch_settles() {
        let (host, mut watchdog, pid) = started();
        host.crash_monitor(pid);
        let first = t0() + ChronoDuration::seconds(300);

        let WatchdogAction::Restarted { pid: relaunched } = watchdog.check(first, None, &config())
        else {
            panic!("expected restart");
        };

        // The relaunched monitor dies before it ever heartbeats
        host.crash_monitor(relaunched);
        let soon = first + ChronoDuration::seconds(10);
        assert_eq!(watchdog.check(soon, None, &config()), WatchdogAction::None);
        assert_eq!(host.launches().len(), 2);

        // Once its grace window is over the guard lets the next restart through
        let after_grace = first + ChronoDuration::seconds(71);
        let action = watchdog.check(after_grace, None, &config());
        assert!(matches!(action, WatchdogAction::Restarted { .. }));
        assert_eq!(host.launches().len(), 3);
    }

    #[test]
    fn test_restart_guard_clears_on_first_heartbeat() {
        let (host, mut watchdog, pid) = started();
        host.crash_monitor(pid);
        let first = t0() + ChronoDuration::seconds(300);
        let WatchdogAction::Restarted { pid: relaunched } = watchdog.check(first, None, &config())
        else {
            panic!("expected restart");
        };

        let beat = first + ChronoDuration::seconds(5);
        let hb = Heartbeat::running(relaunched, beat);
        assert_eq!(watchdog.check(beat, Some(&hb), &config()), WatchdogAction::None);
        assert!(!watchdog.restarting);

        // A crash after the first heartbeat is handled straight away
        host.crash_monitor(relaunched);
        let action = watchdog.check(beat + ChronoDuration::seconds(1), Some(&hb), &config());
        assert!(matches!(action, WatchdogAction::Restarted { .. }));
        assert_eq!(host.launches().len(), 3);
    }
}
