//! Supervisor view of the system, rebuilt from persisted records

use chrono::{DateTime, Utc};
use curfew_api::{Heartbeat, StateEvent};
use curfew_config::{Config, default_heartbeat_ttl, DEFAULT_CHECK_INTERVAL_SECS};
use curfew_host_api::ProcessHost;
use curfew_store::Store;
use std::sync::Arc;
use tracing::debug;

use crate::{CoreResult, EventBus, ProtectedMode, password};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorState {
    /// Enforcement is on and a live monitor is reporting in
    pub monitoring: bool,
    pub protected_mode: bool,
    pub protected_expires_at: Option<DateTime<Utc>>,
    pub heartbeat_fresh: bool,
    /// The heartbeat says running and its PID exists
    pub monitor_healthy: bool,
    pub config_fingerprint: Option<String>,
}

/// Whether the monitor is actually enforcing right now
pub fn detect_monitoring(
    config: &Config,
    heartbeat: Option<&Heartbeat>,
    host: &dyn ProcessHost,
    now: DateTime<Utc>,
) -> bool {
    config.enabled
        && heartbeat.is_some_and(|hb| {
            hb.is_running()
                && hb.is_fresh(now, config.heartbeat_ttl_seconds)
                && host.is_pid_alive(hb.pid)
        })
}

/// Polls persisted state and publishes each change once
pub struct StateSync {
    store: Arc<dyn Store>,
    host: Arc<dyn ProcessHost>,
    protected: ProtectedMode,
    bus: EventBus,
    last: Option<SupervisorState>,
}

impl StateSync {
    pub fn new(
        store: Arc<dyn Store>,
        host: Arc<dyn ProcessHost>,
        protected: ProtectedMode,
        bus: EventBus,
    ) -> Self {
        Self {
            store,
            host,
            protected,
            bus,
            last: None,
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> CoreResult<SupervisorState> {
        let config = self.store.load_config()?;
        let heartbeat = self.store.read_heartbeat()?;
        let protected = self.protected.status(now)?;

        let ttl = config
            .as_ref()
            .map(|c| c.heartbeat_ttl_seconds)
            .unwrap_or_else(|| default_heartbeat_ttl(DEFAULT_CHECK_INTERVAL_SECS));

        Ok(SupervisorState {
            monitoring: config
                .as_ref()
                .is_some_and(|c| detect_monitoring(c, heartbeat.as_ref(), self.host.as_ref(), now)),
            protected_mode: protected.active,
            protected_expires_at: protected.expires_at,
            heartbeat_fresh: heartbeat.as_ref().is_some_and(|hb| hb.is_fresh(now, ttl)),
            monitor_healthy: heartbeat
                .as_ref()
                .is_some_and(|hb| hb.is_running() && self.host.is_pid_alive(hb.pid)),
            config_fingerprint: config.as_ref().map(password::config_hash),
        })
    }

    /// Take a fresh snapshot and publish what changed since the last one.
    /// The first call only sets the baseline.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> CoreResult<SupervisorState> {
        let current = self.snapshot(now)?;

        if let Some(previous) = &self.last {
            for event in diff(previous, &current) {
                self.bus.publish(event);
            }
        } else {
            debug!(?current, "Initial supervisor state");
        }

        self.last = Some(current.clone());
        Ok(current)
    }

    pub fn last(&self) -> Option<&SupervisorState> {
        self.last.as_ref()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

fn diff(previous: &SupervisorState, current: &SupervisorState) -> Vec<StateEvent> {
    let mut events = Vec::new();

    if previous.monitoring != current.monitoring {
        events.push(StateEvent::MonitoringChanged {
            active: current.monitoring,
        });
    }
    if previous.protected_mode != current.protected_mode
        || previous.protected_expires_at != current.protected_expires_at
    {
        events.push(StateEvent::ProtectedModeChanged {
            active: current.protected_mode,
            expires_at: current.protected_expires_at,
        });
    }
    if previous.config_fingerprint != current.config_fingerprint {
        events.push(StateEvent::ConfigChanged);
    }
    if previous.heartbeat_fresh != current.heartbeat_fresh {
        events.push(StateEvent::HeartbeatStatusChanged {
            fresh: current.heartbeat_fresh,
        });
    }
    if previous.monitor_healthy != current.monitor_healthy {
        events.push(StateEvent::MonitorHealthChanged {
            healthy: current.monitor_healthy,
        });
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use curfew_api::KdfParams;
    use curfew_host_api::MockHost;
    use curfew_store::MemoryStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, MockHost, StateSync) {
        let store = Arc::new(MemoryStore::with_config(Config {
            enabled: true,
            ..Default::default()
        }));
        let host = MockHost::new();
        let protected = ProtectedMode::with_kdf(store.clone(), KdfParams::TESTING);
        let sync = StateSync::new(store.clone(), Arc::new(host.clone()), protected, EventBus::new());
        (store, host, sync)
    }

    #[test]
    fn test_detect_monitoring_needs_every_signal() {
        let host = MockHost::new();
        host.set_pid_alive(42, true);
        let config = Config {
            enabled: true,
            ..Default::default()
        };
        let hb = Heartbeat::running(42, t0());

        assert!(detect_monitoring(&config, Some(&hb), &host, t0()));
        assert!(!detect_monitoring(&config, None, &host, t0()));
        assert!(!detect_monitoring(
            &config,
            Some(&Heartbeat::stopped(42, t0())),
            &host,
            t0()
        ));
        assert!(!detect_monitoring(
            &config,
            Some(&hb),
            &host,
            t0() + ChronoDuration::seconds(71)
        ));
        assert!(!detect_monitoring(
            &Config::default(),
            Some(&hb),
            &host,
            t0()
        ));

        host.set_pid_alive(42, false);
        assert!(!detect_monitoring(&config, Some(&hb), &host, t0()));
    }

    #[test]
    fn test_refresh_publishes_each_change_once() {
        let (store, host, mut sync) = setup();
        let mut sub = sync.bus().subscribe();

        sync.refresh(t0()).unwrap();
        assert_eq!(sub.try_recv(), None);

        host.set_pid_alive(7, true);
        store.write_heartbeat(&Heartbeat::running(7, t0())).unwrap();
        let state = sync.refresh(t0()).unwrap();
        assert!(state.monitoring);

        let mut events = Vec::new();
        while let Some(event) = sub.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                StateEvent::MonitoringChanged { active: true },
                StateEvent::HeartbeatStatusChanged { fresh: true },
                StateEvent::MonitorHealthChanged { healthy: true },
            ]
        );

        sync.refresh(t0()).unwrap();
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_config_and_protected_changes() {
        let (store, _host, mut sync) = setup();
        let mut sub = sync.bus().subscribe();
        sync.refresh(t0()).unwrap();

        store
            .save_config(&Config {
                enabled: false,
                ..Default::default()
            })
            .unwrap();
        let protected = ProtectedMode::with_kdf(store.clone(), KdfParams::TESTING);
        protected.setup_password("password1", t0()).unwrap();
        let expires = protected.activate(1, t0()).unwrap();

        sync.refresh(t0()).unwrap();
        assert_eq!(
            sub.try_recv(),
            Some(StateEvent::ProtectedModeChanged {
                active: true,
                expires_at: Some(expires)
            })
        );
        assert_eq!(sub.try_recv(), Some(StateEvent::ConfigChanged));

        sync.refresh(expires).unwrap();
        assert_eq!(
            sub.try_recv(),
            Some(StateEvent::ProtectedModeChanged {
                active: false,
                expires_at: None
            })
        );
    }
}
