//! State events published inside the supervising process

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A change in the supervisor's view of the system. Each change is
/// published once, when the observed value flips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// Monitoring started or stopped
    MonitoringChanged { active: bool },

    /// Protected mode was activated, deactivated or expired
    ProtectedModeChanged {
        active: bool,
        expires_at: Option<DateTime<Utc>>,
    },

    /// The configuration file changed on disk
    ConfigChanged,

    /// The heartbeat became fresh or stale
    HeartbeatStatusChanged { fresh: bool },

    /// The monitor process was found alive or dead
    MonitorHealthChanged { healthy: bool },
}

/// Discriminant of [`StateEvent`], used to filter subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateEventKind {
    MonitoringChanged,
    ProtectedModeChanged,
    ConfigChanged,
    HeartbeatStatusChanged,
    MonitorHealthChanged,
}

impl StateEvent {
    pub fn kind(&self) -> StateEventKind {
        match self {
            Self::MonitoringChanged { .. } => StateEventKind::MonitoringChanged,
            Self::ProtectedModeChanged { .. } => StateEventKind::ProtectedModeChanged,
            Self::ConfigChanged => StateEventKind::ConfigChanged,
            Self::HeartbeatStatusChanged { .. } => StateEventKind::HeartbeatStatusChanged,
            Self::MonitorHealthChanged { .. } => StateEventKind::MonitorHealthChanged,
        }
    }
}
