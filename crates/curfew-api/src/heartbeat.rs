//! Monitor heartbeat record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status reported by the monitor process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatStatus {
    Running,
    Stopped,
}

/// Liveness record written by the monitor at startup, after every tick and
/// at shutdown. Only the monitor writes it; only the supervisor reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub status: HeartbeatStatus,
    pub pid: u32,
    pub timestamp: DateTime<Utc>,
}

impl Heartbeat {
    pub fn running(pid: u32, at: DateTime<Utc>) -> Self {
        Self {
            status: HeartbeatStatus::Running,
            pid,
            timestamp: at,
        }
    }

    pub fn stopped(pid: u32, at: DateTime<Utc>) -> Self {
        Self {
            status: HeartbeatStatus::Stopped,
            pid,
            timestamp: at,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.timestamp)
    }

    /// A heartbeat is fresh while its age does not exceed `ttl_secs`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl_secs: u64) -> bool {
        self.age(now).num_seconds() <= i64::try_from(ttl_secs).unwrap_or(i64::MAX)
    }

    pub fn is_running(&self) -> bool {
        self.status == HeartbeatStatus::Running
    }
}
