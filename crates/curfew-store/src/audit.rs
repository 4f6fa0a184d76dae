//! Audit event types

use chrono::{DateTime, Local, Utc};
use curfew_api::LimitChange;
use curfew_util::AppName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an application was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    DedicatedLimit,
    OverallLimit,
    BlockedHours,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DedicatedLimit => write!(f, "dedicated limit reached"),
            Self::OverallLimit => write!(f, "overall limit reached"),
            Self::BlockedHours => write!(f, "blocked hours"),
        }
    }
}

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Monitor loop started
    MonitorStarted { pid: u32 },

    /// Monitor loop ended
    MonitorStopped { reason: String },

    /// A monitored application was terminated
    AppClosed { app: AppName, reason: CloseReason },

    /// Blocked hours were in force with monitored apps running
    BlockedHoursEnforced { apps: Vec<AppName> },

    /// A limit change was queued
    UpdateScheduled {
        change: LimitChange,
        apply_at: DateTime<Utc>,
    },

    /// A queued (or immediate) limit change took effect
    UpdateApplied { change: LimitChange },

    ProtectedModeActivated { expires_at: DateTime<Utc> },

    ProtectedModeDeactivated,

    ProtectedModeExpired,

    PasswordChanged,

    /// The supervisor relaunched the monitor
    WatchdogRestart { pid: u32 },

    /// The supervisor gave up on the monitor
    WatchdogStopped { reason: String },
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MonitorStarted { pid } => write!(f, "monitor started (pid {})", pid),
            Self::MonitorStopped { reason } => write!(f, "monitor stopped: {}", reason),
            Self::AppClosed { app, reason } => write!(f, "closed {} ({})", app, reason),
            Self::BlockedHoursEnforced { apps } => {
                let names: Vec<&str> = apps.iter().map(AppName::as_str).collect();
                write!(f, "blocked hours enforced on {}", names.join(", "))
            }
            Self::UpdateScheduled { change, apply_at } => {
                write!(f, "scheduled: {} at {}", change, apply_at.to_rfc3339())
            }
            Self::UpdateApplied { change } => write!(f, "applied: {}", change),
            Self::ProtectedModeActivated { expires_at } => {
                write!(f, "protected mode activated until {}", expires_at.to_rfc3339())
            }
            Self::ProtectedModeDeactivated => write!(f, "protected mode deactivated"),
            Self::ProtectedModeExpired => write!(f, "protected mode expired"),
            Self::PasswordChanged => write!(f, "password changed"),
            Self::WatchdogRestart { pid } => write!(f, "watchdog restarted monitor (pid {})", pid),
            Self::WatchdogStopped { reason } => write!(f, "watchdog stopped: {}", reason),
        }
    }
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self::at(event, curfew_util::now())
    }

    pub fn at(event: AuditEventType, timestamp: DateTime<Local>) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp,
            event,
        }
    }
}
