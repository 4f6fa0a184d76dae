//! Core events emitted by the enforcer

use curfew_api::LimitChange;
use curfew_store::CloseReason;
use curfew_util::AppName;
use std::fmt;

use crate::WarningKind;

/// Why the monitor loop ended on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ConfigMissing,
    Disabled,
    NoApps,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigMissing => write!(f, "configuration missing"),
            Self::Disabled => write!(f, "monitoring disabled"),
            Self::NoApps => write!(f, "no apps configured"),
        }
    }
}

/// Events emitted by one enforcer tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// Due deferred changes were written into the configuration
    UpdatesApplied { changes: Vec<LimitChange> },

    /// Protected mode is active but the configuration said disabled
    EnforcementForced,

    /// Protected mode ran out during this tick
    ProtectedModeExpired,

    /// Usage was added for a running app
    UsageRecorded {
        app: AppName,
        used_secs: u64,
        remaining_secs: i64,
    },

    /// A warning was shown
    Warning {
        kind: WarningKind,
        context: String,
        threshold: u32,
    },

    /// A monitored app was terminated
    AppClosed { app: AppName, reason: CloseReason },

    /// The loop should end
    Stopping { reason: StopReason },
}
