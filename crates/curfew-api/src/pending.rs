//! Deferred configuration changes
//!
//! On disk the queue is a JSON list of records such as
//! `{"type": "set_limit", "app": "game.exe", "limit": 3600, "apply_at": "..."}`.

use chrono::{DateTime, Utc};
use curfew_util::AppName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A change to the limit tables of the configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LimitChange {
    /// Set (or add) a dedicated limit
    SetLimit { app: AppName, limit: u64 },

    /// Set the overall limit; `0` disables it
    SetOverall { limit: u64 },

    /// Stop monitoring an app
    RemoveApp { app: AppName },

    /// Rename an app's key, carrying the given limit
    ReplaceApp {
        #[serde(default)]
        old_app: Option<AppName>,
        new_app: AppName,
        limit: u64,
    },
}

impl LimitChange {
    /// App whose monitoring ends with this change, if any
    pub fn removed_app(&self) -> Option<&AppName> {
        match self {
            Self::RemoveApp { app } => Some(app),
            Self::ReplaceApp {
                old_app: Some(old),
                new_app,
                ..
            } if old != new_app => Some(old),
            _ => None,
        }
    }
}

impl fmt::Display for LimitChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetLimit { app, limit } => write!(f, "set limit of {} to {}s", app, limit),
            Self::SetOverall { limit } => write!(f, "set overall limit to {}s", limit),
            Self::RemoveApp { app } => write!(f, "remove {}", app),
            Self::ReplaceApp {
                old_app: Some(old),
                new_app,
                limit,
            } => write!(f, "replace {} with {} ({}s)", old, new_app, limit),
            Self::ReplaceApp {
                old_app: None,
                new_app,
                limit,
            } => write!(f, "add {} ({}s)", new_app, limit),
        }
    }
}

/// A change waiting for its `apply_at` time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpdate {
    #[serde(flatten)]
    pub change: LimitChange,
    pub apply_at: DateTime<Utc>,
}

impl PendingUpdate {
    pub fn new(change: LimitChange, apply_at: DateTime<Utc>) -> Self {
        Self { change, apply_at }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.apply_at <= now
    }
}
