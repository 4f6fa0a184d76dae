//! Errors reported to whoever is editing the configuration

use thiserror::Error;

use crate::AppName;

#[derive(Debug, Error)]
pub enum CurfewError {
    #[error("{0} is not monitored")]
    AppNotMonitored(AppName),

    #[error("Cannot {action} while protected mode is active")]
    ProtectedModeActive { action: String },

    #[error("No configuration available")]
    ConfigMissing,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CurfewError {
    pub fn protected(action: impl Into<String>) -> Self {
        Self::ProtectedModeActive {
            action: action.into(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CurfewError>;
