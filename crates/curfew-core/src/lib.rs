//! Enforcement core for curfew
//!
//! This crate contains:
//! - The enforcer (one monitor tick: reload, apply due changes, enforce, persist)
//! - Notification thresholds with per-day deduplication
//! - The deferred update queue
//! - The protected-mode commitment device and password handling
//! - The monitor watchdog
//! - The supervisor's state event bus and state sync

mod bus;
mod deferred;
mod engine;
mod events;
mod notify;
pub mod password;
mod protected;
mod state;
mod watchdog;

pub use bus::*;
pub use deferred::*;
pub use engine::*;
pub use events::*;
pub use notify::*;
pub use protected::*;
pub use state::*;
pub use watchdog::*;

use curfew_host_api::HostError;
use curfew_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("No configuration available")]
    ConfigMissing,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Protected mode error: {0}")]
    Protected(#[from] ProtectedModeError),
}

pub type CoreResult<T> = Result<T, CoreError>;
