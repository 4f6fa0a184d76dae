//! Persistence layer for curfew
//!
//! Provides:
//! - One JSON file per record type, written atomically
//! - Config load order with default seeding and write-back of upgrades
//! - Tolerant loading of the pending-update queue
//! - Event log (append-only, SQLite)
//! - An in-memory store for tests

mod audit;
mod file;
mod memory;
mod sqlite;
mod traits;

pub use audit::*;
pub use file::*;
pub use memory::*;
pub use sqlite::*;
pub use traits::*;

use curfew_config::ConfigError;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
