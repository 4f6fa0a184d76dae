//! Shared utilities for curfew
//!
//! This crate provides:
//! - The `AppName` identifier for monitored applications
//! - Time utilities (mock-aware clock, wall-clock parsing, day keys)
//! - Error types
//! - Default paths for the data directory and the files inside it
//! - Run mode (production or development)

mod error;
mod ids;
mod mode;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use mode::*;
pub use paths::*;
pub use time::*;
