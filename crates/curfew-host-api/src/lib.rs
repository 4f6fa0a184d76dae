//! Host adapter trait interfaces for curfew
//!
//! This crate defines the interface between the enforcement core and the
//! platform: enumerating and killing processes, launching the monitor
//! process, desktop notifications and audio cues. It contains no platform
//! code itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
