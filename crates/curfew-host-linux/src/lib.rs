//! Linux host adapter for curfew
//!
//! Provides:
//! - Process enumeration by name and forced termination (SIGKILL)
//! - Desktop notifications through `notify-send`
//! - Warning sounds through `paplay`/`aplay`
//! - The monitor child process, isolated in its own process group
//! - A single-instance lock file

mod desktop;
mod host;
mod lock;
mod process;

pub use desktop::*;
pub use host::*;
pub use lock::*;
pub use process::*;
