//! Host adapter traits

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Errors from host adapter operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Stop failed: {0}")]
    StopFailed(String),

    #[error("Process enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("Notification failed: {0}")]
    NotificationFailed(String),

    #[error("Audio playback failed: {0}")]
    AudioFailed(String),

    #[error("Another instance is already running: {0}")]
    AlreadyRunning(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Processes on the host
pub trait ProcessHost: Send + Sync {
    /// Names of every running process. A process may contribute more than
    /// one name (for example its short name and its executable file name).
    fn running_process_names(&self) -> HostResult<HashSet<String>>;

    /// Forcefully terminate every process matching `name`. Returns how many
    /// processes were signalled. No retry, no timeout.
    fn kill_by_name(&self, name: &str) -> HostResult<usize>;

    /// Whether a process with this PID exists
    fn is_pid_alive(&self, pid: u32) -> bool;

    /// Time since boot, if the host can tell
    fn uptime(&self) -> Option<Duration>;
}

/// Desktop notifications
pub trait Notifier: Send + Sync {
    fn show(&self, title: &str, message: &str) -> HostResult<()>;
}

/// Sound played alongside a warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCue {
    /// Regular warning
    Standard,
    /// Last warning before something is closed
    Final,
}

impl AudioCue {
    /// Sound file looked up in the sounds directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Standard => "alarm.wav",
            Self::Final => "final_alarm.wav",
        }
    }
}

pub trait AudioPlayer: Send + Sync {
    fn play(&self, cue: AudioCue) -> HostResult<()>;
}

/// Starts the monitor process
pub trait MonitorLauncher: Send {
    fn launch(&self) -> HostResult<Box<dyn MonitorHandle>>;
}

/// Handle to a launched monitor process. All calls are non-blocking.
pub trait MonitorHandle: Send {
    fn pid(&self) -> u32;

    /// Poll for exit without blocking
    fn is_alive(&mut self) -> bool;

    /// Ask the process to exit; fire and forget
    fn terminate(&mut self) -> HostResult<()>;
}
