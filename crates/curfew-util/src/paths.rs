//! Default paths for curfew components
//!
//! Both processes share one data directory holding every persisted record:
//! - Data: `$CURFEW_DATA_DIR`, `$XDG_DATA_HOME/curfew` or `~/.local/share/curfew`
//! - Logs: `$XDG_STATE_HOME/curfew` or `~/.local/state/curfew`

use std::path::{Path, PathBuf};

/// Environment variable for overriding the data directory
pub const CURFEW_DATA_DIR_ENV: &str = "CURFEW_DATA_DIR";

/// Application subdirectory name
const APP_DIR: &str = "curfew";

pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_CONFIG_FILE: &str = "config.default.json";
pub const USAGE_LOG_FILE: &str = "usage_log.json";
pub const HEARTBEAT_FILE: &str = "monitor_heartbeat.json";
pub const PENDING_UPDATES_FILE: &str = "pending_time_limit_updates.json";
pub const SECURITY_FILE: &str = "security.json";
pub const EVENT_LOG_FILE: &str = "events.db";
pub const MONITOR_LOCK_FILE: &str = "curfewd.lock";
pub const SOUNDS_DIR: &str = "sounds";

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$CURFEW_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/curfew` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/curfew` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(CURFEW_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking CURFEW_DATA_DIR env var.
/// Used for default values where the env var is checked separately.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default log directory.
///
/// Order of precedence:
/// 1. `$XDG_STATE_HOME/curfew` (if XDG_STATE_HOME is set)
/// 2. `~/.local/state/curfew` (fallback)
pub fn default_log_dir() -> PathBuf {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(state_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("state")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("logs")
}

/// Locations of every persisted record inside one data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Paths rooted at [`default_data_dir`]
    pub fn from_env() -> Self {
        Self::new(default_data_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn default_config(&self) -> PathBuf {
        self.root.join(DEFAULT_CONFIG_FILE)
    }

    pub fn usage_log(&self) -> PathBuf {
        self.root.join(USAGE_LOG_FILE)
    }

    pub fn heartbeat(&self) -> PathBuf {
        self.root.join(HEARTBEAT_FILE)
    }

    pub fn pending_updates(&self) -> PathBuf {
        self.root.join(PENDING_UPDATES_FILE)
    }

    pub fn security(&self) -> PathBuf {
        self.root.join(SECURITY_FILE)
    }

    pub fn event_log(&self) -> PathBuf {
        self.root.join(EVENT_LOG_FILE)
    }

    pub fn monitor_lock(&self) -> PathBuf {
        self.root.join(MONITOR_LOCK_FILE)
    }

    pub fn sounds_dir(&self) -> PathBuf {
        self.root.join(SOUNDS_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_contains_curfew() {
        let path = data_dir_without_env();
        assert!(path.to_string_lossy().contains("curfew"));
    }

    #[test]
    fn log_dir_contains_curfew() {
        let path = default_log_dir();
        assert!(path.to_string_lossy().contains("curfew"));
    }

    #[test]
    fn data_paths_share_root() {
        let paths = DataPaths::new("/var/lib/curfew");
        assert_eq!(paths.config(), PathBuf::from("/var/lib/curfew/config.json"));
        assert_eq!(
            paths.pending_updates(),
            PathBuf::from("/var/lib/curfew/pending_time_limit_updates.json")
        );
        assert_eq!(
            paths.heartbeat(),
            PathBuf::from("/var/lib/curfew/monitor_heartbeat.json")
        );
        assert_eq!(paths.root(), Path::new("/var/lib/curfew"));
    }
}
