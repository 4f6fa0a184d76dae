//! JSON-file store
//!
//! Every record lives in its own file under the data directory. Writes go
//! to a sibling temporary file that is then renamed over the target, so a
//! reader never sees a half-written record. There is no cross-process
//! locking: each file has one logical writer and last write wins.

use curfew_api::{Heartbeat, PendingUpdate, SecurityRecord, UsageLog};
use curfew_config::{Config, ConfigError};
use curfew_util::{DataPaths, RunMode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{Store, StoreResult};

/// Store backed by JSON files in one data directory
pub struct FileStore {
    paths: DataPaths,
    mode: RunMode,
}

impl FileStore {
    /// Open the store, creating the data directory if needed
    pub fn open(paths: DataPaths, mode: RunMode) -> StoreResult<Self> {
        std::fs::create_dir_all(paths.root())?;
        Ok(Self { paths, mode })
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    fn normalize_and_write_back(&self, value: &Value, force_write: bool) -> StoreResult<Config> {
        let (config, changed) = curfew_config::normalize_value(value, self.mode)?;
        if changed || force_write {
            debug!("Writing normalized configuration back");
            if let Err(e) = self.save_config(&config) {
                warn!(error = %e, "Failed to write normalized configuration");
            }
        }
        Ok(config)
    }
}

/// Read a file, mapping "not found" to `None`
fn read_text(path: &Path) -> StoreResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    match read_text(path)? {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write pretty JSON atomically (temp file + rename)
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    let text = serde_json::to_string_pretty(value)?;
    let tmp = tmp_path(path);
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl Store for FileStore {
    fn load_config(&self) -> StoreResult<Option<Config>> {
        if let Some(text) = read_text(&self.paths.config())? {
            let value: Value = serde_json::from_str(&text).map_err(ConfigError::from)?;
            return self.normalize_and_write_back(&value, false).map(Some);
        }

        let default_path = self.paths.default_config();
        if let Some(text) = read_text(&default_path)? {
            info!(path = %default_path.display(), "Seeding configuration from default file");
            let value: Value = serde_json::from_str(&text).map_err(ConfigError::from)?;
            return self.normalize_and_write_back(&value, true).map(Some);
        }

        info!("Using built-in default configuration");
        let config = Config::default();
        if let Err(e) = self.save_config(&config) {
            warn!(error = %e, "Failed to save built-in default configuration");
        }
        Ok(Some(config))
    }

    fn save_config(&self, config: &Config) -> StoreResult<()> {
        let mut config = config.clone();
        config.normalize(self.mode);
        write_json_atomic(&self.paths.config(), &config)
    }

    fn load_usage(&self) -> StoreResult<UsageLog> {
        match read_json::<UsageLog>(&self.paths.usage_log()) {
            Ok(usage) => Ok(usage.unwrap_or_default()),
            Err(crate::StoreError::Serialization(e)) => {
                warn!(error = %e, "Usage log unreadable, starting a fresh one");
                Ok(UsageLog::default())
            }
            Err(e) => Err(e),
        }
    }

    fn save_usage(&self, usage: &UsageLog) -> StoreResult<()> {
        write_json_atomic(&self.paths.usage_log(), usage)
    }

    fn load_pending(&self) -> StoreResult<Vec<PendingUpdate>> {
        let value = match read_json::<Value>(&self.paths.pending_updates()) {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(Vec::new()),
            Err(crate::StoreError::Serialization(e)) => {
                debug!(error = %e, "Pending update queue unreadable, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let Value::Array(items) = value else {
            return Ok(Vec::new());
        };

        Ok(items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<PendingUpdate>(item) {
                Ok(update) => Some(update),
                Err(e) => {
                    debug!(error = %e, "Dropping malformed pending update");
                    None
                }
            })
            .collect())
    }

    fn save_pending(&self, updates: &[PendingUpdate]) -> StoreResult<()> {
        write_json_atomic(&self.paths.pending_updates(), updates)
    }

    fn read_heartbeat(&self) -> StoreResult<Option<Heartbeat>> {
        match read_json::<Heartbeat>(&self.paths.heartbeat()) {
            Ok(heartbeat) => Ok(heartbeat),
            Err(crate::StoreError::Serialization(e)) => {
                debug!(error = %e, "Heartbeat unreadable");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn write_heartbeat(&self, heartbeat: &Heartbeat) -> StoreResult<()> {
        write_json_atomic(&self.paths.heartbeat(), heartbeat)
    }

    fn load_security(&self) -> StoreResult<Option<SecurityRecord>> {
        read_json(&self.paths.security())
    }

    fn save_security(&self, record: &SecurityRecord) -> StoreResult<()> {
        write_json_atomic(&self.paths.security(), record)
    }

    fn is_healthy(&self) -> bool {
        self.paths.root().is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;
    use chrono::{TimeZone, Utc};
    use curfew_api::LimitChange;
    use curfew_util::AppName;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(DataPaths::new(dir.path()), RunMode::Production).unwrap();
        (dir, store)
    }

    fn read_value(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_builtin_default_is_saved() {
        let (_dir, store) = store();
        let config = store.load_config().unwrap().unwrap();
        assert_eq!(config, Config::default());
        assert!(!config.enabled);
        assert!(store.paths().config().exists());
    }

    #[test]
    fn test_default_file_is_seeded() {
        let (_dir, store) = store();
        std::fs::write(
            store.paths().default_config(),
            r#"{"time_limits": {"game.exe": 60}, "enabled": true}"#,
        )
        .unwrap();

        let config = store.load_config().unwrap().unwrap();
        assert!(config.enabled);
        assert_eq!(config.dedicated_limit(&AppName::new("game.exe")), Some(60));

        let saved = read_value(&store.paths().config());
        assert_eq!(saved["time_limits"]["dedicated"]["game.exe"], 60);
    }

    #[test]
    fn test_upgraded_config_written_back() {
        let (_dir, store) = store();
        std::fs::write(store.paths().config(), r#"{"apps": {"game.exe": 60}}"#).unwrap();

        store.load_config().unwrap();
        let saved = read_value(&store.paths().config());
        assert!(saved.get("apps").is_none());
        assert_eq!(saved["heartbeat_ttl_seconds"], 70);
        assert_eq!(saved["notification_warning_minutes"], "5,3,1");
    }

    #[test]
    fn test_unparsable_config_is_an_error() {
        let (_dir, store) = store();
        std::fs::write(store.paths().config(), "{not json").unwrap();
        assert!(matches!(
            store.load_config(),
            Err(StoreError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn test_save_config_clamps_delay() {
        let (_dir, store) = store();
        let mut config = Config::default();
        config.time_limit_update_delay_hours = 0;
        store.save_config(&config).unwrap();

        let saved = read_value(&store.paths().config());
        assert_eq!(saved["time_limit_update_delay_hours"], 2);
    }

    #[test]
    fn test_usage_round_trip_and_shape() {
        let (_dir, store) = store();
        assert!(store.load_usage().unwrap().days().next().is_none());

        let day = chrono::NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let mut usage = UsageLog::default();
        usage.record_usage(day, &AppName::new("game.exe"), 30);
        store.save_usage(&usage).unwrap();

        assert_eq!(store.load_usage().unwrap(), usage);
        let saved = read_value(&store.paths().usage_log());
        assert_eq!(saved, json!({"2025-01-02": {"game.exe": 30}}));
    }

    #[test]
    fn test_malformed_pending_entries_dropped() {
        let (_dir, store) = store();
        std::fs::write(
            store.paths().pending_updates(),
            r#"[
                {"type": "set_overall", "limit": 60, "apply_at": "not a time"},
                {"type": "set_limit", "app": "game.exe", "limit": 60, "apply_at": "2025-01-01T00:00:00+00:00"},
                {"type": "launch_rockets", "apply_at": "2025-01-01T00:00:00+00:00"},
                {"type": "remove_app", "app": "chat.exe"}
            ]"#,
        )
        .unwrap();

        let pending = store.load_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0].change,
            LimitChange::SetLimit {
                app: AppName::new("game.exe"),
                limit: 60
            }
        );
    }

    #[test]
    fn test_pending_queue_not_a_list() {
        let (_dir, store) = store();
        std::fs::write(store.paths().pending_updates(), r#"{"type": "set_overall"}"#).unwrap();
        assert!(store.load_pending().unwrap().is_empty());
    }

    #[test]
    fn test_heartbeat_round_trip() {
        let (_dir, store) = store();
        assert!(store.read_heartbeat().unwrap().is_none());

        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        store.write_heartbeat(&Heartbeat::running(1234, at)).unwrap();
        let heartbeat = store.read_heartbeat().unwrap().unwrap();
        assert_eq!(heartbeat.pid, 1234);
        assert!(heartbeat.is_running());
        assert!(!tmp_path(&store.paths().heartbeat()).exists());
    }

    #[test]
    fn test_garbled_heartbeat_reads_as_missing() {
        let (_dir, store) = store();
        std::fs::write(store.paths().heartbeat(), "{\"status\": ").unwrap();
        assert!(store.read_heartbeat().unwrap().is_none());
    }
}
