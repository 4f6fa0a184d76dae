//! In-memory store for tests

use curfew_api::{Heartbeat, PendingUpdate, SecurityRecord, UsageLog};
use curfew_config::Config;
use std::sync::{Mutex, MutexGuard};

use crate::{Store, StoreError, StoreResult};

#[derive(Default)]
struct MemoryState {
    config: Option<Config>,
    usage: UsageLog,
    pending: Vec<PendingUpdate>,
    heartbeat: Option<Heartbeat>,
    security: Option<SecurityRecord>,
    config_saves: usize,
    fail_heartbeat_writes: bool,
    fail_config_loads: bool,
}

/// Store holding every record in memory. Starts without a configuration.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        let store = Self::new();
        if let Ok(mut state) = store.state.lock() {
            state.config = Some(config);
        }
        store
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Number of `save_config` calls so far
    pub fn config_saves(&self) -> usize {
        self.state().map(|s| s.config_saves).unwrap_or(0)
    }

    /// Make heartbeat writes fail
    pub fn set_fail_heartbeat_writes(&self, fail: bool) {
        if let Ok(mut state) = self.state() {
            state.fail_heartbeat_writes = fail;
        }
    }

    /// Make config loads fail as if the file were corrupt
    pub fn set_fail_config_loads(&self, fail: bool) {
        if let Ok(mut state) = self.state() {
            state.fail_config_loads = fail;
        }
    }

    /// Remove the configuration entirely
    pub fn clear_config(&self) {
        if let Ok(mut state) = self.state() {
            state.config = None;
        }
    }
}

impl Store for MemoryStore {
    fn load_config(&self) -> StoreResult<Option<Config>> {
        let state = self.state()?;
        if state.fail_config_loads {
            return Err(StoreError::Serialization("injected config failure".into()));
        }
        Ok(state.config.clone())
    }

    fn save_config(&self, config: &Config) -> StoreResult<()> {
        let mut state = self.state()?;
        state.config = Some(config.clone());
        state.config_saves += 1;
        Ok(())
    }

    fn load_usage(&self) -> StoreResult<UsageLog> {
        Ok(self.state()?.usage.clone())
    }

    fn save_usage(&self, usage: &UsageLog) -> StoreResult<()> {
        self.state()?.usage = usage.clone();
        Ok(())
    }

    fn load_pending(&self) -> StoreResult<Vec<PendingUpdate>> {
        Ok(self.state()?.pending.clone())
    }

    fn save_pending(&self, updates: &[PendingUpdate]) -> StoreResult<()> {
        self.state()?.pending = updates.to_vec();
        Ok(())
    }

    fn read_heartbeat(&self) -> StoreResult<Option<Heartbeat>> {
        Ok(self.state()?.heartbeat.clone())
    }

    fn write_heartbeat(&self, heartbeat: &Heartbeat) -> StoreResult<()> {
        let mut state = self.state()?;
        if state.fail_heartbeat_writes {
            return Err(StoreError::Io(std::io::Error::other("injected heartbeat failure")));
        }
        state.heartbeat = Some(heartbeat.clone());
        Ok(())
    }

    fn load_security(&self) -> StoreResult<Option<SecurityRecord>> {
        Ok(self.state()?.security.clone())
    }

    fn save_security(&self, record: &SecurityRecord) -> StoreResult<()> {
        self.state()?.security = Some(record.clone());
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.state.lock().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_starts_without_config() {
        let store = MemoryStore::new();
        assert!(store.load_config().unwrap().is_none());
        assert!(store.is_healthy());
    }

    #[test]
    fn test_counts_config_saves() {
        let store = MemoryStore::with_config(Config::default());
        store.save_config(&Config::default()).unwrap();
        assert_eq!(store.config_saves(), 1);
    }

    #[test]
    fn test_injected_heartbeat_failure() {
        let store = MemoryStore::new();
        store.set_fail_heartbeat_writes(true);
        assert!(store.write_heartbeat(&Heartbeat::running(1, Utc::now())).is_err());
        assert!(store.read_heartbeat().unwrap().is_none());
    }
}
