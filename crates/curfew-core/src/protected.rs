//! Protected-mode commitment device
//!
//! While active, enforcement cannot be switched off and the password is
//! the only way out before expiry. A hidden-password setup removes even
//! that: the device then simply runs until `expires_at`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use curfew_api::{KdfParams, ProtectedModeRecord, SECURITY_RECORD_VERSION, SecurityRecord};
use curfew_config::Config;
use curfew_store::{Store, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::password::{self, MIN_PASSWORD_LENGTH};

#[derive(Debug, Error)]
pub enum ProtectedModeError {
    #[error("Password must be at least {MIN_PASSWORD_LENGTH} characters")]
    PasswordTooShort,

    #[error("No password has been set up")]
    PasswordNotSet,

    #[error("Protected mode is already active")]
    AlreadyActive,

    #[error("Protected mode is not active")]
    NotActive,

    #[error("Protected mode uses a hidden password and cannot be deactivated before it expires")]
    HiddenPassword,

    #[error("Protected mode must last at least one day")]
    InvalidDuration,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type ProtectedResult<T> = Result<T, ProtectedModeError>;

/// Protected-mode state as of one query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectedStatus {
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub hidden_password: bool,
    /// This query found the expiry passed and switched the mode off
    pub just_expired: bool,
}

pub struct ProtectedMode {
    store: Arc<dyn Store>,
    kdf: KdfParams,
}

impl ProtectedMode {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_kdf(store, KdfParams::default())
    }

    pub fn with_kdf(store: Arc<dyn Store>, kdf: KdfParams) -> Self {
        Self { store, kdf }
    }

    fn record(&self) -> ProtectedResult<SecurityRecord> {
        self.store
            .load_security()?
            .ok_or(ProtectedModeError::PasswordNotSet)
    }

    pub fn is_password_set(&self) -> ProtectedResult<bool> {
        Ok(self.store.load_security()?.is_some())
    }

    /// Establish the password. Refused while protected mode is active.
    pub fn setup_password(&self, password: &str, now: DateTime<Utc>) -> ProtectedResult<()> {
        self.install_password(password, false, now)
    }

    /// Establish a random password that is never shown to anyone
    pub fn setup_generated_password(&self, now: DateTime<Utc>) -> ProtectedResult<()> {
        self.install_password(&password::generate_password(), true, now)
    }

    fn install_password(&self, password: &str, hidden: bool, now: DateTime<Utc>) -> ProtectedResult<()> {
        if !password::is_acceptable_password(password) {
            return Err(ProtectedModeError::PasswordTooShort);
        }
        if self.status(now)?.active {
            return Err(ProtectedModeError::AlreadyActive);
        }

        let credentials =
            password::hash_password(password, self.kdf).map_err(ProtectedModeError::Hashing)?;
        let config_hash = self.store.load_config()?.as_ref().map(password::config_hash);

        let record = SecurityRecord {
            version: SECURITY_RECORD_VERSION,
            salt: credentials.salt,
            password_hash: credentials.password_hash,
            kdf: self.kdf,
            config_hash,
            protected_mode: ProtectedModeRecord {
                hidden_password: hidden,
                ..Default::default()
            },
            created_at: now,
            password_changed_at: None,
        };
        self.store.save_security(&record)?;

        info!(hidden, "Protected-mode password set");
        Ok(())
    }

    /// Wrong passwords return `Ok(false)`; retry limits belong to the caller
    pub fn verify_password(&self, password: &str) -> ProtectedResult<bool> {
        Ok(self
            .store
            .load_security()?
            .is_some_and(|record| password::verify_password(password, &record)))
    }

    pub fn change_password(&self, old: &str, new: &str, now: DateTime<Utc>) -> ProtectedResult<bool> {
        let mut record = self.record()?;
        if !password::verify_password(old, &record) {
            return Ok(false);
        }
        if !password::is_acceptable_password(new) {
            return Err(ProtectedModeError::PasswordTooShort);
        }

        let credentials =
            password::hash_password(new, self.kdf).map_err(ProtectedModeError::Hashing)?;
        record.salt = credentials.salt;
        record.password_hash = credentials.password_hash;
        record.kdf = self.kdf;
        record.protected_mode.hidden_password = false;
        record.password_changed_at = Some(now);
        self.store.save_security(&record)?;

        info!("Protected-mode password changed");
        Ok(true)
    }

    /// Turn protected mode on for `days` days. Returns the expiry.
    pub fn activate(&self, days: i64, now: DateTime<Utc>) -> ProtectedResult<DateTime<Utc>> {
        if days < 1 {
            return Err(ProtectedModeError::InvalidDuration);
        }
        let duration = ChronoDuration::try_days(days).ok_or(ProtectedModeError::InvalidDuration)?;
        let expires_at = now
            .checked_add_signed(duration)
            .ok_or(ProtectedModeError::InvalidDuration)?;

        let mut record = self.record()?;
        if record.protected_mode.is_active_at(now) {
            return Err(ProtectedModeError::AlreadyActive);
        }

        record.protected_mode.active = true;
        record.protected_mode.expires_at = Some(expires_at);
        record.protected_mode.activated_at = Some(now);
        record.protected_mode.deactivated_at = None;
        self.store.save_security(&record)?;

        info!(days, expires_at = %expires_at.to_rfc3339(), "Protected mode activated");
        Ok(expires_at)
    }

    /// Current state. An expiry that has passed is persisted as inactive
    /// by this call.
    pub fn status(&self, now: DateTime<Utc>) -> ProtectedResult<ProtectedStatus> {
        let Some(mut record) = self.store.load_security()? else {
            return Ok(ProtectedStatus {
                active: false,
                expires_at: None,
                hidden_password: false,
                just_expired: false,
            });
        };

        let mode = &mut record.protected_mode;
        let mut just_expired = false;
        if mode.active && !mode.is_active_at(now) {
            mode.active = false;
            just_expired = true;
            info!("Protected mode expired");
        }

        let active = mode.active;
        let status = ProtectedStatus {
            active,
            expires_at: mode.expires_at.filter(|_| active),
            hidden_password: mode.hidden_password,
            just_expired,
        };

        if just_expired {
            self.store.save_security(&record)?;
        }
        Ok(status)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> ProtectedResult<bool> {
        Ok(self.status(now)?.active)
    }

    pub fn expires_at(&self, now: DateTime<Utc>) -> ProtectedResult<Option<DateTime<Utc>>> {
        Ok(self.status(now)?.expires_at)
    }

    /// End protected mode early. `Ok(false)` on a wrong password, with
    /// the state untouched.
    pub fn deactivate(&self, password: &str, now: DateTime<Utc>) -> ProtectedResult<bool> {
        if !self.status(now)?.active {
            return Err(ProtectedModeError::NotActive);
        }

        let mut record = self.record()?;
        if record.protected_mode.hidden_password {
            return Err(ProtectedModeError::HiddenPassword);
        }
        if !password::verify_password(password, &record) {
            warn!("Protected-mode deactivation rejected: wrong password");
            return Ok(false);
        }

        record.protected_mode.active = false;
        record.protected_mode.expires_at = None;
        record.protected_mode.deactivated_at = Some(now);
        self.store.save_security(&record)?;

        info!("Protected mode deactivated");
        Ok(true)
    }

    /// Remember the fingerprint of `config`. No-op without a security record.
    pub fn update_config_hash(&self, config: &Config) -> ProtectedResult<()> {
        let Some(mut record) = self.store.load_security()? else {
            return Ok(());
        };
        record.config_hash = Some(password::config_hash(config));
        self.store.save_security(&record)?;
        Ok(())
    }

    /// Whether `config` matches the stored fingerprint. True when nothing
    /// is stored.
    pub fn verify_config_integrity(&self, config: &Config) -> ProtectedResult<bool> {
        Ok(match self.store.load_security()? {
            Some(SecurityRecord {
                config_hash: Some(stored),
                ..
            }) => stored == password::config_hash(config),
            _ => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use curfew_store::MemoryStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn device() -> (Arc<MemoryStore>, ProtectedMode) {
        let store = Arc::new(MemoryStore::with_config(Config::default()));
        let device = ProtectedMode::with_kdf(store.clone(), KdfParams::TESTING);
        (store, device)
    }

    #[test]
    fn test_activate_then_lazy_expiry() {
        let (store, device) = device();
        device.setup_password("password1", t0()).unwrap();

        let expires = device.activate(7, t0()).unwrap();
        assert_eq!(expires, t0() + ChronoDuration::days(7));
        assert!(device.is_active(t0() + ChronoDuration::days(6)).unwrap());

        let status = device.status(expires).unwrap();
        assert!(!status.active);
        assert!(status.just_expired);

        let record = store.load_security().unwrap().unwrap();
        assert!(!record.protected_mode.active);
        assert!(!device.status(expires).unwrap().just_expired);
    }

    #[test]
    fn test_activate_requires_password_and_days() {
        let (_store, device) = device();
        assert!(matches!(
            device.activate(1, t0()),
            Err(ProtectedModeError::PasswordNotSet)
        ));

        device.setup_password("password1", t0()).unwrap();
        assert!(matches!(
            device.activate(0, t0()),
            Err(ProtectedModeError::InvalidDuration)
        ));

        device.activate(1, t0()).unwrap();
        assert!(matches!(
            device.activate(1, t0()),
            Err(ProtectedModeError::AlreadyActive)
        ));
    }

    #[test]
    fn test_deactivate_with_password() {
        let (_store, device) = device();
        device.setup_password("password1", t0()).unwrap();
        device.activate(3, t0()).unwrap();

        assert!(!device.deactivate("wrong-password", t0()).unwrap());
        assert!(device.is_active(t0()).unwrap());

        assert!(device.deactivate("password1", t0()).unwrap());
        assert!(!device.is_active(t0()).unwrap());
        assert!(matches!(
            device.deactivate("password1", t0()),
            Err(ProtectedModeError::NotActive)
        ));
    }

    #[test]
    fn test_hidden_password_cannot_deactivate() {
        let (_store, device) = device();
        device.setup_generated_password(t0()).unwrap();
        device.activate(2, t0()).unwrap();

        assert!(matches!(
            device.deactivate("anything-at-all", t0()),
            Err(ProtectedModeError::HiddenPassword)
        ));
        assert!(device.status(t0()).unwrap().hidden_password);
        assert!(!device.is_active(t0() + ChronoDuration::days(2)).unwrap());
    }

    #[test]
    fn test_setup_refused_while_active() {
        let (_store, device) = device();
        device.setup_password("password1", t0()).unwrap();
        device.activate(1, t0()).unwrap();

        assert!(matches!(
            device.setup_password("password2", t0()),
            Err(ProtectedModeError::AlreadyActive)
        ));
        assert!(matches!(
            device.setup_password("short", t0()),
            Err(ProtectedModeError::PasswordTooShort)
        ));
    }

    #[test]
    fn test_change_password_clears_hidden() {
        let (store, device) = device();
        device.setup_password("password1", t0()).unwrap();

        assert!(!device.change_password("nope-nope", "password2", t0()).unwrap());
        assert!(matches!(
            device.change_password("password1", "short", t0()),
            Err(ProtectedModeError::PasswordTooShort)
        ));
        assert!(device.change_password("password1", "password2", t0()).unwrap());

        assert!(device.verify_password("password2").unwrap());
        assert!(!device.verify_password("password1").unwrap());
        let record = store.load_security().unwrap().unwrap();
        assert_eq!(record.password_changed_at, Some(t0()));
        assert!(!record.protected_mode.hidden_password);
    }

    #[test]
    fn test_config_integrity() {
        let (_store, device) = device();
        let mut config = Config::default();
        assert!(device.verify_config_integrity(&config).unwrap());

        device.setup_password("password1", t0()).unwrap();
        assert!(device.verify_config_integrity(&config).unwrap());

        config.enabled = true;
        assert!(!device.verify_config_integrity(&config).unwrap());
        device.update_config_hash(&config).unwrap();
        assert!(device.verify_config_integrity(&config).unwrap());
    }
}
