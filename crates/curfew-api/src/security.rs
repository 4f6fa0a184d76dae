//! Security record: password verifier, config hash and protected-mode state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SECURITY_RECORD_VERSION: u32 = 1;

/// Key-stretching parameters stored with the hash so that verification
/// uses the same cost the hash was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    /// Cheap parameters for tests only
    pub const TESTING: Self = Self {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };

    pub const INTERACTIVE: Self = Self {
        memory_kib: 64 * 1024,
        iterations: 3,
        parallelism: 1,
    };
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::INTERACTIVE
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedModeRecord {
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub hidden_password: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl ProtectedModeRecord {
    /// Whether protected mode is in force at `now`. An active record
    /// without an expiry never lapses.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.is_none_or(|expires| now < expires)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRecord {
    pub version: u32,
    /// Base64 salt
    pub salt: String,
    /// Base64 stretched password
    pub password_hash: String,
    #[serde(default)]
    pub kdf: KdfParams,
    /// Hex SHA-256 of the configuration as last saved by the supervisor
    #[serde(default)]
    pub config_hash: Option<String>,
    #[serde(default)]
    pub protected_mode: ProtectedModeRecord,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_changed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_active_until_expiry() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let record = ProtectedModeRecord {
            active: true,
            expires_at: Some(now + chrono::Duration::days(1)),
            ..Default::default()
        };

        assert!(record.is_active_at(now));
        assert!(!record.is_active_at(now + chrono::Duration::days(1)));
    }

    #[test]
    fn test_active_without_expiry_is_permanent() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let record = ProtectedModeRecord {
            active: true,
            ..Default::default()
        };
        assert!(record.is_active_at(now + chrono::Duration::days(10_000)));
    }

    #[test]
    fn test_missing_kdf_uses_default() {
        let json = r#"{
            "version": 1,
            "salt": "c2FsdA==",
            "password_hash": "aGFzaA==",
            "config_hash": null,
            "protected_mode": {"active": false, "expires_at": null, "hidden_password": false},
            "created_at": "2025-01-01T00:00:00+00:00"
        }"#;
        let record: SecurityRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.kdf, KdfParams::INTERACTIVE);
        assert!(!record.protected_mode.active);
    }
}
