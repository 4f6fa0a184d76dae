//! Password stretching, verification and config fingerprints

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use curfew_api::{KdfParams, SecurityRecord};
use curfew_config::Config;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const SALT_SIZE: usize = 32;
const HASH_SIZE: usize = 32;
const GENERATED_PASSWORD_BYTES: usize = 32;

pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

pub fn is_acceptable_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LENGTH
}

/// Argon2id over `password` and `salt`
pub fn stretch(password: &str, salt: &[u8], params: KdfParams) -> Result<[u8; HASH_SIZE], String> {
    let argon2_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(HASH_SIZE),
    )
    .map_err(|e| format!("Argon2 params error: {}", e))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut output = [0u8; HASH_SIZE];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut output)
        .map_err(|e| format!("Argon2 error: {}", e))?;
    Ok(output)
}

/// Base64 salt and hash for a new password
pub struct Credentials {
    pub salt: String,
    pub password_hash: String,
}

pub fn hash_password(password: &str, params: KdfParams) -> Result<Credentials, String> {
    let salt = random_bytes::<SALT_SIZE>();
    let hash = stretch(password, &salt, params)?;
    Ok(Credentials {
        salt: STANDARD.encode(salt),
        password_hash: STANDARD.encode(hash),
    })
}

/// Check `password` against the record. A malformed record never matches.
pub fn verify_password(password: &str, record: &SecurityRecord) -> bool {
    let (Ok(salt), Ok(expected)) = (
        STANDARD.decode(&record.salt),
        STANDARD.decode(&record.password_hash),
    ) else {
        warn!("Security record has undecodable salt or hash");
        return false;
    };

    match stretch(password, &salt, record.kdf) {
        Ok(computed) => bool::from(computed.as_slice().ct_eq(expected.as_slice())),
        Err(e) => {
            warn!(error = %e, "Password stretching failed");
            false
        }
    }
}

/// A random password nobody is shown
pub fn generate_password() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes::<GENERATED_PASSWORD_BYTES>())
}

/// SHA-256 hex of the canonical configuration JSON
pub fn config_hash(config: &Config) -> String {
    let digest = Sha256::digest(config.canonical_json().as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use curfew_api::{ProtectedModeRecord, SECURITY_RECORD_VERSION};

    fn record_for(password: &str) -> SecurityRecord {
        let creds = hash_password(password, KdfParams::TESTING).unwrap();
        SecurityRecord {
            version: SECURITY_RECORD_VERSION,
            salt: creds.salt,
            password_hash: creds.password_hash,
            kdf: KdfParams::TESTING,
            config_hash: None,
            protected_mode: ProtectedModeRecord::default(),
            created_at: Utc::now(),
            password_changed_at: None,
        }
    }

    #[test]
    fn test_verify_roundtrip() {
        let record = record_for("correct horse");
        assert!(verify_password("correct horse", &record));
        assert!(!verify_password("correct horsE", &record));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("password1", KdfParams::TESTING).unwrap();
        let b = hash_password("password1", KdfParams::TESTING).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.password_hash, b.password_hash);
    }

    #[test]
    fn test_corrupt_record_never_matches() {
        let mut record = record_for("password1");
        record.salt = "!!not base64!!".into();
        assert!(!verify_password("password1", &record));
    }

    #[test]
    fn test_generated_password_shape() {
        let password = generate_password();
        assert_eq!(password.len(), 43);
        assert!(is_acceptable_password(&password));
        assert_ne!(password, generate_password());
    }

    #[test]
    fn test_minimum_length_counts_chars() {
        assert!(!is_acceptable_password("1234567"));
        assert!(is_acceptable_password("12345678"));
        assert!(is_acceptable_password("ääääääää"));
    }

    #[test]
    fn test_config_hash_tracks_content() {
        let mut config = Config::default();
        let before = config_hash(&config);
        assert_eq!(before.len(), 64);
        assert_eq!(before, config_hash(&config.clone()));

        config.enabled = true;
        assert_ne!(before, config_hash(&config));
    }
}
