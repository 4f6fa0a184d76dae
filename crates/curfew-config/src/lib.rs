//! Configuration for curfew
//!
//! Supports JSON configuration with:
//! - Forward upgrade of legacy limit layouts
//! - A single normalize pass that fills every default
//! - Blocked-hours windows, including windows that cross midnight
//! - Validation with clear error messages

mod blocked;
mod config;
mod schema;
mod validation;

pub use blocked::*;
pub use config::*;
pub use schema::*;
pub use validation::*;

use curfew_util::RunMode;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Configuration must be a JSON object")]
    NotAnObject,

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Normalize a parsed JSON document. Returns the configuration and whether
/// it differs from `value`, in which case the caller should write it back.
pub fn normalize_value(value: &Value, mode: RunMode) -> ConfigResult<(Config, bool)> {
    if !value.is_object() {
        return Err(ConfigError::NotAnObject);
    }
    let raw: RawConfig = serde_json::from_value(value.clone())?;
    let config = Config::from_raw(raw, mode);
    let changed = config.to_value() != *value;
    Ok((config, changed))
}

/// Parse and normalize configuration from JSON text
pub fn parse_config(content: &str, mode: RunMode) -> ConfigResult<Config> {
    let value: Value = serde_json::from_str(content)?;
    normalize_value(&value, mode).map(|(config, _)| config)
}

/// Load and normalize configuration from a file without writing anything
pub fn load_config(path: impl AsRef<Path>, mode: RunMode) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content, mode)
}

/// Parse, normalize and reject configurations with validation errors
pub fn load_validated_config(path: impl AsRef<Path>, mode: RunMode) -> ConfigResult<Config> {
    let config = load_config(path, mode)?;
    let errors = validate_config(&config);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn parse_minimal_config() {
        let config = parse_config(
            r#"{"time_limits": {"overall": 0, "dedicated": {"game.exe": 120}}}"#,
            RunMode::Production,
        )
        .unwrap();
        assert!(config.has_apps());
        assert_eq!(config.check_interval, 30);
    }

    #[test]
    fn reject_non_object() {
        let result = parse_config("[1, 2]", RunMode::Production);
        assert!(matches!(result, Err(ConfigError::NotAnObject)));
    }

    #[test]
    fn reject_malformed_json() {
        let result = parse_config("{\"enabled\": tru", RunMode::Production);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn normalized_value_reports_change() {
        let (config, changed) = normalize_value(&json!({"enabled": true}), RunMode::Production).unwrap();
        assert!(changed);

        let (_, changed) = normalize_value(&config.to_value(), RunMode::Production).unwrap();
        assert!(!changed);
    }

    #[test]
    fn load_validated_rejects_overlap() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"blocked_hours": [{{"start": "20:00", "end": "22:00"}}, {{"start": "21:00", "end": "23:00"}}]}}"#
        )
        .unwrap();

        assert!(load_config(file.path(), RunMode::Production).is_ok());
        let result = load_validated_config(file.path(), RunMode::Production);
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }
}
