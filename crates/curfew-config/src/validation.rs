//! Configuration validation

use crate::blocked::validate_blocked_hours;
use crate::config::Config;
use thiserror::Error;

/// Thresholds used when the configured text yields none
pub const DEFAULT_WARNING_THRESHOLDS: [u32; 3] = [5, 3, 1];

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Blocked hours: {0}")]
    BlockedHours(String),

    #[error("Warning thresholds: {0}")]
    WarningThresholds(String),

    #[error("'{field}' must be at least 1 second")]
    ZeroInterval { field: &'static str },

    #[error("Application names cannot be empty")]
    EmptyAppName,
}

/// Validate a normalized configuration
pub fn validate_config(config: &Config) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Err(e) = validate_blocked_hours(&config.blocked_hours, None) {
        errors.push(ValidationError::BlockedHours(e));
    }

    if let Err(e) = validate_warning_thresholds(&config.notification_warning_minutes) {
        errors.push(ValidationError::WarningThresholds(e));
    }

    for (field, value) in [
        ("check_interval", config.check_interval),
        ("watchdog_check_interval", config.watchdog_check_interval),
        ("heartbeat_ttl_seconds", config.heartbeat_ttl_seconds),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroInterval { field });
        }
    }

    if config.monitored_apps().any(|app| app.is_empty()) {
        errors.push(ValidationError::EmptyAppName);
    }

    errors
}

/// Parse comma-separated minutes into a descending, deduplicated list.
/// Unparsable and non-positive items are ignored; an empty result falls
/// back to [`DEFAULT_WARNING_THRESHOLDS`].
pub fn parse_warning_thresholds(text: &str) -> Vec<u32> {
    let mut thresholds: Vec<u32> = text
        .split(',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .filter(|value| *value >= 1)
        .filter_map(|value| u32::try_from(value).ok())
        .collect();

    if thresholds.is_empty() {
        return DEFAULT_WARNING_THRESHOLDS.to_vec();
    }

    thresholds.sort_unstable_by(|a, b| b.cmp(a));
    thresholds.dedup();
    thresholds
}

/// Strict check for user-entered thresholds
pub fn validate_warning_thresholds(text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("Warning thresholds cannot be empty".into());
    }

    let mut count = 0;
    for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let value: i64 = part
            .parse()
            .map_err(|_| format!("Invalid value: '{}' is not a number", part))?;
        if value < 1 {
            return Err(format!("Invalid value: {} must be at least 1", value));
        }
        count += 1;
    }

    if count == 0 {
        return Err("At least one warning threshold is required".into());
    }
    Ok(())
}
