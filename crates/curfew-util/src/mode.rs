//! Run mode selection
//!
//! Development mode applies deferred limit changes immediately and lifts the
//! two-hour floor on the update delay. It is selected with
//! `CURFEW_ENV=development` and is not exposed as a user setting.

use std::fmt;

/// Environment variable selecting the run mode
pub const CURFEW_ENV_VAR: &str = "CURFEW_ENV";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Production,
    Development,
}

impl RunMode {
    /// Read the run mode from `CURFEW_ENV`. Anything other than
    /// `development` (case-insensitive) is production.
    pub fn from_env() -> Self {
        match std::env::var(CURFEW_ENV_VAR) {
            Ok(value) => Self::parse(&value),
            Err(_) => Self::Production,
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("development") {
            Self::Development
        } else {
            Self::Production
        }
    }

    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_mode() {
        assert_eq!(RunMode::parse("DEVELOPMENT"), RunMode::Development);
        assert_eq!(RunMode::parse("development"), RunMode::Development);
        assert_eq!(RunMode::parse("production"), RunMode::Production);
        assert_eq!(RunMode::parse(""), RunMode::Production);
        assert_eq!(RunMode::parse("dev"), RunMode::Production);
    }

    #[test]
    fn test_default_is_production() {
        assert!(!RunMode::default().is_development());
    }
}
