//! Strongly-typed identifiers for curfew

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Name of a monitored application, as reported by the process table
/// (e.g. `firefox` or `game.exe`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppName(String);

impl AppName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AppName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AppName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for AppName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_app_name_display() {
        let name = AppName::new("game.exe");
        assert_eq!(format!("{}", name), "game.exe");
        assert_eq!(name.as_str(), "game.exe");
    }

    #[test]
    fn test_app_name_as_map_key() {
        let mut limits = BTreeMap::new();
        limits.insert(AppName::new("game.exe"), 120u64);

        let json = serde_json::to_string(&limits).unwrap();
        assert_eq!(json, r#"{"game.exe":120}"#);

        let parsed: BTreeMap<AppName, u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.get("game.exe"), Some(&120));
    }

    #[test]
    fn test_blank_name_is_empty() {
        assert!(AppName::new("   ").is_empty());
        assert!(!AppName::new("a").is_empty());
    }
}
