//! Typed configuration produced by the normalize pass

use crate::blocked::BlockedRange;
use crate::schema::{RawConfig, value_as_u64};
use crate::validation::parse_warning_thresholds;
use curfew_util::{AppName, RunMode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_WATCHDOG_CHECK_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_BOOT_START_WINDOW_SECS: u64 = 300;
pub const DEFAULT_WARNING_MINUTES: &str = "5,3,1";

/// Floor on the deferred-update delay outside development mode
pub const MIN_UPDATE_DELAY_HOURS: u64 = 2;

/// Heartbeat TTL derived from the monitor's tick interval: two ticks plus
/// a ten second buffer.
pub fn default_heartbeat_ttl(check_interval: u64) -> u64 {
    check_interval.saturating_mul(2).saturating_add(10)
}

/// Daily budgets in seconds. An overall limit of zero means no overall
/// budget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLimits {
    pub overall: u64,
    pub dedicated: BTreeMap<AppName, u64>,
}

impl TimeLimits {
    fn from_value(value: &Value) -> Self {
        let Some(source) = value.as_object() else {
            return Self::default();
        };

        if source.contains_key("dedicated") || source.contains_key("overall") {
            Self {
                overall: source.get("overall").and_then(value_as_u64).unwrap_or(0),
                dedicated: source
                    .get("dedicated")
                    .and_then(Value::as_object)
                    .map(limit_map)
                    .unwrap_or_default(),
            }
        } else {
            Self {
                overall: 0,
                dedicated: limit_map(source),
            }
        }
    }
}

fn limit_map(map: &Map<String, Value>) -> BTreeMap<AppName, u64> {
    map.iter()
        .filter_map(|(app, secs)| value_as_u64(secs).map(|secs| (AppName::new(app.clone()), secs)))
        .collect()
}

/// Validated, fully-defaulted configuration shared by both processes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub time_limits: TimeLimits,
    pub blocked_hours: Vec<BlockedRange>,

    /// Seconds between monitor ticks
    pub check_interval: u64,

    /// Whether the monitor should be running
    pub enabled: bool,

    pub watchdog_enabled: bool,
    pub watchdog_restart: bool,
    pub watchdog_check_interval: u64,
    pub heartbeat_ttl_seconds: u64,

    pub event_log_enabled: bool,

    /// Warn about a start this soon after boot; `0` disables
    pub boot_start_window_seconds: u64,

    pub time_limit_update_delay_hours: u64,

    pub notifications_enabled: bool,

    /// Comma-separated warning thresholds in minutes, as the user typed them
    pub notification_warning_minutes: String,

    pub autostart: bool,
    pub minimize_to_tray: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Config {
    /// The configuration used when neither `config.json` nor
    /// `config.default.json` exists
    fn default() -> Self {
        Self {
            time_limits: TimeLimits::default(),
            blocked_hours: Vec::new(),
            check_interval: DEFAULT_CHECK_INTERVAL_SECS,
            enabled: false,
            watchdog_enabled: true,
            watchdog_restart: true,
            watchdog_check_interval: DEFAULT_WATCHDOG_CHECK_INTERVAL_SECS,
            heartbeat_ttl_seconds: default_heartbeat_ttl(DEFAULT_CHECK_INTERVAL_SECS),
            event_log_enabled: true,
            boot_start_window_seconds: DEFAULT_BOOT_START_WINDOW_SECS,
            time_limit_update_delay_hours: MIN_UPDATE_DELAY_HOURS,
            notifications_enabled: true,
            notification_warning_minutes: DEFAULT_WARNING_MINUTES.to_string(),
            autostart: false,
            minimize_to_tray: false,
            extra: Map::new(),
        }
    }
}

impl Config {
    /// Upgrade and fill defaults. This is the only place defaults are
    /// applied; everything downstream sees a complete `Config`.
    pub fn from_raw(raw: RawConfig, mode: RunMode) -> Self {
        let time_limits = match (&raw.time_limits, &raw.apps) {
            (Some(limits), _) => TimeLimits::from_value(limits),
            (None, Some(apps)) => {
                debug!("Upgrading legacy top-level apps map");
                TimeLimits::from_value(apps)
            }
            (None, None) => TimeLimits::default(),
        };

        let blocked_hours = raw
            .blocked_hours
            .unwrap_or_default()
            .iter()
            .filter_map(BlockedRange::from_value)
            .collect();

        let check_interval = raw.check_interval.unwrap_or(DEFAULT_CHECK_INTERVAL_SECS);

        let notification_warning_minutes = match raw.notification_warning_minutes {
            Some(Value::String(s)) => s,
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(value_as_u64)
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
                .join(","),
            _ => DEFAULT_WARNING_MINUTES.to_string(),
        };

        let mut config = Self {
            time_limits,
            blocked_hours,
            check_interval,
            enabled: raw.enabled.unwrap_or(false),
            watchdog_enabled: raw.watchdog_enabled.unwrap_or(true),
            watchdog_restart: raw.watchdog_restart.unwrap_or(true),
            watchdog_check_interval: raw
                .watchdog_check_interval
                .unwrap_or(DEFAULT_WATCHDOG_CHECK_INTERVAL_SECS),
            heartbeat_ttl_seconds: raw
                .heartbeat_ttl_seconds
                .unwrap_or_else(|| default_heartbeat_ttl(check_interval)),
            event_log_enabled: raw.event_log_enabled.unwrap_or(true),
            boot_start_window_seconds: raw
                .boot_start_window_seconds
                .unwrap_or(DEFAULT_BOOT_START_WINDOW_SECS),
            time_limit_update_delay_hours: raw
                .time_limit_update_delay_hours
                .as_ref()
                .and_then(value_as_u64)
                .unwrap_or(MIN_UPDATE_DELAY_HOURS),
            notifications_enabled: raw.notifications_enabled.unwrap_or(true),
            notification_warning_minutes,
            autostart: raw.autostart.unwrap_or(false),
            minimize_to_tray: raw.minimize_to_tray.unwrap_or(false),
            extra: raw.extra,
        };
        config.normalize(mode);
        config
    }

    /// Re-apply the invariants that must hold whenever the configuration is
    /// read or written.
    pub fn normalize(&mut self, mode: RunMode) {
        if !mode.is_development() {
            self.time_limit_update_delay_hours =
                self.time_limit_update_delay_hours.max(MIN_UPDATE_DELAY_HOURS);
        }
    }

    /// Apps with a dedicated limit, in name order
    pub fn monitored_apps(&self) -> impl Iterator<Item = &AppName> {
        self.time_limits.dedicated.keys()
    }

    pub fn has_apps(&self) -> bool {
        !self.time_limits.dedicated.is_empty()
    }

    pub fn dedicated_limit(&self, app: &AppName) -> Option<u64> {
        self.time_limits.dedicated.get(app).copied()
    }

    /// Overall budget, `None` when disabled
    pub fn overall_limit(&self) -> Option<u64> {
        (self.time_limits.overall > 0).then_some(self.time_limits.overall)
    }

    /// Warning thresholds in minutes, descending
    pub fn warning_thresholds(&self) -> Vec<u32> {
        parse_warning_thresholds(&self.notification_warning_minutes)
    }

    /// Tick interval, never zero
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval.max(1))
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_check_interval.max(1))
    }

    /// The on-disk JSON form
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Canonical text used for integrity hashing: compact JSON with object
    /// keys sorted.
    pub fn canonical_json(&self) -> String {
        self.to_value().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(value: Value) -> Config {
        let raw: RawConfig = serde_json::from_value(value).unwrap();
        Config::from_raw(raw, RunMode::Production)
    }

    #[test]
    fn test_empty_object_gets_defaults() {
        let config = normalize(json!({}));
        assert_eq!(config, Config::default());
        assert_eq!(config.heartbeat_ttl_seconds, 70);
        assert_eq!(config.warning_thresholds(), vec![5, 3, 1]);
    }

    #[test]
    fn test_heartbeat_ttl_follows_check_interval() {
        let config = normalize(json!({"check_interval": 10}));
        assert_eq!(config.heartbeat_ttl_seconds, 30);

        let config = normalize(json!({"check_interval": 10, "heartbeat_ttl_seconds": 99}));
        assert_eq!(config.heartbeat_ttl_seconds, 99);
    }

    #[test]
    fn test_new_time_limits_format() {
        let config = normalize(json!({
            "time_limits": {"overall": 3600, "dedicated": {"game.exe": 1800}}
        }));
        assert_eq!(config.time_limits.overall, 3600);
        assert_eq!(config.dedicated_limit(&AppName::new("game.exe")), Some(1800));
        assert_eq!(config.overall_limit(), Some(3600));
    }

    #[test]
    fn test_flat_time_limits_upgrade() {
        let config = normalize(json!({"time_limits": {"game.exe": 600, "chat.exe": 300}}));
        assert_eq!(config.time_limits.overall, 0);
        assert_eq!(config.time_limits.dedicated.len(), 2);
        assert_eq!(config.overall_limit(), None);
    }

    #[test]
    fn test_legacy_apps_key_upgrade() {
        let config = normalize(json!({"apps": {"game.exe": 600}}));
        assert_eq!(config.dedicated_limit(&AppName::new("game.exe")), Some(600));

        let value = config.to_value();
        assert!(value.get("apps").is_none());
        assert_eq!(value["time_limits"]["dedicated"]["game.exe"], 600);
    }

    #[test]
    fn test_time_limits_win_over_legacy_apps() {
        let config = normalize(json!({
            "time_limits": {"dedicated": {"a": 1}},
            "apps": {"b": 2}
        }));
        assert_eq!(config.monitored_apps().count(), 1);
        assert_eq!(config.dedicated_limit(&AppName::new("a")), Some(1));
    }

    #[test]
    fn test_update_delay_clamped_in_production() {
        let raw: RawConfig =
            serde_json::from_value(json!({"time_limit_update_delay_hours": 0})).unwrap();
        assert_eq!(
            Config::from_raw(raw.clone(), RunMode::Production).time_limit_update_delay_hours,
            2
        );
        assert_eq!(
            Config::from_raw(raw, RunMode::Development).time_limit_update_delay_hours,
            0
        );
    }

    #[test]
    fn test_update_delay_from_string() {
        let config = normalize(json!({"time_limit_update_delay_hours": "24"}));
        assert_eq!(config.time_limit_update_delay_hours, 24);
    }

    #[test]
    fn test_normalized_config_is_stable() {
        let config = normalize(json!({
            "time_limits": {"overall": 0, "dedicated": {"game.exe": 60}},
            "blocked_hours": [{"start": "22:00", "end": "07:00"}],
            "custom_setting": [1, 2, 3]
        }));
        let again = normalize(config.to_value());
        assert_eq!(config, again);
        assert_eq!(again.extra.get("custom_setting"), Some(&json!([1, 2, 3])));
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let config = Config::default();
        let text = config.canonical_json();
        let autostart = text.find("\"autostart\"").unwrap();
        let time_limits = text.find("\"time_limits\"").unwrap();
        assert!(autostart < time_limits);
        assert!(!text.contains('\n'));
    }

    #[test]
    fn test_tick_interval_never_zero() {
        let config = normalize(json!({"check_interval": 0}));
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
    }
}
