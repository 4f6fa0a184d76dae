//! Raw configuration schema (as parsed from JSON)
//!
//! Every field is optional so that files written by older releases still
//! parse. [`crate::Config::from_raw`] fills in the gaps.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Raw configuration as parsed from `config.json`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawConfig {
    /// Either `{"overall": n, "dedicated": {...}}` or a legacy flat
    /// `{"app": secs}` map
    pub time_limits: Option<Value>,

    /// Legacy top-level limit map, superseded by `time_limits`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apps: Option<Value>,

    pub blocked_hours: Option<Vec<Value>>,

    #[serde(default, deserialize_with = "lenient_u64")]
    pub check_interval: Option<u64>,
    pub enabled: Option<bool>,

    pub watchdog_enabled: Option<bool>,
    pub watchdog_restart: Option<bool>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub watchdog_check_interval: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub heartbeat_ttl_seconds: Option<u64>,

    pub event_log_enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub boot_start_window_seconds: Option<u64>,

    /// Accepted as a number or a numeric string
    pub time_limit_update_delay_hours: Option<Value>,

    pub notifications_enabled: Option<bool>,
    pub notification_warning_minutes: Option<Value>,

    pub autostart: Option<bool>,
    pub minimize_to_tray: Option<bool>,

    /// Keys this release does not know about, kept on write-back
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Read a seconds (or hours) count from a JSON number or numeric string.
/// Negative and non-numeric values yield `None`.
pub(crate) fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Serde adapter for counts that older files stored as floats or strings
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_u64))
}
