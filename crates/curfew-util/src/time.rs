//! Clock, wall-clock times of day and ledger day keys
//!
//! Debug builds read `CURFEW_MOCK_TIME` once at first use and shift every
//! reading of the clock by the difference, e.g.
//! `CURFEW_MOCK_TIME="2025-12-25 22:55:00" curfewd` to rehearse blocked
//! hours or a day rollover.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

/// Clock override honoured by debug builds, `YYYY-MM-DD HH:MM:SS`
pub const MOCK_TIME_ENV_VAR: &str = "CURFEW_MOCK_TIME";

const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Minutes in one calendar day
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Format of the calendar-day keys in the usage ledger
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Read once; the clock then runs at the real rate from the mocked start.
static CLOCK_SKEW: OnceLock<Option<chrono::Duration>> = OnceLock::new();

/// Parse a mock start time in the local timezone. Ambiguous or skipped
/// local times (DST changes) are rejected.
pub fn parse_mock_time(text: &str) -> Result<DateTime<Local>, String> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), MOCK_TIME_FORMAT)
        .map_err(|_| format!("expected {}, got '{}'", MOCK_TIME_FORMAT, text))?;
    Local
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| format!("'{}' does not exist in the local timezone", text))
}

fn clock_skew() -> Option<chrono::Duration> {
    *CLOCK_SKEW.get_or_init(|| {
        if !cfg!(debug_assertions) {
            return None;
        }
        let text = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
        match parse_mock_time(&text) {
            Ok(start) => {
                let skew = start.signed_duration_since(Local::now());
                tracing::info!(mock_time = %text, skew_secs = skew.num_seconds(), "Mock time enabled");
                Some(skew)
            }
            Err(e) => {
                tracing::warn!(mock_time = %text, error = %e, "Ignoring mock time");
                None
            }
        }
    })
}

pub fn is_mock_time_active() -> bool {
    clock_skew().is_some()
}

/// Local time, shifted by the mock clock in debug builds
pub fn now() -> DateTime<Local> {
    let real = Local::now();
    clock_skew().map_or(real, |skew| real + skew)
}

/// UTC form of [`now`], as stored in heartbeats and pending updates
pub fn now_utc() -> DateTime<Utc> {
    now().with_timezone(&Utc)
}

/// Ledger key for a calendar day (`YYYY-MM-DD`)
pub fn day_key(day: NaiveDate) -> String {
    day.format(DAY_KEY_FORMAT).to_string()
}

/// Time of day with minute resolution, as used by blocked-hour ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    /// Parse `HH:MM` (24h). Single-digit hours are accepted.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        let (hour, minute) = s
            .split_once(':')
            .ok_or_else(|| format!("'{}' is not in HH:MM format", s))?;

        let hour: u8 = hour.trim().parse().map_err(|_| format!("Invalid hour in '{}'", s))?;
        let minute: u8 = minute
            .trim()
            .parse()
            .map_err(|_| format!("Invalid minute in '{}'", s))?;

        Self::new(hour, minute).ok_or_else(|| format!("'{}' is not a time of day", s))
    }

    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self {
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
        }
    }

    /// Minutes since midnight, `0..1440`
    pub fn minutes_from_midnight(&self) -> u32 {
        (self.hour as u32) * 60 + self.minute as u32
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// `1h 5m 0s`, `5m 0s` or `42s`
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    match (secs / 3600, secs % 3600 / 60, secs % 60) {
        (0, 0, s) => format!("{}s", s),
        (0, m, s) => format!("{}m {}s", m, s),
        (h, m, s) => format!("{}h {}m {}s", h, m, s),
    }
}
