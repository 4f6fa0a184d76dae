//! Blocked-hours scheduling
//!
//! A range is a half-open `[start, end)` window of wall-clock minutes. When
//! `start > end` the range wraps past midnight. Ranges that fail to parse
//! are skipped during evaluation and reported only by
//! [`validate_blocked_hours`].

use chrono::{DateTime, TimeZone};
use curfew_util::{MINUTES_PER_DAY, WallClock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A blocked-hours entry as stored in the configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedRange {
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
}

impl BlockedRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Accept any JSON object; missing or non-string times are kept as empty
    /// strings so the range is skipped instead of failing the whole file.
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let field = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Some(Self::new(field("start"), field("end")))
    }

    /// Parse into minute bounds
    pub fn window(&self) -> Result<MinuteWindow, String> {
        let start = WallClock::parse(&self.start)?;
        let end = WallClock::parse(&self.end)?;
        Ok(MinuteWindow {
            start: start.minutes_from_midnight(),
            end: end.minutes_from_midnight(),
        })
    }

    /// Start label as written, trimmed
    pub fn start_label(&self) -> &str {
        self.start.trim()
    }
}

/// Parsed blocked-hours range in minutes since midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinuteWindow {
    pub start: u32,
    pub end: u32,
}

impl MinuteWindow {
    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, minute: u32) -> bool {
        if self.wraps_midnight() {
            minute >= self.start || minute < self.end
        } else {
            self.start <= minute && minute < self.end
        }
    }

    /// Whether the two windows share at least one covered minute
    pub fn overlaps(&self, other: &MinuteWindow) -> bool {
        (0..MINUTES_PER_DAY).any(|m| self.contains(m) && other.contains(m))
    }

    /// Minutes from `current` forward to this window's start
    fn minutes_until_start(&self, current: u32) -> u32 {
        if self.start > current {
            self.start - current
        } else {
            MINUTES_PER_DAY - current + self.start
        }
    }
}

/// Result of looking ahead to the next blocked window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextBlock {
    /// `now` is inside a blocked window already
    AlreadyBlocked,

    /// The nearest window starts in `minutes`, labelled by its start time
    Upcoming { minutes: u32, start: String },

    /// No parsable windows are configured
    NoneScheduled,
}

fn valid_windows(ranges: &[BlockedRange]) -> impl Iterator<Item = (&BlockedRange, MinuteWindow)> {
    ranges
        .iter()
        .filter_map(|range| range.window().ok().map(|window| (range, window)))
}

fn current_minute<Tz: TimeZone>(now: &DateTime<Tz>) -> u32 {
    WallClock::from_datetime(now).minutes_from_midnight()
}

/// Whether any range covers the wall-clock minute of `now`
pub fn is_blocked<Tz: TimeZone>(now: &DateTime<Tz>, ranges: &[BlockedRange]) -> bool {
    let current = current_minute(now);
    valid_windows(ranges).any(|(_, window)| window.contains(current))
}

/// Distance to the nearest upcoming window start
pub fn minutes_until_next_block<Tz: TimeZone>(
    now: &DateTime<Tz>,
    ranges: &[BlockedRange],
) -> NextBlock {
    let current = current_minute(now);
    let mut nearest: Option<(u32, &BlockedRange)> = None;

    for (range, window) in valid_windows(ranges) {
        if window.contains(current) {
            return NextBlock::AlreadyBlocked;
        }
        let distance = window.minutes_until_start(current);
        if nearest.is_none_or(|(best, _)| distance < best) {
            nearest = Some((distance, range));
        }
    }

    match nearest {
        Some((minutes, range)) => NextBlock::Upcoming {
            minutes,
            start: range.start_label().to_string(),
        },
        None => NextBlock::NoneScheduled,
    }
}

/// Check formats, then pairwise overlap. `exclude` skips one index (the
/// range being edited). Returns the first violation found.
pub fn validate_blocked_hours(ranges: &[BlockedRange], exclude: Option<usize>) -> Result<(), String> {
    let included = |i: &usize| Some(*i) != exclude;

    let mut windows = Vec::with_capacity(ranges.len());
    for (i, range) in ranges.iter().enumerate().filter(|(i, _)| included(i)) {
        let start = WallClock::parse(&range.start).map_err(|_| {
            format!("Invalid start time format in range {}: '{}'", i + 1, range.start)
        })?;
        let end = WallClock::parse(&range.end).map_err(|_| {
            format!("Invalid end time format in range {}: '{}'", i + 1, range.end)
        })?;
        windows.push((
            i,
            MinuteWindow {
                start: start.minutes_from_midnight(),
                end: end.minutes_from_midnight(),
            },
        ));
    }

    for (a, (i, first)) in windows.iter().enumerate() {
        for (j, second) in &windows[a + 1..] {
            if first.overlaps(second) {
                return Err(format!("Time ranges {} and {} overlap", i + 1, j + 1));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, hour, minute, 0).unwrap()
    }

    fn range(start: &str, end: &str) -> BlockedRange {
        BlockedRange::new(start, end)
    }

    #[test]
    fn test_half_open_bounds() {
        for (start, end) in [((9, 0), (17, 0)), ((23, 0), (6, 0)), ((0, 0), (0, 30))] {
            let ranges = [range(
                &format!("{:02}:{:02}", start.0, start.1),
                &format!("{:02}:{:02}", end.0, end.1),
            )];
            assert!(is_blocked(&at(start.0, start.1), &ranges), "start of {:?}", ranges);
            assert!(!is_blocked(&at(end.0, end.1), &ranges), "end of {:?}", ranges);
        }
    }

    #[test]
    fn test_wraparound_range() {
        let ranges = [range("23:00", "06:00")];
        assert!(is_blocked(&at(23, 30), &ranges));
        assert!(is_blocked(&at(2, 0), &ranges));
        assert!(is_blocked(&at(5, 59), &ranges));
        assert!(!is_blocked(&at(6, 0), &ranges));
        assert!(!is_blocked(&at(12, 0), &ranges));
        assert_eq!(minutes_until_next_block(&at(23, 30), &ranges), NextBlock::AlreadyBlocked);
    }

    #[test]
    fn test_minutes_until_same_day() {
        let ranges = [range("21:00", "23:00")];
        assert_eq!(
            minutes_until_next_block(&at(20, 0), &ranges),
            NextBlock::Upcoming {
                minutes: 60,
                start: "21:00".into()
            }
        );
    }

    #[test]
    fn test_minutes_until_next_day() {
        let ranges = [range("07:00", "08:00")];
        assert_eq!(
            minutes_until_next_block(&at(22, 0), &ranges),
            NextBlock::Upcoming {
                minutes: 540,
                start: "07:00".into()
            }
        );
    }

    #[test]
    fn test_nearest_range_wins() {
        let ranges = [range("22:00", "23:00"), range("18:30", "19:00")];
        assert_eq!(
            minutes_until_next_block(&at(18, 0), &ranges),
            NextBlock::Upcoming {
                minutes: 30,
                start: "18:30".into()
            }
        );
    }

    #[test]
    fn test_sentinel_iff_blocked() {
        let ranges = [range("08:00", "09:00"), range("22:00", "02:00"), range("bad", "10:00")];
        for hour in 0..24 {
            for minute in [0, 15, 59] {
                let now = at(hour, minute);
                assert_eq!(
                    minutes_until_next_block(&now, &ranges) == NextBlock::AlreadyBlocked,
                    is_blocked(&now, &ranges),
                    "at {:02}:{:02}",
                    hour,
                    minute
                );
            }
        }
    }

    #[test]
    fn test_malformed_ranges_skipped() {
        let ranges = [range("", "06:00"), range("25:00", "26:00"), range("10:00", "11:00")];
        assert!(is_blocked(&at(10, 30), &ranges));
        assert!(!is_blocked(&at(3, 0), &ranges));
        assert_eq!(
            minutes_until_next_block(&at(12, 0), &[range("x", "y")]),
            NextBlock::NoneScheduled
        );
        assert_eq!(minutes_until_next_block(&at(12, 0), &[]), NextBlock::NoneScheduled);
    }

    #[test]
    fn test_validate_formats() {
        assert_eq!(
            validate_blocked_hours(&[range("10:00", "11:00"), range("9am", "10:00")], None),
            Err("Invalid start time format in range 2: '9am'".into())
        );
        assert_eq!(
            validate_blocked_hours(&[range("10:00", "24:00")], None),
            Err("Invalid end time format in range 1: '24:00'".into())
        );
    }

    #[test]
    fn test_validate_overlap() {
        let ranges = [range("21:00", "23:00"), range("22:30", "01:00")];
        assert_eq!(
            validate_blocked_hours(&ranges, None),
            Err("Time ranges 1 and 2 overlap".into())
        );
        assert!(validate_blocked_hours(&ranges, Some(0)).is_ok());
        assert!(validate_blocked_hours(&[range("09:00", "10:00"), range("10:00", "11:00")], None).is_ok());
    }

    #[test]
    fn test_overlap_is_symmetric() {
        let samples = [
            range("09:00", "10:00"),
            range("09:30", "09:45"),
            range("23:00", "06:00"),
            range("05:00", "07:00"),
            range("06:00", "23:00"),
            range("12:00", "12:00"),
        ];
        for a in &samples {
            for b in &samples {
                let ab = validate_blocked_hours(&[a.clone(), b.clone()], None).is_ok();
                let ba = validate_blocked_hours(&[b.clone(), a.clone()], None).is_ok();
                assert_eq!(ab, ba, "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_from_value_keeps_partial_entries() {
        let value = serde_json::json!({"start": "22:00"});
        let range = BlockedRange::from_value(&value).unwrap();
        assert_eq!(range.end, "");
        assert!(range.window().is_err());
        assert!(BlockedRange::from_value(&serde_json::json!("22:00-06:00")).is_none());
    }
}
