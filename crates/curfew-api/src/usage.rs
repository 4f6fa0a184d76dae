//! Usage ledger: accumulated seconds of use per app per calendar day

use chrono::NaiveDate;
use curfew_util::{day_key, AppName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Seconds of use per application, keyed by calendar day (`YYYY-MM-DD`).
///
/// Entries are created lazily and only ever grow within a day. Past days are
/// never deleted; a new day simply starts under a new key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageLog {
    days: BTreeMap<String, BTreeMap<AppName, u64>>,
}

impl UsageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure every app has an entry (possibly zero) for `day`
    pub fn ensure_apps<'a>(&mut self, day: NaiveDate, apps: impl IntoIterator<Item = &'a AppName>) {
        let entry = self.days.entry(day_key(day)).or_default();
        for app in apps {
            entry.entry(app.clone()).or_insert(0);
        }
    }

    /// Add `delta_secs` to the app's total for `day` and return the new total
    pub fn record_usage(&mut self, day: NaiveDate, app: &AppName, delta_secs: u64) -> u64 {
        let used = self
            .days
            .entry(day_key(day))
            .or_default()
            .entry(app.clone())
            .or_insert(0);
        *used = used.saturating_add(delta_secs);
        *used
    }

    pub fn used(&self, day: NaiveDate, app: &AppName) -> u64 {
        self.days
            .get(&day_key(day))
            .and_then(|apps| apps.get(app))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of the usage of `apps` on `day`
    pub fn total_used<'a>(&self, day: NaiveDate, apps: impl IntoIterator<Item = &'a AppName>) -> u64 {
        apps.into_iter().map(|app| self.used(day, app)).sum()
    }

    pub fn day(&self, day: NaiveDate) -> Option<&BTreeMap<AppName, u64>> {
        self.days.get(&day_key(day))
    }

    pub fn days(&self) -> impl Iterator<Item = &str> {
        self.days.keys().map(String::as_str)
    }
}

/// Remaining budget; negative once the limit is overrun.
pub fn remaining(limit: u64, used: u64) -> i64 {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let used = i64::try_from(used).unwrap_or(i64::MAX);
    limit.saturating_sub(used)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn test_record_usage_accumulates() {
        let mut log = UsageLog::new();
        let app = AppName::new("game.exe");

        assert_eq!(log.record_usage(day(1), &app, 30), 30);
        assert_eq!(log.record_usage(day(1), &app, 30), 60);
        assert_eq!(log.used(day(1), &app), 60);
    }

    #[test]
    fn test_new_day_starts_from_zero() {
        let mut log = UsageLog::new();
        let app = AppName::new("game.exe");

        log.record_usage(day(1), &app, 500);
        assert_eq!(log.used(day(2), &app), 0);
        assert_eq!(log.used(day(1), &app), 500);
    }

    #[test]
    fn test_total_used_only_counts_given_apps() {
        let mut log = UsageLog::new();
        let a = AppName::new("a");
        let b = AppName::new("b");
        let c = AppName::new("c");

        log.record_usage(day(1), &a, 10);
        log.record_usage(day(1), &b, 20);
        log.record_usage(day(1), &c, 40);

        assert_eq!(log.total_used(day(1), [&a, &b]), 30);
    }

    #[test]
    fn test_ensure_apps_does_not_reset() {
        let mut log = UsageLog::new();
        let a = AppName::new("a");
        let b = AppName::new("b");

        log.record_usage(day(1), &a, 10);
        log.ensure_apps(day(1), [&a, &b]);

        assert_eq!(log.used(day(1), &a), 10);
        assert_eq!(log.day(day(1)).unwrap().get("b"), Some(&0));
    }

    #[test]
    fn test_remaining() {
        assert_eq!(remaining(120, 90), 30);
        assert_eq!(remaining(120, 150), -30);
    }

    #[test]
    fn test_on_disk_shape() {
        let mut log = UsageLog::new();
        log.record_usage(day(1), &AppName::new("game.exe"), 30);

        let json = serde_json::to_string(&log).unwrap();
        assert_eq!(json, r#"{"2025-06-01":{"game.exe":30}}"#);
    }

    #[test]
    fn test_remaining_saturates_for_huge_limits() {
        assert_eq!(remaining(u64::MAX, 600), i64::MAX - 600);
        assert!(remaining(u64::MAX, u64::MAX) >= 0);
    }
}
