//! Notification threshold engine
//!
//! Decides whether a warning is due for a given remaining time and emits at
//! most one per call. Every `(kind, context, threshold)` fires at most once
//! per calendar day.

use chrono::NaiveDate;
use curfew_host_api::{AudioCue, AudioPlayer, Notifier};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Context used for the overall-limit warning
pub const OVERALL_CONTEXT: &str = "all_apps";

/// Threshold (minutes) that gets the final-warning wording and cue
pub const FINAL_THRESHOLD: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A single app's dedicated limit; context is the app name
    Dedicated,
    /// The overall limit; context is [`OVERALL_CONTEXT`]
    Overall,
    /// Upcoming blocked hours; context is the range's start label
    BlockedHours,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dedicated => write!(f, "dedicated"),
            Self::Overall => write!(f, "overall"),
            Self::BlockedHours => write!(f, "blocked_hours"),
        }
    }
}

/// A warning the engine decided to emit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub context: String,
    pub threshold: u32,
    pub title: String,
    pub message: String,
    pub cue: AudioCue,
}

impl Warning {
    fn new(kind: WarningKind, context: &str, threshold: u32) -> Self {
        let last = threshold == FINAL_THRESHOLD;
        let (title, message) = match (kind, last) {
            (WarningKind::Dedicated, true) => (
                format!("⚠️ FINAL WARNING: {}", context),
                format!("{} will be closed in less than 1 minute!", context),
            ),
            (WarningKind::Dedicated, false) => (
                format!("⏰ Time Warning: {}", context),
                format!("{} will be closed in {} minutes", context, threshold),
            ),
            (WarningKind::Overall, true) => (
                "⚠️ FINAL WARNING: Overall Limit".to_string(),
                "All monitored apps will be closed in less than 1 minute!".to_string(),
            ),
            (WarningKind::Overall, false) => (
                "⏰ Overall Time Warning".to_string(),
                format!("All monitored apps will be closed in {} minutes", threshold),
            ),
            (WarningKind::BlockedHours, true) => (
                "⚠️ FINAL WARNING: Blocked Hours".to_string(),
                format!("Blocked hours start in less than 1 minute ({})!", context),
            ),
            (WarningKind::BlockedHours, false) => (
                "⏰ Blocked Hours Warning".to_string(),
                format!("Blocked hours start in {} minutes ({})", threshold, context),
            ),
        };

        Self {
            kind,
            context: context.to_string(),
            threshold,
            title,
            message,
            cue: if last { AudioCue::Final } else { AudioCue::Standard },
        }
    }
}

type SentKey = (WarningKind, String, u32);

/// Per-day deduplicating warning engine
pub struct NotificationEngine {
    sent: HashSet<SentKey>,
    day: Option<NaiveDate>,
    notifier: Arc<dyn Notifier>,
    audio: Arc<dyn AudioPlayer>,
}

impl NotificationEngine {
    pub fn new(notifier: Arc<dyn Notifier>, audio: Arc<dyn AudioPlayer>) -> Self {
        Self {
            sent: HashSet::new(),
            day: None,
            notifier,
            audio,
        }
    }

    fn roll_day(&mut self, today: NaiveDate) {
        if self.day != Some(today) {
            if self.day.is_some() {
                info!(day = %today, "New day, resetting sent warnings");
            }
            self.sent.clear();
            self.day = Some(today);
        }
    }

    /// Pick the warning due for `remaining_secs`, if any, and mark it sent.
    /// Thresholds are walked from largest to smallest; ones already sent
    /// today are passed over.
    pub fn evaluate(
        &mut self,
        kind: WarningKind,
        context: &str,
        remaining_secs: i64,
        thresholds: &[u32],
        today: NaiveDate,
    ) -> Option<Warning> {
        self.roll_day(today);

        let mut ordered = thresholds.to_vec();
        ordered.sort_unstable_by(|a, b| b.cmp(a));
        ordered.dedup();

        for threshold in ordered {
            if remaining_secs > i64::from(threshold) * 60 {
                continue;
            }
            let key = (kind, context.to_string(), threshold);
            if self.sent.contains(&key) {
                continue;
            }
            self.sent.insert(key);
            return Some(Warning::new(kind, context, threshold));
        }

        None
    }

    /// Show the warning and play its cue. Failures are logged, never returned.
    pub fn dispatch(&self, warning: &Warning) {
        info!(
            kind = %warning.kind,
            context = %warning.context,
            threshold = warning.threshold,
            "Sending warning"
        );

        if let Err(e) = self.notifier.show(&warning.title, &warning.message) {
            warn!(error = %e, "Failed to show notification");
        }
        if let Err(e) = self.audio.play(warning.cue) {
            warn!(error = %e, cue = ?warning.cue, "Failed to play notification sound");
        }
    }

    fn evaluate_and_dispatch(
        &mut self,
        kind: WarningKind,
        context: &str,
        remaining_secs: i64,
        thresholds: &[u32],
        today: NaiveDate,
    ) -> Option<Warning> {
        let warning = self.evaluate(kind, context, remaining_secs, thresholds, today)?;
        self.dispatch(&warning);
        Some(warning)
    }

    pub fn notify_dedicated(
        &mut self,
        app: &str,
        remaining_secs: i64,
        thresholds: &[u32],
        today: NaiveDate,
    ) -> Option<Warning> {
        self.evaluate_and_dispatch(WarningKind::Dedicated, app, remaining_secs, thresholds, today)
    }

    pub fn notify_overall(
        &mut self,
        remaining_secs: i64,
        thresholds: &[u32],
        today: NaiveDate,
    ) -> Option<Warning> {
        self.evaluate_and_dispatch(
            WarningKind::Overall,
            OVERALL_CONTEXT,
            remaining_secs,
            thresholds,
            today,
        )
    }

    pub fn notify_blocked_hours(
        &mut self,
        minutes_until: u32,
        start_label: &str,
        thresholds: &[u32],
        today: NaiveDate,
    ) -> Option<Warning> {
        self.evaluate_and_dispatch(
            WarningKind::BlockedHours,
            start_label,
            i64::from(minutes_until) * 60,
            thresholds,
            today,
        )
    }

    /// Forget every sent warning for `context`
    pub fn clear(&mut self, context: &str) {
        self.sent.retain(|(_, ctx, _)| ctx != context);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }
}
