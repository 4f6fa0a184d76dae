//! Deferred update queue
//!
//! Limit changes are not applied when requested. They wait in the pending
//! queue until `apply_at`, so a change made in a weak moment has a cooling
//! off period before it takes effect.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use curfew_api::{LimitChange, PendingUpdate};
use curfew_config::{Config, MIN_UPDATE_DELAY_HOURS};
use curfew_store::{Store, StoreResult};
use curfew_util::RunMode;
use std::sync::Arc;
use tracing::{debug, info};

/// What `schedule` did with a change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Queued until `apply_at`
    Scheduled { apply_at: DateTime<Utc> },
    /// Development mode: written straight into the configuration
    AppliedNow,
}

/// Apply one change to the limit tables
pub fn apply_change(config: &mut Config, change: &LimitChange) {
    let limits = &mut config.time_limits;
    match change {
        LimitChange::SetLimit { app, limit } => {
            limits.dedicated.insert(app.clone(), *limit);
        }
        LimitChange::SetOverall { limit } => {
            limits.overall = *limit;
        }
        LimitChange::RemoveApp { app } => {
            limits.dedicated.remove(app);
        }
        LimitChange::ReplaceApp {
            old_app,
            new_app,
            limit,
        } => {
            if let Some(old) = old_app {
                limits.dedicated.remove(old);
            }
            limits.dedicated.insert(new_app.clone(), *limit);
        }
    }
}

fn deadline(now: DateTime<Utc>, hours: u64) -> DateTime<Utc> {
    i64::try_from(hours)
        .ok()
        .and_then(ChronoDuration::try_hours)
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub struct DeferredQueue {
    store: Arc<dyn Store>,
    mode: RunMode,
}

impl DeferredQueue {
    pub fn new(store: Arc<dyn Store>, mode: RunMode) -> Self {
        Self { store, mode }
    }

    /// Queue `change` for `now + max(delay_hours, 2h)`. In development mode
    /// the change is applied to the stored configuration right away.
    pub fn schedule(
        &self,
        change: LimitChange,
        delay_hours: u64,
        now: DateTime<Utc>,
    ) -> StoreResult<ScheduleOutcome> {
        if self.mode.is_development() {
            let mut config = self.store.load_config()?.unwrap_or_default();
            apply_change(&mut config, &change);
            self.store.save_config(&config)?;
            info!(change = %change, "Applied limit change immediately (development mode)");
            return Ok(ScheduleOutcome::AppliedNow);
        }

        let apply_at = deadline(now, delay_hours.max(MIN_UPDATE_DELAY_HOURS));

        let mut pending = self.store.load_pending()?;
        pending.push(PendingUpdate::new(change.clone(), apply_at));
        self.store.save_pending(&pending)?;

        info!(change = %change, apply_at = %apply_at.to_rfc3339(), "Scheduled limit change");
        Ok(ScheduleOutcome::Scheduled { apply_at })
    }

    /// Apply every due entry to `config` in queue order and return the
    /// applied changes. Nothing is written when nothing is due.
    pub fn apply_due(
        &self,
        config: &mut Config,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<LimitChange>> {
        let pending = self.store.load_pending()?;
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let (due, future): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|update| update.is_due(now));
        if due.is_empty() {
            debug!(waiting = future.len(), "No limit changes due");
            return Ok(Vec::new());
        }

        let mut applied = Vec::with_capacity(due.len());
        for update in due {
            apply_change(config, &update.change);
            info!(change = %update.change, "Applied scheduled limit change");
            applied.push(update.change);
        }

        // A crash between these writes replays changes rather than losing them
        self.store.save_config(config)?;
        self.store.save_pending(&future)?;

        Ok(applied)
    }

    /// Entries still waiting, in queue order
    pub fn pending(&self, now: DateTime<Utc>) -> StoreResult<Vec<PendingUpdate>> {
        Ok(self
            .store
            .load_pending()?
            .into_iter()
            .filter(|update| !update.is_due(now))
            .collect())
    }
}
