//! Store trait definitions

use curfew_api::{Heartbeat, PendingUpdate, SecurityRecord, UsageLog};
use curfew_config::Config;

use crate::{AuditEvent, StoreResult};

/// Access to every persisted record shared by the monitor and the
/// supervisor. Each record has a single logical writer; see the process
/// that owns it before adding a new call site.
pub trait Store: Send + Sync {
    // Configuration (written by the supervisor and the deferred queue)

    /// Load and normalize the configuration. `None` means there is no
    /// configuration and no default to fall back to.
    fn load_config(&self) -> StoreResult<Option<Config>>;

    fn save_config(&self, config: &Config) -> StoreResult<()>;

    // Usage ledger (written by the monitor)

    fn load_usage(&self) -> StoreResult<UsageLog>;

    fn save_usage(&self, usage: &UsageLog) -> StoreResult<()>;

    // Deferred updates (enqueued by the supervisor, drained by either side)

    /// Load the queue in insertion order, silently dropping entries that do
    /// not parse
    fn load_pending(&self) -> StoreResult<Vec<PendingUpdate>>;

    fn save_pending(&self, updates: &[PendingUpdate]) -> StoreResult<()>;

    // Heartbeat (written by the monitor, read by the supervisor)

    fn read_heartbeat(&self) -> StoreResult<Option<Heartbeat>>;

    fn write_heartbeat(&self, heartbeat: &Heartbeat) -> StoreResult<()>;

    // Security record (written by the protected-mode device)

    fn load_security(&self) -> StoreResult<Option<SecurityRecord>>;

    fn save_security(&self, record: &SecurityRecord) -> StoreResult<()>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// Append-only log of enforcement events
pub trait AuditLog: Send + Sync {
    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;
}
