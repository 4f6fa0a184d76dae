//! Record types shared by the curfew processes
//!
//! The monitor and the supervisor never share memory; everything one side
//! needs from the other goes through a persisted record defined here:
//! - Usage ledger (seconds per app per calendar day)
//! - Monitor heartbeat
//! - Pending (deferred) limit changes
//! - Security record with the protected-mode state
//! - State events published inside the supervisor

mod events;
mod heartbeat;
mod pending;
mod security;
mod usage;

pub use events::*;
pub use heartbeat::*;
pub use pending::*;
pub use security::*;
pub use usage::*;
