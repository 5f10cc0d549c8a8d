//! In-process mutexes keyed by compromised address (rescues) and chain id (ledger ingestion).
//!
//! Every grant carries a version. A holder whose lock was force-released as stale keeps
//! a token that no longer matches, so its late `release` is a no-op instead of freeing
//! a lock that now belongs to someone else.

use std::time::Duration;

use serde::Serialize;

mod clock;
mod queued;
mod registry;
mod resource;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use queued::{QueuedGuard, QueuedMutex};
pub use registry::{LockRegistry, Lockable};
pub use resource::{ResourceGuard, ResourceMutex};

/// Rescue locks older than this are considered abandoned.
pub const DEFAULT_RESCUE_LOCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Ingestion locks older than this are force-released, failing everyone queued behind them.
pub const DEFAULT_INGESTION_LOCK_TIMEOUT: Duration = Duration::from_secs(15);

/// Unlocked registry entries idle for longer than this are evicted.
pub const DEFAULT_REGISTRY_IDLE_TTL: Duration = Duration::from_secs(10 * 60);

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Proof of one particular grant of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken {
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockError {
    #[error("lock held by {stale_holder} went stale and was force-released; queued waiters were rejected")]
    #[serde(rename_all = "camelCase")]
    ForceReleased { stale_holder: String },

    #[error("lock was dropped before ownership was granted")]
    Abandoned,
}

#[derive(Debug, Clone)]
struct Holder {
    key: String,
    acquired_at_ms: u64,
    version: u64,
}

impl Holder {
    fn held_for(&self, now_ms: u64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.acquired_at_ms))
    }
}
