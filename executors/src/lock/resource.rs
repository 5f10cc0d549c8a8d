use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use super::{Holder, LockToken, Lockable, SharedClock};
use crate::metrics::{LockKind, record_lock_contention, record_stale_lock_release};

#[derive(Debug, Default)]
struct State {
    holder: Option<Holder>,
    version: u64,
}

/// Non-queuing mutex. A busy lock is reported immediately instead of waited on.
pub struct ResourceMutex {
    state: Mutex<State>,
    clock: SharedClock,
    stale_after: Duration,
    last_activity_ms: AtomicU64,
}

impl ResourceMutex {
    pub fn new(clock: SharedClock, stale_after: Duration) -> Self {
        let now = clock.now_ms();
        Self {
            state: Mutex::new(State::default()),
            clock,
            stale_after,
            last_activity_ms: AtomicU64::new(now),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self, now_ms: u64) {
        self.last_activity_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Takes the lock for `holder`, or returns `None` if someone else holds it.
    /// A lock held for longer than the stale timeout is taken over.
    pub fn try_acquire(self: &Arc<Self>, holder: impl Into<String>) -> Option<ResourceGuard> {
        let token = self.try_lock(holder.into())?;
        Some(ResourceGuard {
            mutex: Arc::clone(self),
            token,
            released: false,
        })
    }

    /// Raw acquisition. Pair every `Some` with [`ResourceMutex::release`].
    pub fn try_lock(&self, holder: String) -> Option<LockToken> {
        let now = self.clock.now_ms();
        let mut state = self.state();

        if let Some(current) = &state.holder {
            let held_for = current.held_for(now);
            if held_for < self.stale_after {
                tracing::debug!(
                    holder = %current.key,
                    contender = %holder,
                    held_for_ms = held_for.as_millis() as u64,
                    "Resource lock busy"
                );
                record_lock_contention(LockKind::Resource);
                return None;
            }

            tracing::warn!(
                stale_holder = %current.key,
                new_holder = %holder,
                held_for_ms = held_for.as_millis() as u64,
                "Force-releasing stale resource lock"
            );
            record_stale_lock_release(LockKind::Resource);
        }

        state.version += 1;
        let version = state.version;
        state.holder = Some(Holder {
            key: holder,
            acquired_at_ms: now,
            version,
        });
        self.touch(now);

        Some(LockToken { version })
    }

    /// Frees the lock if `token` still identifies the current grant.
    pub fn release(&self, token: &LockToken) -> bool {
        let now = self.clock.now_ms();
        let mut state = self.state();

        match &state.holder {
            Some(current) if current.version == token.version => {
                state.holder = None;
                self.touch(now);
                true
            }
            _ => {
                tracing::debug!(
                    version = token.version,
                    "Ignoring release of a lock grant that is no longer current"
                );
                false
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state().holder.is_some()
    }

    pub fn lock_duration(&self) -> Option<Duration> {
        let now = self.clock.now_ms();
        self.state().holder.as_ref().map(|h| h.held_for(now))
    }

    pub fn current_holder(&self) -> Option<String> {
        self.state().holder.as_ref().map(|h| h.key.clone())
    }
}

impl Lockable for ResourceMutex {
    fn is_locked(&self) -> bool {
        ResourceMutex::is_locked(self)
    }

    fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms.load(Ordering::SeqCst)
    }
}

/// Releases its grant when dropped.
pub struct ResourceGuard {
    mutex: Arc<ResourceMutex>,
    token: LockToken,
    released: bool,
}

impl ResourceGuard {
    pub fn token(&self) -> LockToken {
        self.token
    }

    /// Explicit release. Returns `false` if the grant had already been taken over.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.mutex.release(&self.token)
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        if !self.released {
            self.mutex.release(&self.token);
        }
    }
}
