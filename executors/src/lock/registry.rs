use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::{sync::watch, task::JoinHandle};

use super::{QueuedMutex, ResourceMutex, SharedClock};

/// What the registry needs to know to decide whether an entry can be dropped.
pub trait Lockable: Send + Sync + 'static {
    fn is_locked(&self) -> bool;

    /// Millisecond timestamp of the last grant or release.
    fn last_activity_ms(&self) -> u64;
}

type Factory<M> = Box<dyn Fn() -> M + Send + Sync>;

/// Key to mutex map. Entries are created on first use and swept once they have been
/// unlocked, unreferenced and idle for longer than `idle_ttl`.
pub struct LockRegistry<M: Lockable> {
    entries: DashMap<String, Arc<M>>,
    factory: Factory<M>,
    clock: SharedClock,
    idle_ttl: Duration,
}

impl LockRegistry<ResourceMutex> {
    pub fn resource(clock: SharedClock, stale_after: Duration, idle_ttl: Duration) -> Self {
        let mutex_clock = clock.clone();
        Self::with_factory(
            clock,
            idle_ttl,
            Box::new(move || ResourceMutex::new(mutex_clock.clone(), stale_after)),
        )
    }
}

impl LockRegistry<QueuedMutex> {
    pub fn queued(clock: SharedClock, stale_after: Duration, idle_ttl: Duration) -> Self {
        let mutex_clock = clock.clone();
        Self::with_factory(
            clock,
            idle_ttl,
            Box::new(move || QueuedMutex::new(mutex_clock.clone(), stale_after)),
        )
    }
}

impl<M: Lockable> LockRegistry<M> {
    fn with_factory(clock: SharedClock, idle_ttl: Duration, factory: Factory<M>) -> Self {
        Self {
            entries: DashMap::new(),
            factory,
            clock,
            idle_ttl,
        }
    }

    pub fn get(&self, key: &str) -> Arc<M> {
        if let Some(existing) = self.entries.get(key) {
            return Arc::clone(existing.value());
        }

        self.entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::new((self.factory)()))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evicts idle entries, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let idle_ttl_ms = self.idle_ttl.as_millis() as u64;
        let before = self.entries.len();

        self.entries.retain(|_, mutex| {
            // someone still holds a handle (a guard, or a caller about to acquire)
            if Arc::strong_count(mutex) > 1 || mutex.is_locked() {
                return true;
            }
            now.saturating_sub(mutex.last_activity_ms()) <= idle_ttl_ms
        });

        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            tracing::debug!(
                evicted,
                remaining = self.entries.len(),
                "Swept idle lock registry entries"
            );
        }
        evicted
    }

    /// Runs [`LockRegistry::sweep`] every `interval` until `shutdown` flips to `true`.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::debug!("Lock registry sweeper stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}
