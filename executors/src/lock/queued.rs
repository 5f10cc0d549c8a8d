use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::sync::oneshot;

use super::{Holder, LockError, LockToken, Lockable, SharedClock};
use crate::metrics::{LockKind, record_lock_contention, record_stale_lock_release};

type Grant = Result<LockToken, LockError>;

struct Waiter {
    key: String,
    grant: oneshot::Sender<Grant>,
}

#[derive(Default)]
struct State {
    holder: Option<Holder>,
    version: u64,
    waiters: VecDeque<Waiter>,
}

impl State {
    fn grant(&mut self, key: String, now_ms: u64) -> LockToken {
        self.version += 1;
        self.holder = Some(Holder {
            key,
            acquired_at_ms: now_ms,
            version: self.version,
        });
        LockToken {
            version: self.version,
        }
    }
}

/// FIFO mutex. Callers wait their turn; ownership passes straight from one holder
/// to the next queued waiter.
pub struct QueuedMutex {
    state: Mutex<State>,
    clock: SharedClock,
    stale_after: Duration,
    last_activity_ms: AtomicU64,
}

impl QueuedMutex {
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

    pub async fn acquire(self: &Arc<Self>, key: impl Into<String>) -> Result<QueuedGuard, LockError> {
        let key = key.into();
        let now = self.clock.now_ms();

        let receiver = {
            let mut state = self.state();

            if let Some(current) = &state.holder {
                let held_for = current.held_for(now);
                if held_for >= self.stale_after {
                    let stale_holder = current.key.clone();
                    let rejected = state.waiters.len();
                    for waiter in state.waiters.drain(..) {
                        let _ = waiter.grant.send(Err(LockError::ForceReleased {
                            stale_holder: stale_holder.clone(),
                        }));
                    }
                    state.holder = None;

                    tracing::warn!(
                        stale_holder = %stale_holder,
                        held_for_ms = held_for.as_millis() as u64,
                        rejected_waiters = rejected,
                        "Force-releasing stale queued lock"
                    );
                    record_stale_lock_release(LockKind::Queued);
                }
            }

            if state.holder.is_none() {
                let token = state.grant(key, now);
                self.touch(now);
                return Ok(self.guard(token));
            }

            let (sender, receiver) = oneshot::channel();
            tracing::debug!(
                waiter = %key,
                position = state.waiters.len(),
                "Queued behind current lock holder"
            );
            record_lock_contention(LockKind::Queued);
            state.waiters.push_back(Waiter { key, grant: sender });
            receiver
        };

        let mut pending = PendingGrant {
            mutex: self.as_ref(),
            receiver: Some(receiver),
        };
        let grant = pending.wait().await?;
        Ok(self.guard(grant))
    }

    fn guard(self: &Arc<Self>, token: LockToken) -> QueuedGuard {
        QueuedGuard {
            mutex: Arc::clone(self),
            token,
            released: false,
        }
    }

    /// Frees the lock, or hands it to the next live waiter without ever
    /// showing it as unlocked in between.
    pub fn release(&self, token: &LockToken) -> bool {
        let now = self.clock.now_ms();
        let mut state = self.state();

        match &state.holder {
            Some(current) if current.version == token.version => {}
            _ => {
                tracing::debug!(
                    version = token.version,
                    "Ignoring release of a queued lock grant that is no longer current"
                );
                return false;
            }
        }

        state.holder = None;
        while let Some(waiter) = state.waiters.pop_front() {
            let token = state.grant(waiter.key, now);
            match waiter.grant.send(Ok(token)) {
                Ok(()) => break,
                // waiter gave up; undo and try the next one
                Err(_) => state.holder = None,
            }
        }
        self.touch(now);
        true
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

    pub fn queue_len(&self) -> usize {
        self.state().waiters.len()
    }
}

impl Lockable for QueuedMutex {
    fn is_locked(&self) -> bool {
        QueuedMutex::is_locked(self)
    }

    fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms.load(Ordering::SeqCst)
    }
}

/// A queued acquisition in flight. If the caller stops waiting after ownership was
/// already handed over, the grant is released on drop so the queue keeps moving.
struct PendingGrant<'a> {
    mutex: &'a QueuedMutex,
    receiver: Option<oneshot::Receiver<Grant>>,
}

impl PendingGrant<'_> {
    async fn wait(&mut self) -> Result<LockToken, LockError> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Err(LockError::Abandoned);
        };
        let outcome = receiver.await;
        self.receiver = None;
        outcome.unwrap_or(Err(LockError::Abandoned))
    }
}

impl Drop for PendingGrant<'_> {
    fn drop(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
            if let Ok(Ok(token)) = receiver.try_recv() {
                self.mutex.release(&token);
            }
        }
    }
}

/// Releases (or hands off) its grant when dropped.
pub struct QueuedGuard {
    mutex: Arc<QueuedMutex>,
    token: LockToken,
    released: bool,
}

impl QueuedGuard {
    pub fn token(&self) -> LockToken {
        self.token
    }

    pub fn release(mut self) -> bool {
        self.released = true;
        self.mutex.release(&self.token)
    }
}

impl Drop for QueuedGuard {
    fn drop(&mut self) {
        if !self.released {
            self.mutex.release(&self.token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::ManualClock;

    fn mutex() -> (Arc<ManualClock>, Arc<QueuedMutex>) {
        let clock = Arc::new(ManualClock::new(0));
        let mutex = Arc::new(QueuedMutex::new(clock.clone(), Duration::from_secs(15)));
        (clock, mutex)
    }

    async fn wait_for_queue(mutex: &QueuedMutex, len: usize) {
        while mutex.queue_len() < len {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn grants_waiters_in_submission_order() {
        let (_, mutex) = mutex();
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = mutex.acquire("holder").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..4 {
            let task_mutex = mutex.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let guard = task_mutex.acquire(format!("waiter-{i}")).await.unwrap();
                order.lock().unwrap().push(i);
                drop(guard);
            }));
            wait_for_queue(&mutex, i + 1).await;
        }

        drop(first);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
        assert!(!mutex.is_locked());
    }

    #[tokio::test]
    async fn release_hands_off_without_unlocking() {
        let (_, mutex) = mutex();
        let first = mutex.acquire("first").await.unwrap();

        let waiter = {
            let mutex = mutex.clone();
            tokio::spawn(async move { mutex.acquire("second").await.map(|g| g.token()) })
        };
        wait_for_queue(&mutex, 1).await;

        assert!(first.release());
        // ownership moved inside release, before the waiter task ever ran
        assert!(mutex.is_locked());
        assert_eq!(mutex.current_holder().as_deref(), Some("second"));

        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stale_holder_is_evicted_and_waiters_rejected() {
        let (clock, mutex) = mutex();
        let stale = mutex.acquire("stuck").await.unwrap();

        let waiter = {
            let mutex = mutex.clone();
            tokio::spawn(async move { mutex.acquire("queued").await.map(|g| g.token()) })
        };
        wait_for_queue(&mutex, 1).await;

        clock.advance(Duration::from_secs(15));
        let fresh = mutex.acquire("late").await.unwrap();

        assert!(matches!(
            waiter.await.unwrap(),
            Err(LockError::ForceReleased { stale_holder }) if stale_holder == "stuck"
        ));
        assert_eq!(mutex.current_holder().as_deref(), Some("late"));

        assert!(!stale.release());
        assert!(fresh.release());
        assert!(!mutex.is_locked());
    }

    #[tokio::test]
    async fn cancelled_waiter_is_skipped() {
        let (_, mutex) = mutex();
        let first = mutex.acquire("first").await.unwrap();

        let cancelled = {
            let mutex = mutex.clone();
            tokio::spawn(async move {
                let _ = mutex.acquire("cancelled").await;
            })
        };
        wait_for_queue(&mutex, 1).await;
        cancelled.abort();
        let _ = cancelled.await;

        drop(first);
        assert!(!mutex.is_locked());
        assert!(mutex.acquire("next").await.is_ok());
    }
}
