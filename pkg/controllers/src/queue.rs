//! Deduplicating work queue shared by controller workers.
//!
//! A key is handed to at most one worker at a time. Adding a key that is
//! already queued is a no-op; adding one that is being processed marks it
//! dirty so it is queued again once `done` is called for it.
//!
//! Delayed adds keep at most one timer per key: the earliest deadline wins.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

struct QueueState<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    failures: HashMap<K, u32>,
    scheduled: HashMap<K, (Instant, JoinHandle<()>)>,
    shutting_down: bool,
}

impl<K: Clone + Eq + Hash> QueueState<K> {
    /// Returns whether a worker should be woken.
    fn add(&mut self, key: K) -> bool {
        if self.shutting_down || !self.dirty.insert(key.clone()) {
            return false;
        }
        // Requeued by `done` once the current worker finishes.
        if self.processing.contains(&key) {
            return false;
        }
        self.queue.push_back(key);
        true
    }
}

struct Inner<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
    base_backoff: Duration,
    max_backoff: Duration,
}

#[derive(Clone)]
pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    failures: HashMap::new(),
                    scheduled: HashMap::new(),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                base_backoff,
                max_backoff,
            }),
        }
    }

    pub async fn add(&self, key: K) {
        if self.inner.state.lock().await.add(key) {
            self.inner.notify.notify_one();
        }
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.inner.state.lock().await;
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    if !state.queue.is_empty() {
                        self.inner.notify.notify_one();
                    }
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Mark `key` as no longer being processed.
    pub async fn done(&self, key: &K) {
        let mut state = self.inner.state.lock().await;
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.clone());
            self.inner.notify.notify_one();
        }
    }

    /// Add `key` once `delay` has passed. A pending wake for the same key
    /// that fires no later is kept and this call is dropped; a later one is
    /// replaced.
    pub async fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key).await;
            return;
        }
        let deadline = Instant::now() + delay;
        let mut state = self.inner.state.lock().await;
        if state.shutting_down {
            return;
        }
        if let Some((pending, handle)) = state.scheduled.get(&key) {
            if *pending <= deadline {
                return;
            }
            handle.abort();
        }

        let inner = Arc::clone(&self.inner);
        let timer_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let mut state = inner.state.lock().await;
            // A replaced timer may still get here before its abort lands.
            if !matches!(state.scheduled.get(&timer_key), Some((at, _)) if *at == deadline) {
                return;
            }
            state.scheduled.remove(&timer_key);
            if state.add(timer_key) {
                inner.notify.notify_one();
            }
        });
        state.scheduled.insert(key, (deadline, handle));
    }

    /// Number of keys waiting on a delayed add.
    pub async fn pending_wakes(&self) -> usize {
        self.inner.state.lock().await.scheduled.len()
    }

    /// Re-add `key` after its next backoff delay and return that delay.
    /// Doubles per consecutive failure, capped at the configured maximum.
    pub async fn add_rate_limited(&self, key: K) -> Duration {
        let delay = {
            let mut state = self.inner.state.lock().await;
            let failures = state.failures.entry(key.clone()).or_insert(0);
            *failures = failures.saturating_add(1);
            self.backoff_for(*failures)
        };
        self.add_after(key, delay).await;
        delay
    }

    fn backoff_for(&self, failures: u32) -> Duration {
        let factor = 1u32
            .checked_shl(failures.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.inner
            .base_backoff
            .saturating_mul(factor)
            .min(self.inner.max_backoff)
    }

    /// Reset the failure count of `key`.
    pub async fn forget(&self, key: &K) {
        self.inner.state.lock().await.failures.remove(key);
    }

    pub async fn failures(&self, key: &K) -> u32 {
        self.inner
            .state
            .lock()
            .await
            .failures
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    pub async fn shutdown(&self) {
        let mut state = self.inner.state.lock().await;
        state.shutting_down = true;
        for (_, (_, handle)) in state.scheduled.drain() {
            handle.abort();
        }
        drop(state);
        self.inner.notify.notify_waiters();
    }

    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> WorkQueue<String> {
        WorkQueue::new(Duration::from_millis(10), Duration::from_millis(80))
    }

    #[tokio::test]
    async fn test_add_dedupes() {
        let q = queue();
        q.add("a".to_string()).await;
        q.add("a".to_string()).await;
        q.add("b".to_string()).await;
        assert_eq!(q.len().await, 2);
        assert_eq!(q.get().await.as_deref(), Some("a"));
        assert_eq!(q.get().await.as_deref(), Some("b"));
        assert!(q.is_empty().await);
    }

    #[tokio::test]
    async fn test_readd_while_processing_is_deferred() {
        let q = queue();
        q.add("a".to_string()).await;
        let key = q.get().await.unwrap();

        // Never handed out twice concurrently.
        q.add("a".to_string()).await;
        assert!(q.is_empty().await);

        q.done(&key).await;
        assert_eq!(q.len().await, 1);
        assert_eq!(q.get().await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_done_without_readd_drops_key() {
        let q = queue();
        q.add("a".to_string()).await;
        let key = q.get().await.unwrap();
        q.done(&key).await;
        assert!(q.is_empty().await);
    }

    #[tokio::test]
    async fn test_backoff_grows_and_caps() {
        let q = queue();
        let key = "a".to_string();
        let delays = [
            q.add_rate_limited(key.clone()).await,
            q.add_rate_limited(key.clone()).await,
            q.add_rate_limited(key.clone()).await,
            q.add_rate_limited(key.clone()).await,
            q.add_rate_limited(key.clone()).await,
        ];
        assert_eq!(
            delays.map(|d| d.as_millis()),
            [10, 20, 40, 80, 80]
        );
        assert_eq!(q.failures(&key).await, 5);

        q.forget(&key).await;
        assert_eq!(q.failures(&key).await, 0);
        assert_eq!(q.add_rate_limited(key).await, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_backoff_never_overflows() {
        let q = WorkQueue::<u32>::new(Duration::from_millis(500), Duration::from_secs(300));
        assert_eq!(q.backoff_for(64), Duration::from_secs(300));
        assert_eq!(q.backoff_for(u32::MAX), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_add_after_delivers_later() {
        let q = queue();
        q.add_after("a".to_string(), Duration::from_millis(20)).await;
        assert!(q.is_empty().await);
        let key = tokio::time::timeout(Duration::from_secs(2), q.get())
            .await
            .unwrap();
        assert_eq!(key.as_deref(), Some("a"));
        assert_eq!(q.pending_wakes().await, 0);
    }

    #[tokio::test]
    async fn test_repeated_add_after_keeps_one_timer() {
        let q = queue();
        for _ in 0..100 {
            q.add_after("a".to_string(), Duration::from_secs(60)).await;
        }
        q.add_after("b".to_string(), Duration::from_secs(60)).await;
        assert_eq!(q.pending_wakes().await, 2);

        // Later deadlines never push out the pending one.
        q.add_after("a".to_string(), Duration::from_secs(600)).await;
        assert_eq!(q.pending_wakes().await, 2);
        q.shutdown().await;
        assert_eq!(q.pending_wakes().await, 0);
    }

    #[tokio::test]
    async fn test_earlier_add_after_replaces_pending_wake() {
        let q = queue();
        q.add_after("a".to_string(), Duration::from_secs(60)).await;
        q.add_after("a".to_string(), Duration::from_millis(20)).await;
        assert_eq!(q.pending_wakes().await, 1);

        let key = tokio::time::timeout(Duration::from_secs(2), q.get())
            .await
            .unwrap();
        assert_eq!(key.as_deref(), Some("a"));
        q.done(&"a".to_string()).await;
        assert_eq!(q.pending_wakes().await, 0);
        assert!(q.is_empty().await);
    }

    #[tokio::test]
    async fn test_rate_limited_retries_share_one_timer() {
        let q = queue();
        let key = "a".to_string();
        q.add_rate_limited(key.clone()).await;
        q.add_rate_limited(key.clone()).await;
        q.add_rate_limited(key.clone()).await;
        assert_eq!(q.pending_wakes().await, 1);

        // The first, shortest backoff is the one that fires.
        let got = tokio::time::timeout(Duration::from_secs(2), q.get())
            .await
            .unwrap();
        assert_eq!(got, Some(key));
        assert_eq!(q.pending_wakes().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        let q = queue();
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.shutdown().await;
        let got = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(got.is_none());

        q.add("late".to_string()).await;
        assert!(q.is_empty().await);
    }
}
