//! Cancellable delayed timers.
//!
//! A [`TimerSet`] keeps at most one pending timer per key. Scheduling a key
//! that is already pending is refused, so repeated triggers collapse into a
//! single firing. A timer leaves the set just before its callback runs, which
//! lets the callback schedule the same key again.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;

type Pending<K> = Arc<Mutex<HashMap<K, (u64, AbortHandle)>>>;

/// Keyed set of delayed callbacks.
pub struct TimerSet<K> {
    name: &'static str,
    pending: Pending<K>,
    generation: AtomicU64,
}

impl<K> TimerSet<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Empty timer set. `name` labels logs and the pending gauge.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Run `fire` after `delay` unless cancelled first.
    ///
    /// Returns `false`, dropping `fire`, when `key` already has a pending timer.
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, key: K, delay: Duration, fire: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.contains_key(&key) {
            return false;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.pending);
        let name = self.name;
        let own_key = key.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_ours = {
                let mut pending = registry.lock().unwrap_or_else(PoisonError::into_inner);
                let ours = pending.get(&own_key).is_some_and(|(g, _)| *g == generation);
                if ours {
                    pending.remove(&own_key);
                }
                record_pending(name, pending.len());
                ours
            };
            if still_ours {
                fire.await;
            }
        });

        pending.insert(key, (generation, task.abort_handle()));
        record_pending(self.name, pending.len());
        true
    }

    /// Cancel the pending timer for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = pending.remove(key);
        record_pending(self.name, pending.len());
        removed.is_some_and(|(_, handle)| {
            handle.abort();
            true
        })
    }

    /// Cancel every pending timer. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            let drained = pending.drain().collect();
            record_pending(self.name, 0);
            drained
        };
        for (_, (_, handle)) in &drained {
            handle.abort();
        }
        if !drained.is_empty() {
            tracing::info!(timers = self.name, cancelled = drained.len(), "Cancelled pending timers");
        }
        drained.len()
    }

    /// Whether `key` has a pending timer.
    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Number of pending timers.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<K> std::fmt::Debug for TimerSet<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerSet").field("name", &self.name).finish_non_exhaustive()
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_pending(name: &'static str, count: usize) {
    metrics::gauge!("realm.timers.pending", "timers" => name).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn bump(count: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let count = Arc::clone(count);
        async move {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let timers = TimerSet::new("test");
        let fired = counter();

        assert!(timers.schedule(7_u32, Duration::from_secs(5), bump(&fired)));
        assert!(!timers.schedule(7_u32, Duration::from_secs(5), bump(&fired)));
        assert!(timers.is_pending(&7));

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timers.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let timers = TimerSet::new("test");
        let fired = counter();

        timers.schedule(1_u32, Duration::from_secs(1), bump(&fired));
        assert!(timers.cancel(&1));
        assert!(!timers.cancel(&1));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn key_is_reusable_after_firing() {
        let timers = TimerSet::new("test");
        let fired = counter();

        timers.schedule(1_u32, Duration::from_millis(10), bump(&fired));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(timers.schedule(1_u32, Duration::from_millis(10), bump(&fired)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears_everything() {
        let timers = TimerSet::new("test");
        let fired = counter();
        for key in 0..5_u32 {
            timers.schedule(key, Duration::from_secs(1), bump(&fired));
        }

        assert_eq!(timers.cancel_all(), 5);
        assert_eq!(timers.pending(), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
