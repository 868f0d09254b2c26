use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::debug;
use tokio::task::AbortHandle;

type Pending<K> = HashMap<K, (u64, AbortHandle)>;

/// Delayed callbacks, at most one per key. Scheduling again for a key or
/// cancelling it aborts whatever was pending there.
pub struct RevealTimers<K> {
    pending: Arc<Mutex<Pending<K>>>,
    sequence: AtomicU64,
}

impl<K> Default for RevealTimers<K> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            sequence: AtomicU64::new(0),
        }
    }
}

impl<K> RevealTimers<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` once `delay` has elapsed unless cancelled first.
    pub fn schedule<F>(&self, key: K, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);
        let fired_key = key.clone();

        // Held across the spawn so the task cannot deregister before it is registered.
        let mut guard = lock(&self.pending);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut guard = lock(&pending);
                if guard.get(&fired_key).map(|(s, _)| *s) == Some(seq) {
                    guard.remove(&fired_key);
                }
            }
            task.await;
        });

        if let Some((_, previous)) = guard.insert(key.clone(), (seq, handle.abort_handle())) {
            debug!("Replacing pending timer for {:?}", key);
            previous.abort();
        }
    }

    /// Aborts the pending callback for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.pending).remove(key) {
            Some((_, handle)) => {
                debug!("Cancelled pending timer for {:?}", key);
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.pending).contains_key(key)
    }
}

fn lock<K>(pending: &Mutex<Pending<K>>) -> MutexGuard<'_, Pending<K>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}
