use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info};

use crate::quiz::provider::ProviderError;
use crate::quiz::session::{Phase, QuizSession, Reveal, SessionError, Ticket};
use crate::quiz::timer::RevealTimers;
use crate::quiz::Question;

/// Every session keyed by its owner (a chat), together with the one timer
/// each of them may have pending. All mutation goes through the inner
/// lock, so answers, timed transitions and restarts never interleave.
pub struct SessionRegistry<K> {
    sessions: Mutex<HashMap<K, QuizSession>>,
    timers: RevealTimers<K>,
    next_id: AtomicU64,
}

impl<K> Default for SessionRegistry<K> {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            timers: RevealTimers::default(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<K> SessionRegistry<K>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timers(&self) -> &RevealTimers<K> {
        &self.timers
    }

    /// Replaces whatever `key` had with a new session in `Loading`.
    /// Returns the new session's id.
    pub fn open(&self, key: K, start_index: usize, amount: usize) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.timers.cancel(&key);
        info!("Opening session {} for {:?}", id, key);
        self.lock()
            .insert(key, QuizSession::new(id, start_index, amount));
        id
    }

    /// Tears down the session of `key` and its pending timer.
    pub fn close(&self, key: &K) -> bool {
        self.timers.cancel(key);
        let removed = self.lock().remove(key).is_some();
        if removed {
            info!("Closed session for {:?}", key);
        }
        removed
    }

    /// Hands a finished fetch to session `id`. Returns `None` when that
    /// session is gone or was replaced while the fetch was in flight.
    pub fn load(
        &self,
        key: &K,
        id: u64,
        fetched: Result<Vec<Question>, ProviderError>,
    ) -> Option<Result<(), ProviderError>> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(key).filter(|s| s.id() == id)?;
        if session.phase() != Phase::Loading {
            debug!("Session {} is no longer loading", id);
            return None;
        }
        Some(session.load(fetched, &mut rand::thread_rng()))
    }

    /// Moves a failed session back to `Loading`. Returns its id on success.
    pub fn retry(&self, key: &K) -> Option<u64> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(key)?;
        session.retry().then(|| session.id())
    }

    pub fn select_answer(
        &self,
        key: &K,
        option_index: usize,
    ) -> Option<Result<Option<Reveal>, SessionError>> {
        let mut sessions = self.lock();
        sessions
            .get_mut(key)
            .map(|session| session.select_answer(option_index))
    }

    /// Applies the timed transition if `ticket` still describes the session.
    /// A stale ticket yields `None` and leaves the session alone.
    pub fn advance(&self, key: &K, ticket: Ticket) -> Option<QuizSession> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(key)?;
        if session.ticket() != ticket {
            debug!("Dropping stale transition {:?} for {:?}", ticket, key);
            return None;
        }
        session.advance()?;
        Some(session.clone())
    }

    /// Arms the timed transition for `ticket`. Once `delay` has passed the
    /// session advances, provided the ticket still matches, and
    /// `on_advance` receives the resulting state.
    pub fn schedule_advance<F, Fut>(
        self: &Arc<Self>,
        key: K,
        ticket: Ticket,
        delay: Duration,
        on_advance: F,
    ) where
        F: FnOnce(QuizSession) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let registry = Arc::clone(self);
        let fired_key = key.clone();
        self.timers.schedule(key, delay, async move {
            if let Some(session) = registry.advance(&fired_key, ticket) {
                on_advance(session).await;
            }
        });
    }

    /// Restarts a finished session. In any other phase nothing changes,
    /// including a transition that is still pending.
    pub fn restart(&self, key: &K) -> Option<QuizSession> {
        let restarted = {
            let mut sessions = self.lock();
            let session = sessions.get_mut(key)?;
            session
                .restart(&mut rand::thread_rng())
                .then(|| session.clone())?
        };
        self.timers.cancel(key);
        Some(restarted)
    }

    /// A copy of the current state for rendering.
    pub fn snapshot(&self, key: &K) -> Option<QuizSession> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, QuizSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
