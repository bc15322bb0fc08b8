//! Bounded per-session memory with write-through persistence.
//!
//! Each `(user, session)` key has its own async mutex, so appends to one key
//! are applied and persisted in a single order while different keys proceed
//! in parallel. A session is loaded from the durable store the first time
//! its key is touched.
//!
//! The durable copy is authoritative once a write succeeds, so idle sessions
//! that are in sync with it may be dropped from memory and reloaded later.
//! Sessions whose last write or delete failed stay cached until one succeeds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use ac_domain::trace::TraceEvent;

use crate::durable::DurableStore;
use crate::key::{user_prefix, SessionKey};
use crate::session::Session;
use crate::turn::ConversationTurn;

/// Default bound on sessions held in memory.
pub const DEFAULT_CACHE_LIMIT: usize = 1024;

#[derive(Default)]
struct SlotState {
    /// `None` until the durable copy has been consulted.
    session: Option<Session>,
    /// The durable copy lags behind `session`.
    dirty: bool,
}

impl SlotState {
    /// Whether dropping this state loses nothing a reload would not restore.
    fn is_disposable(&self) -> bool {
        !self.dirty && self.session.as_ref().map_or(true, Session::is_empty)
    }
}

type Slot = Arc<tokio::sync::Mutex<SlotState>>;

struct CachedSlot {
    slot: Slot,
    last_used: Instant,
}

/// Persistence counters for operators.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreHealth {
    pub persist_failures: u64,
    pub load_failures: u64,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub cached_sessions: usize,
}

impl StoreHealth {
    pub fn is_healthy(&self) -> bool {
        self.persist_failures == 0 && self.load_failures == 0
    }
}

/// Listing entry for one stored session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub turn_count: usize,
    pub last_updated: DateTime<Utc>,
}

pub struct SessionMemoryStore {
    durable: Arc<dyn DurableStore>,
    max_turns: usize,
    cache_limit: usize,
    slots: Mutex<HashMap<SessionKey, CachedSlot>>,
    health: Mutex<StoreHealth>,
}

impl SessionMemoryStore {
    pub fn new(durable: Arc<dyn DurableStore>, max_turns: usize) -> Self {
        Self {
            durable,
            max_turns: max_turns.max(1),
            cache_limit: DEFAULT_CACHE_LIMIT,
            slots: Mutex::new(HashMap::new()),
            health: Mutex::new(StoreHealth::default()),
        }
    }

    /// Bound the number of sessions held in memory. Only idle sessions in
    /// sync with the durable store are evicted, so the bound is soft.
    pub fn with_cache_limit(mut self, limit: usize) -> Self {
        self.cache_limit = limit.max(1);
        self
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn health(&self) -> StoreHealth {
        let mut health = self.health.lock().clone();
        health.cached_sessions = self.slots.lock().len();
        health
    }

    fn slot(&self, key: &SessionKey) -> Slot {
        let mut slots = self.slots.lock();
        if let Some(cached) = slots.get_mut(key) {
            cached.last_used = Instant::now();
            return cached.slot.clone();
        }
        if slots.len() >= self.cache_limit {
            evict_idle(&mut slots, self.cache_limit);
        }
        let slot = Slot::default();
        slots.insert(
            key.clone(),
            CachedSlot {
                slot: slot.clone(),
                last_used: Instant::now(),
            },
        );
        slot
    }

    /// Drop `key` from memory when nobody else holds its slot and its state
    /// is disposable. Call after releasing the slot lock.
    fn release(&self, key: &SessionKey, slot: Slot) {
        let mut slots = self.slots.lock();
        let Some(cached) = slots.get(key) else { return };
        // The map and `slot` are the only holders.
        if !Arc::ptr_eq(&cached.slot, &slot) || Arc::strong_count(&slot) != 2 {
            return;
        }
        let disposable = slot.try_lock().map(|state| state.is_disposable()).unwrap_or(false);
        if disposable {
            slots.remove(key);
        }
    }

    /// Append `turn`, trim to the bound and persist the whole session.
    ///
    /// Returns the turn as stored (with its ordinal). A failed persist does
    /// not undo the in-memory append; it is counted in [`health`] and
    /// reported as a `PersistFailed` event.
    ///
    /// [`health`]: SessionMemoryStore::health
    pub async fn append(&self, key: &SessionKey, turn: ConversationTurn) -> ConversationTurn {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;
        let session = self.loaded(key, &mut guard).await;

        let stored = session.push(turn);
        let snapshot = session.clone();
        guard.dirty = !self.persist(key, &snapshot).await;
        stored
    }

    /// All retained turns, oldest first.
    pub async fn history(&self, key: &SessionKey) -> Vec<ConversationTurn> {
        self.session(key).await.turns
    }

    /// A copy of the session as currently held.
    pub async fn session(&self, key: &SessionKey) -> Session {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;
        let session = self.loaded(key, &mut guard).await.clone();
        drop(guard);
        self.release(key, slot);
        session
    }

    /// Empty the session and remove its durable copy. The next append
    /// starts a fresh session.
    ///
    /// When the delete succeeds the session is also dropped from memory.
    /// When it fails, the empty session stays cached so the stale durable
    /// copy is not reloaded.
    pub async fn clear(&self, key: &SessionKey) {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;
        guard.session = Some(Session::new(key, self.max_turns));

        match self.durable.delete(&key.durable_key()).await {
            Ok(()) => {
                guard.dirty = false;
                TraceEvent::SessionCleared {
                    user_id: key.user_id.clone(),
                    session_id: key.session_id.clone(),
                }
                .emit();
            }
            Err(e) => {
                guard.dirty = true;
                self.record_persist_failure(key, "delete", e.to_string());
            }
        }
        drop(guard);
        self.release(key, slot);
    }

    /// The user's sessions, most recently updated first.
    ///
    /// Merges durable copies with sessions held in memory, so sessions whose
    /// persist failed are still listed.
    pub async fn list_sessions(&self, user_id: &str) -> Vec<SessionSummary> {
        let mut found: HashMap<String, SessionSummary> = HashMap::new();

        match self.durable.list(&user_prefix(user_id)).await {
            Ok(keys) => {
                for durable_key in keys {
                    let session = match self.durable.read(&durable_key).await {
                        Ok(Some(bytes)) => serde_json::from_slice::<Session>(&bytes).ok(),
                        _ => None,
                    };
                    let Some(session) = session.filter(|s| s.user_id == user_id) else {
                        tracing::debug!(key = %durable_key, "skipping unreadable session blob");
                        continue;
                    };
                    found.insert(session.session_id.clone(), summarize(&session));
                }
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "failed to list stored sessions");
            }
        }

        let cached: Vec<(SessionKey, Slot)> = self
            .slots
            .lock()
            .iter()
            .filter(|(k, _)| k.user_id == user_id)
            .map(|(k, c)| (k.clone(), c.slot.clone()))
            .collect();
        for (key, slot) in cached {
            let guard = slot.lock().await;
            match guard.session.as_ref() {
                Some(session) if !session.is_empty() => {
                    found.insert(key.session_id.clone(), summarize(session));
                }
                // Cleared in this process; any durable copy is stale.
                Some(_) => {
                    found.remove(&key.session_id);
                }
                None => {}
            }
        }

        let mut sessions: Vec<SessionSummary> = found.into_values().collect();
        sessions.sort_by(|a, b| {
            b.last_updated
                .cmp(&a.last_updated)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        sessions
    }

    /// The session in `state`, loading it on first touch.
    async fn loaded<'a>(&self, key: &SessionKey, state: &'a mut SlotState) -> &'a mut Session {
        if state.session.is_none() {
            let (session, in_sync) = self.load(key).await;
            state.session = Some(session);
            state.dirty = !in_sync;
        }
        state.session.get_or_insert_with(|| Session::new(key, self.max_turns))
    }

    /// The stored session for `key`, and whether it matches the durable copy.
    /// An unreadable copy, or one written for another key, yields an empty
    /// session that is out of sync.
    async fn load(&self, key: &SessionKey) -> (Session, bool) {
        let durable_key = key.durable_key();
        let parsed = match self.durable.read(&durable_key).await {
            Ok(None) => return (Session::new(key, self.max_turns), true),
            Ok(Some(bytes)) => serde_json::from_slice::<Session>(&bytes)
                .map_err(|e| e.to_string())
                .and_then(|session| {
                    if session.key() == *key {
                        Ok(session)
                    } else {
                        Err(format!("{durable_key} belongs to session {}", session.key()))
                    }
                }),
            Err(e) => Err(e.to_string()),
        };

        match parsed {
            Ok(mut session) => {
                session.set_max_turns(self.max_turns);
                TraceEvent::SessionLoaded {
                    user_id: key.user_id.clone(),
                    session_id: key.session_id.clone(),
                    turns: session.len(),
                }
                .emit();
                (session, true)
            }
            Err(reason) => {
                self.note_error(|h| h.load_failures += 1, &reason);
                TraceEvent::SessionLoadFailed {
                    user_id: key.user_id.clone(),
                    session_id: key.session_id.clone(),
                    reason,
                }
                .emit();
                (Session::new(key, self.max_turns), false)
            }
        }
    }

    /// Write `session` through. Returns whether the durable copy now matches.
    async fn persist(&self, key: &SessionKey, session: &Session) -> bool {
        let bytes = match serde_json::to_vec_pretty(session) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.record_persist_failure(key, "serialize", e.to_string());
                return false;
            }
        };

        match self.durable.write(&key.durable_key(), &bytes).await {
            Ok(()) => {
                TraceEvent::SessionPersisted {
                    user_id: key.user_id.clone(),
                    session_id: key.session_id.clone(),
                    turns: session.len(),
                }
                .emit();
                true
            }
            Err(e) => {
                self.record_persist_failure(key, "write", e.to_string());
                false
            }
        }
    }

    fn record_persist_failure(&self, key: &SessionKey, operation: &str, reason: String) {
        self.note_error(|h| h.persist_failures += 1, &reason);
        TraceEvent::PersistFailed {
            user_id: key.user_id.clone(),
            session_id: key.session_id.clone(),
            operation: operation.to_owned(),
            reason,
        }
        .emit();
    }

    fn note_error(&self, bump: impl FnOnce(&mut StoreHealth), reason: &str) {
        let mut health = self.health.lock();
        bump(&mut *health);
        health.last_error = Some(reason.to_owned());
        health.last_error_at = Some(Utc::now());
    }
}

/// Remove the least recently used idle, in-sync slots until `slots` is
/// below `limit`.
fn evict_idle(slots: &mut HashMap<SessionKey, CachedSlot>, limit: usize) {
    let mut idle: Vec<(Instant, SessionKey)> = slots
        .iter()
        // Only the map holds the slot, so nobody can be waiting on it.
        .filter(|(_, c)| Arc::strong_count(&c.slot) == 1)
        .filter(|(_, c)| c.slot.try_lock().map(|state| !state.dirty).unwrap_or(false))
        .map(|(k, c)| (c.last_used, k.clone()))
        .collect();
    idle.sort();

    let excess = (slots.len() + 1).saturating_sub(limit);
    let mut evicted = 0;
    for (_, key) in idle.into_iter().take(excess) {
        slots.remove(&key);
        evicted += 1;
    }
    tracing::debug!(evicted, cached = slots.len(), "evicted idle sessions");
}

fn summarize(session: &Session) -> SessionSummary {
    SessionSummary {
        session_id: session.session_id.clone(),
        turn_count: session.len(),
        last_updated: session.last_updated,
    }
}
