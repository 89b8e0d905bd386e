//! Per-session event history.
//!
//! Sessions are created on their first event (or an explicit
//! [`SessionStore::start_session`]) and live in a sharded map. Appends for one
//! session are serialized by the shard write guard, so the history and the
//! running counters can never disagree. Readers take a shard read guard and see
//! a consistent prefix of the history.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use super::{BehavioralEvent, EventType};
use crate::config::AntiCheatConfig;

/// Shortest sweep period accepted by [`SessionStore::spawn_sweeper`]
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct SessionState {
    events: Vec<BehavioralEvent>,
    counts: BTreeMap<EventType, usize>,
    flags: usize,
    created_at: Instant,
    last_activity: Instant,
    finished_at: Option<Instant>,
}

impl SessionState {
    fn new(now: Instant) -> Self {
        Self {
            events: Vec::new(),
            counts: BTreeMap::new(),
            flags: 0,
            created_at: now,
            last_activity: now,
            finished_at: None,
        }
    }

    fn push(&mut self, event: BehavioralEvent, now: Instant) {
        *self.counts.entry(event.event_type).or_insert(0) += 1;
        if event.severity.is_flag() {
            self.flags += 1;
        }
        self.events.push(event);
        self.last_activity = now;
    }

    /// Full history in arrival order
    pub fn events(&self) -> &[BehavioralEvent] {
        &self.events
    }

    /// Per-type counts, maintained on append
    pub fn counts(&self) -> &BTreeMap<EventType, usize> {
        &self.counts
    }

    pub fn count_of(&self, event_type: EventType) -> usize {
        self.counts.get(&event_type).copied().unwrap_or(0)
    }

    /// Number of high or critical events, maintained on append
    pub fn flags_count(&self) -> usize {
        self.flags
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    fn is_expired(&self, now: Instant, ttl: Duration, finished_retention: Duration) -> bool {
        match self.finished_at {
            Some(finished) => now.saturating_duration_since(finished) >= finished_retention,
            None => now.saturating_duration_since(self.last_activity) >= ttl,
        }
    }
}

pub struct SessionStore {
    sessions: DashMap<String, SessionState>,
    ttl: Duration,
    finished_retention: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::from_config(&AntiCheatConfig::default())
    }
}

impl SessionStore {
    pub fn new(ttl: Duration, finished_retention: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            finished_retention,
        }
    }

    pub fn from_config(config: &AntiCheatConfig) -> Self {
        Self::new(
            Duration::from_secs(config.session_ttl_seconds),
            Duration::from_secs(config.finished_retention_seconds),
        )
    }

    /// Registers a session ahead of its first event. Returns `false` when it
    /// already existed.
    pub fn start_session(&self, session_id: &str) -> bool {
        let mut created = false;
        self.sessions.entry(session_id.to_string()).or_insert_with(|| {
            created = true;
            SessionState::new(Instant::now())
        });
        if created {
            log::debug!("Started anti-cheat session {}", session_id);
        }
        created
    }

    /// Appends an event, creating the session if needed, and hands the updated
    /// state to `inspect` while the session is still locked.
    pub fn append<R>(
        &self,
        session_id: &str,
        event: BehavioralEvent,
        inspect: impl FnOnce(&SessionState) -> R,
    ) -> R {
        let now = Instant::now();
        let mut state = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::new(now));
        state.push(event, now);
        inspect(&state)
    }

    /// Runs `inspect` against the session, if it exists.
    pub fn with_session<R>(
        &self,
        session_id: &str,
        inspect: impl FnOnce(&SessionState) -> R,
    ) -> Option<R> {
        self.sessions.get(session_id).map(|state| inspect(&state))
    }

    /// Marks the session finished. It stays readable until the finished
    /// retention window passes. Returns `false` for unknown sessions.
    pub fn finish_session(&self, session_id: &str) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut state) => {
                if state.finished_at.is_none() {
                    state.finished_at = Some(Instant::now());
                    log::debug!("Finished anti-cheat session {}", session_id);
                }
                true
            }
            None => false,
        }
    }

    pub fn evict(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now())
    }

    /// Drops idle sessions past their TTL and finished sessions past their
    /// retention window, as of `now`.
    pub fn evict_expired_at(&self, now: Instant) -> usize {
        let mut evicted = 0;
        self.sessions.retain(|_, state| {
            let expired = state.is_expired(now, self.ttl, self.finished_retention);
            if expired {
                evicted += 1;
            }
            !expired
        });
        if evicted > 0 {
            log::info!("Evicted {} expired anti-cheat sessions", evicted);
        }
        evicted
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Spawns a background task that evicts expired sessions every `interval`,
    /// raised to at least [`MIN_SWEEP_INTERVAL`].
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let period = interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.evict_expired();
            }
        })
    }
}
