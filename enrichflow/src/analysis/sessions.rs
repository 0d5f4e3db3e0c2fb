//! Thinking sessions: per-session chains of reasoning steps.
//!
//! Sessions live in an explicit store that is shared by handing out an
//! `Arc`. Entries expire after a time-to-live and the store holds at most a
//! fixed number of sessions, evicting the least recently touched one.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default session time-to-live.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Default maximum number of live sessions.
pub const DEFAULT_SESSION_CAPACITY: usize = 1024;

/// One step in a thinking session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThoughtStep {
    /// Position in the session, starting at 1.
    pub step: usize,
    /// The thought text.
    pub thought: String,
    /// When the step was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// A session's accumulated thoughts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingSession {
    /// The session the thoughts belong to.
    pub session_id: String,
    /// Steps in recording order.
    pub steps: Vec<ThoughtStep>,
    /// When the session was opened.
    pub created_at: DateTime<Utc>,
    /// When the last step was recorded.
    pub updated_at: DateTime<Utc>,
}

impl ThinkingSession {
    fn new(session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the most recent step.
    #[must_use]
    pub fn latest(&self) -> Option<&ThoughtStep> {
        self.steps.last()
    }
}

#[derive(Debug)]
struct SessionEntry {
    session: ThinkingSession,
    touched: Instant,
}

/// Concurrent store of thinking sessions keyed by session id.
#[derive(Debug)]
pub struct ThinkingSessionStore {
    sessions: DashMap<String, SessionEntry>,
    ttl: Duration,
    capacity: usize,
}

impl Default for ThinkingSessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL, DEFAULT_SESSION_CAPACITY)
    }
}

impl ThinkingSessionStore {
    /// Creates a store. A capacity of zero is treated as one.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Returns the time-to-live.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a thought to a session, opening the session if needed, and
    /// returns the updated session.
    pub fn append(&self, session_id: &str, thought: impl Into<String>) -> ThinkingSession {
        self.evict_expired();
        if !self.sessions.contains_key(session_id) {
            self.make_room(session_id);
        }

        let snapshot = {
            let mut entry = self
                .sessions
                .entry(session_id.to_string())
                .or_insert_with(|| SessionEntry {
                    session: ThinkingSession::new(session_id),
                    touched: Instant::now(),
                });
            let now = Utc::now();
            let step = entry.session.steps.len() + 1;
            entry.session.steps.push(ThoughtStep {
                step,
                thought: thought.into(),
                recorded_at: now,
            });
            entry.session.updated_at = now;
            entry.touched = Instant::now();
            entry.session.clone()
        };

        // Concurrent openers may briefly overshoot; settle back to capacity.
        while self.sessions.len() > self.capacity {
            if !self.evict_oldest(Some(session_id)) {
                break;
            }
        }
        snapshot
    }

    /// Returns a live session.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<ThinkingSession> {
        {
            let entry = self.sessions.get(session_id)?;
            if entry.touched.elapsed() < self.ttl {
                return Some(entry.session.clone());
            }
        }
        self.sessions.remove(session_id);
        None
    }

    /// Removes a session, returning it if it was live.
    pub fn remove(&self, session_id: &str) -> Option<ThinkingSession> {
        self.sessions
            .remove(session_id)
            .filter(|(_, entry)| entry.touched.elapsed() < self.ttl)
            .map(|(_, entry)| entry.session)
    }

    /// Drops every expired session and returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| entry.touched.elapsed() < self.ttl);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!(evicted, "Evicted expired thinking sessions");
        }
        evicted
    }

    /// Returns the number of stored sessions, expired ones included until
    /// the next eviction.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no sessions are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn make_room(&self, incoming: &str) {
        while self.sessions.len() >= self.capacity {
            if !self.evict_oldest(Some(incoming)) {
                break;
            }
        }
    }

    /// Removes the least recently touched session other than `keep`.
    fn evict_oldest(&self, keep: Option<&str>) -> bool {
        let oldest = self
            .sessions
            .iter()
            .filter(|entry| keep != Some(entry.key().as_str()))
            .min_by_key(|entry| entry.value().touched)
            .map(|entry| entry.key().clone());
        match oldest {
            Some(key) => {
                debug!(session_id = %key, "Evicting least recently used thinking session");
                self.sessions.remove(&key).is_some()
            }
            None => false,
        }
    }
}
