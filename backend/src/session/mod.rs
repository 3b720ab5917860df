//! Sessions - per-client "active document" between workflow steps
//!
//! A combined collection can be kept in a session and exported later
//! without uploading it again. Sessions live in memory only; the store is
//! owned by its caller (the HTTP server wraps it in a lock).

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::FeatureCollection;

/// One client's workspace
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique identifier
    pub id: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last time this session was read or written
    pub last_used: DateTime<Utc>,
    active: Option<FeatureCollection>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            last_used: now,
            active: None,
        }
    }

    /// Replace the active document
    pub fn set_active(&mut self, collection: FeatureCollection) {
        self.active = Some(collection);
        self.touch();
    }

    pub fn active(&self) -> Option<&FeatureCollection> {
        self.active.as_ref()
    }

    pub fn clear(&mut self) {
        self.active = None;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_used = Utc::now();
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            created_at: self.created_at.to_rfc3339(),
            last_used: self.last_used.to_rfc3339(),
            active_features: self.active.as_ref().map(FeatureCollection::len),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable view of a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub created_at: String,
    pub last_used: String,
    /// Feature count of the active document, if any
    pub active_features: Option<usize>,
}

/// In-memory session registry
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a new session
    pub fn create(&mut self) -> &mut Session {
        let session = Session::new();
        self.sessions.entry(session.id.clone()).or_insert(session)
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }

    /// All sessions, oldest first
    pub fn list(&self) -> Vec<&Session> {
        let mut sessions: Vec<_> = self.sessions.values().collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions unused for longer than `max_idle`; returns their ids
    pub fn purge_idle(&mut self, max_idle: Duration) -> Vec<String> {
        self.purge_idle_at(Utc::now(), max_idle)
    }

    fn purge_idle_at(&mut self, now: DateTime<Utc>, max_idle: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .sessions
            .values()
            .filter(|s| now - s.last_used > max_idle)
            .map(|s| s.id.clone())
            .collect();

        for id in &expired {
            self.sessions.remove(id);
        }
        expired
    }
}
