//! In-memory session store with expiry and bounded history

use super::models::{Session, SessionStats};
use crate::config::SessionConfig;
use crate::errors::{MeshError, MeshResult};
use crate::memory::MemoryBank;
use crate::message::{Context, HistoryEntry, Metadata};
use crate::utils;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Keyed session state with inactivity expiry.
///
/// Any lookup on an unknown or expired id fails with
/// [`MeshError::SessionNotFound`]; callers start a new session on that error.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    memory: Option<Arc<MemoryBank>>,
    timeout: Duration,
    max_history: usize,
    keep_recent: usize,
}

impl SessionStore {
    /// Empty store using the configured timeout and history bounds
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            memory: None,
            timeout: Duration::from_secs(config.timeout_seconds),
            max_history: config.max_history.max(1),
            keep_recent: config.keep_recent,
        }
    }

    /// Attach the memory bank whose snapshot goes into every [`Context`]
    pub fn with_memory(mut self, memory: Arc<MemoryBank>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Override the inactivity timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attached memory bank, if any
    pub fn memory(&self) -> Option<&Arc<MemoryBank>> {
        self.memory.as_ref()
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        // negative age (clock stepped back) counts as fresh
        (now - session.last_accessed)
            .to_std()
            .map(|age| age > self.timeout)
            .unwrap_or(false)
    }

    /// Run `f` against a live session, refreshing its access time
    fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session) -> R,
    ) -> MeshResult<R> {
        let now = Utc::now();
        let mut sessions = utils::lock(&self.sessions);
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| MeshError::session_not_found(session_id))?;

        if self.is_expired(session, now) {
            warn!("Session {} expired", session_id);
            return Err(MeshError::session_not_found(session_id));
        }

        session.last_accessed = now;
        Ok(f(session))
    }

    /// Create a session and return its id
    pub fn create(
        &self,
        user_id: Option<&str>,
        initial_state: Option<BTreeMap<String, Value>>,
    ) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        let session = Session::new(
            session_id.clone(),
            user_id.map(str::to_string),
            initial_state.unwrap_or_default(),
        );
        utils::lock(&self.sessions).insert(session_id.clone(), session);
        info!("Created session: {}", session_id);
        session_id
    }

    /// Snapshot of a session
    pub fn get(&self, session_id: &str) -> MeshResult<Session> {
        self.with_session(session_id, |session| session.clone())
    }

    /// Materialize the context handed to agents
    pub fn context_for(&self, session_id: &str) -> MeshResult<Context> {
        let session = self.get(session_id)?;
        let memory = self
            .memory
            .as_ref()
            .map(|bank| bank.all(session_id))
            .unwrap_or_default();

        Ok(Context {
            session_id: session.session_id,
            user_id: session.user_id,
            conversation_history: session.conversation_history,
            memory,
            state: session.state,
        })
    }

    /// Append to history, compacting past `max_history`
    pub fn append_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        metadata: Option<Metadata>,
    ) -> MeshResult<()> {
        let max_history = self.max_history;
        self.with_session(session_id, |session| {
            session.conversation_history.push(HistoryEntry::new(
                role,
                content,
                metadata.unwrap_or_default(),
            ));
            if session.conversation_history.len() > max_history {
                session.retain_anchor_and_recent(max_history - 1);
                debug!("Compacted context for session {}", session_id);
            }
        })
    }

    /// Set one scratch-state value
    pub fn set_state(&self, session_id: &str, key: &str, value: Value) -> MeshResult<()> {
        self.with_session(session_id, |session| {
            session.state.insert(key.to_string(), value);
        })
    }

    /// Read one scratch-state value
    pub fn get_state(&self, session_id: &str, key: &str) -> MeshResult<Option<Value>> {
        self.with_session(session_id, |session| session.state.get(key).cloned())
    }

    /// Whole scratch-state map
    pub fn state(&self, session_id: &str) -> MeshResult<BTreeMap<String, Value>> {
        self.with_session(session_id, |session| session.state.clone())
    }

    /// Set one metadata value
    pub fn set_metadata(&self, session_id: &str, key: &str, value: Value) -> MeshResult<()> {
        self.with_session(session_id, |session| {
            session.metadata.insert(key.to_string(), value);
        })
    }

    /// Keep the first entry plus the last `keep_recent` once history is longer
    /// than `keep_recent`. Returns the number of entries removed.
    pub fn compact(&self, session_id: &str, keep_recent: usize) -> MeshResult<usize> {
        let removed = self.with_session(session_id, |session| {
            if session.conversation_history.len() > keep_recent {
                session.retain_anchor_and_recent(keep_recent)
            } else {
                0
            }
        })?;
        if removed > 0 {
            info!(
                "Compacted context for session {}: removed {} messages",
                session_id, removed
            );
        }
        Ok(removed)
    }

    /// [`compact`](Self::compact) with the configured `keep_recent`
    pub fn compact_default(&self, session_id: &str) -> MeshResult<usize> {
        self.compact(session_id, self.keep_recent)
    }

    /// Remove a session; returns whether it existed
    pub fn delete(&self, session_id: &str) -> bool {
        let removed = utils::lock(&self.sessions).remove(session_id).is_some();
        if removed {
            info!("Deleted session: {}", session_id);
        }
        removed
    }

    /// Remove every expired session
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = utils::lock(&self.sessions);
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session, now));
        let removed = before - sessions.len();
        if removed > 0 {
            info!("Cleaned up {} expired sessions", removed);
        }
        removed
    }

    /// Total and unexpired session counts
    pub fn stats(&self) -> SessionStats {
        let now = Utc::now();
        let sessions = utils::lock(&self.sessions);
        SessionStats {
            total_sessions: sessions.len(),
            active_sessions: sessions
                .values()
                .filter(|session| !self.is_expired(session, now))
                .count(),
        }
    }

    /// Number of stored sessions, expired ones included until swept
    pub fn len(&self) -> usize {
        utils::lock(&self.sessions).len()
    }

    /// True when no session is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}
