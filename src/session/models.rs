//! Session records

use crate::message::{HistoryEntry, Metadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A conversation's history and scratch state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique id (uuid v4 unless supplied)
    pub session_id: String,
    /// Owning user, if known
    pub user_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last read or write, drives expiry
    pub last_accessed: DateTime<Utc>,
    /// Conversation turns, oldest first
    pub conversation_history: Vec<HistoryEntry>,
    /// Scratch values such as the current task id
    pub state: BTreeMap<String, Value>,
    /// Caller-supplied annotations
    pub metadata: Metadata,
}

impl Session {
    pub(crate) fn new(
        session_id: String,
        user_id: Option<String>,
        state: BTreeMap<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            user_id,
            created_at: now,
            last_accessed: now,
            conversation_history: Vec::new(),
            state,
            metadata: Metadata::new(),
        }
    }

    /// Keep the anchor entry plus the newest `keep` entries after it.
    ///
    /// Returns how many entries were dropped.
    pub(crate) fn retain_anchor_and_recent(&mut self, keep: usize) -> usize {
        let len = self.conversation_history.len();
        if len <= keep + 1 {
            return 0;
        }
        let removed = len - keep - 1;
        self.conversation_history.drain(1..1 + removed);
        removed
    }
}

/// Session counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Sessions held, including expired ones not yet swept
    pub total_sessions: usize,
    /// Sessions still inside the timeout window
    pub active_sessions: usize,
}
