//! Messages exchanged between agents and the context they run against

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Ordered key/value metadata attached to messages, history entries and records
pub type Metadata = BTreeMap<String, Value>;

/// Kind of a message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text (default)
    #[default]
    Text,
    /// Error content produced when an agent fails
    Error,
    /// Control command for an agent
    Command,
    /// Structured result
    Result,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Text => write!(f, "text"),
            MessageKind::Error => write!(f, "error"),
            MessageKind::Command => write!(f, "command"),
            MessageKind::Result => write!(f, "result"),
        }
    }
}

/// Message passed to and produced by agents.
///
/// Messages are never mutated once built; every hop produces a new one through
/// [`Message::reply`], [`Message::forward`] or the builder methods, which all
/// consume `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Originating agent or `"user"`
    pub sender: String,
    /// Addressed agent
    pub receiver: String,
    /// Message body
    pub content: String,
    /// Text or error content
    pub kind: MessageKind,
    /// Free-form annotations
    pub metadata: Metadata,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Owning session, if any
    pub session_id: Option<String>,
}

impl Message {
    /// Create a text message
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            content: content.into(),
            kind: MessageKind::Text,
            metadata: Metadata::new(),
            timestamp: Utc::now(),
            session_id: None,
        }
    }

    /// Set the session id
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the message kind
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Add one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace the whole metadata map
    pub fn with_metadata_map(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Build a reply from `from` back to this message's sender
    pub fn reply(&self, from: impl Into<String>, content: impl Into<String>) -> Message {
        Message {
            sender: from.into(),
            receiver: self.sender.clone(),
            content: content.into(),
            kind: MessageKind::Text,
            metadata: Metadata::new(),
            timestamp: Utc::now(),
            session_id: self.session_id.clone(),
        }
    }

    /// Build an error-content reply carrying the error string
    pub fn error_reply(&self, from: impl Into<String>, error: impl std::fmt::Display) -> Message {
        self.reply(from, format!("Error: {}", error))
            .with_kind(MessageKind::Error)
    }

    /// Re-address this message's content and metadata to another receiver.
    ///
    /// The sender is preserved, so a pipeline stage sees who started the chain.
    pub fn forward(&self, receiver: impl Into<String>, session_id: Option<&str>) -> Message {
        Message {
            sender: self.sender.clone(),
            receiver: receiver.into(),
            content: self.content.clone(),
            kind: self.kind,
            metadata: self.metadata.clone(),
            timestamp: Utc::now(),
            session_id: session_id
                .map(str::to_string)
                .or_else(|| self.session_id.clone()),
        }
    }

    /// Whether this message carries error content
    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }
}

/// One entry of a session's conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// `"user"` or `"assistant"`
    pub role: String,
    /// Turn text
    pub content: String,
    /// When the turn was recorded
    pub timestamp: DateTime<Utc>,
    /// Annotations such as the execution pattern
    pub metadata: Metadata,
}

impl HistoryEntry {
    /// Create a history entry stamped now
    pub fn new(role: impl Into<String>, content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata,
        }
    }
}

/// Snapshot of a session handed to an agent at invocation time.
///
/// Materialized by [`SessionStore::context_for`](crate::session::SessionStore::context_for);
/// `memory` is the memory bank's view of the session at that instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Session the context belongs to
    pub session_id: String,
    /// Owning user, if known
    pub user_id: Option<String>,
    /// Conversation so far, oldest first
    pub conversation_history: Vec<HistoryEntry>,
    /// Memory bank entries for the session
    pub memory: BTreeMap<String, Value>,
    /// Session-scoped state values
    pub state: BTreeMap<String, Value>,
}

impl Context {
    /// Bare context for a session id, with empty history, memory and state
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    /// Last `n` history entries, oldest first
    pub fn recent_history(&self, n: usize) -> &[HistoryEntry] {
        let start = self.conversation_history.len().saturating_sub(n);
        &self.conversation_history[start..]
    }
}
