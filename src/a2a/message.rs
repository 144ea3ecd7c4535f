//! A2A record types

use crate::message::Metadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Intent of an agent-to-agent message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum A2AMessageType {
    /// Asks the receiver to act
    Request,
    /// Answers an earlier request
    Response,
    /// Informational, no reply expected
    Notification,
    /// Asks for information without side effects
    Query,
    /// Carries the outcome of delegated work
    Result,
}

impl std::fmt::Display for A2AMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            A2AMessageType::Request => write!(f, "request"),
            A2AMessageType::Response => write!(f, "response"),
            A2AMessageType::Notification => write!(f, "notification"),
            A2AMessageType::Query => write!(f, "query"),
            A2AMessageType::Result => write!(f, "result"),
        }
    }
}

/// A delivered agent-to-agent message as kept in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct A2AMessage {
    /// Sending agent
    pub from: String,
    /// Receiving agent
    pub to: String,
    /// Intent of the message
    #[serde(rename = "type")]
    pub message_type: A2AMessageType,
    /// Payload
    pub content: Value,
    /// Caller-supplied annotations
    pub metadata: Metadata,
    /// Delivery time
    pub timestamp: DateTime<Utc>,
    /// Unique id (uuid v4)
    pub message_id: String,
}

/// Whether a registered agent takes part in discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Discoverable and routable
    Active,
    /// Registered but skipped by discovery
    Inactive,
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationStatus::Active => write!(f, "active"),
            RegistrationStatus::Inactive => write!(f, "inactive"),
        }
    }
}

/// Directory entry for one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRegistration {
    /// Registered id
    pub agent_id: String,
    /// Advertised capabilities
    pub capabilities: BTreeSet<String>,
    /// Optional address for out-of-process agents
    pub endpoint: Option<String>,
    /// Registration time
    pub registered_at: DateTime<Utc>,
    /// Current status
    pub status: RegistrationStatus,
}

impl AgentRegistration {
    /// True when the agent takes part in discovery
    pub fn is_active(&self) -> bool {
        self.status == RegistrationStatus::Active
    }
}

/// Per-agent summary within a [`Topology`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentNode {
    /// Advertised capabilities
    pub capabilities: BTreeSet<String>,
    /// Current status
    pub status: RegistrationStatus,
}

/// Network view returned by [`AgentDirectory::topology`](super::AgentDirectory::topology)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Topology {
    /// Registered agents
    pub total_agents: usize,
    /// Agents with active status
    pub active_agents: usize,
    /// Messages in the log
    pub total_messages: usize,
    /// Per-agent summaries keyed by id
    pub agents: BTreeMap<String, AgentNode>,
}
