//! Agent lifecycle state and request metrics

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle state of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Constructed, no request yet
    #[default]
    Idle,
    /// Handling a request
    Running,
    /// Suspended until resumed
    Paused,
    /// Last request succeeded
    Completed,
    /// Last request failed
    Error,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Idle => write!(f, "idle"),
            AgentState::Running => write!(f, "running"),
            AgentState::Paused => write!(f, "paused"),
            AgentState::Completed => write!(f, "completed"),
            AgentState::Error => write!(f, "error"),
        }
    }
}

/// Request counters for one agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Requests started
    pub total_requests: u64,
    /// Requests that finished successfully
    pub successful_requests: u64,
    /// Requests that finished with an error
    pub failed_requests: u64,
    /// Running mean over finished requests
    pub average_response_time_ms: f64,
    /// Successful executions per tool name
    pub tool_usage: BTreeMap<String, u64>,
}

impl AgentMetrics {
    pub(crate) fn record_finish(&mut self, success: bool, elapsed_ms: f64) {
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
        let finished = (self.successful_requests + self.failed_requests) as f64;
        self.average_response_time_ms += (elapsed_ms - self.average_response_time_ms) / finished;
    }
}

/// Snapshot returned by [`Agent::status`](super::Agent::status)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Agent id
    pub agent_id: String,
    /// Display name
    pub agent_name: String,
    /// Current lifecycle state
    pub state: AgentState,
    /// Request counters
    pub metrics: AgentMetrics,
    /// Registered tool names
    pub available_tools: Vec<String>,
}
