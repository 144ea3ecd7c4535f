//! Error types for the coordination substrate

use thiserror::Error;

/// Result type for mesh operations
pub type MeshResult<T> = Result<T, MeshError>;

/// Error taxonomy shared by the stores, the A2A directory and the orchestrator
#[derive(Error, Debug)]
pub enum MeshError {
    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The session does not exist or has expired
    #[error("Session not found or expired: {session_id}")]
    SessionNotFound {
        /// Requested session
        session_id: String,
    },

    /// No agent is registered under the id
    #[error("Agent {agent_id} not registered")]
    UnknownAgent {
        /// Requested agent
        agent_id: String,
    },

    /// No active agent advertises the capability
    #[error("No agent found with capability: {capability}")]
    NoCapableAgent {
        /// Requested capability
        capability: String,
    },

    /// An agent returned an error or panicked
    #[error("Agent {agent_id} failed: {message}")]
    AgentProcessing {
        /// Failing agent
        agent_id: String,
        /// Failure description
        message: String,
    },

    /// An agent exceeded the orchestrator's per-call deadline
    #[error("Agent {agent_id} timed out after {seconds} seconds")]
    AgentTimeout {
        /// Slow agent
        agent_id: String,
        /// Configured deadline
        seconds: u64,
    },

    /// The agent has no tool with this name
    #[error("Tool '{tool_name}' not found")]
    ToolNotFound {
        /// Requested tool
        tool_name: String,
    },

    /// No long-running task with this id
    #[error("Task {task_id} not found")]
    TaskNotFound {
        /// Requested task
        task_id: String,
    },

    /// A task command is not valid in the task's current status
    #[error("Task {task_id} cannot {action} while {status}")]
    InvalidTransition {
        /// Target task
        task_id: String,
        /// Rejected command
        action: String,
        /// Status at the time of the command
        status: String,
    },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// What was wrong
        message: String,
    },
}

impl MeshError {
    /// Create a session-not-found error
    pub fn session_not_found<S: Into<String>>(session_id: S) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    /// Create an unknown-agent error
    pub fn unknown_agent<S: Into<String>>(agent_id: S) -> Self {
        Self::UnknownAgent {
            agent_id: agent_id.into(),
        }
    }

    /// Create an agent processing error
    pub fn processing<A: Into<String>, M: Into<String>>(agent_id: A, message: M) -> Self {
        Self::AgentProcessing {
            agent_id: agent_id.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if the caller can recover (start a new session, retarget, retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MeshError::SessionNotFound { .. }
                | MeshError::UnknownAgent { .. }
                | MeshError::NoCapableAgent { .. }
                | MeshError::AgentTimeout { .. }
                | MeshError::ToolNotFound { .. }
                | MeshError::TaskNotFound { .. }
                | MeshError::InvalidTransition { .. }
        )
    }
}
