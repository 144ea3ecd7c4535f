//! Traits at the agent boundary
//!
//! The orchestrator and [`AgentCore`](super::AgentCore) depend only on these;
//! applications supply the concrete agents, tools and text generators.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use super::state::AgentStatus;
use crate::message::{Context, Message};

/// A unit of work: turn a message into a response message
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique id used for routing and registration
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Handle one message.
    ///
    /// Expected failures should come back as an error-content reply. `Err` is
    /// for internal faults; the orchestrator isolates those per agent.
    async fn process(&self, message: Message, context: &Context) -> Result<Message>;

    /// Current state and metrics
    fn status(&self) -> AgentStatus;
}

/// A named capability an agent can call with JSON parameters
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name
    fn name(&self) -> &str;

    /// Human-readable summary of what the tool does
    fn description(&self) -> &str;

    /// Execute with named parameters
    async fn execute(&self, params: Map<String, JsonValue>) -> Result<JsonValue>;
}

/// Text generation backend for [`ResponderAgent`](super::ResponderAgent)
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce a completion for the prompt
    async fn generate(&self, prompt: &str) -> Result<String>;
}
