//! Agents: the unit of work the orchestrator executes.
//!
//! [`Agent`] and [`Tool`] are the two contracts applications implement.
//! [`AgentCore`] carries the behaviour every agent shares (state machine,
//! metrics, tool execution with tracing, memory access), and two ready-made
//! agents build on it: [`ResponderAgent`], the general-purpose fallback, and
//! [`LongRunningAgent`] for pausable tasks.

pub mod base;
pub mod long_running;
pub mod responder;
pub mod state;
pub mod tools;
pub mod traits;

pub use base::AgentCore;
pub use long_running::{LongRunningAgent, LongRunningTask, TaskCheckpoint, TaskStatus};
pub use responder::{ResponderAgent, DEFAULT_RESPONDER_ID, UNCONFIGURED_REPLY};
pub use state::{AgentMetrics, AgentState, AgentStatus};
pub use tools::{ToolBox, ToolExecutionRecord};
pub use traits::{Agent, TextGenerator, Tool};
