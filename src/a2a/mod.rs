//! Agent-to-agent (A2A) messaging over a capability directory.
//!
//! Independent of the orchestrator: agents find each other by capability tag
//! and exchange logged messages without going through a pattern execution.

pub mod directory;
pub mod message;

pub use directory::AgentDirectory;
pub use message::{
    A2AMessage, A2AMessageType, AgentNode, AgentRegistration, RegistrationStatus, Topology,
};
