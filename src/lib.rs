//! agentmesh - in-process multi-agent coordination
//!
//! agentmesh runs a set of autonomous agents behind one request API:
//!
//! - **`orchestration`** - sequential, parallel and loop execution with
//!   keyword auto-routing and per-agent fault isolation
//! - **`session`** - sessions with expiry and anchor-preserving history compaction
//! - **`memory`** - session-scoped key/value memory, optionally persisted to a file
//! - **`a2a`** - capability directory and agent-to-agent message log
//! - **`observability`** - buffered logs, traces and metrics with JSON export
//! - **`evaluation`** - quality, tool usage and performance scoring
//! - **`config`** - configuration types; TOML and environment loading with the
//!   `config` feature
//!
//! # Features
//!
//! ```toml
//! [dependencies]
//! agentmesh = "0.1"
//! # Without TOML/.env loading:
//! agentmesh = { version = "0.1", default-features = false }
//! ```
//!
//! # Example: handling a request
//!
//! ```ignore
//! use agentmesh::prelude::*;
//! use std::path::Path;
//!
//! let loader = ConfigurationLoader::new(Some(Path::new("config/agentmesh.toml")))?;
//! let mut config = loader.config;
//! EnvironmentLoader::new(None).apply(&mut config);
//!
//! let runtime = MeshRuntime::from_config(config);
//! let session = runtime.create_session(Some("farmer-42"));
//! let handled = runtime.handle(&session, "what should I grow?", "parallel").await?;
//! println!("{}", handled.content);
//! ```
//!
//! # Example: custom agents
//!
//! ```ignore
//! use agentmesh::prelude::*;
//! use async_trait::async_trait;
//!
//! struct Upper(AgentCore);
//!
//! #[async_trait]
//! impl Agent for Upper {
//!     fn id(&self) -> &str { self.0.id() }
//!     fn name(&self) -> &str { self.0.name() }
//!     async fn process(&self, message: Message, _ctx: &Context) -> anyhow::Result<Message> {
//!         Ok(message.reply(self.0.id(), message.content.to_uppercase()))
//!     }
//!     fn status(&self) -> AgentStatus { self.0.status() }
//! }
//!
//! let orchestrator = Orchestrator::new();
//! orchestrator.register(std::sync::Arc::new(Upper(AgentCore::new("upper", "Upper", sink))));
//! ```

#![warn(missing_docs)]

/// Agent-to-agent directory and messaging
pub mod a2a;

/// Agent contracts, shared core and built-in agents
pub mod agent;

/// Configuration management (loaders enabled with the `config` feature)
pub mod config;

/// Error types
pub mod errors;

/// Response scoring
pub mod evaluation;

/// Session-scoped persistent memory
pub mod memory;

/// Messages and agent context
pub mod message;

/// Logs, traces and metrics
pub mod observability;

/// Multi-agent execution
pub mod orchestration;

/// Session store
pub mod session;

mod utils;

pub use errors::{MeshError, MeshResult};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Configuration;
    #[cfg(feature = "config")]
    pub use crate::config::{ConfigurationLoader, EnvironmentLoader};

    pub use crate::a2a::{A2AMessage, A2AMessageType, AgentDirectory};
    pub use crate::agent::{
        Agent, AgentCore, AgentState, AgentStatus, LongRunningAgent, ResponderAgent,
        TextGenerator, Tool,
    };
    pub use crate::errors::{MeshError, MeshResult};
    pub use crate::evaluation::{Evaluator, Interaction};
    pub use crate::memory::MemoryBank;
    pub use crate::message::{Context, Message, MessageKind, Metadata};
    pub use crate::observability::{LogLevel, ObservabilitySink};
    pub use crate::orchestration::{
        AutoRouter, ExecutionPattern, HandledRequest, MeshRuntime, Orchestrator, RouteOutcome,
    };
    pub use crate::session::SessionStore;
}
