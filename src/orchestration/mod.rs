//! Orchestration - composing agents into request handling
//!
//! - [`ExecutionPattern`]: sequential pipeline, parallel fan-out or loop,
//!   normalized leniently from strings or any [`PatternSource`]
//! - [`AutoRouter`]: keyword rules that pick agents when the caller names none
//! - [`Orchestrator`]: agent registry plus the three patterns, with per-agent
//!   fault, panic and timeout isolation
//! - [`MeshRuntime`]: every component wired from one configuration, handling a
//!   user turn in one call
//!
//! # Example
//!
//! ```ignore
//! use agentmesh::orchestration::MeshRuntime;
//!
//! let runtime = MeshRuntime::default();
//! let session = runtime.create_session(None);
//! let handled = runtime.handle(&session, "which crop should I plant?", "seq").await?;
//! println!("{}", handled.content);
//! ```

pub mod orchestrator;
pub mod pattern;
pub mod router;
pub mod runtime;

pub use orchestrator::{Orchestrator, RouteOutcome};
pub use pattern::{ExecutionPattern, PatternSource};
pub use router::AutoRouter;
pub use runtime::{HandledRequest, MeshRuntime};
