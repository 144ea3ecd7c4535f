//! Configuration for the coordination substrate.
//!
//! Every component is built from a [`Configuration`], either constructed in
//! code or (with the default `config` feature) loaded from a TOML file and
//! overlaid with environment variables.
//!
//! # Example
//!
//! ```no_run
//! use agentmesh::config::{ConfigurationLoader, EnvironmentLoader};
//! use std::path::Path;
//!
//! let loader = ConfigurationLoader::new(Some(Path::new("config/agentmesh.toml"))).unwrap();
//! let mut config = loader.config;
//! EnvironmentLoader::new(None).apply(&mut config);
//!
//! println!("Session timeout: {}s", config.session.timeout_seconds);
//! ```

pub mod config;
#[cfg(feature = "config")]
pub mod environment;

pub use self::config::{
    Configuration, MemoryConfig, ObservabilityConfig, OrchestrationConfig, RouteRule,
    SessionConfig,
};
#[cfg(feature = "config")]
pub use self::config::ConfigurationLoader;
#[cfg(feature = "config")]
pub use self::environment::EnvironmentLoader;
