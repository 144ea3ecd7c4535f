//! Environment variable loading and overrides.
//!
//! Recognized variables:
//! `AGENTMESH_MEMORY_PATH`, `AGENTMESH_SESSION_TIMEOUT`,
//! `AGENTMESH_LOG_LEVEL`, `AGENTMESH_MAX_ITERATIONS`.

use super::Configuration;
use std::env;
use std::path::{Path, PathBuf};

const MEMORY_PATH: &str = "AGENTMESH_MEMORY_PATH";
const SESSION_TIMEOUT: &str = "AGENTMESH_SESSION_TIMEOUT";
const LOG_LEVEL: &str = "AGENTMESH_LOG_LEVEL";
const MAX_ITERATIONS: &str = "AGENTMESH_MAX_ITERATIONS";

/// Loads environment variables from .env file and system environment.
#[derive(Debug, Clone)]
pub struct EnvironmentLoader {
    env_file: Option<String>,
}

impl EnvironmentLoader {
    /// Initialize the environment loader.
    ///
    /// # Arguments
    /// * `env_file` - Path to .env file. Nothing is loaded from disk when None.
    pub fn new(env_file: Option<&Path>) -> Self {
        if let Some(path) = env_file {
            if path.exists() {
                if let Err(e) = dotenv::from_path(path) {
                    tracing::warn!("Failed to load .env file {}: {}", path.display(), e);
                }
            }
        }

        Self {
            env_file: env_file.map(|p| p.to_string_lossy().to_string()),
        }
    }

    /// The .env file this loader was created with
    pub fn env_file(&self) -> Option<&str> {
        self.env_file.as_deref()
    }

    /// Memory bank file from `AGENTMESH_MEMORY_PATH`
    pub fn memory_path(&self) -> Option<PathBuf> {
        env::var(MEMORY_PATH)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
    }

    /// Session timeout in seconds from `AGENTMESH_SESSION_TIMEOUT`
    pub fn session_timeout(&self) -> Option<u64> {
        parse_var(SESSION_TIMEOUT)
    }

    /// Log level from `AGENTMESH_LOG_LEVEL`
    pub fn log_level(&self) -> Option<String> {
        env::var(LOG_LEVEL).ok().filter(|v| !v.trim().is_empty())
    }

    /// Loop iteration cap from `AGENTMESH_MAX_ITERATIONS`
    pub fn max_iterations(&self) -> Option<u32> {
        parse_var(MAX_ITERATIONS)
    }

    /// Overlay every set variable onto `config`.
    pub fn apply(&self, config: &mut Configuration) {
        if let Some(path) = self.memory_path() {
            config.memory.storage_path = Some(path);
        }
        if let Some(timeout) = self.session_timeout() {
            config.session.timeout_seconds = timeout;
        }
        if let Some(level) = self.log_level() {
            config.observability.log_level = level;
        }
        if let Some(max) = self.max_iterations() {
            config.orchestration.max_iterations = max;
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a number", name, raw);
            None
        }
    }
}

impl Default for EnvironmentLoader {
    fn default() -> Self {
        Self::new(None)
    }
}
