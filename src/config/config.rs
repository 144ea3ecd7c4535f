//! TOML configuration parsing and management.

#[cfg(feature = "config")]
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(feature = "config")]
use std::fs;
#[cfg(feature = "config")]
use std::path::Path;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    /// Session store settings
    #[serde(default)]
    pub session: SessionConfig,
    /// Memory bank settings
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Orchestrator settings
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    /// Logging settings
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity window after which a session expires (seconds)
    #[serde(default = "default_session_timeout")]
    pub timeout_seconds: u64,
    /// History length that triggers automatic compaction
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Recent entries kept by an explicit compaction
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
}

fn default_session_timeout() -> u64 {
    3600
}

fn default_max_history() -> usize {
    50
}

fn default_keep_recent() -> usize {
    20
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_session_timeout(),
            max_history: default_max_history(),
            keep_recent: default_keep_recent(),
        }
    }
}

/// Memory bank configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Backing JSON file. In-memory only when unset.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
}

/// One keyword routing rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Agent selected when a keyword matches
    pub agent_id: String,
    /// Case-insensitive substrings of the request content
    pub keywords: Vec<String>,
}

impl RouteRule {
    /// Build a rule from borrowed keywords
    pub fn new(agent_id: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            agent_id: agent_id.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Default pattern name, normalized at use
    #[serde(default = "default_pattern")]
    pub default_pattern: String,
    /// Upper bound on loop iterations
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Per-agent timeout. No timeout when unset.
    #[serde(default)]
    pub agent_timeout_seconds: Option<u64>,
    /// Agent used alone when nothing matches, and appended last otherwise
    #[serde(default = "default_fallback_agent")]
    pub fallback_agent: String,
    /// Keyword rules checked in order by the auto-router
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteRule>,
    /// Loop stops once any message of an iteration contains one of these
    #[serde(default = "default_stop_keywords")]
    pub loop_stop_keywords: Vec<String>,
}

fn default_pattern() -> String {
    "sequential".to_string()
}

fn default_max_iterations() -> u32 {
    10
}

fn default_fallback_agent() -> String {
    "chat_agent".to_string()
}

fn default_routes() -> Vec<RouteRule> {
    vec![
        RouteRule::new("crop_agent", &["crop", "recommend", "plant", "grow"]),
        RouteRule::new("disease_agent", &["disease", "leaf", "pest", "detect"]),
    ]
}

fn default_stop_keywords() -> Vec<String> {
    vec!["complete".to_string(), "done".to_string()]
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            default_pattern: default_pattern(),
            max_iterations: default_max_iterations(),
            agent_timeout_seconds: None,
            fallback_agent: default_fallback_agent(),
            routes: default_routes(),
            loop_stop_keywords: default_stop_keywords(),
        }
    }
}

/// Observability sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Minimum level kept in the in-memory log buffer
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "DEBUG".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Loads and manages TOML configuration.
#[cfg(feature = "config")]
#[derive(Debug)]
pub struct ConfigurationLoader {
    /// Path the configuration was read from
    pub config_path: PathBuf,
    /// Parsed configuration
    pub config: Configuration,
}

#[cfg(feature = "config")]
impl ConfigurationLoader {
    /// Initialize configuration loader.
    ///
    /// # Arguments
    /// * `config_path` - Path to TOML config file. If None or missing, uses defaults.
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config_path = config_path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("config/agentmesh.toml"));

        let config = if config_path.exists() {
            Self::load_config(&config_path)?
        } else {
            Configuration::default()
        };

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Create a configuration loader from a pre-built Configuration.
    pub fn from_config(config: Configuration) -> Self {
        Self {
            config_path: PathBuf::from("config/agentmesh.toml"),
            config,
        }
    }

    fn load_config(path: &Path) -> Result<Configuration> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
    }

    /// Get configuration value by dot-notation key.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match key {
            "orchestration.default_pattern" => Some(self.config.orchestration.default_pattern.clone()),
            "orchestration.fallback_agent" => Some(self.config.orchestration.fallback_agent.clone()),
            "observability.log_level" => Some(self.config.observability.log_level.clone()),
            "memory.storage_path" => self
                .config
                .memory
                .storage_path
                .as_ref()
                .map(|p| p.to_string_lossy().to_string()),
            _ => None,
        }
    }

    /// Get numeric configuration value.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match key {
            "session.timeout_seconds" => Some(self.config.session.timeout_seconds),
            "session.max_history" => Some(self.config.session.max_history as u64),
            "session.keep_recent" => Some(self.config.session.keep_recent as u64),
            "orchestration.max_iterations" => Some(self.config.orchestration.max_iterations as u64),
            "orchestration.agent_timeout_seconds" => self.config.orchestration.agent_timeout_seconds,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Configuration::default();
        assert_eq!(config.session.timeout_seconds, 3600);
        assert_eq!(config.session.max_history, 50);
        assert_eq!(config.session.keep_recent, 20);
        assert!(config.memory.storage_path.is_none());
        assert_eq!(config.orchestration.max_iterations, 10);
        assert_eq!(config.orchestration.fallback_agent, "chat_agent");
        assert_eq!(config.orchestration.routes.len(), 2);
        assert_eq!(config.orchestration.routes[0].agent_id, "crop_agent");
        assert!(config.orchestration.agent_timeout_seconds.is_none());
        assert_eq!(config.observability.log_level, "DEBUG");
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_get_methods() {
        let loader = ConfigurationLoader::from_config(Configuration::default());
        assert_eq!(loader.get_u64("session.timeout_seconds"), Some(3600));
        assert_eq!(loader.get_u64("orchestration.max_iterations"), Some(10));
        assert_eq!(loader.get_u64("orchestration.agent_timeout_seconds"), None);
        assert_eq!(
            loader.get_string("orchestration.fallback_agent"),
            Some("chat_agent".to_string())
        );
        assert_eq!(loader.get_string("memory.storage_path"), None);
        assert_eq!(loader.get_string("nope"), None);
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigurationLoader::new(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(loader.config.session.max_history, 50);
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_partial_config_from_toml() {
        use tempfile::NamedTempFile;

        let toml_content = r#"
[session]
timeout_seconds = 60

[memory]
storage_path = "/tmp/mesh_memory.json"

[orchestration]
max_iterations = 3
agent_timeout_seconds = 5
fallback_agent = "general"

[[orchestration.routes]]
agent_id = "weather_agent"
keywords = ["rain", "forecast"]
"#;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).unwrap();

        let loader = ConfigurationLoader::new(Some(temp_file.path())).unwrap();
        let config = &loader.config;
        assert_eq!(config.session.timeout_seconds, 60);
        // unspecified keys keep their defaults
        assert_eq!(config.session.max_history, 50);
        assert_eq!(
            config.memory.storage_path,
            Some(PathBuf::from("/tmp/mesh_memory.json"))
        );
        assert_eq!(config.orchestration.max_iterations, 3);
        assert_eq!(config.orchestration.agent_timeout_seconds, Some(5));
        assert_eq!(config.orchestration.fallback_agent, "general");
        assert_eq!(
            config.orchestration.routes,
            vec![RouteRule::new("weather_agent", &["rain", "forecast"])]
        );
        assert_eq!(config.observability.log_level, "DEBUG");
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_malformed_toml_is_an_error() {
        use tempfile::NamedTempFile;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[session\ntimeout_seconds = ").unwrap();
        assert!(ConfigurationLoader::new(Some(temp_file.path())).is_err());
    }
}
