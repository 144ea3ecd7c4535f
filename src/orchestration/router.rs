//! Content-based agent selection

use crate::config::{OrchestrationConfig, RouteRule};

/// Picks agents for a message from keyword rules.
///
/// Every rule whose keywords appear in the content (case-insensitive) adds
/// its agent, in rule order. The fallback agent is appended last when any
/// specialist matched so it can compose the final answer, and is used alone
/// otherwise.
#[derive(Debug, Clone)]
pub struct AutoRouter {
    rules: Vec<RouteRule>,
    fallback: String,
}

impl AutoRouter {
    /// Build a router; keywords are lowercased once here
    pub fn new(rules: Vec<RouteRule>, fallback: impl Into<String>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| RouteRule {
                agent_id: rule.agent_id,
                keywords: rule.keywords.iter().map(|k| k.to_lowercase()).collect(),
            })
            .collect();
        Self {
            rules,
            fallback: fallback.into(),
        }
    }

    /// Router from the configured rules and fallback agent
    pub fn from_config(config: &OrchestrationConfig) -> Self {
        Self::new(config.routes.clone(), config.fallback_agent.clone())
    }

    /// Agent used when no rule matches
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Matching agents in rule order, with the fallback appended when absent
    pub fn select(&self, content: &str) -> Vec<String> {
        let content = content.to_lowercase();
        let mut agents: Vec<String> = Vec::new();
        for rule in &self.rules {
            let hit = rule.keywords.iter().any(|k| content.contains(k.as_str()));
            if hit && !agents.contains(&rule.agent_id) {
                agents.push(rule.agent_id.clone());
            }
        }
        if !agents.contains(&self.fallback) {
            agents.push(self.fallback.clone());
        }
        agents
    }
}

impl Default for AutoRouter {
    fn default() -> Self {
        Self::from_config(&OrchestrationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let router = AutoRouter::default();
        assert_eq!(
            router.select("Which CROP should I plant?"),
            vec!["crop_agent", "chat_agent"]
        );
        assert_eq!(
            router.select("leaf spots, is it a disease? also what to grow"),
            vec!["crop_agent", "disease_agent", "chat_agent"]
        );
        assert_eq!(router.select("hello there"), vec!["chat_agent"]);
    }

    #[test]
    fn test_custom_rules_are_case_insensitive() {
        let router = AutoRouter::new(vec![RouteRule::new("weather_agent", &["Rain"])], "helper");
        assert_eq!(router.select("will it RAIN"), vec!["weather_agent", "helper"]);
        assert_eq!(router.select("sunny"), vec!["helper"]);
        assert_eq!(router.fallback(), "helper");
    }
}
