//! Execution patterns and their normalization

use serde::{Deserialize, Serialize};
use tracing::warn;

/// How the orchestrator composes a set of agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPattern {
    /// Pipeline: each agent receives the previous agent's output
    #[default]
    Sequential,
    /// Fan-out: every agent receives the same original message
    Parallel,
    /// Repeated sequential passes until a stop condition holds
    Loop,
}

impl ExecutionPattern {
    /// Get the canonical lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Loop => "loop",
        }
    }

    /// Resolve anything pattern-like into a pattern.
    ///
    /// Never fails: input that names no pattern resolves to `Sequential` and
    /// logs a warning.
    pub fn normalize<P: PatternSource + ?Sized>(source: &P) -> Self {
        if let Some(pattern) = source.as_pattern() {
            return pattern;
        }
        let raw = source.pattern_text();
        match Self::match_text(&raw) {
            Some(pattern) => pattern,
            None => {
                warn!("Unrecognized execution pattern '{}', defaulting to sequential", raw);
                Self::Sequential
            }
        }
    }

    fn match_text(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        match lowered.as_str() {
            "sequential" | "seq" => return Some(Self::Sequential),
            "parallel" | "par" => return Some(Self::Parallel),
            "loop" | "looping" => return Some(Self::Loop),
            _ => {}
        }
        // e.g. "ExecutionPattern::Parallel" or "AgentPattern.LOOP"
        [Self::Sequential, Self::Parallel, Self::Loop]
            .into_iter()
            .find(|pattern| lowered.contains(pattern.name()))
    }
}

impl std::fmt::Display for ExecutionPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ExecutionPattern {
    type Err = std::convert::Infallible;

    /// Lenient parse, see [`ExecutionPattern::normalize`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::normalize(s))
    }
}

/// Anything that can be read as an execution pattern.
///
/// Implement this for application types (a UI selector, a request field) to
/// pass them straight to [`ExecutionPattern::normalize`].
pub trait PatternSource {
    /// A pattern this value already is, if any
    fn as_pattern(&self) -> Option<ExecutionPattern> {
        None
    }

    /// Text to match when [`as_pattern`](Self::as_pattern) gives nothing
    fn pattern_text(&self) -> String;
}

impl PatternSource for ExecutionPattern {
    fn as_pattern(&self) -> Option<ExecutionPattern> {
        Some(*self)
    }

    fn pattern_text(&self) -> String {
        self.name().to_string()
    }
}

impl PatternSource for str {
    fn pattern_text(&self) -> String {
        self.to_string()
    }
}

impl PatternSource for &str {
    fn pattern_text(&self) -> String {
        (*self).to_string()
    }
}

impl PatternSource for String {
    fn pattern_text(&self) -> String {
        self.clone()
    }
}
