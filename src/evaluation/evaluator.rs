//! Interaction scoring with per-agent history

use crate::errors::MeshResult;
use crate::message::Metadata;
use crate::utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

/// Response length at which completeness saturates
const COMPLETENESS_CHARS: f64 = 200.0;
/// Response time at which the time score reaches zero
const SLOW_RESPONSE_MS: f64 = 5000.0;
const MAX_ERRORS: f64 = 10.0;
const NEUTRAL_KEYWORD_SCORE: f64 = 0.5;

/// Dimension an evaluation result scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationType {
    /// Keyword coverage and length of the response
    Quality,
    /// Overlap between used and expected tools
    ToolUsage,
    /// Latency, success and error count
    Performance,
    /// Weighted combination of the other three
    Overall,
}

impl std::fmt::Display for EvaluationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluationType::Quality => write!(f, "quality"),
            EvaluationType::ToolUsage => write!(f, "tool_usage"),
            EvaluationType::Performance => write!(f, "performance"),
            EvaluationType::Overall => write!(f, "overall"),
        }
    }
}

/// One scored dimension of an interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Agent that produced the response
    pub agent_id: String,
    /// Scored dimension
    pub evaluation_type: EvaluationType,
    /// Score in [0, 1]
    pub score: f64,
    /// When the score was computed
    pub timestamp: DateTime<Utc>,
    /// Inputs behind the score
    pub details: Metadata,
}

/// The four results of one [`Evaluator::evaluate`] call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    /// Quality score
    pub quality: EvaluationResult,
    /// Tool usage score
    pub tool_usage: EvaluationResult,
    /// Performance score
    pub performance: EvaluationResult,
    /// Weighted overall score
    pub overall: EvaluationResult,
}

/// One request/response exchange to score
#[derive(Debug, Clone, Default)]
pub struct Interaction {
    /// Agent that handled the request
    pub agent_id: String,
    /// Request text
    pub query: String,
    /// Response text
    pub response: String,
    /// End-to-end latency in milliseconds
    pub response_time_ms: f64,
    /// Whether the request completed without faults
    pub success: bool,
    /// Faulted agent calls
    pub error_count: u32,
    /// Tools the agent executed
    pub tools_used: Vec<String>,
    /// Tools the request should have used
    pub expected_tools: Vec<String>,
    /// Keywords the response should mention
    pub expected_keywords: Vec<String>,
}

impl Interaction {
    /// A successful interaction with no tools and zero latency
    pub fn new(
        agent_id: impl Into<String>,
        query: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            query: query.into(),
            response: response.into(),
            success: true,
            ..Default::default()
        }
    }

    /// Set the measured latency
    pub fn response_time_ms(mut self, ms: f64) -> Self {
        self.response_time_ms = ms;
        self
    }

    /// Set whether the request succeeded
    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    /// Set the fault count
    pub fn error_count(mut self, count: u32) -> Self {
        self.error_count = count;
        self
    }

    /// Set the tools that were executed
    pub fn tools_used(mut self, tools: Vec<String>) -> Self {
        self.tools_used = tools;
        self
    }

    /// Set the tools that were expected
    pub fn expected_tools(mut self, tools: Vec<String>) -> Self {
        self.expected_tools = tools;
        self
    }

    /// Set the keywords the response should mention
    pub fn expected_keywords(mut self, keywords: Vec<String>) -> Self {
        self.expected_keywords = keywords;
        self
    }
}

/// Clamp to [0, 1]; NaN and infinities score 0
fn bounded(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Scores interactions and keeps an append-only history of the results.
///
/// No scoring path can fail: empty or malformed input degrades to zero or to
/// the neutral keyword score.
#[derive(Debug, Default)]
pub struct Evaluator {
    history: Mutex<Vec<EvaluationResult>>,
}

impl Evaluator {
    /// Create an evaluator with empty history
    pub fn new() -> Self {
        Self::default()
    }

    fn record(
        &self,
        agent_id: &str,
        evaluation_type: EvaluationType,
        score: f64,
        details: Metadata,
    ) -> EvaluationResult {
        let result = EvaluationResult {
            agent_id: agent_id.to_string(),
            evaluation_type,
            score: bounded(score),
            timestamp: Utc::now(),
            details,
        };
        utils::lock(&self.history).push(result.clone());
        result
    }

    /// Relevance (0.4), completeness (0.3) and keyword coverage (0.3)
    pub fn score_quality(
        &self,
        agent_id: &str,
        query: &str,
        response: &str,
        expected_keywords: &[String],
    ) -> EvaluationResult {
        let mut details = Metadata::new();

        let query_words = words(query);
        let response_words = words(response);
        let relevance = if query_words.is_empty() {
            0.0
        } else {
            let overlap = query_words.intersection(&response_words).count();
            bounded(overlap as f64 / query_words.len() as f64)
        };
        details.insert("relevance_score".to_string(), json!(relevance));

        let completeness = bounded(response.chars().count() as f64 / COMPLETENESS_CHARS);
        details.insert("completeness_score".to_string(), json!(completeness));

        let keyword_score = if expected_keywords.is_empty() {
            NEUTRAL_KEYWORD_SCORE
        } else {
            let response_lower = response.to_lowercase();
            let found: Vec<&String> = expected_keywords
                .iter()
                .filter(|kw| response_lower.contains(&kw.to_lowercase()))
                .collect();
            details.insert("found_keywords".to_string(), json!(found));
            found.len() as f64 / expected_keywords.len() as f64
        };
        details.insert("keyword_score".to_string(), json!(keyword_score));

        let score = relevance * 0.4 + completeness * 0.3 + keyword_score * 0.3;
        self.record(agent_id, EvaluationType::Quality, score, details)
    }

    /// 0.5 for using any tool, plus 0.5 times the share of expected tools used
    pub fn score_tool_usage(
        &self,
        agent_id: &str,
        tools_used: &[String],
        expected_tools: &[String],
    ) -> EvaluationResult {
        let mut details = Metadata::new();
        details.insert("tools_used".to_string(), json!(tools_used));
        details.insert("tool_count".to_string(), json!(tools_used.len()));

        let mut score = if tools_used.is_empty() { 0.0 } else { 0.5 };

        if !expected_tools.is_empty() {
            let used_expected: Vec<&String> = expected_tools
                .iter()
                .filter(|t| tools_used.contains(t))
                .collect();
            let match_score = used_expected.len() as f64 / expected_tools.len() as f64;
            score += match_score * 0.5;
            details.insert("expected_tools".to_string(), json!(expected_tools));
            details.insert("used_expected".to_string(), json!(used_expected));
            details.insert("tool_match_score".to_string(), json!(match_score));
        }

        self.record(agent_id, EvaluationType::ToolUsage, score, details)
    }

    /// Success (0.6), speed against a 5 s scale (0.3), error count against 10 (0.1)
    pub fn score_performance(
        &self,
        agent_id: &str,
        response_time_ms: f64,
        success: bool,
        error_count: u32,
    ) -> EvaluationResult {
        let time_score = bounded(1.0 - response_time_ms / SLOW_RESPONSE_MS);
        let error_score = bounded(1.0 - error_count as f64 / MAX_ERRORS);
        let success_score = if success { 0.6 } else { 0.0 };
        let score = success_score + time_score * 0.3 + error_score * 0.1;

        let mut details = Metadata::new();
        details.insert("success".to_string(), json!(success));
        details.insert(
            "response_time_ms".to_string(),
            json!(if response_time_ms.is_finite() { response_time_ms } else { 0.0 }),
        );
        details.insert("time_score".to_string(), json!(time_score));
        details.insert("error_count".to_string(), json!(error_count));
        details.insert("error_score".to_string(), json!(error_score));

        self.record(agent_id, EvaluationType::Performance, score, details)
    }

    /// Score all three dimensions and the weighted overall
    pub fn evaluate(&self, interaction: &Interaction) -> EvaluationReport {
        let agent_id = interaction.agent_id.as_str();
        let quality = self.score_quality(
            agent_id,
            &interaction.query,
            &interaction.response,
            &interaction.expected_keywords,
        );
        let tool_usage = self.score_tool_usage(
            agent_id,
            &interaction.tools_used,
            &interaction.expected_tools,
        );
        let performance = self.score_performance(
            agent_id,
            interaction.response_time_ms,
            interaction.success,
            interaction.error_count,
        );

        let overall_score = 0.5 * quality.score + 0.2 * tool_usage.score + 0.3 * performance.score;
        let mut details = Metadata::new();
        details.insert("quality_score".to_string(), json!(quality.score));
        details.insert("tool_usage_score".to_string(), json!(tool_usage.score));
        details.insert("performance_score".to_string(), json!(performance.score));
        let overall = self.record(agent_id, EvaluationType::Overall, overall_score, details);

        EvaluationReport {
            quality,
            tool_usage,
            performance,
            overall,
        }
    }

    /// Most recent results, optionally filtered by agent and dimension
    pub fn history(
        &self,
        agent_id: Option<&str>,
        evaluation_type: Option<EvaluationType>,
        limit: usize,
    ) -> Vec<EvaluationResult> {
        let history = utils::lock(&self.history);
        let filtered: Vec<EvaluationResult> = history
            .iter()
            .filter(|e| agent_id.map_or(true, |id| e.agent_id == id))
            .filter(|e| evaluation_type.map_or(true, |ty| e.evaluation_type == ty))
            .cloned()
            .collect();
        utils::tail(&filtered, limit)
    }

    /// Mean score per evaluation type for one agent; types never scored are absent
    pub fn averages(&self, agent_id: &str) -> BTreeMap<EvaluationType, f64> {
        let mut sums: BTreeMap<EvaluationType, (f64, usize)> = BTreeMap::new();
        for e in utils::lock(&self.history).iter().filter(|e| e.agent_id == agent_id) {
            let slot = sums.entry(e.evaluation_type).or_insert((0.0, 0));
            slot.0 += e.score;
            slot.1 += 1;
        }
        sums.into_iter()
            .map(|(ty, (sum, count))| (ty, sum / count as f64))
            .collect()
    }

    /// History as pretty-printed JSON
    pub fn to_json(&self) -> MeshResult<String> {
        Ok(serde_json::to_string_pretty(&*utils::lock(&self.history))?)
    }

    /// Write the history as JSON to `path`
    pub fn export(&self, path: &Path) -> MeshResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_quality_components() {
        let eval = Evaluator::new();
        let response = "Rice grows well in Kerala during monsoon";
        let result = eval.score_quality(
            "crop_agent",
            "what grows in kerala",
            response,
            &strings(&["rice", "wheat"]),
        );

        // overlap {grows, in, kerala} of 4 query words
        let relevance = 0.75;
        let completeness = response.chars().count() as f64 / 200.0;
        let expected = relevance * 0.4 + completeness * 0.3 + 0.5 * 0.3;
        assert!((result.score - expected).abs() < 1e-9);
        assert_eq!(result.details["keyword_score"], json!(0.5));
        assert_eq!(result.evaluation_type, EvaluationType::Quality);
    }

    #[test]
    fn test_quality_neutral_keywords_and_empty_query() {
        let eval = Evaluator::new();
        let long = "x".repeat(400);
        let result = eval.score_quality("a", "", &long, &[]);
        // relevance 0, completeness 1, neutral keywords 0.5
        assert!((result.score - (0.3 + 0.15)).abs() < 1e-9);
    }

    #[test]
    fn test_tool_usage() {
        let eval = Evaluator::new();
        assert_eq!(eval.score_tool_usage("a", &[], &[]).score, 0.0);
        assert_eq!(eval.score_tool_usage("a", &strings(&["search"]), &[]).score, 0.5);

        let result = eval.score_tool_usage(
            "a",
            &strings(&["weather"]),
            &strings(&["weather", "soil"]),
        );
        assert!((result.score - 0.75).abs() < 1e-9);
        assert_eq!(result.details["used_expected"], json!(["weather"]));
    }

    #[test]
    fn test_performance() {
        let eval = Evaluator::new();
        let fast = eval.score_performance("a", 0.0, true, 0);
        assert!((fast.score - 1.0).abs() < 1e-9);

        let slow_failed = eval.score_performance("a", 10_000.0, false, 20);
        assert_eq!(slow_failed.score, 0.0);

        let mid = eval.score_performance("a", 2500.0, true, 5);
        assert!((mid.score - (0.6 + 0.15 + 0.05)).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_inputs_stay_bounded() {
        let eval = Evaluator::new();
        for ms in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -1e12, 1e12] {
            let r = eval.score_performance("a", ms, true, u32::MAX);
            assert!((0.0..=1.0).contains(&r.score), "score {} for {}", r.score, ms);
        }
        let r = eval.score_quality("a", "   ", "", &strings(&["", "x"]));
        assert!((0.0..=1.0).contains(&r.score));
    }

    #[test]
    fn test_evaluate_overall_formula() {
        let eval = Evaluator::new();
        let interaction = Interaction::new("chat_agent", "plant rice now", "You should plant rice in June")
            .response_time_ms(1200.0)
            .tools_used(strings(&["weather"]))
            .expected_tools(strings(&["weather"]))
            .expected_keywords(strings(&["rice"]));

        let report = eval.evaluate(&interaction);
        let expected = 0.5 * report.quality.score
            + 0.2 * report.tool_usage.score
            + 0.3 * report.performance.score;
        assert_eq!(report.overall.score, expected);
        assert_eq!(report.tool_usage.score, 1.0);

        assert_eq!(eval.history(None, None, 100).len(), 4);
        assert_eq!(
            eval.history(Some("chat_agent"), Some(EvaluationType::Overall), 100).len(),
            1
        );
    }

    #[test]
    fn test_averages_and_export() {
        let eval = Evaluator::new();
        eval.score_performance("a", 0.0, true, 0);
        eval.score_performance("a", 0.0, false, 0);
        eval.score_tool_usage("b", &[], &[]);

        let avg = eval.averages("a");
        assert_eq!(avg.len(), 1);
        assert!((avg[&EvaluationType::Performance] - 0.7).abs() < 1e-9);
        assert!(eval.averages("nobody").is_empty());

        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("evaluations.json");
        eval.export(&path).unwrap();
        let back: Vec<EvaluationResult> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back[2].evaluation_type, EvaluationType::ToolUsage);
    }
}
