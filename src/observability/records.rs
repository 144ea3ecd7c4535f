//! Record shapes held by the observability sink

use crate::message::Metadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Severity of a log entry, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Diagnostic detail
    Debug,
    /// Normal operation
    Info,
    /// Something unexpected that did not fail the request
    Warning,
    /// A failed operation
    Error,
    /// A failure needing attention
    Critical,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DEBUG" | "TRACE" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" | "FATAL" => Ok(LogLevel::Critical),
            other => Err(format!("Unknown log level: {}", other)),
        }
    }
}

/// One buffered log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity
    pub level: LogLevel,
    /// Log text
    pub message: String,
    /// Emitting agent, if any
    pub agent_id: Option<String>,
    /// When the entry was written
    pub timestamp: DateTime<Utc>,
    /// Structured context
    pub metadata: Metadata,
}

/// One buffered trace event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Emitting agent
    pub agent_id: String,
    /// Event name such as `agent_invoked`
    pub event_type: String,
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
    /// Duration of the traced work, if measured
    pub duration_ms: Option<f64>,
    /// Event details
    pub metadata: Metadata,
}

/// One recorded metric sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Metric name
    pub name: String,
    /// Sample value
    pub value: f64,
    /// When the sample was recorded
    pub timestamp: DateTime<Utc>,
    /// Dimensions such as `pattern` or `agent_id`
    pub tags: BTreeMap<String, String>,
}

/// Aggregate over every point recorded under one metric name
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSummary {
    /// Number of samples
    pub count: usize,
    /// Sum of samples
    pub sum: f64,
    /// Mean of samples
    pub avg: f64,
    /// Smallest sample
    pub min: f64,
    /// Largest sample
    pub max: f64,
}

impl MetricSummary {
    pub(crate) fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                count: 0,
                sum: 0.0,
                avg: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }
        let sum: f64 = values.iter().sum();
        Self {
            count: values.len(),
            sum,
            avg: sum / values.len() as f64,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Snapshot for a dashboard view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    /// Buffered traces
    pub traces_count: usize,
    /// Buffered metric samples
    pub metrics_count: usize,
    /// Buffered log entries
    pub logs_count: usize,
    /// Summaries per metric name
    pub aggregate: BTreeMap<String, MetricSummary>,
    /// Latest traces
    pub recent_traces: Vec<TraceEvent>,
    /// Latest metric samples
    pub recent_metrics: Vec<MetricPoint>,
    /// Latest log entries
    pub recent_logs: Vec<LogEntry>,
}
