//! In-memory trace, metric and log buffers.

use super::records::{
    Dashboard, LogEntry, LogLevel, MetricPoint, MetricSummary, TraceEvent,
};
use crate::config::ObservabilityConfig;
use crate::errors::MeshResult;
use crate::message::Metadata;
use crate::utils;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

const DASHBOARD_RECENT: usize = 10;

/// Append-only observability buffers shared by agents and the orchestrator.
///
/// Each buffer sits behind its own mutex; reads return filtered, tail-limited
/// copies, oldest first. Log entries are mirrored to `tracing` regardless of
/// the buffer's minimum level.
#[derive(Debug)]
pub struct ObservabilitySink {
    min_level: LogLevel,
    logs: Mutex<Vec<LogEntry>>,
    traces: Mutex<Vec<TraceEvent>>,
    metrics: Mutex<Vec<MetricPoint>>,
}

impl ObservabilitySink {
    /// Create an empty sink that buffers logs at `min_level` and above
    pub fn new(min_level: LogLevel) -> Self {
        Self {
            min_level,
            logs: Mutex::new(Vec::new()),
            traces: Mutex::new(Vec::new()),
            metrics: Mutex::new(Vec::new()),
        }
    }

    /// Build from config, falling back to DEBUG on an unknown level name
    pub fn from_config(config: &ObservabilityConfig) -> Self {
        let level = config.log_level.parse().unwrap_or_else(|e| {
            tracing::warn!("{}, keeping DEBUG", e);
            LogLevel::Debug
        });
        Self::new(level)
    }

    /// Lowest level that is buffered
    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Forward to `tracing` and buffer when at or above the minimum level
    pub fn log(
        &self,
        level: LogLevel,
        message: &str,
        agent_id: Option<&str>,
        metadata: Option<Metadata>,
    ) {
        let agent = agent_id.unwrap_or("-");
        match level {
            LogLevel::Debug => tracing::debug!(agent_id = agent, "{}", message),
            LogLevel::Info => tracing::info!(agent_id = agent, "{}", message),
            LogLevel::Warning => tracing::warn!(agent_id = agent, "{}", message),
            LogLevel::Error | LogLevel::Critical => {
                tracing::error!(agent_id = agent, "{}", message)
            }
        }

        if level < self.min_level {
            return;
        }

        utils::lock(&self.logs).push(LogEntry {
            level,
            message: message.to_string(),
            agent_id: agent_id.map(str::to_string),
            timestamp: Utc::now(),
            metadata: metadata.unwrap_or_default(),
        });
    }

    /// Append a trace event
    pub fn trace(
        &self,
        agent_id: &str,
        event_type: &str,
        duration_ms: Option<f64>,
        metadata: Option<Metadata>,
    ) {
        let metadata = metadata.unwrap_or_default();
        utils::lock(&self.traces).push(TraceEvent {
            agent_id: agent_id.to_string(),
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            duration_ms,
            metadata: metadata.clone(),
        });
        self.log(
            LogLevel::Debug,
            &format!("Trace: {}", event_type),
            Some(agent_id),
            Some(metadata),
        );
    }

    /// Append a metric sample
    pub fn record_metric(&self, name: &str, value: f64, tags: Option<BTreeMap<String, String>>) {
        let tags = tags.unwrap_or_default();
        let mut metadata = Metadata::new();
        if !tags.is_empty() {
            metadata.insert("tags".to_string(), serde_json::json!(tags));
        }
        utils::lock(&self.metrics).push(MetricPoint {
            name: name.to_string(),
            value,
            timestamp: Utc::now(),
            tags,
        });
        self.log(
            LogLevel::Debug,
            &format!("Metric: {}={}", name, value),
            None,
            Some(metadata),
        );
    }

    /// Start timing an operation; [`Span::finish`] records the trace
    pub fn start_span<'a>(&'a self, agent_id: &str, event_type: &str) -> Span<'a> {
        Span {
            sink: self,
            agent_id: agent_id.to_string(),
            event_type: event_type.to_string(),
            started: Instant::now(),
        }
    }

    /// Latest traces, optionally filtered by agent and event type
    pub fn traces(
        &self,
        agent_id: Option<&str>,
        event_type: Option<&str>,
        limit: usize,
    ) -> Vec<TraceEvent> {
        let traces = utils::lock(&self.traces);
        let filtered: Vec<TraceEvent> = traces
            .iter()
            .filter(|t| agent_id.map_or(true, |id| t.agent_id == id))
            .filter(|t| event_type.map_or(true, |ty| t.event_type == ty))
            .cloned()
            .collect();
        utils::tail(&filtered, limit)
    }

    /// Latest samples, optionally filtered by name
    pub fn metrics(&self, name: Option<&str>, limit: usize) -> Vec<MetricPoint> {
        let metrics = utils::lock(&self.metrics);
        let filtered: Vec<MetricPoint> = metrics
            .iter()
            .filter(|m| name.map_or(true, |n| m.name == n))
            .cloned()
            .collect();
        utils::tail(&filtered, limit)
    }

    /// Latest buffered logs, optionally filtered by level and agent
    pub fn logs(
        &self,
        level: Option<LogLevel>,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Vec<LogEntry> {
        let logs = utils::lock(&self.logs);
        let filtered: Vec<LogEntry> = logs
            .iter()
            .filter(|l| level.map_or(true, |lv| l.level == lv))
            .filter(|l| agent_id.map_or(true, |id| l.agent_id.as_deref() == Some(id)))
            .cloned()
            .collect();
        utils::tail(&filtered, limit)
    }

    /// Per-name count/sum/avg/min/max over the full metric buffer
    pub fn aggregate(&self) -> BTreeMap<String, MetricSummary> {
        let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for point in utils::lock(&self.metrics).iter() {
            grouped.entry(point.name.clone()).or_default().push(point.value);
        }
        grouped
            .into_iter()
            .map(|(name, values)| (name, MetricSummary::from_values(&values)))
            .collect()
    }

    /// Counts, aggregates and the latest ten of each buffer
    pub fn dashboard(&self) -> Dashboard {
        let traces_count = utils::lock(&self.traces).len();
        let metrics_count = utils::lock(&self.metrics).len();
        let logs_count = utils::lock(&self.logs).len();
        Dashboard {
            traces_count,
            metrics_count,
            logs_count,
            aggregate: self.aggregate(),
            recent_traces: self.traces(None, None, DASHBOARD_RECENT),
            recent_metrics: self.metrics(None, DASHBOARD_RECENT),
            recent_logs: self.logs(None, None, DASHBOARD_RECENT),
        }
    }

    /// Traces as pretty-printed JSON
    pub fn traces_json(&self) -> MeshResult<String> {
        Ok(serde_json::to_string_pretty(&*utils::lock(&self.traces))?)
    }

    /// Metrics as pretty-printed JSON
    pub fn metrics_json(&self) -> MeshResult<String> {
        Ok(serde_json::to_string_pretty(&*utils::lock(&self.metrics))?)
    }

    /// Write every trace as JSON to `path`
    pub fn export_traces(&self, path: &Path) -> MeshResult<()> {
        export(path, &*utils::lock(&self.traces))
    }

    /// Write every metric sample as JSON to `path`
    pub fn export_metrics(&self, path: &Path) -> MeshResult<()> {
        export(path, &*utils::lock(&self.metrics))
    }

    /// Write every buffered log as JSON to `path`
    pub fn export_logs(&self, path: &Path) -> MeshResult<()> {
        export(path, &*utils::lock(&self.logs))
    }
}

impl Default for ObservabilitySink {
    fn default() -> Self {
        Self::new(LogLevel::Debug)
    }
}

fn export<T: Serialize>(path: &Path, records: &[T]) -> MeshResult<()> {
    let content = serde_json::to_string_pretty(records)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// A timed trace in progress
#[derive(Debug)]
pub struct Span<'a> {
    sink: &'a ObservabilitySink,
    agent_id: String,
    event_type: String,
    started: Instant,
}

impl Span<'_> {
    /// Record the trace with the elapsed time and return it in milliseconds
    pub fn finish(self, metadata: Option<Metadata>) -> f64 {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        self.sink
            .trace(&self.agent_id, &self.event_type, Some(elapsed_ms), metadata);
        elapsed_ms
    }
}
