//! Shared agent behaviour: state machine, metrics, tools, memory and tracing.
//!
//! Concrete agents embed an [`AgentCore`] and delegate to it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use serde_json::{json, Map, Value};
use tracing::warn;

use super::state::{AgentMetrics, AgentState, AgentStatus};
use super::tools::ToolBox;
use super::traits::Tool;
use crate::errors::MeshError;
use crate::memory::MemoryBank;
use crate::message::{Context, Metadata};
use crate::observability::{ObservabilitySink, TraceEvent};
use crate::utils;

/// Characters of a tool result kept in traces and history
const TOOL_RESULT_PREVIEW: usize = 100;

/// Behaviour shared by every agent: state, metrics, tools, memory and tracing
#[derive(Debug)]
pub struct AgentCore {
    id: String,
    name: String,
    tools: ToolBox,
    memory: Option<Arc<MemoryBank>>,
    sink: Arc<ObservabilitySink>,
    state: Mutex<AgentState>,
    metrics: Mutex<AgentMetrics>,
}

impl AgentCore {
    /// Create a core in the idle state with no tools and no memory bank
    pub fn new(id: impl Into<String>, name: impl Into<String>, sink: Arc<ObservabilitySink>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tools: ToolBox::new(),
            memory: None,
            sink,
            state: Mutex::new(AgentState::Idle),
            metrics: Mutex::new(AgentMetrics::default()),
        }
    }

    /// Attach the session memory bank
    pub fn with_memory(mut self, memory: Arc<MemoryBank>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Add a tool
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    /// Agent id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered tools and their execution history
    pub fn tools(&self) -> &ToolBox {
        &self.tools
    }

    /// Sink that receives this agent's traces and metrics
    pub fn sink(&self) -> &Arc<ObservabilitySink> {
        &self.sink
    }

    /// Current lifecycle state
    pub fn state(&self) -> AgentState {
        *utils::lock(&self.state)
    }

    /// Overwrite the lifecycle state
    pub fn set_state(&self, state: AgentState) {
        *utils::lock(&self.state) = state;
    }

    /// Mark the agent running and count the request; pass the returned
    /// instant to [`finish_request`](Self::finish_request)
    pub fn begin_request(&self) -> Instant {
        self.set_state(AgentState::Running);
        utils::lock(&self.metrics).total_requests += 1;
        Instant::now()
    }

    /// Close a request opened by [`begin_request`](Self::begin_request).
    ///
    /// Returns the elapsed time in milliseconds.
    pub fn finish_request(&self, success: bool, started: Instant) -> f64 {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        utils::lock(&self.metrics).record_finish(success, elapsed_ms);
        self.set_state(if success {
            AgentState::Completed
        } else {
            AgentState::Error
        });

        let mut tags = BTreeMap::new();
        tags.insert("agent_id".to_string(), self.id.clone());
        tags.insert("success".to_string(), success.to_string());
        self.sink
            .record_metric("agent_response_time_ms", elapsed_ms, Some(tags));
        elapsed_ms
    }

    /// Record a trace event under this agent's id
    pub fn log_trace(&self, event_type: &str, metadata: Metadata) {
        self.sink.trace(&self.id, event_type, None, Some(metadata));
    }

    /// Run a tool by name, tracing start and outcome.
    ///
    /// Fails with [`MeshError::ToolNotFound`] for an unknown name, or with the
    /// tool's own error.
    pub async fn execute_tool(&self, tool_name: &str, params: Map<String, Value>) -> Result<Value> {
        let mut start = Metadata::new();
        start.insert("tool_name".to_string(), json!(tool_name));
        start.insert("parameters".to_string(), Value::Object(params.clone()));
        self.log_trace("tool_execution_start", start);

        let tool = self.tools.get(tool_name).ok_or_else(|| MeshError::ToolNotFound {
            tool_name: tool_name.to_string(),
        })?;

        let mut outcome = Metadata::new();
        outcome.insert("tool_name".to_string(), json!(tool_name));

        match tool.execute(params).await {
            Ok(result) => {
                let preview = utils::truncate(&result.to_string(), TOOL_RESULT_PREVIEW);
                *utils::lock(&self.metrics)
                    .tool_usage
                    .entry(tool_name.to_string())
                    .or_insert(0) += 1;
                self.tools.record(tool_name, preview.clone(), true);
                outcome.insert("result".to_string(), json!(preview));
                self.log_trace("tool_execution_success", outcome);
                Ok(result)
            }
            Err(e) => {
                self.tools.record(tool_name, e.to_string(), false);
                outcome.insert("error".to_string(), json!(e.to_string()));
                self.log_trace("tool_execution_error", outcome);
                Err(e)
            }
        }
    }

    /// Memory bank value for this session, or the context snapshot without a bank
    pub fn get_memory(&self, key: &str, context: &Context) -> Option<Value> {
        match &self.memory {
            Some(bank) => bank.get(&context.session_id, key),
            None => context.memory.get(key).cloned(),
        }
    }

    /// Write a value to the session's memory
    pub fn store_memory(&self, key: &str, value: Value, context: &Context) {
        match &self.memory {
            Some(bank) => bank.put(&context.session_id, key, value, None),
            None => warn!(
                "Agent {} has no memory bank, dropping memory key {}",
                self.id, key
            ),
        }
    }

    /// Running -> Paused; any other state is left alone
    pub fn pause(&self) -> bool {
        let paused = {
            let mut state = utils::lock(&self.state);
            if *state == AgentState::Running {
                *state = AgentState::Paused;
                true
            } else {
                false
            }
        };
        if paused {
            self.log_trace("agent_paused", Metadata::new());
        }
        paused
    }

    /// Paused -> Running; any other state is left alone
    pub fn resume(&self) -> bool {
        let resumed = {
            let mut state = utils::lock(&self.state);
            if *state == AgentState::Paused {
                *state = AgentState::Running;
                true
            } else {
                false
            }
        };
        if resumed {
            self.log_trace("agent_resumed", Metadata::new());
        }
        resumed
    }

    /// Most recent traces emitted by this agent
    pub fn traces(&self, limit: usize) -> Vec<TraceEvent> {
        self.sink.traces(Some(&self.id), None, limit)
    }

    /// Snapshot of the request counters
    pub fn metrics(&self) -> AgentMetrics {
        utils::lock(&self.metrics).clone()
    }

    /// Id, state, metrics and tool names
    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            agent_id: self.id.clone(),
            agent_name: self.name.clone(),
            state: self.state(),
            metrics: self.metrics(),
            available_tools: self.tools.names(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Doubler;

    #[async_trait]
    impl Tool for Doubler {
        fn name(&self) -> &str {
            "doubler"
        }
        fn description(&self) -> &str {
            "Doubles `n`"
        }
        async fn execute(&self, params: Map<String, Value>) -> Result<Value> {
            let n = params
                .get("n")
                .and_then(Value::as_i64)
                .ok_or_else(|| anyhow::anyhow!("missing n"))?;
            Ok(json!(n * 2))
        }
    }

    fn core() -> AgentCore {
        AgentCore::new("crop_agent", "Crop Agent", Arc::new(ObservabilitySink::default()))
            .with_tool(Arc::new(Doubler))
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_execute_tool_traces_and_usage() {
        let core = core();
        let result = core.execute_tool("doubler", params(json!({"n": 21}))).await.unwrap();
        assert_eq!(result, json!(42));

        let events: Vec<String> = core.traces(10).into_iter().map(|t| t.event_type).collect();
        assert_eq!(events, vec!["tool_execution_start", "tool_execution_success"]);
        assert_eq!(core.metrics().tool_usage.get("doubler"), Some(&1));
        assert_eq!(core.tools().successful_executions().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_tool_failure_and_missing() {
        let core = core();
        assert!(core.execute_tool("doubler", Map::new()).await.is_err());
        assert_eq!(core.traces(1)[0].event_type, "tool_execution_error");
        assert!(core.metrics().tool_usage.is_empty());

        let err = core.execute_tool("nope", Map::new()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MeshError>(),
            Some(MeshError::ToolNotFound { .. })
        ));
    }

    #[test]
    fn test_request_lifecycle() {
        let core = core();
        assert_eq!(core.state(), AgentState::Idle);

        let started = core.begin_request();
        assert_eq!(core.state(), AgentState::Running);
        core.finish_request(true, started);
        assert_eq!(core.state(), AgentState::Completed);

        let started = core.begin_request();
        core.finish_request(false, started);
        assert_eq!(core.state(), AgentState::Error);

        let status = core.status();
        assert_eq!(status.metrics.total_requests, 2);
        assert_eq!(status.metrics.successful_requests, 1);
        assert_eq!(status.metrics.failed_requests, 1);
        assert_eq!(status.available_tools, vec!["doubler"]);
        assert_eq!(core.sink().metrics(Some("agent_response_time_ms"), 10).len(), 2);
    }

    #[test]
    fn test_pause_resume_only_from_matching_state() {
        let core = core();
        assert!(!core.pause());
        core.begin_request();
        assert!(core.pause());
        assert_eq!(core.state(), AgentState::Paused);
        assert!(!core.pause());
        assert!(core.resume());
        assert_eq!(core.state(), AgentState::Running);
    }

    #[test]
    fn test_memory_with_and_without_bank() {
        let mut ctx = Context::new("s1");
        ctx.memory.insert("crop".to_string(), json!("wheat"));

        let bare = core();
        assert_eq!(bare.get_memory("crop", &ctx), Some(json!("wheat")));
        bare.store_memory("ignored", json!(1), &ctx);

        let bank = Arc::new(MemoryBank::in_memory());
        let backed = core().with_memory(bank.clone());
        assert_eq!(backed.get_memory("crop", &ctx), None);
        backed.store_memory("crop", json!("rice"), &ctx);
        assert_eq!(backed.get_memory("crop", &ctx), Some(json!("rice")));
        assert_eq!(bank.entry("s1", "crop").unwrap().access_count, 1);
    }
}
