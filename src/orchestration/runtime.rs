//! Mesh runtime - one-call request handling over every component

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::info;

use super::orchestrator::{Orchestrator, RouteOutcome};
use super::pattern::{ExecutionPattern, PatternSource};
use crate::a2a::AgentDirectory;
use crate::agent::long_running::DEFAULT_LONG_RUNNING_ID;
use crate::agent::{Agent, AgentCore, LongRunningAgent, ResponderAgent, TextGenerator};
use crate::config::Configuration;
use crate::errors::MeshResult;
use crate::evaluation::{EvaluationReport, Evaluator, Interaction};
use crate::memory::MemoryBank;
use crate::message::{Message, Metadata};
use crate::observability::{LogLevel, ObservabilitySink};
use crate::session::SessionStore;
use crate::utils;

const RUNTIME_ID: &str = "orchestrator";

/// Outcome of [`MeshRuntime::handle`]
#[derive(Debug, Clone)]
pub struct HandledRequest {
    /// Session the request belongs to
    pub session_id: String,
    /// Normalized execution pattern
    pub pattern: ExecutionPattern,
    /// Text recorded as the assistant turn
    pub content: String,
    /// Full orchestration result
    pub outcome: RouteOutcome,
    /// End-to-end latency in milliseconds
    pub response_time_ms: f64,
    /// Scores recorded for the reply
    pub evaluation: EvaluationReport,
}

/// Owns the stores, the sink, the evaluator, the A2A directory and the
/// orchestrator, all built from one [`Configuration`].
///
/// Two agents are registered up front: a [`ResponderAgent`] under the
/// configured fallback id and a [`LongRunningAgent`]. Applications add their
/// specialists with [`register`](Self::register).
///
/// The default routes name `crop_agent` and `disease_agent`, which are not
/// registered here. Until the application registers them, a matching request
/// skips them and is answered by the fallback alone.
pub struct MeshRuntime {
    config: Configuration,
    memory: Arc<MemoryBank>,
    sessions: Arc<SessionStore>,
    sink: Arc<ObservabilitySink>,
    evaluator: Arc<Evaluator>,
    directory: AgentDirectory,
    orchestrator: Orchestrator,
}

impl MeshRuntime {
    /// Runtime built from `config`, with an unconfigured responder
    pub fn from_config(config: Configuration) -> Self {
        Self::build(config, None)
    }

    /// Like [`from_config`](Self::from_config), with a generator for the responder
    pub fn with_generator(config: Configuration, generator: Arc<dyn TextGenerator>) -> Self {
        Self::build(config, Some(generator))
    }

    fn build(config: Configuration, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        let memory = Arc::new(MemoryBank::new(config.memory.storage_path.clone()));
        let sessions =
            Arc::new(SessionStore::new(&config.session).with_memory(memory.clone()));
        let sink = Arc::new(ObservabilitySink::from_config(&config.observability));
        let orchestrator =
            Orchestrator::from_config(&config.orchestration).with_sink(sink.clone());

        let runtime = Self {
            memory,
            sessions,
            sink,
            evaluator: Arc::new(Evaluator::new()),
            directory: AgentDirectory::new(),
            orchestrator,
            config,
        };

        let fallback_id = runtime.config.orchestration.fallback_agent.clone();
        let mut responder = ResponderAgent::new(runtime.agent_core(&fallback_id, "Chat Assistant"));
        if let Some(generator) = generator {
            responder = responder.with_generator(generator);
        }
        runtime.register(Arc::new(responder), ["conversation", "query_answering"]);

        let long_running = LongRunningAgent::new(
            runtime.agent_core(DEFAULT_LONG_RUNNING_ID, "Long-Running Operations"),
            runtime.sessions.clone(),
        );
        runtime.register(Arc::new(long_running), ["long_running_operations"]);

        info!(
            "Mesh runtime ready with agents: {:?}",
            runtime.orchestrator.agent_ids()
        );
        runtime
    }

    /// A core wired to this runtime's memory bank and sink
    pub fn agent_core(&self, id: &str, name: &str) -> AgentCore {
        AgentCore::new(id, name, self.sink.clone()).with_memory(self.memory.clone())
    }

    /// Register with the orchestrator and announce capabilities in the directory
    pub fn register<I, S>(&self, agent: Arc<dyn Agent>, capabilities: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.directory.register(agent.id(), capabilities, None);
        self.orchestrator.register(agent);
    }

    /// Create a session and return its id
    pub fn create_session(&self, user_id: Option<&str>) -> String {
        self.sessions.create(user_id, None)
    }

    /// Route one user turn through the mesh.
    ///
    /// Records the user turn and the final reply in history, scores the reply
    /// and records a `response_time_ms` metric. Fails only when the session is
    /// unknown or expired; agent faults arrive as error content.
    pub async fn handle<P: PatternSource + ?Sized>(
        &self,
        session_id: &str,
        content: &str,
        pattern: &P,
    ) -> MeshResult<HandledRequest> {
        self.handle_targeted(session_id, content, pattern, None).await
    }

    /// [`handle`](Self::handle) with explicit agent ids instead of auto-routing
    pub async fn handle_targeted<P: PatternSource + ?Sized>(
        &self,
        session_id: &str,
        content: &str,
        pattern: &P,
        agent_ids: Option<&[String]>,
    ) -> MeshResult<HandledRequest> {
        let pattern = ExecutionPattern::normalize(pattern);
        let context = self.sessions.context_for(session_id)?;
        self.sessions
            .append_message(session_id, "user", content, None)?;

        let started = Instant::now();
        let mut start = Metadata::new();
        start.insert("input".to_string(), json!(utils::truncate(content, 100)));
        self.sink
            .trace(RUNTIME_ID, "request_start", None, Some(start));

        let request = Message::new("user", RUNTIME_ID, content).with_session(session_id);
        let outcome = self
            .orchestrator
            .route(request, &context, &pattern, agent_ids)
            .await;
        let reply = outcome.final_content();
        let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let mut done = Metadata::new();
        done.insert("response_length".to_string(), json!(reply.chars().count()));
        self.sink.trace(
            RUNTIME_ID,
            "request_complete",
            Some(response_time_ms),
            Some(done),
        );
        let tags = BTreeMap::from([("pattern".to_string(), pattern.name().to_string())]);
        self.sink
            .record_metric("response_time_ms", response_time_ms, Some(tags));

        let errors = outcome.messages().iter().filter(|m| m.is_error()).count() as u32;
        if errors > 0 {
            let mut meta = Metadata::new();
            meta.insert("errors".to_string(), json!(errors));
            meta.insert("session_id".to_string(), json!(session_id));
            self.sink.log(
                LogLevel::Error,
                "Agent processing error",
                Some(RUNTIME_ID),
                Some(meta),
            );
        }

        let mut reply_meta = Metadata::new();
        reply_meta.insert("pattern".to_string(), json!(pattern.name()));
        self.sessions
            .append_message(session_id, "assistant", &reply, Some(reply_meta))?;

        let evaluation = self.evaluator.evaluate(
            &Interaction::new(RUNTIME_ID, content, reply.as_str())
                .response_time_ms(response_time_ms)
                .success(errors == 0)
                .error_count(errors),
        );

        Ok(HandledRequest {
            session_id: session_id.to_string(),
            pattern,
            content: reply,
            outcome,
            response_time_ms,
            evaluation,
        })
    }

    /// Route with the configured default pattern
    pub async fn handle_default(
        &self,
        session_id: &str,
        content: &str,
    ) -> MeshResult<HandledRequest> {
        let pattern = self.config.orchestration.default_pattern.clone();
        self.handle(session_id, content, &pattern).await
    }

    /// Configuration the runtime was built from
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Session store
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Memory bank shared by the agents
    pub fn memory(&self) -> &Arc<MemoryBank> {
        &self.memory
    }

    /// Observability sink shared by every component
    pub fn sink(&self) -> &Arc<ObservabilitySink> {
        &self.sink
    }

    /// Evaluator that scores each handled request
    pub fn evaluator(&self) -> &Arc<Evaluator> {
        &self.evaluator
    }

    /// A2A directory
    pub fn directory(&self) -> &AgentDirectory {
        &self.directory
    }

    /// Agent registry and executor
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}

impl Default for MeshRuntime {
    fn default() -> Self {
        Self::from_config(Configuration::default())
    }
}
