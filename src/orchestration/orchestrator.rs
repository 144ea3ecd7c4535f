//! Multi-agent execution engine
//!
//! Agents run as tokio tasks, so an `Err`, a panic or a timeout in one agent
//! becomes an error-content message in that agent's slot instead of aborting
//! the routed operation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::pattern::{ExecutionPattern, PatternSource};
use super::router::AutoRouter;
use crate::agent::{Agent, AgentStatus};
use crate::config::OrchestrationConfig;
use crate::errors::{MeshError, MeshResult};
use crate::message::{Context, Message, Metadata};
use crate::observability::ObservabilitySink;
use crate::utils;

const ORCHESTRATOR_ID: &str = "orchestrator";
const FANOUT_EXCERPT_CHARS: usize = 200;

/// Result of [`Orchestrator::route`]
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Sequential and loop runs: the original message followed by every output
    Sequence(Vec<Message>),
    /// Parallel runs, keyed by agent id
    Fanout(BTreeMap<String, Message>),
}

impl RouteOutcome {
    /// Every message in the outcome, in order
    pub fn messages(&self) -> Vec<&Message> {
        match self {
            RouteOutcome::Sequence(messages) => messages.iter().collect(),
            RouteOutcome::Fanout(results) => results.values().collect(),
        }
    }

    /// Whether any agent produced error content
    pub fn has_errors(&self) -> bool {
        self.messages().iter().any(|m| m.is_error())
    }

    /// Text to show the user.
    ///
    /// The last message of a sequence, or one `**agent**: excerpt` paragraph
    /// per fan-out slot.
    pub fn final_content(&self) -> String {
        match self {
            RouteOutcome::Sequence(messages) => messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_else(|| "No response generated".to_string()),
            RouteOutcome::Fanout(results) => results
                .iter()
                .map(|(id, m)| {
                    format!("**{}**: {}", id, utils::truncate(&m.content, FANOUT_EXCERPT_CHARS))
                })
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

struct PendingCall {
    handle: JoinHandle<anyhow::Result<Message>>,
    started: Instant,
    deadline: Option<Instant>,
}

/// Registry of agents plus the three execution patterns
pub struct Orchestrator {
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
    router: AutoRouter,
    sink: Option<Arc<ObservabilitySink>>,
    agent_timeout: Option<Duration>,
    max_iterations: u32,
    stop_keywords: Vec<String>,
}

impl Orchestrator {
    /// Orchestrator with default settings and no agents
    pub fn new() -> Self {
        Self::from_config(&OrchestrationConfig::default())
    }

    /// Orchestrator configured from the orchestration section
    pub fn from_config(config: &OrchestrationConfig) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            router: AutoRouter::from_config(config),
            sink: None,
            agent_timeout: config.agent_timeout_seconds.map(Duration::from_secs),
            max_iterations: config.max_iterations.max(1),
            stop_keywords: config
                .loop_stop_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    /// Record traces and failures into `sink`
    pub fn with_sink(mut self, sink: Arc<ObservabilitySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the auto-router
    pub fn with_router(mut self, router: AutoRouter) -> Self {
        self.router = router;
        self
    }

    /// Bound every agent call; an overrun becomes an error-content message
    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = Some(timeout);
        self
    }

    /// Router used when a request names no agents
    pub fn router(&self) -> &AutoRouter {
        &self.router
    }

    /// Register an agent, replacing any agent with the same id
    pub fn register(&self, agent: Arc<dyn Agent>) {
        let id = agent.id().to_string();
        if utils::write(&self.agents).insert(id.clone(), agent).is_some() {
            debug!("Replaced agent: {}", id);
        } else {
            info!("Registered agent: {}", id);
        }
    }

    /// Register each agent in turn
    pub fn register_many(&self, agents: impl IntoIterator<Item = Arc<dyn Agent>>) {
        for agent in agents {
            self.register(agent);
        }
    }

    /// Look up an agent by id
    pub fn agent(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        utils::read(&self.agents).get(agent_id).cloned()
    }

    /// Registered ids, sorted
    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = utils::read(&self.agents).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Status of every registered agent keyed by id
    pub fn status(&self) -> BTreeMap<String, AgentStatus> {
        // clone out so status() never runs under the registry lock
        let agents: Vec<Arc<dyn Agent>> = utils::read(&self.agents).values().cloned().collect();
        agents
            .into_iter()
            .map(|agent| (agent.id().to_string(), agent.status()))
            .collect()
    }

    fn trace(&self, event_type: &str, metadata: Metadata) {
        if let Some(sink) = &self.sink {
            sink.trace(ORCHESTRATOR_ID, event_type, None, Some(metadata));
        }
    }

    /// Start one agent call in its own task
    fn spawn(
        &self,
        agent: Arc<dyn Agent>,
        message: Message,
        context: Arc<Context>,
    ) -> PendingCall {
        let started = Instant::now();
        PendingCall {
            handle: tokio::spawn(async move { agent.process(message, &context).await }),
            started,
            deadline: self.agent_timeout.map(|limit| started + limit),
        }
    }

    /// Wait for a spawned call and convert any fault into a [`MeshError`]
    async fn settle(&self, agent_id: &str, call: PendingCall) -> MeshResult<Message> {
        let PendingCall {
            mut handle,
            started,
            deadline,
        } = call;

        let joined = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    let err = MeshError::AgentTimeout {
                        agent_id: agent_id.to_string(),
                        seconds: self.agent_timeout.map(|t| t.as_secs()).unwrap_or_default(),
                    };
                    self.record_failure(agent_id, &err);
                    return Err(err);
                }
            },
            None => handle.await,
        };

        let result = match joined {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(MeshError::processing(agent_id, e.to_string())),
            Err(join_err) if join_err.is_panic() => {
                Err(MeshError::processing(agent_id, "agent panicked"))
            }
            Err(join_err) => Err(MeshError::processing(agent_id, join_err.to_string())),
        };

        match &result {
            Ok(reply) => {
                let mut meta = Metadata::new();
                meta.insert("agent_id".to_string(), json!(agent_id));
                meta.insert(
                    "duration_ms".to_string(),
                    json!(started.elapsed().as_secs_f64() * 1000.0),
                );
                meta.insert("error".to_string(), json!(reply.is_error()));
                self.trace("agent_invoked", meta);
            }
            Err(err) => self.record_failure(agent_id, err),
        }
        result
    }

    fn record_failure(&self, agent_id: &str, err: &MeshError) {
        warn!("Agent {} failed: {}", agent_id, err);
        let mut meta = Metadata::new();
        meta.insert("agent_id".to_string(), json!(agent_id));
        meta.insert("error".to_string(), json!(err.to_string()));
        self.trace("agent_failed", meta);
    }

    /// One pipeline pass; the flag is true when an agent faulted
    async fn pipeline(
        &self,
        agent_ids: &[String],
        start: &Message,
        context: &Arc<Context>,
    ) -> (Vec<Message>, bool) {
        let mut outputs = Vec::new();
        let mut current = start.clone();

        for agent_id in agent_ids {
            let Some(agent) = self.agent(agent_id) else {
                warn!("Agent {} not found, skipping", agent_id);
                continue;
            };
            let staged = current.forward(agent_id.as_str(), Some(context.session_id.as_str()));
            let call = self.spawn(agent, staged, context.clone());
            match self.settle(agent_id, call).await {
                Ok(reply) => {
                    current = reply.clone();
                    outputs.push(reply);
                }
                Err(err) => {
                    outputs.push(
                        current
                            .error_reply(agent_id.as_str(), &err)
                            .with_session(context.session_id.clone()),
                    );
                    return (outputs, true);
                }
            }
        }
        (outputs, false)
    }

    /// Pipeline execution.
    ///
    /// Returns `[original, output_1, ...]`. A faulting agent contributes an
    /// error-content message and ends the pipeline.
    pub async fn execute_sequential(
        &self,
        agent_ids: &[String],
        message: Message,
        context: &Context,
    ) -> Vec<Message> {
        info!("Executing sequential pattern with agents: {:?}", agent_ids);
        let context = Arc::new(context.clone());
        let (outputs, _) = self.pipeline(agent_ids, &message, &context).await;

        let mut messages = Vec::with_capacity(outputs.len() + 1);
        messages.push(message);
        messages.extend(outputs);
        messages
    }

    /// Fan-out execution: every agent gets its own copy of `message`
    pub async fn execute_parallel(
        &self,
        agent_ids: &[String],
        message: Message,
        context: &Context,
    ) -> BTreeMap<String, Message> {
        info!("Executing parallel pattern with agents: {:?}", agent_ids);
        let context = Arc::new(context.clone());

        // spawn everything first so agents run concurrently
        let mut calls = Vec::new();
        for agent_id in agent_ids {
            let Some(agent) = self.agent(agent_id) else {
                warn!("Agent {} not found, skipping", agent_id);
                continue;
            };
            let staged = message.forward(agent_id.as_str(), Some(context.session_id.as_str()));
            calls.push((agent_id, self.spawn(agent, staged, context.clone())));
        }

        let mut results = BTreeMap::new();
        for (agent_id, call) in calls {
            let reply = self.settle(agent_id, call).await.unwrap_or_else(|err| {
                message
                    .error_reply(agent_id.as_str(), &err)
                    .with_session(context.session_id.clone())
            });
            results.insert(agent_id.clone(), reply);
        }
        results
    }

    /// Repeated pipeline passes.
    ///
    /// Each pass starts from the previous pass's final message. Stops when
    /// `condition` holds over the pass's outputs, when an agent faults, or
    /// after `max_iterations` passes. Returns the original message followed
    /// by every output of every pass.
    pub async fn execute_loop(
        &self,
        agent_ids: &[String],
        message: Message,
        context: &Context,
        condition: &(dyn Fn(&[Message]) -> bool + Send + Sync),
        max_iterations: u32,
    ) -> Vec<Message> {
        info!(
            "Executing loop pattern with agents: {:?}, max_iterations: {}",
            agent_ids, max_iterations
        );
        let context = Arc::new(context.clone());
        let mut messages = vec![message.clone()];
        let mut current = message;
        let mut iteration = 0;

        while iteration < max_iterations {
            iteration += 1;
            debug!("Loop iteration {}", iteration);

            let (outputs, faulted) = self.pipeline(agent_ids, &current, &context).await;
            if let Some(last) = outputs.last() {
                current = last.clone();
            }
            let stop = faulted || condition(&outputs);
            messages.extend(outputs);

            if stop {
                info!("Loop ended at iteration {}", iteration);
                return messages;
            }
        }

        warn!("Loop reached max iterations: {}", max_iterations);
        messages
    }

    /// Route a message under a pattern.
    ///
    /// Without explicit `agent_ids` the [`AutoRouter`] picks them from the
    /// content. Loops stop once any output contains one of the configured
    /// stop keywords.
    pub async fn route<P: PatternSource + ?Sized>(
        &self,
        message: Message,
        context: &Context,
        pattern: &P,
        agent_ids: Option<&[String]>,
    ) -> RouteOutcome {
        let pattern = ExecutionPattern::normalize(pattern);
        let agent_ids = match agent_ids {
            Some(ids) => ids.to_vec(),
            None => self.router.select(&message.content),
        };

        let mut meta = Metadata::new();
        meta.insert("pattern".to_string(), json!(pattern.name()));
        meta.insert("agents".to_string(), json!(agent_ids));
        meta.insert("session_id".to_string(), json!(context.session_id));
        self.trace("route_start", meta);

        match pattern {
            ExecutionPattern::Sequential => {
                RouteOutcome::Sequence(self.execute_sequential(&agent_ids, message, context).await)
            }
            ExecutionPattern::Parallel => {
                RouteOutcome::Fanout(self.execute_parallel(&agent_ids, message, context).await)
            }
            ExecutionPattern::Loop => {
                let keywords = &self.stop_keywords;
                let condition = |outputs: &[Message]| {
                    outputs.iter().any(|m| {
                        let content = m.content.to_lowercase();
                        keywords.iter().any(|k| content.contains(k.as_str()))
                    })
                };
                RouteOutcome::Sequence(
                    self.execute_loop(&agent_ids, message, context, &condition, self.max_iterations)
                        .await,
                )
            }
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}
