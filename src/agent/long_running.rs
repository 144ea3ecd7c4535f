//! Pausable long-running tasks persisted through the session store.
//!
//! Each task lives in its session's state under `task_<id>`, and the most
//! recently started task id under `current_task_id`.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::base::AgentCore;
use super::state::{AgentState, AgentStatus};
use super::traits::Agent;
use crate::errors::{MeshError, MeshResult};
use crate::message::{Context, Message, MessageKind, Metadata};
use crate::session::SessionStore;

/// Id the runtime registers the long-running agent under
pub const DEFAULT_LONG_RUNNING_ID: &str = "long_running_agent";
const CURRENT_TASK_KEY: &str = "current_task_id";

const HELP_REPLY: &str = "I'm a long-running operation agent. Use commands like \
'start task', 'pause', 'resume', 'task status' or 'complete task'.";

/// Lifecycle of a long-running task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Making progress
    Running,
    /// Suspended with a checkpoint
    Paused,
    /// Finished at 100 percent
    Completed,
    /// Stopped by a failure
    Errored,
}

impl TaskStatus {
    /// Whether moving from `self` to `next` is allowed
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Running, Errored)
                | (Paused, Errored)
        )
    }

    /// Completed or errored tasks accept no further commands
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Errored)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Paused => write!(f, "paused"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Errored => write!(f, "errored"),
        }
    }
}

/// Snapshot taken when a task is paused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCheckpoint {
    /// Progress at the time of the pause
    pub progress: u8,
    /// When the pause happened
    pub paused_at: DateTime<Utc>,
    /// Task state captured with the checkpoint
    pub state: BTreeMap<String, Value>,
}

/// A pausable unit of work owned by one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongRunningTask {
    /// Unique id (uuid v4)
    pub task_id: String,
    /// Caller-chosen label
    pub task_type: String,
    /// Current status
    pub status: TaskStatus,
    /// Percent complete, 0 to 100
    pub progress: u8,
    /// Creation time
    pub started_at: DateTime<Utc>,
    /// Last transition
    pub updated_at: DateTime<Utc>,
    /// Checkpoint from the most recent pause
    pub checkpoint: Option<TaskCheckpoint>,
    /// Task-specific values
    #[serde(default)]
    pub state: BTreeMap<String, Value>,
}

fn state_key(task_id: &str) -> String {
    format!("task_{}", task_id)
}

/// Agent managing pausable tasks through chat commands
pub struct LongRunningAgent {
    core: AgentCore,
    sessions: Arc<SessionStore>,
}

impl LongRunningAgent {
    /// Build the agent over a shared session store
    pub fn new(core: AgentCore, sessions: Arc<SessionStore>) -> Self {
        Self { core, sessions }
    }

    /// Shared agent core
    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    fn save(&self, session_id: &str, task: &LongRunningTask) -> MeshResult<()> {
        self.sessions
            .set_state(session_id, &state_key(&task.task_id), serde_json::to_value(task)?)
    }

    /// Load a task from session state
    pub fn task(&self, session_id: &str, task_id: &str) -> MeshResult<LongRunningTask> {
        let raw = self
            .sessions
            .get_state(session_id, &state_key(task_id))?
            .ok_or_else(|| MeshError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;
        Ok(serde_json::from_value(raw)?)
    }

    /// Apply a checked status change, then `update`, then persist
    fn transition(
        &self,
        session_id: &str,
        task_id: &str,
        action: &str,
        next: TaskStatus,
        update: impl FnOnce(&mut LongRunningTask),
    ) -> MeshResult<LongRunningTask> {
        let mut task = self.task(session_id, task_id)?;
        if !task.status.can_transition_to(next) {
            return Err(MeshError::InvalidTransition {
                task_id: task_id.to_string(),
                action: action.to_string(),
                status: task.status.to_string(),
            });
        }
        task.status = next;
        task.updated_at = Utc::now();
        update(&mut task);
        self.save(session_id, &task)?;

        let mut meta = Metadata::new();
        meta.insert("task_id".to_string(), json!(task_id));
        meta.insert("status".to_string(), json!(next));
        self.core.log_trace(&format!("task_{}", action), meta);
        Ok(task)
    }

    /// Start a task and make it the session's current one
    pub fn start_task(&self, session_id: &str, task_type: &str) -> MeshResult<LongRunningTask> {
        let now = Utc::now();
        let task = LongRunningTask {
            task_id: uuid::Uuid::new_v4().simple().to_string(),
            task_type: task_type.to_string(),
            status: TaskStatus::Running,
            progress: 0,
            started_at: now,
            updated_at: now,
            checkpoint: None,
            state: BTreeMap::new(),
        };
        self.save(session_id, &task)?;
        self.sessions
            .set_state(session_id, CURRENT_TASK_KEY, json!(task.task_id))?;

        let mut meta = Metadata::new();
        meta.insert("task_id".to_string(), json!(task.task_id));
        meta.insert("task_type".to_string(), json!(task_type));
        self.core.log_trace("long_task_start", meta);
        Ok(task)
    }

    /// Pause a running task and checkpoint its progress
    pub fn pause_task(&self, session_id: &str, task_id: &str) -> MeshResult<LongRunningTask> {
        let task = self.transition(session_id, task_id, "pause", TaskStatus::Paused, |task| {
            task.checkpoint = Some(TaskCheckpoint {
                progress: task.progress,
                paused_at: Utc::now(),
                state: task.state.clone(),
            });
        })?;
        self.core.pause();
        Ok(task)
    }

    /// Resume from the pause checkpoint
    pub fn resume_task(&self, session_id: &str, task_id: &str) -> MeshResult<LongRunningTask> {
        let task = self.transition(session_id, task_id, "resume", TaskStatus::Running, |task| {
            if let Some(checkpoint) = &task.checkpoint {
                task.progress = checkpoint.progress;
                task.state = checkpoint.state.clone();
            }
        })?;
        self.core.resume();
        Ok(task)
    }

    /// Mark a running task as finished at 100 percent
    pub fn complete_task(&self, session_id: &str, task_id: &str) -> MeshResult<LongRunningTask> {
        self.transition(session_id, task_id, "complete", TaskStatus::Completed, |task| {
            task.progress = 100;
        })
    }

    /// Mark a task as errored, recording the reason
    pub fn fail_task(
        &self,
        session_id: &str,
        task_id: &str,
        reason: &str,
    ) -> MeshResult<LongRunningTask> {
        let reason = reason.to_string();
        self.transition(session_id, task_id, "fail", TaskStatus::Errored, move |task| {
            task.state.insert("error".to_string(), Value::String(reason));
        })
    }

    /// Record progress (clamped to 100) on a running task
    pub fn update_progress(
        &self,
        session_id: &str,
        task_id: &str,
        progress: u8,
    ) -> MeshResult<LongRunningTask> {
        let mut task = self.task(session_id, task_id)?;
        if task.status != TaskStatus::Running {
            return Err(MeshError::InvalidTransition {
                task_id: task_id.to_string(),
                action: "update".to_string(),
                status: task.status.to_string(),
            });
        }
        task.progress = progress.min(100);
        task.updated_at = Utc::now();
        self.save(session_id, &task)?;
        Ok(task)
    }

    fn current_task_id(context: &Context) -> Option<String> {
        context
            .state
            .get(CURRENT_TASK_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Status of the session's current task, read from the store
    fn current_task_status(&self, session_id: &str) -> Option<TaskStatus> {
        let task_id = self.sessions.get_state(session_id, CURRENT_TASK_KEY).ok()??;
        let task_id = task_id.as_str()?;
        self.task(session_id, task_id).ok().map(|task| task.status)
    }

    fn run_command(&self, content: &str, context: &Context) -> MeshResult<(String, Metadata)> {
        let command = content.to_lowercase();
        let session_id = context.session_id.as_str();
        let mut metadata = Metadata::new();

        if command.contains("start task") || command.contains("long running") {
            let task = self.start_task(session_id, "data_processing")?;
            metadata.insert("task_id".to_string(), json!(task.task_id));
            let text = format!(
                "Started long-running task: {}. Use pause/resume commands to manage it.",
                task.task_id
            );
            return Ok((text, metadata));
        }

        let action: fn(&Self, &str, &str) -> MeshResult<LongRunningTask> =
            if command.contains("complete task") {
                Self::complete_task
            } else if command.contains("pause") {
                Self::pause_task
            } else if command.contains("resume") {
                Self::resume_task
            } else if command.contains("task status") {
                Self::task
            } else {
                return Ok((HELP_REPLY.to_string(), metadata));
            };

        let Some(task_id) = Self::current_task_id(context) else {
            return Ok(("No active task. Start one with 'start task'.".to_string(), metadata));
        };
        let task = action(self, session_id, &task_id)?;
        metadata.insert("task_id".to_string(), json!(task.task_id));
        metadata.insert("status".to_string(), json!(task.status));
        Ok((serde_json::to_string_pretty(&task)?, metadata))
    }
}

#[async_trait]
impl Agent for LongRunningAgent {
    fn id(&self) -> &str {
        self.core.id()
    }

    fn name(&self) -> &str {
        self.core.name()
    }

    async fn process(&self, message: Message, context: &Context) -> Result<Message> {
        let started = self.core.begin_request();
        let outcome = self.run_command(&message.content, context);
        let paused =
            self.current_task_status(&context.session_id) == Some(TaskStatus::Paused);

        let reply = match outcome {
            Ok((text, metadata)) => {
                self.core.finish_request(true, started);
                message.reply(self.core.id(), text).with_metadata_map(metadata)
            }
            Err(e) => {
                self.core.finish_request(false, started);
                message
                    .reply(self.core.id(), format!("I encountered an error: {}", e))
                    .with_kind(MessageKind::Error)
            }
        };
        // a paused task keeps the agent paused
        if paused {
            self.core.set_state(AgentState::Paused);
        }
        Ok(reply.with_session(context.session_id.clone()))
    }

    fn status(&self) -> AgentStatus {
        self.core.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::ObservabilitySink;

    fn setup() -> (LongRunningAgent, Arc<SessionStore>, String) {
        let sessions = Arc::new(SessionStore::default());
        let session_id = sessions.create(None, None);
        let core = AgentCore::new(
            DEFAULT_LONG_RUNNING_ID,
            "Long-Running Operation Agent",
            Arc::new(ObservabilitySink::default()),
        );
        (LongRunningAgent::new(core, sessions.clone()), sessions, session_id)
    }

    #[test]
    fn test_transition_table() {
        use TaskStatus::*;
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Paused.can_transition_to(Errored));
        assert!(!Paused.can_transition_to(Completed));
        assert!(!Paused.can_transition_to(Paused));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Errored.can_transition_to(Running));
        assert!(Completed.is_terminal());
    }

    #[test]
    fn test_pause_resume_restores_checkpoint() {
        let (agent, sessions, sid) = setup();
        let task = agent.start_task(&sid, "ingest").unwrap();
        assert_eq!(
            sessions.get_state(&sid, CURRENT_TASK_KEY).unwrap(),
            Some(json!(task.task_id))
        );

        agent.update_progress(&sid, &task.task_id, 40).unwrap();
        let paused = agent.pause_task(&sid, &task.task_id).unwrap();
        assert_eq!(paused.status, TaskStatus::Paused);
        assert_eq!(paused.checkpoint.as_ref().unwrap().progress, 40);

        // progress cannot move while paused
        assert!(matches!(
            agent.update_progress(&sid, &task.task_id, 90),
            Err(MeshError::InvalidTransition { .. })
        ));
        let err = agent.pause_task(&sid, &task.task_id).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Task {} cannot pause while paused", task.task_id)
        );

        let resumed = agent.resume_task(&sid, &task.task_id).unwrap();
        assert_eq!(resumed.status, TaskStatus::Running);
        assert_eq!(resumed.progress, 40);

        let done = agent.complete_task(&sid, &task.task_id).unwrap();
        assert_eq!(done.progress, 100);
        assert!(agent.resume_task(&sid, &task.task_id).is_err());
        assert_eq!(agent.task(&sid, &task.task_id).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn test_fail_and_unknown_task() {
        let (agent, _sessions, sid) = setup();
        let task = agent.start_task(&sid, "ingest").unwrap();
        agent.pause_task(&sid, &task.task_id).unwrap();
        let failed = agent.fail_task(&sid, &task.task_id, "disk full").unwrap();
        assert_eq!(failed.status, TaskStatus::Errored);
        assert_eq!(failed.state.get("error"), Some(&json!("disk full")));

        assert!(matches!(
            agent.task(&sid, "missing"),
            Err(MeshError::TaskNotFound { .. })
        ));
        assert!(matches!(
            agent.task("no-session", &task.task_id),
            Err(MeshError::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_chat_commands() {
        let (agent, sessions, sid) = setup();
        let ask = |text: &str| Message::new("user", DEFAULT_LONG_RUNNING_ID, text);

        let ctx = sessions.context_for(&sid).unwrap();
        let reply = agent.process(ask("hello"), &ctx).await.unwrap();
        assert_eq!(reply.content, HELP_REPLY);

        let reply = agent.process(ask("pause"), &ctx).await.unwrap();
        assert!(reply.content.starts_with("No active task"));

        let reply = agent.process(ask("Start task please"), &ctx).await.unwrap();
        let task_id = reply.metadata["task_id"].as_str().unwrap().to_string();

        // commands read the current task from a fresh context
        let ctx = sessions.context_for(&sid).unwrap();
        let reply = agent.process(ask("pause"), &ctx).await.unwrap();
        assert_eq!(reply.metadata["status"], json!("paused"));
        assert_eq!(agent.status().state, AgentState::Paused);

        let reply = agent.process(ask("pause"), &ctx).await.unwrap();
        assert!(reply.is_error());
        assert!(reply.content.contains("cannot pause while paused"));

        let reply = agent.process(ask("resume"), &ctx).await.unwrap();
        assert_eq!(reply.metadata["status"], json!("running"));

        let reply = agent.process(ask("task status"), &ctx).await.unwrap();
        let view: LongRunningTask = serde_json::from_str(&reply.content).unwrap();
        assert_eq!(view.task_id, task_id);
        assert_eq!(view.status, TaskStatus::Running);

        let reply = agent.process(ask("complete task"), &ctx).await.unwrap();
        assert_eq!(reply.metadata["status"], json!("completed"));
    }

    #[tokio::test]
    async fn test_paused_task_keeps_agent_paused() {
        let (agent, sessions, sid) = setup();
        let ask = |text: &str| Message::new("user", DEFAULT_LONG_RUNNING_ID, text);

        let ctx = sessions.context_for(&sid).unwrap();
        agent.process(ask("start task"), &ctx).await.unwrap();
        let ctx = sessions.context_for(&sid).unwrap();
        agent.process(ask("pause"), &ctx).await.unwrap();

        let reply = agent.process(ask("task status"), &ctx).await.unwrap();
        assert_eq!(reply.metadata["status"], json!("paused"));
        assert_eq!(agent.status().state, AgentState::Paused);

        agent.process(ask("what can you do?"), &ctx).await.unwrap();
        assert_eq!(agent.status().state, AgentState::Paused);

        agent.process(ask("resume"), &ctx).await.unwrap();
        assert_eq!(agent.status().state, AgentState::Completed);
    }
}
