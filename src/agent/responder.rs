//! General-purpose conversational agent, the default routing fallback

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::base::AgentCore;
use super::state::AgentStatus;
use super::traits::{Agent, TextGenerator};
use crate::message::{Context, Message, MessageKind, Metadata};
use crate::utils;

/// Id the runtime registers the responder under
pub const DEFAULT_RESPONDER_ID: &str = "chat_agent";

/// Reply used when no generator is configured
pub const UNCONFIGURED_REPLY: &str =
    "I'm a chat agent. Please configure the LLM model to get responses.";

const HISTORY_WINDOW: usize = 10;
const MEMORY_ITEMS: usize = 5;

const DEFAULT_PREAMBLE: &str =
    "You are a helpful assistant. Provide concise, actionable responses.";

/// Answers from recent history and session memory through a [`TextGenerator`].
///
/// Never returns `Err`: a missing generator yields [`UNCONFIGURED_REPLY`] with
/// `fallback = true` metadata, and a generator failure becomes an
/// `"I encountered an error: ..."` reply.
pub struct ResponderAgent {
    core: AgentCore,
    generator: Option<Arc<dyn TextGenerator>>,
    preamble: String,
}

impl ResponderAgent {
    /// Build a responder with the default preamble and no generator
    pub fn new(core: AgentCore) -> Self {
        Self {
            core,
            generator: None,
            preamble: DEFAULT_PREAMBLE.to_string(),
        }
    }

    /// Use a text generation backend
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Replace the system preamble put before every prompt
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    /// Shared agent core
    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    /// Preamble, up to five memory items, the last ten history entries, then the request
    pub fn build_prompt(&self, request: &str, context: &Context) -> String {
        let mut prompt = format!("{}\n\n", self.preamble);

        if !context.memory.is_empty() {
            prompt.push_str("Context from previous conversations:\n");
            for (key, value) in context.memory.iter().take(MEMORY_ITEMS) {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                prompt.push_str(&format!("- {}: {}\n", key, value));
            }
            prompt.push('\n');
        }

        let history = context.recent_history(HISTORY_WINDOW);
        if !history.is_empty() {
            prompt.push_str("Recent conversation:\n");
            for entry in history {
                prompt.push_str(&format!("{}: {}\n", entry.role, entry.content));
            }
            prompt.push('\n');
        }

        prompt.push_str(&format!("User question: {}\n\n", request));
        prompt.push_str("Provide a helpful, accurate response:");
        prompt
    }
}

#[async_trait]
impl Agent for ResponderAgent {
    fn id(&self) -> &str {
        self.core.id()
    }

    fn name(&self) -> &str {
        self.core.name()
    }

    async fn process(&self, message: Message, context: &Context) -> Result<Message> {
        let started = self.core.begin_request();

        let mut start = Metadata::new();
        start.insert(
            "message".to_string(),
            json!(utils::truncate(&message.content, 100)),
        );
        start.insert("session_id".to_string(), json!(context.session_id));
        self.core.log_trace("chat_processing_start", start);

        let Some(generator) = &self.generator else {
            self.core.finish_request(true, started);
            return Ok(message
                .reply(self.core.id(), UNCONFIGURED_REPLY)
                .with_session(context.session_id.clone())
                .with_metadata("fallback", true));
        };

        let prompt = self.build_prompt(&message.content, context);
        match generator.generate(&prompt).await {
            Ok(text) => {
                let elapsed = self.core.finish_request(true, started);
                let mut done = Metadata::new();
                done.insert("response_length".to_string(), json!(text.chars().count()));
                done.insert("response_time_ms".to_string(), json!(elapsed));
                self.core.log_trace("chat_processing_success", done);

                Ok(message
                    .reply(self.core.id(), text)
                    .with_session(context.session_id.clone()))
            }
            Err(e) => {
                self.core.finish_request(false, started);
                let mut failed = Metadata::new();
                failed.insert("error".to_string(), json!(e.to_string()));
                self.core.log_trace("chat_processing_error", failed);

                Ok(message
                    .reply(self.core.id(), format!("I encountered an error: {}", e))
                    .with_kind(MessageKind::Error)
                    .with_session(context.session_id.clone()))
            }
        }
    }

    fn status(&self) -> AgentStatus {
        self.core.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::HistoryEntry;
    use crate::observability::ObservabilitySink;
    use std::sync::Mutex;

    /// Echoes the prompt it was given
    struct Recording {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for Recording {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("Plant rice in June.".to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl TextGenerator for Failing {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            anyhow::bail!("quota exceeded")
        }
    }

    fn responder() -> ResponderAgent {
        ResponderAgent::new(AgentCore::new(
            DEFAULT_RESPONDER_ID,
            "Chat Assistant",
            Arc::new(ObservabilitySink::default()),
        ))
    }

    #[tokio::test]
    async fn test_unconfigured_fallback() {
        let agent = responder();
        let reply = agent
            .process(Message::new("user", "chat_agent", "hi"), &Context::new("s"))
            .await
            .unwrap();

        assert_eq!(reply.content, UNCONFIGURED_REPLY);
        assert_eq!(reply.metadata.get("fallback"), Some(&json!(true)));
        assert_eq!(reply.receiver, "user");
        assert_eq!(reply.session_id.as_deref(), Some("s"));
    }

    #[tokio::test]
    async fn test_generator_reply_and_prompt() {
        let generator = Arc::new(Recording {
            prompts: Mutex::new(Vec::new()),
        });
        let agent = responder().with_generator(generator.clone());

        let mut ctx = Context::new("s");
        for i in 0..12 {
            ctx.conversation_history
                .push(HistoryEntry::new("user", format!("turn {}", i), Metadata::new()));
        }
        for i in 0..7 {
            ctx.memory.insert(format!("k{}", i), json!(format!("v{}", i)));
        }

        let reply = agent
            .process(Message::new("user", "chat_agent", "when to plant?"), &ctx)
            .await
            .unwrap();
        assert_eq!(reply.content, "Plant rice in June.");
        assert!(!reply.is_error());

        let prompt = generator.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("User question: when to plant?"));
        assert!(prompt.contains("- k4: v4"));
        assert!(!prompt.contains("- k5: v5"));
        assert!(prompt.contains("user: turn 2"));
        assert!(!prompt.contains("user: turn 1\n"));
        assert_eq!(agent.status().metrics.successful_requests, 1);
    }

    #[tokio::test]
    async fn test_generator_error_becomes_reply() {
        let agent = responder().with_generator(Arc::new(Failing));
        let reply = agent
            .process(Message::new("user", "chat_agent", "hi"), &Context::new("s"))
            .await
            .unwrap();

        assert_eq!(reply.content, "I encountered an error: quota exceeded");
        assert!(reply.is_error());
        let status = agent.status();
        assert_eq!(status.metrics.failed_requests, 1);
        assert_eq!(status.state, crate::agent::AgentState::Error);
    }
}
