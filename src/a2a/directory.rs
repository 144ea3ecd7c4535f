//! Thread-safe agent directory with capability discovery and a message log.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::message::{
    A2AMessage, A2AMessageType, AgentNode, AgentRegistration, RegistrationStatus, Topology,
};
use crate::errors::{MeshError, MeshResult};
use crate::message::Metadata;
use crate::utils;

/// Internal state of the directory.
#[derive(Debug, Default)]
struct DirectoryInner {
    /// Registrations in first-registration order.
    agents: Vec<AgentRegistration>,

    /// Index from agent id to position in `agents`.
    index: HashMap<String, usize>,
}

impl DirectoryInner {
    fn get(&self, agent_id: &str) -> Option<&AgentRegistration> {
        self.index.get(agent_id).map(|&idx| &self.agents[idx])
    }
}

/// Registry of agents by capability plus the append-only A2A message log.
///
/// Cloning shares the same registry and log. The registry and the log are
/// guarded separately; no operation holds both locks at once.
///
/// # Example
///
/// ```
/// use agentmesh::a2a::{A2AMessageType, AgentDirectory};
/// use serde_json::json;
///
/// let directory = AgentDirectory::new();
/// directory.register("crop_agent", ["crop_recommendation"], None);
/// directory.register("chat_agent", ["general_chat"], None);
///
/// let msg = directory
///     .route_to_capability("chat_agent", "crop_recommendation", json!({"soil": "loamy"}))
///     .unwrap();
/// assert_eq!(msg.to, "crop_agent");
/// assert_eq!(msg.message_type, A2AMessageType::Request);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AgentDirectory {
    inner: Arc<RwLock<DirectoryInner>>,
    log: Arc<Mutex<Vec<A2AMessage>>>,
}

impl AgentDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent as active, replacing any prior registration in place
    pub fn register<I, S>(&self, agent_id: &str, capabilities: I, endpoint: Option<&str>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registration = AgentRegistration {
            agent_id: agent_id.to_string(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            endpoint: endpoint.map(str::to_string),
            registered_at: Utc::now(),
            status: RegistrationStatus::Active,
        };
        info!(
            "Registered agent: {} with capabilities: {:?}",
            agent_id, registration.capabilities
        );

        let mut inner = utils::write(&self.inner);
        match inner.index.get(agent_id).copied() {
            Some(idx) => inner.agents[idx] = registration,
            None => {
                let idx = inner.agents.len();
                inner.index.insert(agent_id.to_string(), idx);
                inner.agents.push(registration);
            }
        }
    }

    /// Activate or deactivate a registered agent
    pub fn set_status(&self, agent_id: &str, status: RegistrationStatus) -> MeshResult<()> {
        let mut inner = utils::write(&self.inner);
        let idx = *inner
            .index
            .get(agent_id)
            .ok_or_else(|| MeshError::unknown_agent(agent_id))?;
        inner.agents[idx].status = status;
        Ok(())
    }

    /// Active agents in registration order, optionally with a capability tag
    pub fn discover(&self, capability: Option<&str>) -> Vec<String> {
        utils::read(&self.inner)
            .agents
            .iter()
            .filter(|a| a.is_active())
            .filter(|a| capability.map_or(true, |cap| a.capabilities.contains(cap)))
            .map(|a| a.agent_id.clone())
            .collect()
    }

    /// Registration record for an agent
    pub fn agent_info(&self, agent_id: &str) -> Option<AgentRegistration> {
        utils::read(&self.inner).get(agent_id).cloned()
    }

    /// Whether the id has ever been registered
    pub fn is_registered(&self, agent_id: &str) -> bool {
        utils::read(&self.inner).index.contains_key(agent_id)
    }

    /// Deliver a message to a registered agent and log it
    pub fn send(
        &self,
        from: &str,
        to: &str,
        message_type: A2AMessageType,
        content: Value,
        metadata: Option<Metadata>,
    ) -> MeshResult<A2AMessage> {
        if !self.is_registered(to) {
            return Err(MeshError::unknown_agent(to));
        }

        let message = A2AMessage {
            from: from.to_string(),
            to: to.to_string(),
            message_type,
            content,
            metadata: metadata.unwrap_or_default(),
            timestamp: Utc::now(),
            message_id: Uuid::new_v4().to_string(),
        };

        utils::lock(&self.log).push(message.clone());
        info!("A2A message: {} -> {} ({})", from, to, message_type);

        Ok(message)
    }

    /// Send to every discovered agent except the sender
    pub fn broadcast(
        &self,
        from: &str,
        message_type: A2AMessageType,
        content: Value,
        capability: Option<&str>,
    ) -> Vec<A2AMessage> {
        let messages: Vec<A2AMessage> = self
            .discover(capability)
            .into_iter()
            .filter(|id| id != from)
            // a target deregistered between discover and send is skipped
            .filter_map(|id| self.send(from, &id, message_type, content.clone(), None).ok())
            .collect();

        info!("Broadcast from {} to {} agents", from, messages.len());
        messages
    }

    /// Send a `query` message carrying `{query, context}`
    pub fn query(
        &self,
        from: &str,
        to: &str,
        query: &str,
        context: Option<Value>,
    ) -> MeshResult<A2AMessage> {
        let content = json!({
            "query": query,
            "context": context.unwrap_or_else(|| json!({})),
        });
        self.send(from, to, A2AMessageType::Query, content, None)
    }

    /// Send a request to the first active agent advertising `capability`
    pub fn route_to_capability(
        &self,
        from: &str,
        capability: &str,
        content: Value,
    ) -> MeshResult<A2AMessage> {
        let target = self
            .discover(Some(capability))
            .into_iter()
            .next()
            .ok_or_else(|| MeshError::NoCapableAgent {
                capability: capability.to_string(),
            })?;
        self.send(from, &target, A2AMessageType::Request, content, None)
    }

    /// Logged messages where `agent_id` is sender or receiver, newest `limit`
    pub fn messages(
        &self,
        agent_id: Option<&str>,
        message_type: Option<A2AMessageType>,
        limit: usize,
    ) -> Vec<A2AMessage> {
        let log = utils::lock(&self.log);
        let filtered: Vec<A2AMessage> = log
            .iter()
            .filter(|m| agent_id.map_or(true, |id| m.from == id || m.to == id))
            .filter(|m| message_type.map_or(true, |ty| m.message_type == ty))
            .cloned()
            .collect();
        utils::tail(&filtered, limit)
    }

    /// Snapshot of agents and message volume
    pub fn topology(&self) -> Topology {
        let total_messages = utils::lock(&self.log).len();
        let inner = utils::read(&self.inner);
        Topology {
            total_agents: inner.agents.len(),
            active_agents: inner.agents.iter().filter(|a| a.is_active()).count(),
            total_messages,
            agents: inner
                .agents
                .iter()
                .map(|a| {
                    (
                        a.agent_id.clone(),
                        AgentNode {
                            capabilities: a.capabilities.clone(),
                            status: a.status,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Capability tags of a registered agent
    pub fn capabilities(&self, agent_id: &str) -> Option<BTreeSet<String>> {
        utils::read(&self.inner)
            .get(agent_id)
            .map(|a| a.capabilities.clone())
    }

    /// Number of registered agents
    pub fn len(&self) -> usize {
        utils::read(&self.inner).agents.len()
    }

    /// True when no agent is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> AgentDirectory {
        let dir = AgentDirectory::new();
        dir.register("crop_agent", ["crop_recommendation", "soil"], None);
        dir.register("disease_agent", ["disease_detection"], Some("local://disease"));
        dir.register("chat_agent", ["general_chat", "soil"], None);
        dir
    }

    #[test]
    fn test_discover() {
        let dir = directory();
        assert_eq!(dir.discover(None).len(), 3);
        assert_eq!(dir.discover(Some("soil")), vec!["crop_agent", "chat_agent"]);
        assert!(dir.discover(Some("nonexistent-capability")).is_empty());

        dir.set_status("crop_agent", RegistrationStatus::Inactive).unwrap();
        assert_eq!(dir.discover(Some("soil")), vec!["chat_agent"]);
        assert!(dir.set_status("ghost", RegistrationStatus::Active).is_err());
    }

    #[test]
    fn test_reregister_replaces_in_place() {
        let dir = directory();
        dir.set_status("crop_agent", RegistrationStatus::Inactive).unwrap();
        dir.register("crop_agent", ["irrigation"], None);

        let info = dir.agent_info("crop_agent").unwrap();
        assert!(info.is_active());
        assert_eq!(info.capabilities.len(), 1);
        assert!(info.capabilities.contains("irrigation"));
        assert_eq!(dir.len(), 3);
        assert_eq!(dir.discover(None)[0], "crop_agent");
    }

    #[test]
    fn test_send_unknown_target() {
        let dir = directory();
        let err = dir
            .send("x", "not-registered", A2AMessageType::Request, json!("hi"), None)
            .unwrap_err();
        assert!(matches!(err, MeshError::UnknownAgent { .. }));
        assert!(dir.messages(None, None, 100).is_empty());
    }

    #[test]
    fn test_send_and_message_ids_unique() {
        let dir = directory();
        let a = dir
            .send("chat_agent", "crop_agent", A2AMessageType::Request, json!(1), None)
            .unwrap();
        let b = dir
            .send("chat_agent", "crop_agent", A2AMessageType::Request, json!(2), None)
            .unwrap();
        assert_ne!(a.message_id, b.message_id);
        assert_eq!(dir.messages(Some("crop_agent"), None, 100).len(), 2);
    }

    #[test]
    fn test_broadcast_excludes_sender() {
        let dir = directory();
        let sent = dir.broadcast(
            "chat_agent",
            A2AMessageType::Notification,
            json!({"event": "weather_alert"}),
            None,
        );
        let targets: Vec<&str> = sent.iter().map(|m| m.to.as_str()).collect();
        assert_eq!(targets, vec!["crop_agent", "disease_agent"]);

        let filtered = dir.broadcast("chat_agent", A2AMessageType::Notification, json!({}), Some("soil"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].to, "crop_agent");
    }

    #[test]
    fn test_route_to_capability() {
        let dir = directory();
        let msg = dir
            .route_to_capability("chat_agent", "soil", json!("loamy?"))
            .unwrap();
        assert_eq!(msg.to, "crop_agent");
        assert_eq!(msg.message_type, A2AMessageType::Request);

        let err = dir
            .route_to_capability("chat_agent", "weather", json!(null))
            .unwrap_err();
        assert!(matches!(err, MeshError::NoCapableAgent { .. }));
    }

    #[test]
    fn test_query_and_message_filters() {
        let dir = directory();
        dir.query("chat_agent", "disease_agent", "is this blight?", None)
            .unwrap();
        dir.send("crop_agent", "chat_agent", A2AMessageType::Result, json!("rice"), None)
            .unwrap();

        let queries = dir.messages(None, Some(A2AMessageType::Query), 100);
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].content["query"], "is this blight?");
        assert_eq!(queries[0].content["context"], json!({}));

        assert_eq!(dir.messages(Some("chat_agent"), None, 100).len(), 2);
        assert_eq!(dir.messages(Some("chat_agent"), None, 1)[0].to, "chat_agent");
    }

    #[test]
    fn test_topology() {
        let dir = directory();
        dir.set_status("disease_agent", RegistrationStatus::Inactive).unwrap();
        dir.send("chat_agent", "crop_agent", A2AMessageType::Request, json!(1), None)
            .unwrap();

        let topo = dir.topology();
        assert_eq!(topo.total_agents, 3);
        assert_eq!(topo.active_agents, 2);
        assert_eq!(topo.total_messages, 1);
        assert_eq!(
            topo.agents["disease_agent"].status,
            RegistrationStatus::Inactive
        );

        let json = serde_json::to_value(&topo).unwrap();
        assert_eq!(json["agents"]["crop_agent"]["status"], "active");
    }

    #[test]
    fn test_serialized_message_shape() {
        let dir = directory();
        let msg = dir
            .send("chat_agent", "crop_agent", A2AMessageType::Notification, json!("x"), None)
            .unwrap();
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "notification");
        assert_eq!(value["from"], "chat_agent");
    }
}
