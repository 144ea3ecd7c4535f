//! Tool lookup and execution history

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::traits::Tool;
use crate::utils;

/// Tool execution record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolExecutionRecord {
    /// Unique ID for this call
    pub call_id: String,
    /// Name of the tool that was executed
    pub tool_name: String,
    /// Truncated output or error text
    pub content: String,
    /// Whether tool execution succeeded
    pub success: bool,
    /// When the execution finished
    pub timestamp: DateTime<Utc>,
}

/// Name-indexed tools plus their execution history
#[derive(Default)]
pub struct ToolBox {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
    history: Mutex<Vec<ToolExecutionRecord>>,
}

impl std::fmt::Debug for ToolBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBox")
            .field("tools", &self.names())
            .field("invocations", &self.invocation_count())
            .finish()
    }
}

impl ToolBox {
    /// Create an empty toolbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool; a tool with the same name is replaced
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&idx) => self.tools[idx] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&idx| self.tools[idx].clone())
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// True when no tool is registered
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Record a tool invocation
    pub fn record(&self, tool_name: &str, content: String, success: bool) {
        utils::lock(&self.history).push(ToolExecutionRecord {
            call_id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool_name.to_string(),
            content,
            success,
            timestamp: Utc::now(),
        });
    }

    /// Get total number of tool invocations
    pub fn invocation_count(&self) -> usize {
        utils::lock(&self.history).len()
    }

    /// Every recorded execution, oldest first
    pub fn execution_history(&self) -> Vec<ToolExecutionRecord> {
        utils::lock(&self.history).clone()
    }

    /// Executions that succeeded
    pub fn successful_executions(&self) -> Vec<ToolExecutionRecord> {
        utils::lock(&self.history)
            .iter()
            .filter(|r| r.success)
            .cloned()
            .collect()
    }

    /// Executions that failed
    pub fn failed_executions(&self) -> Vec<ToolExecutionRecord> {
        utils::lock(&self.history)
            .iter()
            .filter(|r| !r.success)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{Map, Value};

    struct NamedTool(&'static str, &'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            self.1
        }
        async fn execute(&self, _params: Map<String, Value>) -> Result<Value> {
            Ok(Value::String(self.1.to_string()))
        }
    }

    #[test]
    fn test_register_and_replace() {
        let mut tools = ToolBox::new();
        tools.register(Arc::new(NamedTool("search", "v1")));
        tools.register(Arc::new(NamedTool("calculator", "calc")));
        tools.register(Arc::new(NamedTool("search", "v2")));

        assert_eq!(tools.len(), 2);
        assert_eq!(tools.names(), vec!["search", "calculator"]);
        assert_eq!(tools.get("search").unwrap().description(), "v2");
        assert!(tools.get("missing").is_none());
    }

    #[test]
    fn test_execution_history() {
        let tools = ToolBox::new();
        assert_eq!(tools.invocation_count(), 0);

        tools.record("search", "ok".to_string(), true);
        tools.record("search", "boom".to_string(), false);

        assert_eq!(tools.invocation_count(), 2);
        assert_eq!(tools.successful_executions().len(), 1);
        assert_eq!(tools.failed_executions()[0].content, "boom");
        let history = tools.execution_history();
        assert_ne!(history[0].call_id, history[1].call_id);
    }
}
