//! Tool System Module
//!
//! Structured tool calling with JSON schema definitions, the live tool
//! registry, and the tools that let the agent forge new ones.

mod dynamic;
mod forge_tool;

pub use dynamic::{ScriptTool, ScriptWorker};
pub use forge_tool::{ForgeTool, ReviseTool};

use crate::agent::AgentResult;
use crate::forge::CapabilityRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Output from a tool execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutput {
    /// Whether the tool execution was successful
    pub success: bool,
    /// The output data (can be string, JSON object, etc.)
    pub data: Value,
    /// Human-readable summary of the output
    pub summary: String,
    /// Optional error message if success is false
    pub error: Option<String>,
}

impl ToolOutput {
    /// Create a successful output
    pub fn success(data: impl Into<Value>, summary: impl Into<String>) -> Self {
        Self {
            success: true,
            data: data.into(),
            summary: summary.into(),
            error: None,
        }
    }

    /// Create a failed output
    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            data: Value::Null,
            summary: format!("Error: {}", error),
            error: Some(error),
        }
    }
}

/// A tool call request parsed from LLM output
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct ToolCall {
    /// Name of the tool to call
    pub name: String,
    /// Parameters for the tool
    pub parameters: Value,
}

/// Trait for tools that can be executed by agents
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the unique name of the tool
    fn name(&self) -> String;

    /// Get a description of what the tool does
    fn description(&self) -> String;

    /// Get the JSON schema for the tool's parameters
    fn parameters(&self) -> Value;

    /// Operational constraints the agent should weigh before choosing this tool
    fn work_scope(&self) -> Value {
        json!({
            "status": "unconstrained",
            "notes": "No explicit hardware or data constraints declared."
        })
    }

    /// Execute the tool with the given parameters
    async fn execute(&self, params: Value) -> AgentResult<ToolOutput>;

    /// Whether this tool requires explicit human confirmation
    fn requires_confirmation(&self) -> bool {
        false
    }
}

/// Registry of the tools live in this process
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool instance under its own name
    pub async fn register_instance<T: Tool + 'static>(&self, tool: T) {
        let mut tools = self.tools.write().await;
        tools.insert(tool.name(), Arc::new(tool));
    }

    /// Get all tool names, sorted
    pub async fn tool_names(&self) -> Vec<String> {
        let tools = self.tools.read().await;
        let mut names: Vec<String> = tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.tools.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tools.read().await.is_empty()
    }

    /// Generate a combined schema for all tools (for LLM prompt)
    pub async fn generate_tools_prompt(&self) -> String {
        let names = self.tool_names().await;
        self.generate_filtered_tools_prompt(&names).await
    }

    /// Generate a schema for specific tools
    pub async fn generate_filtered_tools_prompt(&self, allowed_names: &[String]) -> String {
        if allowed_names.is_empty() {
            return "No tools available for this task.\n".to_string();
        }

        let mut prompt = String::from("Available Tools:\n\n");

        let tools = self.tools.read().await;
        let mut names: Vec<_> = allowed_names.iter().filter(|n| tools.contains_key(*n)).collect();
        names.sort();

        for name in names {
            let tool = &tools[name.as_str()];
            prompt.push_str(&format!("- {}: {} (params: {})\n",
                name,
                tool.description(),
                serde_json::to_string(&tool.parameters()).unwrap_or_default()
            ));

            let scope = tool.work_scope();
            if scope["status"] != "unconstrained" {
                prompt.push_str(&format!("  WorkScope (Constraints): {}\n", scope));
            }
        }

        prompt
    }

    /// Get a specific tool by name
    pub async fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        tools.get(name).cloned()
    }

    /// Execute a tool call against whatever is registered right now
    pub async fn execute(&self, call: &ToolCall) -> AgentResult<ToolOutput> {
        // Release the lock before running: tools may register new tools
        let tool = {
            let tools = self.tools.read().await;
            tools.get(&call.name).cloned()
        };

        match tool {
            Some(tool) => tool.execute(call.parameters.clone()).await,
            None => Ok(ToolOutput::failure(format!("Unknown tool: {}", call.name))),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityRegistry for ToolRegistry {
    async fn exists(&self, identity: &str) -> bool {
        self.tools.read().await.contains_key(identity)
    }

    async fn register(&self, identity: &str, capability: Arc<dyn Tool>) {
        let mut tools = self.tools.write().await;
        if tools.insert(identity.to_string(), capability).is_some() {
            tracing::info!("🔁 Replaced tool '{}'", identity);
        }
    }

    async fn register_if_absent(&self, identity: &str, capability: Arc<dyn Tool>) -> bool {
        let mut tools = self.tools.write().await;
        if tools.contains_key(identity) {
            return false;
        }
        tools.insert(identity.to_string(), capability);
        true
    }
}
