//! Forge Tools
//!
//! Expose synthesis to the agent: `forge_tool` creates a capability from a
//! description, `revise_tool` rebuilds an existing one from feedback. Both
//! hot-load the result so it can be used in the very next step.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{Tool, ToolOutput};
use crate::agent::{AgentError, AgentResult};
use crate::forge::{CapabilitySpec, ParamSpec, SynthesisOutcome, ToolForge};

/// Accepts `"text: str, n: int"`, `["text", "n"]` or `[{"name": "n", "type": "int"}]`
fn params_from_value(value: &Value) -> AgentResult<Vec<ParamSpec>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(list) => CapabilitySpec::parse_params(list).map_err(|e| AgentError::Validation(e.to_string())),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(name) => Ok(ParamSpec::new(name.clone(), "str")),
                Value::Object(_) => serde_json::from_value::<ParamSpec>(item.clone()).map_err(AgentError::from),
                other => Err(AgentError::Validation(format!("Invalid parameter declaration: {}", other))),
            })
            .collect(),
        other => Err(AgentError::Validation(format!("Invalid parameter list: {}", other))),
    }
}

fn outcome_output(outcome: SynthesisOutcome) -> AgentResult<ToolOutput> {
    let data = serde_json::to_value(&outcome)?;
    Ok(match outcome {
        SynthesisOutcome::Registered { message, .. } => ToolOutput::success(data, message),
        SynthesisOutcome::Failed { message, .. } => ToolOutput {
            success: false,
            data,
            summary: format!("Error: {}", message),
            error: Some(message),
        },
    })
}

/// Tool for forging new tools
pub struct ForgeTool {
    forge: Arc<ToolForge>,
}

impl ForgeTool {
    pub fn new(forge: Arc<ToolForge>) -> Self {
        Self { forge }
    }

    fn spec_from_params(params: &Value) -> AgentResult<CapabilitySpec> {
        let name = params["name"].as_str().ok_or_else(|| AgentError::Validation("Missing name".to_string()))?;
        let description = params["description"]
            .as_str()
            .ok_or_else(|| AgentError::Validation("Missing description".to_string()))?;

        let mut spec = CapabilitySpec::new(name, description);
        if let Some(title) = params["title"].as_str() {
            spec = spec.with_display_name(title);
        }
        spec.inputs = params_from_value(&params["inputs"])?;
        spec.outputs = params_from_value(&params["outputs"])?;
        Ok(spec)
    }
}

#[async_trait]
impl Tool for ForgeTool {
    fn name(&self) -> String {
        "forge_tool".to_string()
    }

    fn description(&self) -> String {
        "Generate a new tool from a description. The tool's code is written for you, checked, saved, \
         and CAN BE USED IMMEDIATELY in the next step. Use this when you need functionality that no \
         existing tool provides (e.g. specialized parsing, data transformation or API access)."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Unique name for the tool (snake_case)" },
                "title": { "type": "string", "description": "Human-readable name" },
                "description": { "type": "string", "description": "What the tool does" },
                "inputs": { "type": "string", "description": "Inputs, e.g. \"text: str, count: int\"" },
                "outputs": { "type": "string", "description": "Outputs, e.g. \"result: str\"" }
            },
            "required": ["name", "description", "inputs"]
        })
    }

    fn work_scope(&self) -> Value {
        json!({
            "status": "highly_agential",
            "capability": "metaprogramming (self-expansion)",
            "safety": "generated code runs in a separate interpreter without further review",
            "persistence": "generated tools are saved to disk and reloaded on start"
        })
    }

    async fn execute(&self, params: Value) -> AgentResult<ToolOutput> {
        let spec = Self::spec_from_params(&params)?;
        outcome_output(self.forge.synthesize(&spec).await)
    }

    fn requires_confirmation(&self) -> bool {
        true
    }
}

/// Tool for rebuilding a generated tool from feedback
pub struct ReviseTool {
    forge: Arc<ToolForge>,
}

impl ReviseTool {
    pub fn new(forge: Arc<ToolForge>) -> Self {
        Self { forge }
    }
}

#[async_trait]
impl Tool for ReviseTool {
    fn name(&self) -> String {
        "revise_tool".to_string()
    }

    fn description(&self) -> String {
        "Rebuild a previously generated tool. Describe what is wrong or what should change; the new \
         version replaces the old one under the same name."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Name of the generated tool to revise" },
                "feedback": { "type": "string", "description": "What must change" }
            },
            "required": ["name", "feedback"]
        })
    }

    fn work_scope(&self) -> Value {
        json!({
            "status": "highly_agential",
            "capability": "metaprogramming (self-repair)",
            "persistence": "overwrites the saved tool"
        })
    }

    async fn execute(&self, params: Value) -> AgentResult<ToolOutput> {
        let name = params["name"].as_str().ok_or_else(|| AgentError::Validation("Missing name".to_string()))?;
        let feedback = params["feedback"]
            .as_str()
            .ok_or_else(|| AgentError::Validation("Missing feedback".to_string()))?;
        outcome_output(self.forge.revise_existing(name, feedback).await)
    }

    fn requires_confirmation(&self) -> bool {
        true
    }
}
