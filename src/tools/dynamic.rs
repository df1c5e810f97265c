//! Script Tool Implementation
//!
//! A capability loaded from a generated artifact. Each invocation runs the
//! artifact in a fresh interpreter worker: the bootstrap below provides the
//! `forge_runtime` module, executes the artifact source, looks up the
//! registered class and awaits its `execute` with positional string inputs.
//! Request and response are single JSON documents on stdin and stdout.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::debug;

use super::{Tool, ToolOutput};
use crate::agent::{AgentError, AgentResult};
use crate::forge::CapabilityManifest;
use crate::utils::process::run_with_input;
use crate::utils::truncate::{clip_middle, last_line};

const WORKER_BOOTSTRAP: &str = r#"
import asyncio, inspect, json, sys, types

request = json.loads(sys.stdin.read())
registered = {}

class Capability:
    name = ""
    title = ""
    description = ""
    parameters = {}

def register_capability(cls, manifest):
    data = json.loads(manifest) if isinstance(manifest, str) else dict(manifest)
    registered[data.get("name") or cls.__name__] = cls
    return cls

runtime = types.ModuleType("forge_runtime")
runtime.Capability = Capability
runtime.register_capability = register_capability
sys.modules["forge_runtime"] = runtime

def emit(payload):
    sys.stdout.write("\n" + json.dumps(payload, default=str) + "\n")
    sys.stdout.flush()

try:
    namespace = {"__name__": request["unit"]}
    exec(compile(request["source"], request["unit"], "exec"), namespace)
    if request["identity"] not in registered:
        raise LookupError("artifact does not register " + repr(request["identity"]))
    result = registered[request["identity"]]().execute(*request["args"])
    if inspect.iscoroutine(result):
        result = asyncio.run(result)
    emit({"ok": True, "result": result})
except BaseException as exc:
    emit({"ok": False, "error": type(exc).__name__ + ": " + str(exc)})
"#;

/// How script workers are launched. Shared by every capability a loader creates.
#[derive(Debug, Clone)]
pub struct ScriptWorker {
    python: String,
    timeout: Duration,
    max_output_bytes: usize,
}

impl ScriptWorker {
    pub fn new(python: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python: python.into(),
            timeout,
            max_output_bytes: 16 * 1024,
        }
    }
}

impl Default for ScriptWorker {
    fn default() -> Self {
        Self::new("python3", Duration::from_secs(60))
    }
}

#[derive(Debug, Deserialize)]
struct WorkerResponse {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// A registered capability backed by one artifact snapshot
pub struct ScriptTool {
    manifest: CapabilityManifest,
    unit: String,
    // Snapshot taken at load time; a later reload does not affect this instance
    source: Arc<str>,
    worker: Arc<ScriptWorker>,
}

impl ScriptTool {
    pub fn new(
        manifest: CapabilityManifest,
        unit: impl Into<String>,
        source: Arc<str>,
        worker: Arc<ScriptWorker>,
    ) -> Self {
        Self {
            manifest,
            unit: unit.into(),
            source,
            worker,
        }
    }

    pub fn manifest(&self) -> &CapabilityManifest {
        &self.manifest
    }

    /// Namespaced unit the capability was loaded from
    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Positional string arguments in declared input order.
    ///
    /// Accepts an object keyed by input name, an array of positional
    /// values, or a bare scalar when the capability takes one input.
    /// Non-string values are passed as their JSON text.
    pub fn invocation_args(&self, params: &Value) -> AgentResult<Vec<String>> {
        let inputs = &self.manifest.inputs;
        match params {
            Value::Object(map) => inputs
                .iter()
                .map(|name| match map.get(name) {
                    None | Some(Value::Null) => Err(AgentError::Validation(format!(
                        "Missing required parameter '{}' for '{}'",
                        name, self.manifest.name
                    ))),
                    Some(value) => Ok(stringify(value)),
                })
                .collect(),
            Value::Array(items) if items.len() == inputs.len() => Ok(items.iter().map(stringify).collect()),
            Value::Null if inputs.is_empty() => Ok(Vec::new()),
            scalar if inputs.len() == 1 && !scalar.is_array() && !scalar.is_null() => Ok(vec![stringify(scalar)]),
            _ => Err(AgentError::Validation(format!(
                "'{}' expects {} input(s): {}",
                self.manifest.name,
                inputs.len(),
                inputs.join(", ")
            ))),
        }
    }

    fn request(&self, args: Vec<String>) -> Value {
        json!({
            "unit": self.unit,
            "identity": self.manifest.name,
            "source": &*self.source,
            "args": args,
        })
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Tool for ScriptTool {
    fn name(&self) -> String {
        self.manifest.name.clone()
    }

    fn description(&self) -> String {
        self.manifest.description.clone()
    }

    fn parameters(&self) -> Value {
        self.manifest.parameters.clone()
    }

    fn work_scope(&self) -> Value {
        json!({
            "status": "generated",
            "unit": self.unit,
            "notes": "Generated at runtime. Runs in a separate interpreter; inputs are passed as strings."
        })
    }

    async fn execute(&self, params: Value) -> AgentResult<ToolOutput> {
        let args = match self.invocation_args(&params) {
            Ok(args) => args,
            Err(e) => return Ok(ToolOutput::failure(e.to_string())),
        };
        let request = serde_json::to_vec(&self.request(args))?;

        debug!("Invoking '{}' from {}", self.manifest.name, self.unit);
        let output = run_with_input(
            &self.worker.python,
            &["-c", WORKER_BOOTSTRAP],
            Some(&request),
            self.worker.timeout,
        )
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut => AgentError::Execution(format!(
                "'{}' timed out after {:?}",
                self.manifest.name, self.worker.timeout
            )),
            _ => AgentError::Tool(format!("Failed to start worker for '{}': {}", self.manifest.name, e)),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let limit = self.worker.max_output_bytes;

        let response = last_line(&stdout).and_then(|line| serde_json::from_str::<WorkerResponse>(line).ok());
        let Some(response) = response else {
            let exit_code = output.status.code().unwrap_or(-1);
            return Ok(ToolOutput {
                success: false,
                data: json!({ "stdout": clip_middle(&stdout, limit), "stderr": clip_middle(&stderr, limit), "exit_code": exit_code }),
                summary: format!("Worker exited with code {} without a result.\nError: {}", exit_code, clip_middle(&stderr, limit)),
                error: Some(stderr.trim().to_string()),
            });
        };

        // Anything the artifact printed before the result line
        let printed = stdout.trim_end().rsplit_once('\n').map(|(head, _)| head.trim()).unwrap_or("");

        if response.ok {
            let summary = match &response.result {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Ok(ToolOutput::success(
                json!({ "result": response.result, "printed": clip_middle(printed, limit) }),
                clip_middle(&summary, limit).into_owned(),
            ))
        } else {
            let error = response.error.unwrap_or_else(|| "unknown worker error".to_string());
            Ok(ToolOutput {
                success: false,
                data: json!({ "printed": clip_middle(printed, limit), "stderr": clip_middle(&stderr, limit) }),
                summary: format!("Error: {}", error),
                error: Some(error),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::CapabilitySpec;

    fn tool(spec: &CapabilitySpec, source: &str) -> ScriptTool {
        ScriptTool::new(
            spec.manifest(),
            format!("generated_tools.{}", spec.identity),
            Arc::from(source),
            Arc::new(ScriptWorker::default()),
        )
    }

    fn two_inputs() -> CapabilitySpec {
        CapabilitySpec::new("repeat_text", "Repeat text n times")
            .with_input("text", "str")
            .with_input("times", "int")
    }

    #[test]
    fn test_args_follow_declared_order() {
        let t = tool(&two_inputs(), "");
        let args = t.invocation_args(&json!({"times": 3, "text": "ab"})).unwrap();
        assert_eq!(args, vec!["ab", "3"]);
    }

    #[test]
    fn test_args_positional_and_scalar() {
        let t = tool(&two_inputs(), "");
        assert_eq!(t.invocation_args(&json!(["ab", 2])).unwrap(), vec!["ab", "2"]);

        let single = tool(&CapabilitySpec::new("reverse_text", "Reverse").with_input("text", "str"), "");
        assert_eq!(single.invocation_args(&json!("abc")).unwrap(), vec!["abc"]);
        assert_eq!(single.invocation_args(&json!({"text": "abc"})).unwrap(), vec!["abc"]);
    }

    #[test]
    fn test_args_missing_parameter() {
        let t = tool(&two_inputs(), "");
        let err = t.invocation_args(&json!({"text": "ab"})).unwrap_err();
        assert!(err.to_string().contains("times"));
        assert!(t.invocation_args(&json!("ab")).is_err());
    }

    #[tokio::test]
    async fn test_missing_argument_is_tool_failure() {
        let t = tool(&two_inputs(), "");
        let out = t.execute(json!({})).await.unwrap();
        assert!(!out.success);
    }

    #[test]
    fn test_metadata_comes_from_manifest() {
        let t = tool(&two_inputs(), "x = 1");
        assert_eq!(t.name(), "repeat_text");
        assert_eq!(t.parameters()["properties"]["times"]["type"], "number");
        assert_eq!(t.work_scope()["unit"], "generated_tools.repeat_text");
        assert_eq!(t.source(), "x = 1");
    }

    #[tokio::test]
    #[ignore = "requires python3 on PATH"]
    async fn test_execute_in_worker() {
        let spec = CapabilitySpec::new("reverse_text", "Reverse").with_input("text", "str");
        let artifact = crate::forge::assemble("async def run(text):\n    print('working')\n    return text[::-1]", &spec);
        let t = tool(&spec, &artifact.source);

        let out = t.execute(json!({"text": "abc"})).await.unwrap();
        assert!(out.success, "{:?}", out);
        assert_eq!(out.summary, "cba");
        assert_eq!(out.data["printed"], "working");
    }
}
