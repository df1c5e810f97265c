//! Artifact Assembler
//!
//! Turns a candidate fragment into a self-contained artifact: hoisted
//! imports, the logic body verbatim, a uniform wrapper class whose
//! `execute` forwards to the body's `run`, and a closing registration call
//! carrying the capability manifest.

use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

use super::spec::{CapabilityManifest, CapabilitySpec};

/// Import every artifact header starts with; the worker bootstrap provides it
pub const BASE_IMPORT: &str = "from forge_runtime import Capability, register_capability";

/// Name of the registration function the loader scans for
pub const REGISTRATION_FN: &str = "register_capability";

fn import_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(import\s+\S.*|from\s+\S+\s+import\s+\S.*)$").expect("static regex"))
}

fn run_entry() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(async\s+)?def\s+run\s*\(").expect("static regex"))
}

/// A fully assembled artifact, ready for validation and persistence
#[derive(Debug, Clone)]
pub struct AssembledArtifact {
    pub identity: String,
    pub class_name: String,
    /// Deduplicated dependency declarations, first-seen order
    pub imports: Vec<String>,
    pub manifest: CapabilityManifest,
    pub source: String,
}

/// Split top-level import statements from logic. Parenthesized multi-line
/// imports are kept together. Duplicates (by whitespace-normalized text) are
/// dropped, first occurrence wins.
pub fn split_imports(fragment: &str) -> (Vec<String>, String) {
    let mut imports: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut body: Vec<&str> = Vec::new();
    let mut lines = fragment.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim_end();
        if !import_line().is_match(trimmed) {
            body.push(line);
            continue;
        }

        let mut statement = trimmed.to_string();
        if statement.contains('(') && !statement.contains(')') {
            for cont in lines.by_ref() {
                statement.push('\n');
                statement.push_str(cont.trim_end());
                if cont.contains(')') {
                    break;
                }
            }
        }

        let key = statement.split_whitespace().collect::<Vec<_>>().join(" ");
        if key == BASE_IMPORT || seen.contains(&key) {
            continue;
        }
        seen.insert(key);
        imports.push(statement);
    }

    (imports, body.join("\n").trim().to_string())
}

/// Remove what `assemble` adds: provenance header, base import, and
/// everything from the wrapper class onward. Leaves the logic the model wrote.
pub fn strip_wrapper(source: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for line in source.lines() {
        let trimmed = line.trim_end();
        if trimmed.starts_with("class ") && trimmed.ends_with("(Capability):") {
            break;
        }
        if trimmed.starts_with(&format!("{}(", REGISTRATION_FN)) {
            continue;
        }
        if trimmed == BASE_IMPORT
            || trimmed.starts_with("# Capability: ")
            || trimmed.starts_with("# Generated: ")
        {
            continue;
        }
        kept.push(line);
    }
    kept.join("\n").trim().to_string()
}

/// Assemble the artifact for `spec` around `fragment`
pub fn assemble(fragment: &str, spec: &CapabilitySpec) -> AssembledArtifact {
    let (imports, body) = split_imports(&strip_wrapper(fragment));
    if !run_entry().is_match(&body) {
        warn!("Fragment for '{}' does not define a top-level run(); the capability will fail when invoked", spec.identity);
    }

    let manifest = spec.manifest();
    let class_name = spec.class_name();

    // `from __future__` must stay ahead of every other statement
    let (future, regular): (Vec<&String>, Vec<&String>) =
        imports.iter().partition(|i| i.starts_with("from __future__"));

    let mut out = String::new();
    out.push_str(&format!("# Capability: {}\n", spec.identity));
    out.push_str(&format!("# Generated: {}\n", Utc::now().to_rfc3339()));
    for line in &future {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(BASE_IMPORT);
    out.push('\n');
    for line in &regular {
        out.push_str(line);
        out.push('\n');
    }

    if !body.is_empty() {
        out.push('\n');
        out.push_str(&body);
        out.push('\n');
    }

    out.push_str("\n\n");
    out.push_str(&render_wrapper(&class_name, spec, &manifest));
    AssembledArtifact {
        identity: spec.identity.clone(),
        class_name,
        imports,
        manifest,
        source: out,
    }
}

fn render_wrapper(class_name: &str, spec: &CapabilitySpec, manifest: &CapabilityManifest) -> String {
    let args: Vec<&str> = spec.inputs.iter().map(|p| p.name.as_str()).collect();
    let params = args.iter().fold(String::from("self"), |acc, a| format!("{}, {}", acc, a));
    let manifest_json = serde_json::to_string(manifest).unwrap_or_else(|_| "{}".to_string());

    format!(
        "class {class}(Capability):\n\
         \x20   name = {name}\n\
         \x20   title = {title}\n\
         \x20   description = {description}\n\
         \x20   parameters = {parameters}\n\
         \n\
         \x20   async def execute({params}):\n\
         \x20       return await run({args})\n\
         \n\n\
         {register}({class}, {manifest})\n",
        class = class_name,
        name = py_str(&manifest.name),
        title = py_str(&manifest.title),
        description = py_str(&manifest.description),
        parameters = py_literal(&manifest.parameters),
        params = params,
        args = args.join(", "),
        register = REGISTRATION_FN,
        manifest = py_str(&manifest_json),
    )
}

/// A JSON string literal is also a valid Python string literal
fn py_str(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Render a JSON value with Python literal syntax
fn py_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => py_str(s),
        Value::Array(items) => format!("[{}]", items.iter().map(py_literal).collect::<Vec<_>>().join(", ")),
        Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{}: {}", py_str(k), py_literal(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::validate::GrammarChecker;
    use serde_json::json;

    fn reverse_spec() -> CapabilitySpec {
        CapabilitySpec::new("reverse_text", "Reverse the characters of a string")
            .with_input("text", "str")
            .with_output("result", "str")
    }

    #[test]
    fn test_split_imports_dedup_preserves_order() {
        let fragment = "import json\nfrom collections import Counter\nimport  json\n\ndef run(x):\n    import os\n    return x\nimport re";
        let (imports, body) = split_imports(fragment);
        assert_eq!(imports, vec!["import json", "from collections import Counter", "import re"]);
        assert!(body.contains("    import os"));
        assert!(body.starts_with("def run(x):"));
    }

    #[test]
    fn test_split_imports_multiline() {
        let fragment = "from typing import (\n    List,\n    Dict,\n)\nx = 1";
        let (imports, body) = split_imports(fragment);
        assert_eq!(imports.len(), 1);
        assert!(imports[0].contains("Dict,"));
        assert_eq!(body, "x = 1");
    }

    #[test]
    fn test_base_import_not_duplicated() {
        let (imports, _) = split_imports(&format!("{}\nimport json", BASE_IMPORT));
        assert_eq!(imports, vec!["import json"]);
    }

    #[test]
    fn test_wrapper_forwards_inputs_positionally() {
        let spec = CapabilitySpec::new("join_words", "Join words with a separator")
            .with_input("words", "list")
            .with_input("sep", "str");
        let artifact = assemble("async def run(words, sep):\n    return sep.join(words.split())", &spec);
        assert!(artifact.source.contains("class JoinWordsTool(Capability):"));
        assert!(artifact.source.contains("    async def execute(self, words, sep):\n        return await run(words, sep)"));
        assert!(artifact.source.contains("register_capability(JoinWordsTool, \""));
    }

    #[test]
    fn test_header_layout() {
        let fragment = "import json\nfrom __future__ import annotations\n\nasync def run(text):\n    return json.dumps(text)";
        let artifact = assemble(fragment, &reverse_spec());
        let lines: Vec<&str> = artifact.source.lines().collect();
        assert!(lines[0].starts_with("# Capability: reverse_text"));
        assert_eq!(lines[2], "from __future__ import annotations");
        assert_eq!(lines[3], BASE_IMPORT);
        assert_eq!(lines[4], "import json");
    }

    #[test]
    fn test_assembled_artifact_parses() {
        let artifact = assemble("async def run(text):\n    return text[::-1]", &reverse_spec());
        assert_eq!(GrammarChecker::new().analyze(&artifact.source), Ok(()));
    }

    #[test]
    fn test_description_with_quotes_stays_valid() {
        let spec = CapabilitySpec::new("quote_it", "Wraps text in \"quotes\" and\nnewlines \\ backslashes")
            .with_input("text", "str");
        let artifact = assemble("async def run(text):\n    return f'\"{text}\"'", &spec);
        assert_eq!(GrammarChecker::new().analyze(&artifact.source), Ok(()));
    }

    #[test]
    fn test_schema_in_wrapper_uses_mapped_kinds() {
        let spec = CapabilitySpec::new("typed", "All the kinds")
            .with_input("a", "int")
            .with_input("b", "float")
            .with_input("c", "bool")
            .with_input("d", "list")
            .with_input("e", "str")
            .with_input("f", "Whatever");
        let artifact = assemble("async def run(a, b, c, d, e, f):\n    return a", &spec);
        let props = &artifact.manifest.parameters["properties"];
        let kinds: Vec<&str> = ["a", "b", "c", "d", "e", "f"]
            .iter()
            .map(|k| props[*k]["type"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, vec!["number", "number", "boolean", "array", "string", "string"]);
    }

    #[test]
    fn test_reassembly_does_not_stack_wrappers() {
        let spec = reverse_spec();
        let first = assemble("import json\n\nasync def run(text):\n    return text[::-1]", &spec);
        let second = assemble(&first.source, &spec);

        assert_eq!(second.source.matches("class ReverseTextTool(Capability):").count(), 1);
        assert_eq!(second.source.matches("register_capability(ReverseTextTool").count(), 1);
        assert_eq!(second.source.matches(BASE_IMPORT).count(), 1);
        assert_eq!(second.imports, vec!["import json"]);
    }

    #[test]
    fn test_strip_wrapper_keeps_logic() {
        let artifact = assemble("def helper(t):\n    return t\n\nasync def run(text):\n    return helper(text)", &reverse_spec());
        let logic = strip_wrapper(&artifact.source);
        assert!(logic.starts_with("def helper(t):"));
        assert!(logic.ends_with("return helper(text)"));
        assert!(!logic.contains("Capability"));
    }

    #[test]
    fn test_py_literal() {
        let v = json!({"a": [true, false, null, 1.5], "b": "x\"y"});
        assert_eq!(py_literal(&v), r#"{"a": [True, False, None, 1.5], "b": "x\"y"}"#);
    }
}
