//! Capability specifications and the manifest embedded in every artifact.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::ForgeError;

/// Schema kind a declared parameter type maps onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    Array,
}

impl ParamKind {
    /// Map a declared (Python-flavoured) type onto a schema kind.
    /// Anything unrecognized is treated as text.
    pub fn from_declared(declared: &str) -> Self {
        let normalized = declared.trim().to_ascii_lowercase();
        // `List[str]`, `list[int]`, `typing.List` all collapse to their head
        let head = normalized
            .split('[')
            .next()
            .unwrap_or_default()
            .trim()
            .trim_start_matches("typing.");

        match head {
            "int" | "integer" | "float" | "double" | "number" | "decimal" => ParamKind::Number,
            "bool" | "boolean" => ParamKind::Boolean,
            "list" | "array" | "tuple" | "sequence" | "set" => ParamKind::Array,
            _ => ParamKind::String,
        }
    }

    pub fn as_schema_type(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Array => "array",
        }
    }
}

/// A named, typed parameter as declared by the requester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type", default = "default_declared_type")]
    pub declared_type: String,
}

fn default_declared_type() -> String {
    "str".to_string()
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self { name: name.into(), declared_type: declared_type.into() }
    }

    pub fn kind(&self) -> ParamKind {
        ParamKind::from_declared(&self.declared_type)
    }
}

/// What the caller asks the forge to build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub identity: String,
    #[serde(default)]
    pub display_name: String,
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<ParamSpec>,
    #[serde(default)]
    pub outputs: Vec<ParamSpec>,
}

impl CapabilitySpec {
    pub fn new(identity: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            display_name: String::new(),
            description: description.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        self.inputs.push(ParamSpec::new(name, declared_type));
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        self.outputs.push(ParamSpec::new(name, declared_type));
        self
    }

    /// Parse a compact `"text: str, count: int"` parameter list.
    /// A bare name defaults to `str`.
    pub fn parse_params(list: &str) -> Result<Vec<ParamSpec>, ForgeError> {
        let mut params = Vec::new();
        for raw in list.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (name, declared) = match raw.split_once(':') {
                Some((name, declared)) => (name.trim(), declared.trim()),
                None => (raw, "str"),
            };
            if name.is_empty() {
                return Err(ForgeError::InvalidSpec(format!("parameter without a name in '{}'", raw)));
            }
            params.push(ParamSpec::new(name, if declared.is_empty() { "str" } else { declared }));
        }
        Ok(params)
    }

    /// Check the invariants the assembler relies on
    pub fn validate(&self) -> Result<(), ForgeError> {
        if !is_identifier(&self.identity) || self.identity.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(ForgeError::InvalidSpec(format!(
                "identity '{}' must be a snake_case identifier",
                self.identity
            )));
        }
        if self.description.trim().is_empty() {
            return Err(ForgeError::InvalidSpec("description must not be empty".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for param in self.inputs.iter().chain(self.outputs.iter()) {
            if !is_identifier(&param.name) || PY_KEYWORDS.contains(&param.name.as_str()) {
                return Err(ForgeError::InvalidSpec(format!(
                    "parameter name '{}' is not a valid identifier",
                    param.name
                )));
            }
        }
        for param in &self.inputs {
            if param.name == "self" || !seen.insert(param.name.as_str()) {
                return Err(ForgeError::InvalidSpec(format!("duplicate or reserved input '{}'", param.name)));
            }
        }
        Ok(())
    }

    /// Human-facing title; falls back to the PascalCase identity
    pub fn title(&self) -> String {
        if self.display_name.trim().is_empty() {
            pascal_case(&self.identity)
        } else {
            self.display_name.trim().to_string()
        }
    }

    /// Name of the wrapper class emitted into the artifact
    pub fn class_name(&self) -> String {
        format!("{}Tool", pascal_case(&self.identity))
    }

    /// Input schema in JSON-schema form
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.inputs {
            properties.insert(
                param.name.clone(),
                json!({
                    "type": param.kind().as_schema_type(),
                    "description": format!("{} ({})", param.name, param.declared_type),
                }),
            );
        }
        let required: Vec<&str> = self.inputs.iter().map(|p| p.name.as_str()).collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn manifest(&self) -> CapabilityManifest {
        CapabilityManifest {
            name: self.identity.clone(),
            title: self.title(),
            description: self.description.trim().to_string(),
            parameters: self.input_schema(),
            inputs: self.inputs.iter().map(|p| p.name.clone()).collect(),
            outputs: self.outputs.iter().map(|p| p.name.clone()).collect(),
        }
    }

    /// One-line rendering used in prompts, e.g. `text: str, count: int`
    pub fn render_params(params: &[ParamSpec]) -> String {
        if params.is_empty() {
            return "(none)".to_string();
        }
        params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.declared_type))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Descriptor carried by an artifact's registration call.
///
/// The loader reads these instead of reflecting over the loaded unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityManifest {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
    /// Positional order of the wrapper's inputs
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl CapabilityManifest {
    /// Rebuild a spec from a loaded manifest. Declared input types are
    /// recovered from their schema kinds; outputs come back as `str`.
    pub fn to_spec(&self) -> CapabilitySpec {
        let mut spec = CapabilitySpec::new(self.name.clone(), self.description.clone())
            .with_display_name(self.title.clone());
        for input in &self.inputs {
            let declared = match self.parameters["properties"][input.as_str()]["type"].as_str() {
                Some("number") => "float",
                Some("boolean") => "bool",
                Some("array") => "list",
                _ => "str",
            };
            spec = spec.with_input(input.clone(), declared);
        }
        for output in &self.outputs {
            spec = spec.with_output(output.clone(), "str");
        }
        spec
    }
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

const PY_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise",
    "return", "try", "while", "with", "yield",
];

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn pascal_case(identity: &str) -> String {
    identity
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_round_trips_to_spec() {
        let spec = CapabilitySpec::new("scale", "Scale numbers")
            .with_input("values", "List[float]")
            .with_input("factor", "int")
            .with_output("scaled", "list");
        let back = spec.manifest().to_spec();
        assert_eq!(back.identity, "scale");
        assert_eq!(back.title(), "Scale");
        let kinds: Vec<ParamKind> = back.inputs.iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, vec![ParamKind::Array, ParamKind::Number]);
        assert_eq!(back.outputs[0].name, "scaled");
    }

    #[test]
    fn test_schema_kind_mapping() {
        let kinds: Vec<&str> = ["int", "float", "bool", "list", "str"]
            .iter()
            .map(|t| ParamKind::from_declared(t).as_schema_type())
            .collect();
        assert_eq!(kinds, vec!["number", "number", "boolean", "array", "string"]);
    }

    #[test]
    fn test_unrecognized_type_defaults_to_string() {
        assert_eq!(ParamKind::from_declared("dict"), ParamKind::String);
        assert_eq!(ParamKind::from_declared("Path"), ParamKind::String);
        assert_eq!(ParamKind::from_declared(""), ParamKind::String);
    }

    #[test]
    fn test_generic_and_alias_types() {
        assert_eq!(ParamKind::from_declared("List[str]"), ParamKind::Array);
        assert_eq!(ParamKind::from_declared("typing.List[int]"), ParamKind::Array);
        assert_eq!(ParamKind::from_declared("Integer"), ParamKind::Number);
    }

    #[test]
    fn test_parse_params() {
        let params = CapabilitySpec::parse_params("text: str, count: int, flag").unwrap();
        assert_eq!(params.len(), 3);
        assert_eq!(params[1], ParamSpec::new("count", "int"));
        assert_eq!(params[2], ParamSpec::new("flag", "str"));
        assert!(CapabilitySpec::parse_params(": int").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_identity() {
        assert!(CapabilitySpec::new("Reverse Text", "x").validate().is_err());
        assert!(CapabilitySpec::new("ReverseText", "x").validate().is_err());
        assert!(CapabilitySpec::new("reverse_text", "x").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_inputs() {
        let spec = CapabilitySpec::new("pair", "pairs things")
            .with_input("a", "str")
            .with_input("a", "int");
        assert!(matches!(spec.validate(), Err(ForgeError::InvalidSpec(_))));

        let spec = CapabilitySpec::new("kw", "keyword param").with_input("class", "str");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_manifest_keeps_input_order() {
        let spec = CapabilitySpec::new("join_words", "Join words")
            .with_input("words", "list")
            .with_input("sep", "str");
        let manifest = spec.manifest();
        assert_eq!(manifest.inputs, vec!["words", "sep"]);
        assert_eq!(manifest.parameters["properties"]["words"]["type"], "array");
        assert_eq!(manifest.parameters["required"], json!(["words", "sep"]));
        assert_eq!(manifest.title, "JoinWords");
        assert_eq!(spec.class_name(), "JoinWordsTool");
    }
}
