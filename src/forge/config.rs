//! Forge configuration
//!
//! Defaults, then an optional JSON file, then `FORGE_*` environment
//! variables. The binary loads `.env` before any of this runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::warn;

use super::synthesizer::DEFAULT_MAX_STEPS;
use super::validate::{GrammarChecker, InterpreterChecker, StructuralChecker, SyntaxChecker};
use crate::agent::{LLMProvider, OllamaProvider, OpenAICompatibleProvider};
use crate::tools::ScriptWorker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckerKind {
    /// Built-in Python grammar parse; needs no interpreter
    #[default]
    Grammar,
    /// Brackets, strings and indentation only
    Structural,
    /// `ast.parse` in the configured interpreter
    Interpreter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub artifact_dir: PathBuf,
    pub model: String,
    /// OpenAI-compatible endpoint; Ollama on its default address when unset
    pub provider_url: Option<String>,
    pub api_key: Option<String>,
    pub max_steps: usize,
    pub python: String,
    pub worker_timeout_secs: u64,
    pub install_dependencies: bool,
    pub checker: CheckerKind,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("generated-tools"),
            model: "qwen2.5-coder:7b".to_string(),
            provider_url: None,
            api_key: None,
            max_steps: DEFAULT_MAX_STEPS,
            python: "python3".to_string(),
            worker_timeout_secs: 60,
            install_dependencies: true,
            checker: CheckerKind::Grammar,
        }
    }
}

impl ForgeConfig {
    /// Read a JSON config file. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse forge config at {:?}", path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read forge config at {:?}", path)),
        }
    }

    /// Apply `FORGE_*` overrides from the process environment
    pub fn apply_env(self) -> Self {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("FORGE_ARTIFACT_DIR") {
            self.artifact_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FORGE_MODEL") {
            self.model = v;
        }
        if let Some(v) = lookup("FORGE_PROVIDER_URL") {
            self.provider_url = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("FORGE_API_KEY") {
            self.api_key = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("FORGE_PYTHON") {
            self.python = v;
        }
        if let Some(v) = lookup("FORGE_MAX_STEPS") {
            match v.parse() {
                Ok(n) => self.max_steps = n,
                Err(_) => warn!("Ignoring FORGE_MAX_STEPS={:?}: not a number", v),
            }
        }
        if let Some(v) = lookup("FORGE_WORKER_TIMEOUT_SECS") {
            match v.parse() {
                Ok(n) => self.worker_timeout_secs = n,
                Err(_) => warn!("Ignoring FORGE_WORKER_TIMEOUT_SECS={:?}: not a number", v),
            }
        }
        if let Some(v) = lookup("FORGE_INSTALL_DEPENDENCIES") {
            match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.install_dependencies = true,
                "0" | "false" | "no" | "off" => self.install_dependencies = false,
                _ => warn!("Ignoring FORGE_INSTALL_DEPENDENCIES={:?}", v),
            }
        }
        if let Some(v) = lookup("FORGE_CHECKER") {
            match v.to_ascii_lowercase().as_str() {
                "grammar" => self.checker = CheckerKind::Grammar,
                "structural" => self.checker = CheckerKind::Structural,
                "interpreter" => self.checker = CheckerKind::Interpreter,
                _ => warn!("Ignoring FORGE_CHECKER={:?}", v),
            }
        }
        self
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }

    pub fn build_checker(&self) -> Arc<dyn SyntaxChecker> {
        match self.checker {
            CheckerKind::Grammar => Arc::new(GrammarChecker::new()),
            CheckerKind::Structural => Arc::new(StructuralChecker::new()),
            CheckerKind::Interpreter => {
                Arc::new(InterpreterChecker::new(self.python.clone()).with_timeout(self.worker_timeout()))
            }
        }
    }

    pub fn build_worker(&self) -> ScriptWorker {
        ScriptWorker::new(self.python.clone(), self.worker_timeout())
    }

    pub fn build_provider(&self) -> Arc<dyn LLMProvider> {
        match &self.provider_url {
            Some(url) => Arc::new(OpenAICompatibleProvider::new(url.clone(), self.api_key.clone())),
            None => Arc::new(OllamaProvider::new(ollama_rs::Ollama::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = ForgeConfig::default();
        assert_eq!(config.artifact_dir, PathBuf::from("generated-tools"));
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.checker, CheckerKind::Grammar);
        assert!(config.install_dependencies);
    }

    #[tokio::test]
    async fn test_load_partial_file_and_missing_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("forge.json");
        std::fs::write(&path, r#"{"model": "llama3", "checker": "interpreter"}"#).unwrap();

        let config = ForgeConfig::load(&path).await.unwrap();
        assert_eq!(config.model, "llama3");
        assert_eq!(config.checker, CheckerKind::Interpreter);
        assert_eq!(config.python, "python3");

        let missing = ForgeConfig::load(&temp_dir.path().join("nope.json")).await.unwrap();
        assert_eq!(missing, ForgeConfig::default());
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("forge.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(ForgeConfig::load(&path).await.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FORGE_ARTIFACT_DIR", "/tmp/tools"),
            ("FORGE_MAX_STEPS", "3"),
            ("FORGE_WORKER_TIMEOUT_SECS", "soon"),
            ("FORGE_INSTALL_DEPENDENCIES", "off"),
            ("FORGE_PROVIDER_URL", "http://localhost:8080/v1"),
            ("FORGE_CHECKER", "Structural"),
        ]
        .into_iter()
        .collect();

        let config = ForgeConfig::default().apply_vars(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.artifact_dir, PathBuf::from("/tmp/tools"));
        assert_eq!(config.max_steps, 3);
        assert_eq!(config.worker_timeout_secs, 60);
        assert!(!config.install_dependencies);
        assert_eq!(config.provider_url.as_deref(), Some("http://localhost:8080/v1"));
        assert_eq!(config.checker, CheckerKind::Structural);
    }

    #[tokio::test]
    async fn test_default_checker_rejects_grammar_errors() {
        let checker = ForgeConfig::default().build_checker();
        assert!(checker.check("async def run(text):\n    return text\n").await.is_ok());
        let res = checker.check("def run(text):\n    if text = '':\n        return text\n").await;
        assert!(matches!(res, Err(crate::forge::ForgeError::StructuralValidationFailed(_))));
    }
}
