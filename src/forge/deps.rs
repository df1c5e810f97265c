//! Dependency Resolver
//!
//! Finds the third-party packages an accepted artifact needs and installs
//! them. Installation is best-effort: failures are logged and never fail the
//! synthesis that produced the artifact.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tokio::time::Duration;
use tracing::{info, warn};

use super::ForgeError;
use crate::utils::process::run_with_input;

/// Modules that ship with the interpreter and never need installing
const STDLIB_MODULES: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "base64", "binascii", "bisect",
    "calendar", "cmath", "collections", "concurrent", "contextlib", "copy", "csv", "dataclasses",
    "datetime", "decimal", "difflib", "email", "enum", "errno", "fnmatch", "fractions",
    "functools", "gc", "glob", "gzip", "hashlib", "heapq", "hmac", "html", "http", "inspect",
    "io", "ipaddress", "itertools", "json", "locale", "logging", "math", "mimetypes",
    "numbers", "operator", "os", "pathlib", "pickle", "platform", "pprint", "queue", "random",
    "re", "secrets", "shlex", "shutil", "signal", "socket", "sqlite3", "ssl", "statistics",
    "string", "struct", "subprocess", "sys", "tempfile", "textwrap", "threading", "time",
    "timeit", "traceback", "types", "typing", "unicodedata", "urllib", "uuid", "warnings",
    "weakref", "xml", "zipfile", "zlib", "zoneinfo",
];

/// Provided by the worker bootstrap, not by a package index
const RUNTIME_MODULE: &str = "forge_runtime";

fn install_comment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*#\s*install\s+modules\s*:\s*(.+)$").expect("static regex"))
}

/// Top-level package names implied by import statements
pub fn packages_from_imports(imports: &[String]) -> Vec<String> {
    let mut names = Vec::new();
    for statement in imports {
        let flat = statement.split_whitespace().collect::<Vec<_>>().join(" ");
        if let Some(rest) = flat.strip_prefix("from ") {
            let module = rest.split_whitespace().next().unwrap_or_default();
            // Relative imports name local modules
            if !module.starts_with('.') {
                names.push(root_module(module));
            }
        } else if let Some(rest) = flat.strip_prefix("import ") {
            for part in rest.split(',') {
                let module = part.split_whitespace().next().unwrap_or_default();
                if !module.is_empty() {
                    names.push(root_module(module));
                }
            }
        }
    }
    names
        .into_iter()
        .filter(|n| !n.is_empty() && n != RUNTIME_MODULE && !STDLIB_MODULES.contains(&n.as_str()))
        .collect()
}

/// Packages named in `# install modules: a b c` comments
pub fn packages_from_comment(source: &str) -> Vec<String> {
    install_comment()
        .captures_iter(source)
        .filter_map(|caps| caps.get(1))
        .flat_map(|m| m.as_str().split_whitespace().map(|s| s.trim_matches(',').to_string()).collect::<Vec<_>>())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Both strategies combined: header-derived first, then the comment
/// convention; duplicates removed, order preserved.
pub fn detect_packages(imports: &[String], source: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in packages_from_imports(imports).into_iter().chain(packages_from_comment(source)) {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

fn root_module(module: &str) -> String {
    module.split('.').next().unwrap_or_default().to_string()
}

#[async_trait]
pub trait PackageInstaller: Send + Sync {
    async fn install(&self, package: &str) -> Result<(), ForgeError>;
}

/// Installs packages with `python -m pip install`
pub struct PipInstaller {
    python: String,
    timeout: Duration,
}

impl PipInstaller {
    pub fn new(python: impl Into<String>) -> Self {
        Self { python: python.into(), timeout: Duration::from_secs(300) }
    }
}

#[async_trait]
impl PackageInstaller for PipInstaller {
    async fn install(&self, package: &str) -> Result<(), ForgeError> {
        let failed = |reason: String| ForgeError::DependencyInstallFailed {
            package: package.to_string(),
            reason,
        };

        let output = run_with_input(&self.python, &["-m", "pip", "install", "--quiet", package], None, self.timeout)
            .await
            .map_err(|e| failed(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(failed(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }
}

/// Outcome of one resolution pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub failed: Vec<String>,
}

pub struct DependencyResolver {
    installer: Arc<dyn PackageInstaller>,
}

impl DependencyResolver {
    pub fn new(installer: Arc<dyn PackageInstaller>) -> Self {
        Self { installer }
    }

    /// Install every detected package. Never fails; problems are logged and
    /// reported.
    pub async fn resolve(&self, identity: &str, imports: &[String], source: &str) -> InstallReport {
        let mut report = InstallReport::default();
        for package in detect_packages(imports, source) {
            match self.installer.install(&package).await {
                Ok(()) => {
                    info!("📦 Installed '{}' for capability '{}'", package, identity);
                    report.installed.push(package);
                }
                Err(e) => {
                    warn!("Dependency install failed for capability '{}': {}", identity, e);
                    report.failed.push(package);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingInstaller {
        calls: Mutex<Vec<String>>,
        fail: Vec<&'static str>,
    }

    #[async_trait]
    impl PackageInstaller for RecordingInstaller {
        async fn install(&self, package: &str) -> Result<(), ForgeError> {
            self.calls.lock().await.push(package.to_string());
            if self.fail.iter().any(|f| *f == package) {
                return Err(ForgeError::DependencyInstallFailed {
                    package: package.to_string(),
                    reason: "index unreachable".to_string(),
                });
            }
            Ok(())
        }
    }

    fn imports(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_packages_from_imports() {
        let found = packages_from_imports(&imports(&[
            "import json",
            "import requests, numpy as np",
            "from bs4 import BeautifulSoup",
            "from os.path import join",
            "from . import sibling",
            "from forge_runtime import Capability",
            "import yaml.constructor",
        ]));
        assert_eq!(found, vec!["requests", "numpy", "bs4", "yaml"]);
    }

    #[test]
    fn test_packages_from_comment() {
        let src = "import bs4\n\nasync def run(x):\n    return x\n# install modules: beautifulsoup4 lxml\n";
        assert_eq!(packages_from_comment(src), vec!["beautifulsoup4", "lxml"]);
        assert!(packages_from_comment("x = 1").is_empty());
    }

    #[test]
    fn test_detect_combines_both_strategies() {
        let src = "# install modules: requests pyyaml";
        let found = detect_packages(&imports(&["import requests", "import yaml"]), src);
        assert_eq!(found, vec!["requests", "yaml", "pyyaml"]);
    }

    #[tokio::test]
    async fn test_resolve_continues_past_failures() {
        let installer = Arc::new(RecordingInstaller {
            fail: vec!["numpy"],
            ..Default::default()
        });
        let resolver = DependencyResolver::new(installer.clone());
        let report = resolver
            .resolve("stats", &imports(&["import numpy", "import scipy"]), "")
            .await;

        assert_eq!(report.failed, vec!["numpy"]);
        assert_eq!(report.installed, vec!["scipy"]);
        assert_eq!(installer.calls.lock().await.len(), 2);
    }
}
