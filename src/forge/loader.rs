//! Hot Loader and Directory Scanner
//!
//! Loads artifacts into the live registry without restarting the host.
//! Capabilities are discovered statically from the registration calls the
//! assembler writes at the end of every artifact, so loading never executes
//! generated code. Execution happens later, per invocation, in a worker.

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::assemble::REGISTRATION_FN;
use super::registry::CapabilityRegistry;
use super::spec::{is_identifier, CapabilityManifest};
use super::store::list_artifacts;
use super::ForgeError;
use crate::tools::{ScriptTool, ScriptWorker};

/// Namespace every loaded unit lives under
pub const UNIT_NAMESPACE: &str = "generated_tools";

/// What to do when a discovered identity is already registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Leave the existing entry alone; used by scans and new syntheses
    SkipExisting,
    /// Replace the existing entry; used by revisions
    Replace,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub unit: String,
    pub registered: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub files: usize,
    pub registered: Vec<String>,
    pub skipped: Vec<String>,
    /// `<path>: <reason>` per artifact or registration that failed
    pub failed: Vec<String>,
}

impl ScanReport {
    fn absorb(&mut self, report: LoadReport) {
        self.registered.extend(report.registered);
        self.skipped.extend(report.skipped);
        self.failed.extend(report.failed);
    }
}

/// Record of a unit's last load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedUnit {
    pub unit: String,
    pub path: PathBuf,
    /// SHA-256 of the source, hex
    pub digest: String,
    /// Identities the unit declared and now owns or shares
    pub identities: Vec<String>,
}

fn registration_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r#"(?m)^{}\(\s*([A-Za-z_][A-Za-z0-9_]*)\s*,\s*("(?:[^"\\]|\\.)*")\s*\)\s*$"#,
            REGISTRATION_FN
        ))
        .expect("static regex")
    })
}

/// Unit name for an artifact path: `generated_tools.<file stem>`
pub fn unit_name(path: &Path) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unnamed");
    format!("{}.{}", UNIT_NAMESPACE, stem)
}

/// Every registration call in `source`, in order. Each entry is the
/// declared manifest or the reason it could not be read.
pub fn discover_registrations(source: &str) -> Vec<Result<CapabilityManifest, String>> {
    registration_line()
        .captures_iter(source)
        .map(|caps| {
            let class = &caps[1];
            let manifest_json: String = serde_json::from_str(&caps[2])
                .map_err(|e| format!("registration of {} has an unreadable manifest literal: {}", class, e))?;
            let manifest: CapabilityManifest = serde_json::from_str(&manifest_json)
                .map_err(|e| format!("registration of {} has an invalid manifest: {}", class, e))?;
            if !is_identifier(&manifest.name) {
                return Err(format!("registration of {} declares invalid identity '{}'", class, manifest.name));
            }
            Ok(manifest)
        })
        .collect()
}

pub struct HotLoader {
    registry: Arc<dyn CapabilityRegistry>,
    worker: Arc<ScriptWorker>,
    units: RwLock<HashMap<String, LoadedUnit>>,
}

impl HotLoader {
    pub fn new(registry: Arc<dyn CapabilityRegistry>, worker: ScriptWorker) -> Self {
        Self {
            registry,
            worker: Arc::new(worker),
            units: RwLock::new(HashMap::new()),
        }
    }

    /// Load one artifact file and register what it declares.
    ///
    /// Reloading a path replaces its unit record; capabilities already handed
    /// out keep the source snapshot they were created with.
    pub async fn load_file(&self, path: &Path, policy: LoadPolicy) -> Result<LoadReport, ForgeError> {
        let source = fs::read_to_string(path).await.map_err(|e| ForgeError::LoaderInstantiationFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(self.load_source(path, source, policy).await)
    }

    async fn load_source(&self, path: &Path, source: String, policy: LoadPolicy) -> LoadReport {
        let unit = unit_name(path);
        let digest = hex::encode(Sha256::digest(source.as_bytes()));

        if let Some(previous) = self.units.read().await.get(&unit) {
            if previous.digest == digest {
                debug!("Unit {} unchanged since last load", unit);
            } else {
                info!("🔄 Reloading unit {} from {:?}", unit, path);
            }
        }

        let snapshot: Arc<str> = Arc::from(source);
        let mut report = LoadReport {
            unit: unit.clone(),
            ..Default::default()
        };

        let discovered = discover_registrations(&snapshot);
        if discovered.is_empty() {
            warn!("No {}() call found in {:?}; nothing to register", REGISTRATION_FN, path);
        }

        for found in discovered {
            let manifest = match found {
                Ok(manifest) => manifest,
                Err(reason) => {
                    let err = ForgeError::LoaderInstantiationFailed { path: path.to_path_buf(), reason };
                    warn!("{}", err);
                    report.failed.push(err.to_string());
                    continue;
                }
            };

            let identity = manifest.name.clone();
            let tool = Arc::new(ScriptTool::new(manifest, unit.clone(), snapshot.clone(), self.worker.clone()));
            match policy {
                LoadPolicy::Replace => {
                    self.registry.register(&identity, tool).await;
                    report.registered.push(identity);
                }
                LoadPolicy::SkipExisting => {
                    if self.registry.register_if_absent(&identity, tool).await {
                        report.registered.push(identity);
                    } else {
                        debug!("'{}' already registered; skipping the copy in {}", identity, unit);
                        report.skipped.push(identity);
                    }
                }
            }
        }

        let identities = report.registered.iter().chain(&report.skipped).cloned().collect();
        self.units.write().await.insert(
            unit.clone(),
            LoadedUnit {
                unit,
                path: path.to_path_buf(),
                digest,
                identities,
            },
        );
        report
    }

    /// Load every artifact in `dir` without replacing anything already
    /// registered. A missing directory is an empty scan; one bad artifact
    /// never stops the rest.
    pub async fn scan(&self, dir: &Path) -> ScanReport {
        let mut scan = ScanReport::default();
        let files = match list_artifacts(dir).await {
            Ok(files) => files,
            Err(e) => {
                warn!("Could not read artifact directory {:?}: {}", dir, e);
                scan.failed.push(format!("{}: {}", dir.display(), e));
                return scan;
            }
        };

        scan.files = files.len();
        for path in files {
            match self.load_file(&path, LoadPolicy::SkipExisting).await {
                Ok(report) => scan.absorb(report),
                Err(e) => {
                    warn!("Skipping artifact {:?}: {}", path, e);
                    scan.failed.push(format!("{}: {}", path.display(), e));
                }
            }
        }

        info!(
            "🔍 Scanned {:?}: {} registered, {} skipped, {} failed",
            dir,
            scan.registered.len(),
            scan.skipped.len(),
            scan.failed.len()
        );
        scan
    }

    /// Loaded units, sorted by name
    pub async fn units(&self) -> Vec<LoadedUnit> {
        let mut units: Vec<LoadedUnit> = self.units.read().await.values().cloned().collect();
        units.sort_by(|a, b| a.unit.cmp(&b.unit));
        units
    }
}
