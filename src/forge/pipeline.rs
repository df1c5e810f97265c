//! Create and Revise pipelines
//!
//! draft -> extract -> assemble -> validate -> resolve deps (background)
//! -> persist -> hot-load. Nothing is written or registered unless the
//! assembled artifact passes validation.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::assemble::{assemble, strip_wrapper};
use super::config::ForgeConfig;
use super::deps::{DependencyResolver, PackageInstaller, PipInstaller};
use super::extract::extract_candidate;
use super::loader::{discover_registrations, HotLoader, LoadPolicy, ScanReport};
use super::registry::CapabilityRegistry;
use super::spec::CapabilitySpec;
use super::store::ArtifactStore;
use super::synthesizer::{SynthesisRequest, Synthesizer};
use super::validate::SyntaxChecker;
use super::{ForgeError, SynthesisOutcome};
use crate::agent::LLMProvider;

#[derive(Debug, Clone, Copy)]
enum Mode<'a> {
    Create,
    Revise { feedback: &'a str },
}

/// Runtime capability synthesis: turns a capability spec into a registered,
/// invocable capability without restarting the host.
pub struct ToolForge {
    synthesizer: Synthesizer,
    store: ArtifactStore,
    loader: Arc<HotLoader>,
    registry: Arc<dyn CapabilityRegistry>,
    resolver: Option<Arc<DependencyResolver>>,
    // One pipeline per identity at a time
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ToolForge {
    pub fn new(config: &ForgeConfig, provider: Arc<dyn LLMProvider>, registry: Arc<dyn CapabilityRegistry>) -> Self {
        let synthesizer = Synthesizer::new(provider, config.model.clone())
            .with_checker(config.build_checker())
            .with_max_steps(config.max_steps);
        let resolver = config.install_dependencies.then(|| {
            let installer: Arc<dyn PackageInstaller> = Arc::new(PipInstaller::new(config.python.clone()));
            Arc::new(DependencyResolver::new(installer))
        });

        Self {
            synthesizer,
            store: ArtifactStore::new(config.artifact_dir.clone()),
            loader: Arc::new(HotLoader::new(registry.clone(), config.build_worker())),
            registry,
            resolver,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Use `installer` for dependency resolution, enabling it if it was off
    pub fn with_installer(mut self, installer: Arc<dyn PackageInstaller>) -> Self {
        self.resolver = Some(Arc::new(DependencyResolver::new(installer)));
        self
    }

    pub fn with_checker(mut self, checker: Arc<dyn SyntaxChecker>) -> Self {
        self.synthesizer = self.synthesizer.with_checker(checker);
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn loader(&self) -> &Arc<HotLoader> {
        &self.loader
    }

    /// Directory scan of the artifact store; run once at startup
    pub async fn load_existing(&self) -> ScanReport {
        self.loader.scan(self.store.dir()).await
    }

    /// Create pipeline. Fails with a precondition error if the identity is
    /// already registered or persisted.
    pub async fn synthesize(&self, spec: &CapabilitySpec) -> SynthesisOutcome {
        self.run(spec, Mode::Create).await
    }

    /// Revise pipeline. Rebuilds the persisted artifact with `feedback` and
    /// replaces the registered capability under the same identity.
    pub async fn revise(&self, spec: &CapabilitySpec, feedback: &str) -> SynthesisOutcome {
        self.run(spec, Mode::Revise { feedback }).await
    }

    /// Revise a persisted capability by identity alone
    pub async fn revise_existing(&self, identity: &str, feedback: &str) -> SynthesisOutcome {
        match self.persisted_spec(identity).await {
            Ok(spec) => self.revise(&spec, feedback).await,
            Err(e) => SynthesisOutcome::failed(identity, &e),
        }
    }

    /// Spec recovered from the manifest in the persisted artifact
    pub async fn persisted_spec(&self, identity: &str) -> Result<CapabilitySpec, ForgeError> {
        let source = self.store.read(identity).await?;
        discover_registrations(&source)
            .into_iter()
            .filter_map(Result::ok)
            .find(|m| m.name == identity)
            .map(|m| m.to_spec())
            .ok_or_else(|| ForgeError::PriorArtifactMissing(identity.to_string()))
    }

    async fn run(&self, spec: &CapabilitySpec, mode: Mode<'_>) -> SynthesisOutcome {
        let revising = matches!(mode, Mode::Revise { .. });
        match self.forge(spec, mode).await {
            Ok(()) => {
                let message = if revising {
                    format!(
                        "Successfully revised tool '{}'. The new version replaces the previous one and is available for immediate use.",
                        spec.identity
                    )
                } else {
                    format!(
                        "Successfully generated tool '{}'. It is now loaded and available for immediate use.",
                        spec.identity
                    )
                };
                SynthesisOutcome::Registered {
                    identity: spec.identity.clone(),
                    message,
                    replaced: revising,
                }
            }
            Err(e) => {
                warn!("Synthesis of '{}' failed: {}", spec.identity, e);
                SynthesisOutcome::failed(&spec.identity, &e)
            }
        }
    }

    async fn identity_lock(&self, identity: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(identity.to_string()).or_default().clone()
    }

    /// Drop the identity's lock entry unless another pipeline holds or awaits it
    async fn release_lock(&self, identity: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // Ours plus the map's own reference
        if Arc::strong_count(&lock) == 2 {
            locks.remove(identity);
        }
    }

    async fn forge(&self, spec: &CapabilitySpec, mode: Mode<'_>) -> Result<(), ForgeError> {
        spec.validate()?;
        let identity = spec.identity.as_str();

        let lock = self.identity_lock(identity).await;
        let result = {
            let _guard = lock.lock().await;
            self.forge_locked(spec, mode).await
        };
        self.release_lock(identity, lock).await;
        result
    }

    async fn forge_locked(&self, spec: &CapabilitySpec, mode: Mode<'_>) -> Result<(), ForgeError> {
        let identity = spec.identity.as_str();

        let prior_logic = match mode {
            Mode::Create => {
                if self.registry.exists(identity).await || self.store.exists(identity).await {
                    return Err(ForgeError::AlreadyExists(identity.to_string()));
                }
                None
            }
            Mode::Revise { .. } => Some(strip_wrapper(&self.store.read(identity).await?)),
        };

        let request = match (mode, prior_logic.as_deref()) {
            (Mode::Revise { feedback }, Some(prior_logic)) => SynthesisRequest::Revise { prior_logic, feedback },
            _ => SynthesisRequest::Create,
        };

        info!("🛠️ Forging '{}' ({} steps max)", identity, self.synthesizer.max_steps());
        let draft = self.synthesizer.draft(spec, request).await?;
        if !draft.accepted {
            warn!("No clean draft for '{}' after {} steps; validating the last reply", identity, draft.steps);
        }

        let fragment = extract_candidate(&draft.reply);
        if fragment.is_empty() {
            return Err(ForgeError::ExtractionEmpty);
        }

        let artifact = assemble(&fragment, spec);
        self.synthesizer.checker().check(&artifact.source).await?;

        // Installation runs alongside persistence and loading; its failures
        // only surface when the capability is invoked.
        if let Some(resolver) = &self.resolver {
            let resolver = resolver.clone();
            let identity = identity.to_string();
            let imports = artifact.imports.clone();
            let source = artifact.source.clone();
            tokio::spawn(async move {
                resolver.resolve(&identity, &imports, &source).await;
            });
        }

        let path = self.store.write(identity, &artifact.source).await?;
        let policy = if matches!(mode, Mode::Revise { .. }) {
            LoadPolicy::Replace
        } else {
            LoadPolicy::SkipExisting
        };
        let report = self.loader.load_file(&path, policy).await?;

        if !report.registered.iter().any(|id| id == identity) {
            // A new artifact that lost the registration must not block later creates
            if matches!(mode, Mode::Create) {
                if let Err(e) = self.store.remove(identity).await {
                    warn!("Could not remove unregistered artifact {:?}: {}", path, e);
                }
            }
            let reason = match report.failed.first() {
                Some(reason) => reason.clone(),
                None if report.skipped.iter().any(|id| id == identity) => {
                    format!("'{}' was registered by another source first", identity)
                }
                None => format!("artifact did not register '{}'", identity),
            };
            return Err(ForgeError::LoaderInstantiationFailed { path, reason });
        }

        info!("✅ '{}' registered from {:?}", identity, path);
        Ok(())
    }
}
