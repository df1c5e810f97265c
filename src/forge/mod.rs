//! Tool Forge
//!
//! Runtime capability synthesis. A model drafts Python logic for a
//! capability spec; the forge extracts and assembles it into a
//! self-registering artifact, validates it, persists it, and hot-loads it
//! into the live registry. Persisted artifacts are picked up again by the
//! directory scan on the next start.

mod assemble;
mod config;
mod deps;
mod error;
mod extract;
mod loader;
mod pipeline;
mod registry;
mod spec;
mod store;
mod synthesizer;
mod validate;

pub use assemble::{assemble, split_imports, strip_wrapper, AssembledArtifact, BASE_IMPORT, REGISTRATION_FN};
pub use config::{CheckerKind, ForgeConfig};
pub use deps::{detect_packages, DependencyResolver, InstallReport, PackageInstaller, PipInstaller};
pub use error::ForgeError;
pub use extract::{extract_candidate, strip_code_fences};
pub use loader::{
    discover_registrations, unit_name, HotLoader, LoadPolicy, LoadReport, LoadedUnit, ScanReport, UNIT_NAMESPACE,
};
pub use pipeline::ToolForge;
pub use registry::CapabilityRegistry;
pub use spec::{CapabilityManifest, CapabilitySpec, ParamKind, ParamSpec};
pub use store::{list_artifacts, ArtifactStore};
pub use synthesizer::{Draft, SynthesisRequest, SynthesisState, Synthesizer, DEFAULT_MAX_STEPS};
pub use validate::{Diagnostic, GrammarChecker, InterpreterChecker, StructuralChecker, SyntaxChecker};

use serde::Serialize;

const INFEASIBLE_MESSAGE: &str =
    "Failed to generate code. Task may not be feasible for current generation models.";

/// Why a synthesis request did not produce a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The model could not produce valid code; retrying as-is is unlikely to help
    Infeasible,
    /// Provider, filesystem or loading trouble; a retry may succeed
    Transient,
    /// The request itself cannot be served (bad spec, existing or missing identity)
    Precondition,
}

impl FailureKind {
    pub fn of(error: &ForgeError) -> Self {
        match error {
            ForgeError::ExtractionEmpty | ForgeError::StructuralValidationFailed(_) => FailureKind::Infeasible,
            ForgeError::PriorArtifactMissing(_) | ForgeError::AlreadyExists(_) | ForgeError::InvalidSpec(_) => {
                FailureKind::Precondition
            }
            ForgeError::Provider(_)
            | ForgeError::Io(_)
            | ForgeError::Json(_)
            | ForgeError::LoaderInstantiationFailed { .. }
            | ForgeError::DependencyInstallFailed { .. } => FailureKind::Transient,
        }
    }
}

/// What the forge reports back to its caller. Errors never escape as panics
/// or `Err`; every request ends in one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SynthesisOutcome {
    Registered {
        identity: String,
        message: String,
        /// True when an existing capability was replaced (revise)
        replaced: bool,
    },
    Failed {
        identity: String,
        kind: FailureKind,
        message: String,
    },
}

impl SynthesisOutcome {
    pub fn failed(identity: &str, error: &ForgeError) -> Self {
        let kind = FailureKind::of(error);
        let message = match kind {
            FailureKind::Infeasible => format!("{} {}", INFEASIBLE_MESSAGE, error),
            FailureKind::Precondition => error.to_string(),
            FailureKind::Transient => format!("Tool generation failed: {}. Retrying may succeed.", error),
        };
        SynthesisOutcome::Failed {
            identity: identity.to_string(),
            kind,
            message,
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, SynthesisOutcome::Registered { .. })
    }

    pub fn identity(&self) -> &str {
        match self {
            SynthesisOutcome::Registered { identity, .. } | SynthesisOutcome::Failed { identity, .. } => identity,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SynthesisOutcome::Registered { message, .. } | SynthesisOutcome::Failed { message, .. } => message,
        }
    }
}
