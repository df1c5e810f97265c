use std::path::PathBuf;
use thiserror::Error;

use super::validate::Diagnostic;

/// Failures inside the synthesis and hot-load pipeline.
///
/// None of these escape [`ToolForge`](super::ToolForge): they are folded into
/// a [`SynthesisOutcome`](super::SynthesisOutcome) at the facade boundary.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("model output contained no usable code fragment")]
    ExtractionEmpty,

    #[error("artifact failed structural validation: {0}")]
    StructuralValidationFailed(Diagnostic),

    #[error("no persisted artifact for capability '{0}'")]
    PriorArtifactMissing(String),

    #[error("capability '{0}' already exists")]
    AlreadyExists(String),

    #[error("dependency installation failed for '{package}': {reason}")]
    DependencyInstallFailed { package: String, reason: String },

    #[error("failed to instantiate capability from {}: {reason}", path.display())]
    LoaderInstantiationFailed { path: PathBuf, reason: String },

    #[error("invalid capability spec: {0}")]
    InvalidSpec(String),

    #[error("language model request failed: {0}")]
    Provider(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
