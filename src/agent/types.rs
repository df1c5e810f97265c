use thiserror::Error;

/// Errors surfaced by tools and agent plumbing
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type AgentResult<T> = Result<T, AgentError>;
