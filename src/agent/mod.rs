//! Agent Module
//!
//! The narrow slice of the agent the forge talks to: language model
//! providers and the shared agent error type.

mod provider;
mod types;

pub use provider::{ChatMessage, ChatRole, LLMProvider, OllamaProvider, OpenAICompatibleProvider};
pub use types::{AgentError, AgentResult};
