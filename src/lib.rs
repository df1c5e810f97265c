//! Adaptive Agency
//!
//! Runtime tool synthesis for an agent host:
//! - Model-driven drafting with syntax feedback
//! - Self-registering Python artifacts, validated before they touch disk
//! - Hot-loading into the live tool registry
//! - Startup scan of previously generated tools

pub mod agent;
pub mod forge;
pub mod tools;
pub mod utils;

// Re-exports for convenience
pub use forge::{CapabilitySpec, ForgeConfig, SynthesisOutcome, ToolForge};
pub use tools::ToolRegistry;
