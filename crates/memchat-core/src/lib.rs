//! ============================================================================
//! MEMCHAT-CORE: Conversational assistant with semantic memory
//! ============================================================================
//! This crate holds everything behind the `memchat` binary:
//! - Per-session vector memory with a confidence gate for recall questions
//! - A bounded tool-calling loop over an OpenAI-compatible chat model
//! - Weather, stock price, and web search tools
//! - Environment-driven configuration
//! ============================================================================

pub mod config;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod session;
pub mod tools;
pub mod types;

// Re-export main types for convenience
pub use config::ChatConfig;
pub use orchestrator::{Completion, OrchestrationError, ToolOrchestrator, DEFAULT_MAX_TOOL_ROUNDS};
pub use session::{ChatSession, SessionState};
pub use tools::{Tool, ToolOutcome, ToolRegistry};
pub use types::*;
