//! Language-model interface and the OpenAI-compatible client.

mod client;
mod openai;

pub use client::{ChatMessage, ChatModel, LlmError, ModelReply, ToolCall, ToolSpec};
pub use openai::{OpenAiChatClient, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL};
