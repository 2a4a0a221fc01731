//! ============================================================================
//! Configuration - Environment-driven settings
//! ============================================================================
//! Read once at startup, after the binary has loaded `.env`. Missing tool
//! keys are not errors here; each tool reports its own variable when called.
//! ============================================================================

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::llm::{ChatModel, OpenAiChatClient, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL};
use crate::memory::{
    create_embedder, ConfidenceGate, Embedder, DEFAULT_EMBEDDING_BASE_URL,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_RECALL_K, DEFAULT_RECALL_THRESHOLD,
};
use crate::orchestrator::DEFAULT_MAX_TOOL_ROUNDS;
use crate::tools::DEFAULT_TOOL_TIMEOUT;
use crate::types::{ChatError, Result};

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    /// `None` selects the local all-MiniLM-L6-v2 embedder
    pub embedding_api_key: Option<String>,
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub weather_api_key: Option<String>,
    pub alpha_vantage_api_key: Option<String>,
    pub tavily_api_key: Option<String>,
    pub tool_timeout: Duration,
    pub max_tool_rounds: usize,
    pub recall_threshold: f32,
    pub recall_k: usize,
    pub retrieval_k: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            llm_api_key: None,
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            embedding_api_key: None,
            embedding_base_url: DEFAULT_EMBEDDING_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            weather_api_key: None,
            alpha_vantage_api_key: None,
            tavily_api_key: None,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            recall_threshold: DEFAULT_RECALL_THRESHOLD,
            recall_k: DEFAULT_RECALL_K,
            retrieval_k: DEFAULT_RECALL_K,
        }
    }
}

impl ChatConfig {
    /// Build from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let config = Self {
            llm_api_key: get("GROQ_API_KEY").or_else(|| get("LLM_API_KEY")),
            llm_base_url: get("LLM_BASE_URL").unwrap_or(defaults.llm_base_url),
            llm_model: get("LLM_MODEL").unwrap_or(defaults.llm_model),
            embedding_api_key: get("EMBEDDING_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            embedding_base_url: get("EMBEDDING_BASE_URL").unwrap_or(defaults.embedding_base_url),
            embedding_model: get("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            weather_api_key: get("WEATHER_API_KEY"),
            alpha_vantage_api_key: get("ALPHA_VANTAGE_API_KEY"),
            tavily_api_key: get("TAVILY_API_KEY"),
            tool_timeout: match get("MEMCHAT_TOOL_TIMEOUT_SECS") {
                Some(raw) => Duration::from_secs(parse_var("MEMCHAT_TOOL_TIMEOUT_SECS", &raw)?),
                None => defaults.tool_timeout,
            },
            max_tool_rounds: parse_or("MEMCHAT_MAX_TOOL_ROUNDS", get, defaults.max_tool_rounds)?,
            recall_threshold: parse_or(
                "MEMCHAT_RECALL_THRESHOLD",
                get,
                defaults.recall_threshold,
            )?,
            recall_k: parse_or("MEMCHAT_RECALL_K", get, defaults.recall_k)?,
            retrieval_k: parse_or("MEMCHAT_RETRIEVAL_K", get, defaults.retrieval_k)?,
        };

        config.validate()?;
        debug!(
            "Loaded config: model={} base_url={} tool_timeout={:?} max_tool_rounds={}",
            config.llm_model, config.llm_base_url, config.tool_timeout, config.max_tool_rounds
        );
        Ok(config)
    }

    /// Reject values that would make the session unusable
    pub fn validate(&self) -> Result<()> {
        if self.tool_timeout.is_zero() {
            return Err(ChatError::Config(
                "tool timeout must be at least one second".to_string(),
            ));
        }
        if !self.recall_threshold.is_finite() || self.recall_threshold < 0.0 {
            return Err(ChatError::Config(format!(
                "recall threshold must be a non-negative number, got {}",
                self.recall_threshold
            )));
        }
        if self.recall_k == 0 {
            return Err(ChatError::Config("recall k must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn require_llm_key(&self) -> Result<&str> {
        self.llm_api_key.as_deref().ok_or_else(|| {
            ChatError::Config("GROQ_API_KEY (or LLM_API_KEY) is not set".to_string())
        })
    }

    pub fn confidence_gate(&self) -> ConfidenceGate {
        ConfidenceGate::new(self.recall_k, self.recall_threshold)
    }

    pub fn build_embedder(&self) -> Arc<dyn Embedder> {
        create_embedder(
            self.embedding_api_key.clone(),
            Some(self.embedding_base_url.clone()),
            Some(self.embedding_model.clone()),
        )
    }

    /// OpenAI-compatible chat client; fails without an LLM key
    pub fn build_chat_model(&self) -> Result<Arc<dyn ChatModel>> {
        let key = self.require_llm_key()?;
        Ok(Arc::new(OpenAiChatClient::new(
            key.to_string(),
            Some(self.llm_base_url.clone()),
            Some(self.llm_model.clone()),
        )))
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ChatError::Config(format!("{} has invalid value '{}': {}", name, raw, e)))
}

fn parse_or<T, G>(name: &str, get: G, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => parse_var(name, &raw),
        None => Ok(default),
    }
}
