//! ============================================================================
//! Tools Module - Callable capabilities for the orchestrator
//! ============================================================================
//! Every tool takes one free-text input and never fails outward: provider
//! errors, missing keys, and timeouts all come back as
//! `ToolOutcome::Failure` text the model can read.
//! - WeatherTool: current, forecast, yesterday, and comparisons (weatherapi.com)
//! - StockTool: company name to ticker to price (Alpha Vantage)
//! - WebSearchTool: top results for a query (Tavily)
//! ============================================================================

mod search;
mod stock;
mod weather;

pub use search::{WebSearchTool, TAVILY_API_BASE};
pub use stock::{StockTool, ALPHA_VANTAGE_API_BASE};
pub use weather::{parse_weather_query, WeatherKind, WeatherQuery, WeatherTool, WEATHER_API_BASE};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ChatConfig;
use crate::llm::{ToolCall, ToolSpec};

/// Result of one tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Success(String),
    Failure(String),
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }

    pub fn text(&self) -> &str {
        match self {
            ToolOutcome::Success(text) | ToolOutcome::Failure(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            ToolOutcome::Success(text) | ToolOutcome::Failure(text) => text,
        }
    }
}

/// A named capability with a single string parameter
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Shown to the model to decide when to call the tool
    fn description(&self) -> &str;

    /// Prefix for failure text, e.g. "Weather error"
    fn error_label(&self) -> &str;

    fn parameter(&self) -> &str {
        "query"
    }

    fn parameter_description(&self) -> &str {
        "Free-text input for the tool"
    }

    /// Do the work. `Ok(Failure)` is an expected negative result such as an
    /// unknown ticker; `Err` is anything that went wrong on the way.
    async fn run(&self, input: &str) -> anyhow::Result<ToolOutcome>;

    /// Total wrapper around `run`
    async fn invoke(&self, input: &str) -> ToolOutcome {
        match self.run(input).await {
            Ok(outcome) => outcome,
            Err(e) => ToolOutcome::Failure(format!("{}: {:#}", self.error_label(), e)),
        }
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameter: self.parameter().to_string(),
            parameter_description: self.parameter_description().to_string(),
        }
    }
}

/// Default per-call timeout
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client shared by the provider-backed tools
fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Fixed set of tools, looked up by name
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: Vec::new(),
            timeout,
        }
    }

    /// Weather, stock, and search tools configured from `config`
    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(config.tool_timeout)
            .with_tool(WeatherTool::new(config.weather_api_key.clone()))
            .with_tool(StockTool::new(config.alpha_vantage_api_key.clone()))
            .with_tool(WebSearchTool::new(config.tavily_api_key.clone()))
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    /// Add a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        if let Some(pos) = self.tools.iter().position(|t| t.name() == tool.name()) {
            warn!("Replacing already registered tool '{}'", tool.name());
            self.tools[pos] = tool;
        } else {
            self.tools.push(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Descriptions advertised to the model, in registration order
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Invoke a tool by name under the registry timeout
    pub async fn invoke(&self, name: &str, input: &str) -> ToolOutcome {
        let Some(tool) = self.get(name) else {
            warn!("Model requested unknown tool '{}'", name);
            return ToolOutcome::Failure(format!("Unknown tool: {}", name));
        };

        debug!("Invoking tool '{}' with input: {}", name, input);

        let outcome = match tokio::time::timeout(self.timeout, tool.invoke(input)).await {
            Ok(outcome) => outcome,
            Err(_) => ToolOutcome::Failure(format!(
                "{}: timed out after {}s",
                tool.error_label(),
                self.timeout.as_secs_f32()
            )),
        };

        if !outcome.is_success() {
            warn!("Tool '{}' failed: {}", name, outcome.text());
        }
        outcome
    }

    /// Invoke the tool a model call names. Returns the extracted input string
    /// alongside the outcome.
    pub async fn invoke_call(&self, call: &ToolCall) -> (String, ToolOutcome) {
        let parameter = self.get(&call.name).map(|t| t.parameter()).unwrap_or("query");
        let input = extract_input(&call.arguments, parameter);
        let outcome = self.invoke(&call.name, &input).await;
        (input, outcome)
    }
}

/// Pull the tool's input string out of a model argument string.
///
/// Accepts `{"<parameter>": "..."}`, any single-field object with a string
/// value, a bare JSON string, or falls back to the raw text.
pub fn extract_input(arguments: &str, parameter: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(arguments) {
        Ok(serde_json::Value::Object(map)) => {
            if let Some(value) = map.get(parameter).and_then(|v| v.as_str()) {
                return value.to_string();
            }
            if map.len() == 1 {
                if let Some(value) = map.values().next().and_then(|v| v.as_str()) {
                    return value.to_string();
                }
            }
            arguments.to_string()
        }
        Ok(serde_json::Value::String(value)) => value,
        _ => arguments.to_string(),
    }
}
