//! Web search via the Tavily API.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Tool, ToolOutcome};

pub const TAVILY_API_BASE: &str = "https://api.tavily.com";

const MAX_RESULTS: u32 = 5;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
    search_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

pub struct WebSearchTool {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl WebSearchTool {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, TAVILY_API_BASE)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: super::http_client(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information, news, and facts."
    }

    fn error_label(&self) -> &str {
        "Search error"
    }

    fn parameter_description(&self) -> &str {
        "Search query"
    }

    async fn run(&self, input: &str) -> Result<ToolOutcome> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("TAVILY_API_KEY is not set"))?;

        let request = SearchRequest {
            api_key,
            query: input.trim(),
            max_results: MAX_RESULTS,
            search_depth: "basic",
        };

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("HTTP {}: {}", status.as_u16(), body));
        }

        let data: SearchResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse response: {}", e))?;

        if data.results.is_empty() {
            return Ok(ToolOutcome::Failure("No search results found.".to_string()));
        }

        let mut lines = vec!["Search results:".to_string()];
        lines.extend(
            data.results
                .iter()
                .map(|r| format!("- {}: {}", r.title, r.content)),
        );
        Ok(ToolOutcome::Success(lines.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_search_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({
                "api_key": "tkey",
                "query": "rust 2024 edition",
                "max_results": 5,
                "search_depth": "basic"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "title": "Rust Blog", "content": "The 2024 edition is out.", "url": "https://blog.rust-lang.org" },
                    { "title": "Edition Guide", "content": "What changed.", "url": "https://doc.rust-lang.org" }
                ]
            })))
            .mount(&server)
            .await;

        let tool = WebSearchTool::with_base_url(Some("tkey".to_string()), server.uri());
        let outcome = tool.invoke("rust 2024 edition").await;
        assert_eq!(
            outcome,
            ToolOutcome::Success(
                "Search results:\n- Rust Blog: The 2024 edition is out.\n- Edition Guide: What changed."
                    .to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_no_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
            .mount(&server)
            .await;

        let tool = WebSearchTool::with_base_url(Some("tkey".to_string()), server.uri());
        let outcome = tool.invoke("zzzz").await;
        assert_eq!(outcome, ToolOutcome::Failure("No search results found.".to_string()));
    }

    #[tokio::test]
    async fn test_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let tool = WebSearchTool::with_base_url(Some("bad".to_string()), server.uri());
        let outcome = tool.invoke("anything").await;
        assert_eq!(
            outcome,
            ToolOutcome::Failure("Search error: HTTP 401: Unauthorized".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_key() {
        let outcome = WebSearchTool::new(None).invoke("anything").await;
        assert_eq!(
            outcome,
            ToolOutcome::Failure("Search error: TAVILY_API_KEY is not set".to_string())
        );
    }
}
