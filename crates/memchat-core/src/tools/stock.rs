//! Stock price lookup via Alpha Vantage: company name to ticker
//! (SYMBOL_SEARCH), then ticker to latest price (GLOBAL_QUOTE).

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use super::{Tool, ToolOutcome};

pub const ALPHA_VANTAGE_API_BASE: &str = "https://www.alphavantage.co";

#[derive(Debug, Deserialize)]
struct SymbolSearchResponse {
    #[serde(rename = "bestMatches", default)]
    best_matches: Vec<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote", default)]
    quote: HashMap<String, String>,
}

pub struct StockTool {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl StockTool {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, ALPHA_VANTAGE_API_BASE)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: super::http_client(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Alpha Vantage answers rate limits and bad keys with HTTP 200 and a
    /// note field instead of data.
    async fn query(&self, api_key: &str, params: &[(&str, &str)]) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(format!("{}/query", self.base_url))
            .query(params)
            .query(&[("apikey", api_key)])
            .send()
            .await
            .map_err(|e| anyhow!("Request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("HTTP {}: {}", status.as_u16(), body));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse response: {}", e))?;

        for field in ["Error Message", "Note", "Information"] {
            if let Some(message) = value.get(field).and_then(|v| v.as_str()) {
                return Err(anyhow!("{}", message));
            }
        }
        Ok(value)
    }
}

#[async_trait]
impl Tool for StockTool {
    fn name(&self) -> &str {
        "stock_price"
    }

    fn description(&self) -> &str {
        "Latest stock price for a publicly traded company, looked up by company name."
    }

    fn error_label(&self) -> &str {
        "Stock error"
    }

    fn parameter_description(&self) -> &str {
        "Company name or ticker, e.g. 'Apple'"
    }

    async fn run(&self, input: &str) -> Result<ToolOutcome> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("ALPHA_VANTAGE_API_KEY is not set"))?;
        let company = input.trim();

        let search: SymbolSearchResponse = serde_json::from_value(
            self.query(api_key, &[("function", "SYMBOL_SEARCH"), ("keywords", company)])
                .await?,
        )?;

        let Some(symbol) = search
            .best_matches
            .first()
            .and_then(|m| m.get("1. symbol"))
            .cloned()
        else {
            return Ok(ToolOutcome::Failure(format!(
                "No stock symbol found for {}",
                company
            )));
        };
        debug!("Resolved '{}' to ticker {}", company, symbol);

        let quote: GlobalQuoteResponse = serde_json::from_value(
            self.query(api_key, &[("function", "GLOBAL_QUOTE"), ("symbol", symbol.as_str())])
                .await?,
        )?;

        Ok(match quote.quote.get("05. price").filter(|p| !p.trim().is_empty()) {
            Some(price) => ToolOutcome::Success(format!("Stock: {}\nPrice: ${}", symbol, price)),
            None => ToolOutcome::Failure("Price not available.".to_string()),
        })
    }
}
