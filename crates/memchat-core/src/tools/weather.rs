//! ============================================================================
//! Weather Tool - weatherapi.com lookups
//! ============================================================================
//! One free-text query selects one of four reports:
//! - Compare: "compare" or " and " with two or more cities (first two used)
//! - Yesterday: history for the day before today
//! - Forecast: "forecast" or a "7" anywhere in the query
//! - Current: everything else
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{Tool, ToolOutcome};

pub const WEATHER_API_BASE: &str = "https://api.weatherapi.com/v1";

const FORECAST_DAYS: &str = "7";

/// One or two capitalized words
static CITY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+(?: [A-Z][a-z]+)?\b").expect("valid city regex"));

/// Capitalized words that are never part of a city name
const NON_CITY_WORDS: &[&str] = &[
    "What", "Whats", "How", "Is", "Tell", "Show", "Give", "Get", "Please", "The", "Weather",
    "Compare", "Forecast", "Yesterday", "Today", "Tomorrow", "Current", "Temperature", "Day",
    "Days", "And", "In", "At", "Of", "Between", "Vs",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherKind {
    Current,
    Forecast,
    Yesterday,
    Compare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherQuery {
    pub kind: WeatherKind,
    /// Never empty; falls back to the whole query
    pub cities: Vec<String>,
}

/// Classify a query and pull city names out of it
pub fn parse_weather_query(query: &str) -> WeatherQuery {
    let lower = query.to_lowercase();
    let cities = extract_cities(query);

    let kind = if (lower.contains("compare") || lower.contains(" and ")) && cities.len() >= 2 {
        WeatherKind::Compare
    } else if lower.contains("yesterday") {
        WeatherKind::Yesterday
    } else if lower.contains("forecast") || lower.contains('7') {
        WeatherKind::Forecast
    } else {
        WeatherKind::Current
    };

    let cities = if cities.is_empty() {
        vec![query.trim().to_string()]
    } else {
        cities
    };

    WeatherQuery { kind, cities }
}

fn extract_cities(query: &str) -> Vec<String> {
    let mut cities: Vec<String> = Vec::new();

    for found in CITY_PATTERN.find_iter(query) {
        let words: Vec<&str> = found
            .as_str()
            .split(' ')
            .filter(|w| !NON_CITY_WORDS.contains(w))
            .collect();
        if words.is_empty() {
            continue;
        }
        let city = words.join(" ");
        if !cities.contains(&city) {
            cities.push(city);
        }
    }

    cities
}

// ============================================================================
// API response shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct Condition {
    text: String,
}

#[derive(Debug, Deserialize)]
struct Location {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Current {
    temp_c: f64,
    condition: Condition,
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    location: Location,
    current: Current,
}

#[derive(Debug, Deserialize)]
struct DaySummary {
    avgtemp_c: f64,
    condition: Condition,
}

#[derive(Debug, Deserialize)]
struct ForecastDay {
    date: String,
    day: DaySummary,
}

#[derive(Debug, Deserialize)]
struct Forecast {
    forecastday: Vec<ForecastDay>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    location: Location,
    forecast: Forecast,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// Tool
// ============================================================================

pub struct WeatherTool {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl WeatherTool {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, WEATHER_API_BASE)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: super::http_client(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("WEATHER_API_KEY is not set"))
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(&[("key", self.key()?)])
            .query(params)
            .send()
            .await
            .map_err(|e| anyhow!("Request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(parsed) => anyhow!("{}", parsed.error.message),
                Err(_) => anyhow!("HTTP {}: {}", status.as_u16(), body),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| anyhow!("Failed to parse response: {}", e))
    }

    async fn current(&self, city: &str) -> Result<(String, Current)> {
        let data: CurrentResponse = self.get("current.json", &[("q", city)]).await?;
        Ok((data.location.name, data.current))
    }

    async fn report_current(&self, city: &str) -> Result<String> {
        let (name, current) = self.current(city).await?;
        Ok(format!(
            "Current weather in {}: {}°C, {}",
            name, current.temp_c, current.condition.text
        ))
    }

    async fn report_compare(&self, cities: &[String]) -> Result<String> {
        let mut lines = vec!["Weather comparison:".to_string()];
        for city in cities.iter().take(2) {
            let (name, current) = self.current(city).await?;
            lines.push(format!(
                "{}: {}°C, {}",
                name, current.temp_c, current.condition.text
            ));
        }
        Ok(lines.join("\n"))
    }

    async fn report_forecast(&self, city: &str) -> Result<String> {
        let data: ForecastResponse = self
            .get("forecast.json", &[("q", city), ("days", FORECAST_DAYS)])
            .await?;
        let mut lines = vec![format!("7-day forecast for {}:", data.location.name)];
        for day in data.forecast.forecastday {
            lines.push(format!(
                "{}: {} ({}°C)",
                day.date, day.day.condition.text, day.day.avgtemp_c
            ));
        }
        Ok(lines.join("\n"))
    }

    async fn report_yesterday(&self, city: &str) -> Result<String> {
        let date = (Utc::now() - Duration::days(1)).format("%Y-%m-%d").to_string();
        let data: ForecastResponse = self
            .get("history.json", &[("q", city), ("dt", date.as_str())])
            .await?;
        let day = data
            .forecast
            .forecastday
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No history returned for {}", city))?;
        Ok(format!(
            "Yesterday in {}: {}°C, {}",
            data.location.name, day.day.avgtemp_c, day.day.condition.text
        ))
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "weather"
    }

    fn description(&self) -> &str {
        "Weather reports for named cities: current conditions, a 7-day forecast, \
         yesterday's weather, or a comparison of several cities."
    }

    fn error_label(&self) -> &str {
        "Weather error"
    }

    fn parameter_description(&self) -> &str {
        "Natural-language weather request naming the city or cities, e.g. 'forecast for Paris'"
    }

    async fn run(&self, input: &str) -> Result<ToolOutcome> {
        self.key()?;
        let query = parse_weather_query(input);
        debug!("Weather query {:?} for {:?}", query.kind, query.cities);

        let first = &query.cities[0];
        let text = match query.kind {
            WeatherKind::Compare => self.report_compare(&query.cities).await?,
            WeatherKind::Yesterday => self.report_yesterday(first).await?,
            WeatherKind::Forecast => self.report_forecast(first).await?,
            WeatherKind::Current => self.report_current(first).await?,
        };
        Ok(ToolOutcome::Success(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn current_body(name: &str, temp: f64, condition: &str) -> serde_json::Value {
        json!({
            "location": { "name": name },
            "current": { "temp_c": temp, "condition": { "text": condition } }
        })
    }

    #[test]
    fn test_parse_current() {
        let q = parse_weather_query("What's the weather in Tokyo?");
        assert_eq!(q.kind, WeatherKind::Current);
        assert_eq!(q.cities, vec!["Tokyo"]);
    }

    #[test]
    fn test_parse_two_word_city() {
        let q = parse_weather_query("weather in New York");
        assert_eq!(q.cities, vec!["New York"]);
    }

    #[test]
    fn test_parse_compare() {
        let q = parse_weather_query("Compare London and Paris");
        assert_eq!(q.kind, WeatherKind::Compare);
        assert_eq!(q.cities, vec!["London", "Paris"]);
    }

    #[test]
    fn test_compare_needs_two_cities() {
        let q = parse_weather_query("compare the weather in Berlin");
        assert_eq!(q.kind, WeatherKind::Current);
        assert_eq!(q.cities, vec!["Berlin"]);
    }

    #[test]
    fn test_parse_forecast_and_yesterday() {
        assert_eq!(
            parse_weather_query("forecast for Paris").kind,
            WeatherKind::Forecast
        );
        assert_eq!(
            parse_weather_query("Paris next 7 days").kind,
            WeatherKind::Forecast
        );
        assert_eq!(
            parse_weather_query("How was Madrid yesterday").kind,
            WeatherKind::Yesterday
        );
    }

    #[test]
    fn test_duplicate_cities_collapse() {
        let q = parse_weather_query("Oslo and Oslo");
        assert_eq!(q.cities, vec!["Oslo"]);
        assert_eq!(q.kind, WeatherKind::Current);
    }

    #[test]
    fn test_no_capitalized_city_falls_back_to_query() {
        let q = parse_weather_query("  weather in lisbon ");
        assert_eq!(q.cities, vec!["weather in lisbon"]);
    }

    #[tokio::test]
    async fn test_missing_key() {
        let tool = WeatherTool::new(None);
        let outcome = tool.invoke("weather in Tokyo").await;
        assert_eq!(
            outcome,
            ToolOutcome::Failure("Weather error: WEATHER_API_KEY is not set".to_string())
        );
    }

    #[tokio::test]
    async fn test_current_weather() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/current.json"))
            .and(query_param("key", "wkey"))
            .and(query_param("q", "Tokyo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body(
                "Tokyo", 22.0, "Sunny",
            )))
            .mount(&server)
            .await;

        let tool = WeatherTool::with_base_url(Some("wkey".to_string()), server.uri());
        let outcome = tool.invoke("weather in Tokyo").await;
        assert_eq!(
            outcome,
            ToolOutcome::Success("Current weather in Tokyo: 22°C, Sunny".to_string())
        );
    }

    #[tokio::test]
    async fn test_compare_weather() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/current.json"))
            .and(query_param("q", "London"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body(
                "London", 14.5, "Cloudy",
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/current.json"))
            .and(query_param("q", "Paris"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body(
                "Paris", 18.0, "Clear",
            )))
            .mount(&server)
            .await;

        let tool = WeatherTool::with_base_url(Some("wkey".to_string()), server.uri());
        let outcome = tool.invoke("Compare London and Paris").await;
        assert_eq!(
            outcome.text(),
            "Weather comparison:\nLondon: 14.5°C, Cloudy\nParis: 18°C, Clear"
        );
    }

    #[tokio::test]
    async fn test_forecast() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast.json"))
            .and(query_param("days", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "location": { "name": "Paris" },
                "forecast": { "forecastday": [
                    { "date": "2026-10-16", "day": { "avgtemp_c": 15.2, "condition": { "text": "Rain" } } },
                    { "date": "2026-10-17", "day": { "avgtemp_c": 16.0, "condition": { "text": "Sunny" } } }
                ]}
            })))
            .mount(&server)
            .await;

        let tool = WeatherTool::with_base_url(Some("wkey".to_string()), server.uri());
        let outcome = tool.invoke("forecast for Paris").await;
        assert_eq!(
            outcome.text(),
            "7-day forecast for Paris:\n2026-10-16: Rain (15.2°C)\n2026-10-17: Sunny (16°C)"
        );
    }

    #[tokio::test]
    async fn test_provider_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/current.json"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 1006, "message": "No matching location found." }
            })))
            .mount(&server)
            .await;

        let tool = WeatherTool::with_base_url(Some("wkey".to_string()), server.uri());
        let outcome = tool.invoke("weather in Atlantis").await;
        assert_eq!(
            outcome,
            ToolOutcome::Failure("Weather error: No matching location found.".to_string())
        );
    }
}
