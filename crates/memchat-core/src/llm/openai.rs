//! ============================================================================
//! OpenAI-compatible chat completions with function calling
//! ============================================================================
//! Works against any `/chat/completions` endpoint speaking the OpenAI wire
//! format (Groq by default).
//! ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::client::{ChatMessage, ChatModel, LlmError, ModelReply, ToolCall, ToolSpec};

/// Default API base (Groq's OpenAI-compatible endpoint)
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default chat model
pub const DEFAULT_LLM_MODEL: &str = "llama-3.3-70b-versatile";

/// Chat client for OpenAI-compatible APIs
pub struct OpenAiChatClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiChatClient {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request<'a>(&'a self, messages: &[ChatMessage], tools: &[ToolSpec]) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: tools.iter().map(WireTool::from).collect(),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, LlmError> {
        debug!(
            "Calling {} with {} messages and {} tools",
            self.model,
            messages.len(),
            tools.len()
        );

        let request = self.build_request(messages, tools);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        if let Some(usage) = &completion.usage {
            debug!(
                "LLM tokens: prompt={} completion={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        into_reply(choice.message)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn into_reply(message: WireMessage) -> Result<ModelReply, LlmError> {
    let tool_calls = message.tool_calls.unwrap_or_default();
    if !tool_calls.is_empty() {
        return Ok(ModelReply::ToolCalls(
            tool_calls
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
        ));
    }

    match message.content {
        Some(text) if !text.trim().is_empty() => Ok(ModelReply::Final(text)),
        _ => Err(LlmError::InvalidResponse(
            "Message has neither content nor tool calls".to_string(),
        )),
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        match message {
            ChatMessage::System(content) => Self::text("system", content),
            ChatMessage::User(content) => Self::text("user", content),
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => Self {
                role: "assistant".to_string(),
                content: content.clone(),
                tool_calls: (!tool_calls.is_empty())
                    .then(|| tool_calls.iter().map(WireToolCall::from).collect()),
                tool_call_id: None,
            },
            ChatMessage::Tool { call_id, content } => Self {
                role: "tool".to_string(),
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: Some(call_id.clone()),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_kind(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef,
}

#[derive(Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolSpec> for WireTool {
    fn from(spec: &ToolSpec) -> Self {
        let mut properties = serde_json::Map::new();
        properties.insert(
            spec.parameter.clone(),
            serde_json::json!({
                "type": "string",
                "description": spec.parameter_description,
            }),
        );

        Self {
            kind: "function",
            function: WireFunctionDef {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": properties,
                    "required": [spec.parameter],
                }),
            },
        }
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct CompletionUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn weather_spec() -> ToolSpec {
        ToolSpec {
            name: "weather".to_string(),
            description: "Weather lookups".to_string(),
            parameter: "query".to_string(),
            parameter_description: "City and report kind".to_string(),
        }
    }

    async fn mock_completion(body: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    fn client_for(server: &MockServer) -> OpenAiChatClient {
        OpenAiChatClient::new("test-key".to_string(), Some(server.uri()), None)
    }

    #[test]
    fn test_defaults() {
        let client = OpenAiChatClient::new("k".to_string(), None, None);
        assert_eq!(client.base_url(), DEFAULT_LLM_BASE_URL);
        assert_eq!(client.model_name(), DEFAULT_LLM_MODEL);
    }

    #[test]
    fn test_tool_schema() {
        let tool = WireTool::from(&weather_spec());
        let json = serde_json::to_value(&tool).unwrap();

        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "weather");
        assert_eq!(json["function"]["parameters"]["required"][0], "query");
        assert_eq!(
            json["function"]["parameters"]["properties"]["query"]["type"],
            "string"
        );
    }

    #[test]
    fn test_message_wire_format() {
        let assistant = WireMessage::from(&ChatMessage::Assistant {
            content: None,
            tool_calls: vec![ToolCall {
                id: "call_1".to_string(),
                name: "weather".to_string(),
                arguments: r#"{"query":"London"}"#.to_string(),
            }],
        });
        let json = serde_json::to_value(&assistant).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json["content"].is_null());
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["tool_calls"][0]["function"]["arguments"], r#"{"query":"London"}"#);

        let tool = WireMessage::from(&ChatMessage::Tool {
            call_id: "call_1".to_string(),
            content: "12°C".to_string(),
        });
        let json = serde_json::to_value(&tool).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert!(json.get("tool_calls").is_none());
    }

    #[tokio::test]
    async fn test_final_answer() {
        let server = mock_completion(serde_json::json!({
            "model": "llama-3.3-70b-versatile",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Hello!" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 2 }
        }))
        .await;

        let reply = client_for(&server)
            .complete(&[ChatMessage::User("hi".to_string())], &[])
            .await
            .unwrap();
        assert_eq!(reply, ModelReply::Final("Hello!".to_string()));

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = requests[0].body_json().unwrap();
        assert_eq!(body["model"], DEFAULT_LLM_MODEL);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("tools").is_none());
    }

    #[tokio::test]
    async fn test_tool_call_reply() {
        let server = mock_completion(serde_json::json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": { "name": "weather", "arguments": "{\"query\":\"London\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .await;

        let reply = client_for(&server)
            .complete(
                &[ChatMessage::User("weather in London".to_string())],
                &[weather_spec()],
            )
            .await
            .unwrap();

        assert_eq!(
            reply,
            ModelReply::ToolCalls(vec![ToolCall {
                id: "call_abc".to_string(),
                name: "weather".to_string(),
                arguments: r#"{"query":"London"}"#.to_string(),
            }])
        );

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = requests[0].body_json().unwrap();
        assert_eq!(body["tools"][0]["function"]["name"], "weather");
    }

    #[tokio::test]
    async fn test_api_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete(&[ChatMessage::User("hi".to_string())], &[])
            .await
            .unwrap_err();

        match err {
            LlmError::Api { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_message_is_invalid() {
        let server = mock_completion(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "" } }]
        }))
        .await;

        let err = client_for(&server)
            .complete(&[ChatMessage::User("hi".to_string())], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_no_choices_is_invalid() {
        let server = mock_completion(serde_json::json!({ "choices": [] })).await;

        let err = client_for(&server)
            .complete(&[ChatMessage::User("hi".to_string())], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }
}
