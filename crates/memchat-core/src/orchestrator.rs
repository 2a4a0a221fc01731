//! ============================================================================
//! Tool Orchestrator - Bounded reason/act loop
//! ============================================================================
//! ```text
//! Start ──► Decide ──final text──► Done
//!             │  ▲
//!     tool calls  └── observations appended to the scratchpad
//!             ▼  │
//!            Invoke (sequential, per-call timeout)
//! ```
//! After `max_tool_rounds` round-trips one last Decide is made with no tools
//! offered. Every failure ends as an `"Error: ..."` reply, never a panic or
//! an `Err` to the caller.
//! ============================================================================

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::llm::{ChatMessage, ChatModel, LlmError, ModelReply, ToolCall};
use crate::tools::{ToolOutcome, ToolRegistry};

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;

/// System instruction with retrieved memory spliced in
pub fn system_prompt(context: &str) -> String {
    format!(
        "You are a helpful assistant.\nRelevant past conversation:\n{}\nUse tools ONLY if required.",
        context
    )
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("no final answer after {0} tool rounds")]
    NoFinalAnswer(usize),
}

/// One executed tool call and what it observed
#[derive(Debug, Clone, PartialEq)]
pub struct ScratchpadEntry {
    pub call: ToolCall,
    /// Input string handed to the tool
    pub input: String,
    pub outcome: ToolOutcome,
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct Completion {
    pub answer: String,
    pub scratchpad: Vec<ScratchpadEntry>,
    /// Decide→Invoke round-trips taken
    pub rounds: usize,
}

pub struct ToolOrchestrator {
    model: Arc<dyn ChatModel>,
    max_tool_rounds: usize,
}

impl ToolOrchestrator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self::with_max_tool_rounds(model, DEFAULT_MAX_TOOL_ROUNDS)
    }

    pub fn with_max_tool_rounds(model: Arc<dyn ChatModel>, max_tool_rounds: usize) -> Self {
        Self {
            model,
            max_tool_rounds,
        }
    }

    /// Produce a reply for `user_message`. Always returns text.
    pub async fn run(&self, user_message: &str, context: &str, tools: &ToolRegistry) -> String {
        match self.run_detailed(user_message, context, tools).await {
            Ok(completion) => completion.answer,
            Err(e) => {
                error!("Orchestration failed: {}", e);
                format!("Error: {}", e)
            }
        }
    }

    /// Same loop as `run`, exposing the scratchpad and the failure cause
    pub async fn run_detailed(
        &self,
        user_message: &str,
        context: &str,
        tools: &ToolRegistry,
    ) -> Result<Completion, OrchestrationError> {
        let specs = tools.specs();
        let mut messages = vec![
            ChatMessage::System(system_prompt(context)),
            ChatMessage::User(user_message.to_string()),
        ];
        let mut scratchpad = Vec::new();

        for round in 0..self.max_tool_rounds {
            debug!("Decide step {} with {} messages", round + 1, messages.len());

            let calls = match self.model.complete(&messages, &specs).await? {
                ModelReply::Final(answer) => {
                    info!("Answered after {} tool round(s)", round);
                    return Ok(Completion {
                        answer,
                        scratchpad,
                        rounds: round,
                    });
                }
                ModelReply::ToolCalls(calls) if calls.is_empty() => {
                    return Err(LlmError::InvalidResponse(
                        "reply contained neither text nor tool calls".to_string(),
                    )
                    .into());
                }
                ModelReply::ToolCalls(calls) => calls,
            };

            messages.push(ChatMessage::Assistant {
                content: None,
                tool_calls: calls.clone(),
            });

            for call in calls {
                let (input, outcome) = tools.invoke_call(&call).await;
                debug!("Tool '{}' observed: {}", call.name, outcome.text());
                messages.push(ChatMessage::Tool {
                    call_id: call.id.clone(),
                    content: outcome.text().to_string(),
                });
                scratchpad.push(ScratchpadEntry {
                    call,
                    input,
                    outcome,
                });
            }
        }

        warn!(
            "Reached {} tool rounds, asking for a final answer without tools",
            self.max_tool_rounds
        );

        match self.model.complete(&messages, &[]).await {
            Ok(ModelReply::Final(answer)) if !answer.trim().is_empty() => Ok(Completion {
                answer,
                scratchpad,
                rounds: self.max_tool_rounds,
            }),
            Ok(_) | Err(LlmError::InvalidResponse(_)) => {
                Err(OrchestrationError::NoFinalAnswer(self.max_tool_rounds))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolSpec;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned replies and records what it was sent
    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<ModelReply, LlmError>>>,
        seen: Mutex<Vec<(Vec<ChatMessage>, usize)>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<ModelReply, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<(Vec<ChatMessage>, usize)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            tools: &[ToolSpec],
        ) -> Result<ModelReply, LlmError> {
            self.seen.lock().unwrap().push((messages.to_vec(), tools.len()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Request("script exhausted".to_string())))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "Upper-cases its input"
        }

        fn error_label(&self) -> &str {
            "Upper error"
        }

        async fn run(&self, input: &str) -> anyhow::Result<ToolOutcome> {
            Ok(ToolOutcome::Success(input.to_uppercase()))
        }
    }

    fn tools() -> ToolRegistry {
        ToolRegistry::new(Duration::from_secs(1)).with_tool(UpperTool)
    }

    fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[test]
    fn test_system_prompt_layout() {
        assert_eq!(
            system_prompt("User: hi\nAssistant: hello"),
            "You are a helpful assistant.\nRelevant past conversation:\nUser: hi\nAssistant: hello\nUse tools ONLY if required."
        );
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let model = ScriptedModel::new(vec![Ok(ModelReply::Final("Hello!".to_string()))]);
        let orchestrator = ToolOrchestrator::new(model.clone());

        let reply = orchestrator.run("hi", "Conversation started", &tools()).await;
        assert_eq!(reply, "Hello!");

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1, 1);
        assert_eq!(
            requests[0].0[0],
            ChatMessage::System(system_prompt("Conversation started"))
        );
        assert_eq!(requests[0].0[1], ChatMessage::User("hi".to_string()));
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::ToolCalls(vec![call("c1", "upper", r#"{"query":"abc"}"#)])),
            Ok(ModelReply::Final("It is ABC".to_string())),
        ]);
        let orchestrator = ToolOrchestrator::new(model.clone());

        let completion = orchestrator
            .run_detailed("shout abc", "", &tools())
            .await
            .unwrap();
        assert_eq!(completion.answer, "It is ABC");
        assert_eq!(completion.rounds, 1);
        assert_eq!(completion.scratchpad.len(), 1);
        assert_eq!(completion.scratchpad[0].input, "abc");
        assert_eq!(
            completion.scratchpad[0].outcome,
            ToolOutcome::Success("ABC".to_string())
        );

        let second = &model.requests()[1].0;
        assert_eq!(
            second.last(),
            Some(&ChatMessage::Tool {
                call_id: "c1".to_string(),
                content: "ABC".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_observation() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::ToolCalls(vec![call("c1", "teleport", r#"{"query":"Mars"}"#)])),
            Ok(ModelReply::Final("I can't do that.".to_string())),
        ]);
        let orchestrator = ToolOrchestrator::new(model.clone());

        let reply = orchestrator.run("go to Mars", "", &tools()).await;
        assert_eq!(reply, "I can't do that.");
        assert_eq!(
            model.requests()[1].0.last(),
            Some(&ChatMessage::Tool {
                call_id: "c1".to_string(),
                content: "Unknown tool: teleport".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_cap_forces_final_answer_without_tools() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::ToolCalls(vec![call("c1", "upper", "\"a\"")])),
            Ok(ModelReply::ToolCalls(vec![call("c2", "upper", "\"b\"")])),
            Ok(ModelReply::Final("done".to_string())),
        ]);
        let orchestrator = ToolOrchestrator::with_max_tool_rounds(model.clone(), 2);

        let completion = orchestrator.run_detailed("loop", "", &tools()).await.unwrap();
        assert_eq!(completion.answer, "done");
        assert_eq!(completion.rounds, 2);

        let requests = model.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2].1, 0);
    }

    #[tokio::test]
    async fn test_cap_without_text_is_error_reply() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::ToolCalls(vec![call("c1", "upper", "\"a\"")])),
            Ok(ModelReply::ToolCalls(vec![call("c2", "upper", "\"b\"")])),
        ]);
        let orchestrator = ToolOrchestrator::with_max_tool_rounds(model, 1);

        let reply = orchestrator.run("loop", "", &tools()).await;
        assert_eq!(reply, "Error: no final answer after 1 tool rounds");
    }

    #[tokio::test]
    async fn test_model_error_becomes_reply() {
        let model = ScriptedModel::new(vec![Err(LlmError::Api {
            status: 500,
            body: "overloaded".to_string(),
        })]);
        let orchestrator = ToolOrchestrator::new(model);

        let reply = orchestrator.run("hi", "", &tools()).await;
        assert_eq!(reply, "Error: LLM API error 500: overloaded");
    }

    #[tokio::test]
    async fn test_zero_rounds_goes_straight_to_synthesis() {
        let model = ScriptedModel::new(vec![Ok(ModelReply::Final("plain".to_string()))]);
        let orchestrator = ToolOrchestrator::with_max_tool_rounds(model.clone(), 0);

        assert_eq!(orchestrator.run("hi", "", &tools()).await, "plain");
        assert_eq!(model.requests()[0].1, 0);
    }
}
