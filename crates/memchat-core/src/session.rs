//! ============================================================================
//! Chat Session - Per-conversation state and message handling
//! ============================================================================
//! A session owns its history and its memory store. The orchestrator and
//! tool registry are immutable and may be shared between sessions.
//! ============================================================================

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ChatConfig;
use crate::memory::{
    format_memory_entry, is_recall_question, ConfidenceGate, Embedder, VectorMemoryStore,
    DEFAULT_RECALL_K,
};
use crate::orchestrator::ToolOrchestrator;
use crate::tools::ToolRegistry;
use crate::types::{render_transcript, ConversationTurn, Result};

/// Everything one conversation accumulates
pub struct SessionState {
    pub id: Uuid,
    /// Unix timestamp
    pub started_at: i64,
    pub history: Vec<ConversationTurn>,
    pub memory: VectorMemoryStore,
}

impl SessionState {
    /// Empty history and a freshly seeded memory store
    pub async fn new(embedder: Arc<dyn Embedder>) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            started_at: chrono::Utc::now().timestamp(),
            history: Vec::new(),
            memory: VectorMemoryStore::new(embedder).await?,
        })
    }
}

pub struct ChatSession {
    state: SessionState,
    orchestrator: Arc<ToolOrchestrator>,
    tools: Arc<ToolRegistry>,
    gate: ConfidenceGate,
    retrieval_k: usize,
}

impl ChatSession {
    pub async fn new(
        orchestrator: Arc<ToolOrchestrator>,
        tools: Arc<ToolRegistry>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let state = SessionState::new(embedder).await?;
        info!("Started session {}", state.id);
        Ok(Self {
            state,
            orchestrator,
            tools,
            gate: ConfidenceGate::default(),
            retrieval_k: DEFAULT_RECALL_K,
        })
    }

    /// Wire up model, tools, and embedder from configuration
    pub async fn from_config(config: &ChatConfig) -> Result<Self> {
        let model = config.build_chat_model()?;
        let orchestrator = Arc::new(ToolOrchestrator::with_max_tool_rounds(
            model,
            config.max_tool_rounds,
        ));
        let tools = Arc::new(ToolRegistry::from_config(config));
        Ok(Self::new(orchestrator, tools, config.build_embedder())
            .await?
            .with_gate(config.confidence_gate())
            .with_retrieval_k(config.retrieval_k))
    }

    pub fn with_gate(mut self, gate: ConfidenceGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_retrieval_k(mut self, retrieval_k: usize) -> Self {
        self.retrieval_k = retrieval_k;
        self
    }

    /// Process one user message and return the reply.
    ///
    /// Recall questions are answered "Yes"/"No" from memory alone. Everything
    /// else goes through the orchestrator with retrieved context. The
    /// exchange is then committed to memory and history. Embedding failures
    /// propagate; model and tool failures come back as reply text.
    pub async fn handle(&mut self, user_input: &str) -> Result<String> {
        self.state.history.push(ConversationTurn::user(user_input));

        let reply = if is_recall_question(user_input) {
            debug!("Recall question, answering from memory");
            self.gate
                .answer_recall(&self.state.memory, user_input)
                .await?
                .to_string()
        } else {
            let hits = self.state.memory.search(user_input, self.retrieval_k).await?;
            let context = hits
                .iter()
                .map(|hit| hit.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            debug!("Retrieved {} memory snippet(s) as context", hits.len());
            self.orchestrator.run(user_input, &context, &self.tools).await
        };

        self.state
            .memory
            .add(&format_memory_entry(user_input, &reply))
            .await?;
        self.state.history.push(ConversationTurn::assistant(reply.clone()));

        Ok(reply)
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.state.history
    }

    pub fn memory(&self) -> &VectorMemoryStore {
        &self.state.memory
    }

    /// History in insertion order, one `Role: content` block per turn
    pub fn transcript(&self) -> String {
        render_transcript(&self.state.history)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn id(&self) -> Uuid {
        self.state.id
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }
}
