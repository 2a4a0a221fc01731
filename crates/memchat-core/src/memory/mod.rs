//! ============================================================================
//! Memory Module - Volatile semantic memory for one conversation
//! ============================================================================
//! Every processed message is embedded and appended to a per-session vector
//! store. The store answers two kinds of questions:
//!
//! ## Flow
//! ```text
//! User Message ──► is_recall_question? ──yes──► ConfidenceGate ──► "Yes" / "No"
//!                          │
//!                          no
//!                          ▼
//!                  search(k) ──► context for the tool orchestrator
//!
//! Reply ──► "User: {input}\nAssistant: {reply}" ──► VectorMemoryStore::add
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use memchat_core::memory::{LocalEmbedder, VectorMemoryStore, ConfidenceGate};
//!
//! let mut store = VectorMemoryStore::new(Arc::new(LocalEmbedder::default())).await?;
//! store.add("User: weather in Tokyo\nAssistant: 22°C").await?;
//!
//! let hits = store.search("Tokyo", 3).await?;
//! let answer = ConfidenceGate::default().answer_recall(&store, "did I ask about Tokyo earlier").await?;
//! ```
//! ============================================================================

mod embeddings;
mod recall;
mod store;
mod types;

// Re-export public types
pub use embeddings::{
    create_embedder, Embedder, EmbeddingService, LocalEmbedder, DEFAULT_EMBEDDING_BASE_URL,
    DEFAULT_EMBEDDING_MODEL, LOCAL_EMBEDDING_DIM, LOCAL_EMBEDDING_MODEL,
};
pub use recall::{
    is_recall_question, ConfidenceGate, RecallAnswer, DEFAULT_RECALL_K,
    DEFAULT_RECALL_THRESHOLD, RECALL_TRIGGERS,
};
pub use store::VectorMemoryStore;
pub use types::{format_memory_entry, MemoryRecord, MemoryStats, SearchHit, SEED_TEXT};
