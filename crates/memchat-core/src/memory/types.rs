//! ============================================================================
//! Memory Types - Data structures for conversation memory
//! ============================================================================
//! Defines stored records, ranked search hits, and store statistics.
//! ============================================================================

use serde::{Deserialize, Serialize};

/// Text of the record every store is seeded with
pub const SEED_TEXT: &str = "Conversation started";

/// A single committed entry in the vector memory. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// The remembered text
    pub text: String,
    /// Vector embedding (not serialized to the terminal view)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    /// Position in the store, starting at 0 for the seed record
    pub insertion_index: usize,
}

impl MemoryRecord {
    pub(crate) fn new(text: String, embedding: Vec<f32>, insertion_index: usize) -> Self {
        Self {
            text,
            embedding,
            insertion_index,
        }
    }
}

/// One ranked result of a nearest-neighbour search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    /// Squared L2 distance to the query; smaller is more similar
    pub distance: f32,
    pub insertion_index: usize,
}

/// Store statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub records: usize,
    pub dimension: usize,
    pub model: String,
}

/// Format a committed turn the way it is written into memory
pub fn format_memory_entry(user_input: &str, reply: &str) -> String {
    format!("User: {}\nAssistant: {}", user_input, reply)
}
