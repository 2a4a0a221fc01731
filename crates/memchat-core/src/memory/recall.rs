//! ============================================================================
//! Recall - "Did this come up before?" questions
//! ============================================================================
//! Recall questions are detected lexically and answered Yes/No from memory
//! distances alone. No model call, no tools.
//! ============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::store::VectorMemoryStore;
use crate::types::Result;

/// Substrings that mark a message as a recall question (matched lower-case)
pub const RECALL_TRIGGERS: [&str; 6] = [
    "did i ask",
    "did i mention",
    "have i asked",
    "before",
    "earlier",
    "previous",
];

/// Default number of neighbours inspected by the gate
pub const DEFAULT_RECALL_K: usize = 3;

/// Default distance below which a memory counts as a match
pub const DEFAULT_RECALL_THRESHOLD: f32 = 0.6;

/// True if `text` contains any recall trigger, ignoring case.
/// Coarse on purpose: "the day before yesterday" also matches.
pub fn is_recall_question(text: &str) -> bool {
    let lower = text.to_lowercase();
    RECALL_TRIGGERS.iter().any(|trigger| lower.contains(trigger))
}

/// Binary answer to a recall question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecallAnswer {
    Yes,
    No,
}

impl RecallAnswer {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecallAnswer::Yes => "Yes",
            RecallAnswer::No => "No",
        }
    }
}

impl std::fmt::Display for RecallAnswer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answers recall questions from similarity distances
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceGate {
    pub k: usize,
    pub threshold: f32,
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self {
            k: DEFAULT_RECALL_K,
            threshold: DEFAULT_RECALL_THRESHOLD,
        }
    }
}

impl ConfidenceGate {
    pub fn new(k: usize, threshold: f32) -> Self {
        Self { k, threshold }
    }

    /// `Yes` if any of the `k` nearest memories is strictly closer than the
    /// threshold. Results arrive sorted, so the first qualifying hit is the
    /// closest one.
    pub async fn answer_recall(&self, store: &VectorMemoryStore, query: &str) -> Result<RecallAnswer> {
        let hits = store.search(query, self.k).await?;

        let answer = match hits.iter().find(|hit| hit.distance < self.threshold) {
            Some(hit) => {
                debug!(
                    "Recall match at distance {:.4} (record {})",
                    hit.distance, hit.insertion_index
                );
                RecallAnswer::Yes
            }
            None => {
                debug!(
                    "No recall match under {} (best: {:?})",
                    self.threshold,
                    hits.first().map(|h| h.distance)
                );
                RecallAnswer::No
            }
        };

        Ok(answer)
    }
}
