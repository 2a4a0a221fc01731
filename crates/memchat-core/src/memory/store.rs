//! ============================================================================
//! Memory Store - In-process vector memory
//! ============================================================================
//! Append-only set of embedded records searched by exhaustive squared-L2
//! distance. Lives only as long as its session; there is no eviction.
//! ============================================================================

use std::sync::Arc;
use tracing::debug;

use super::embeddings::Embedder;
use super::types::{MemoryRecord, MemoryStats, SearchHit, SEED_TEXT};
use crate::types::{ChatError, Result};

/// Vector memory for one conversation
pub struct VectorMemoryStore {
    embedder: Arc<dyn Embedder>,
    records: Vec<MemoryRecord>,
}

impl VectorMemoryStore {
    /// Create a store holding only the seed record
    pub async fn new(embedder: Arc<dyn Embedder>) -> Result<Self> {
        let mut store = Self {
            embedder,
            records: Vec::new(),
        };
        store.add(SEED_TEXT).await?;
        Ok(store)
    }

    /// Embed `text` and append it as a new record. Returns its insertion index.
    pub async fn add(&mut self, text: &str) -> Result<usize> {
        let embedding = self.embedder.embed_single(text).await?;
        self.check_dimension(&embedding)?;

        let index = self.records.len();
        self.records
            .push(MemoryRecord::new(text.to_string(), embedding, index));

        debug!("Stored memory record {} ({} chars)", index, text.len());
        Ok(index)
    }

    /// The `k` records nearest to `query`, ascending by distance.
    /// Equal distances keep insertion order.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let query_embedding = self.embedder.embed_single(query).await?;
        self.check_dimension(&query_embedding)?;

        let mut hits: Vec<SearchHit> = self
            .records
            .iter()
            .map(|record| SearchHit {
                text: record.text.clone(),
                distance: squared_l2(&record.embedding, &query_embedding),
                insertion_index: record.insertion_index,
            })
            .collect();

        // Stable sort, so ties stay in insertion order
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);

        debug!(
            "Memory search returned {} of {} records (best distance: {:?})",
            hits.len(),
            self.records.len(),
            hits.first().map(|h| h.distance)
        );
        Ok(hits)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in insertion order
    pub fn records(&self) -> &[MemoryRecord] {
        &self.records
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            records: self.records.len(),
            dimension: self.dimension().unwrap_or(0),
            model: self.embedder.model().to_string(),
        }
    }

    fn dimension(&self) -> Option<usize> {
        self.records.first().map(|r| r.embedding.len())
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.is_empty() {
            return Err(ChatError::Memory(
                "Cannot store or search with an empty embedding".to_string(),
            ));
        }

        match self.dimension() {
            Some(dim) if dim != embedding.len() => Err(ChatError::Memory(format!(
                "Embedding dimension mismatch: store has {}, got {}",
                dim,
                embedding.len()
            ))),
            _ => Ok(()),
        }
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
