//! ============================================================================
//! Embedding Service - Vector embeddings for semantic memory search
//! ============================================================================
//! Two embedders share the `Embedder` interface:
//! - `EmbeddingService`: any OpenAI-compatible `/embeddings` endpoint
//! - `LocalEmbedder`: all-MiniLM-L6-v2 through fastembed, used when no
//!   embedding API key is configured
//! Both are expected to return unit-length vectors.
//! ============================================================================

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use once_cell::sync::OnceCell;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tracing::{debug, info, warn};

use crate::types::{ChatError, Result};

/// Default embedding model (OpenAI compatible)
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default base URL for the embedding API
pub const DEFAULT_EMBEDDING_BASE_URL: &str = "https://api.openai.com/v1";

/// Text to vector mapping. Must be deterministic for identical input.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embeddings for multiple texts, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Name of the model backing this embedder
    fn model(&self) -> &str;

    /// Generate embedding for a single text
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Embedding("No embedding returned".to_string()))
    }
}

/// Embedding service for an OpenAI-compatible HTTP API
pub struct EmbeddingService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    model: String,
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl EmbeddingService {
    /// Create a new embedding service using the OpenAI API
    pub fn new_openai(api_key: String) -> Self {
        Self::new_custom(
            api_key,
            DEFAULT_EMBEDDING_BASE_URL.to_string(),
            DEFAULT_EMBEDDING_MODEL.to_string(),
        )
    }

    /// Create with custom base URL and model
    pub fn new_custom(api_key: String, base_url: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::Embedding(format!("Failed to send embedding request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChatError::Embedding(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(ChatError::Embedding(format!(
                    "Embedding API error ({}): {}",
                    status, error.error.message
                )));
            }
            return Err(ChatError::Embedding(format!(
                "Embedding API error ({}): {}",
                status, body
            )));
        }

        let embedding_response: EmbeddingResponse = serde_json::from_str(&body).map_err(|e| {
            ChatError::Embedding(format!(
                "Failed to parse embedding response: {} - body: {}",
                e, body
            ))
        })?;

        if let Some(usage) = &embedding_response.usage {
            debug!(
                "Embedding tokens used: {} (model: {})",
                usage.total_tokens, embedding_response.model
            );
        }

        if embedding_response.data.len() != texts.len() {
            return Err(ChatError::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embedding_response.data.len()
            )));
        }

        // Sort by index and extract embeddings
        let mut embeddings: Vec<(usize, Vec<f32>)> = embedding_response
            .data
            .into_iter()
            .map(|d| (d.index, d.embedding))
            .collect();
        embeddings.sort_by_key(|(idx, _)| *idx);

        Ok(embeddings.into_iter().map(|(_, e)| e).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Output dimension of all-MiniLM-L6-v2
pub const LOCAL_EMBEDDING_DIM: usize = 384;

/// Name reported for the local model
pub const LOCAL_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

/// Local sentence embedder backed by fastembed's all-MiniLM-L6-v2.
///
/// The model is downloaded and loaded on the first `embed` call and then
/// shared by every clone. Inference runs on the blocking pool since
/// fastembed is synchronous.
#[derive(Clone)]
pub struct LocalEmbedder {
    model_name: EmbeddingModel,
    model: Arc<OnceCell<Arc<TextEmbedding>>>,
}

impl LocalEmbedder {
    /// The model is not loaded until the first embedding call
    pub fn new() -> Self {
        Self {
            model_name: EmbeddingModel::AllMiniLML6V2,
            model: Arc::new(OnceCell::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        LOCAL_EMBEDDING_DIM
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    fn get_or_init_model(
        cell: &OnceCell<Arc<TextEmbedding>>,
        model_name: &EmbeddingModel,
    ) -> Result<Arc<TextEmbedding>> {
        cell.get_or_try_init(|| {
            info!(model = ?model_name, "Initializing local embedding model");

            let mut options = InitOptions::new(model_name.clone());
            options.show_download_progress = true;
            let model = TextEmbedding::try_new(options).map_err(|e| {
                ChatError::Embedding(format!("Failed to initialize embedding model: {}", e))
            })?;

            info!(
                model = ?model_name,
                dimension = LOCAL_EMBEDDING_DIM,
                "Local embedding model initialized"
            );
            Ok(Arc::new(model))
        })
        .cloned()
    }
}

impl Default for LocalEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let cell = Arc::clone(&self.model);
        let model_name = self.model_name.clone();
        let texts = texts.to_vec();

        let embeddings = task::spawn_blocking(move || {
            let model = Self::get_or_init_model(&cell, &model_name)?;
            model.embed(texts, None).map_err(|e| {
                ChatError::Embedding(format!("Failed to generate embeddings: {}", e))
            })
        })
        .await
        .map_err(|e| ChatError::Embedding(format!("Embedding task failed: {}", e)))??;

        debug!(
            batch_size = embeddings.len(),
            dimension = embeddings.first().map(|e| e.len()).unwrap_or(0),
            "Generated local embeddings"
        );

        Ok(embeddings.into_iter().map(normalize).collect())
    }

    fn model(&self) -> &str {
        LOCAL_EMBEDDING_MODEL
    }
}

/// Scale to unit length so squared L2 stays in [0, 4]
fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

/// Create an embedder: the HTTP service when a key is available, otherwise
/// the local MiniLM model
pub fn create_embedder(
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
) -> Arc<dyn Embedder> {
    match api_key.filter(|key| !key.is_empty()) {
        Some(key) => {
            let base_url = base_url.unwrap_or_else(|| DEFAULT_EMBEDDING_BASE_URL.to_string());
            let model = model.unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());
            debug!("Using {} at {} for embeddings", model, base_url);
            Arc::new(EmbeddingService::new_custom(key, base_url, model))
        }
        None => {
            warn!("No embedding API key configured, falling back to local {}", LOCAL_EMBEDDING_MODEL);
            Arc::new(LocalEmbedder::default())
        }
    }
}
