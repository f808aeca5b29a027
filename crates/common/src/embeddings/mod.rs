//! Embedding service abstraction
//!
//! Provides a unified interface for the query embedding backends:
//! - OpenAI (text-embedding-3-small and friends, server-side dimensions)
//! - Deterministic hash backend for offline and air-gapped deployments

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Truncate or zero-pad a vector to exactly `dim` values
pub fn resize_vector(mut values: Vec<f32>, dim: usize) -> Vec<f32> {
    values.truncate(dim);
    while values.len() < dim {
        values.push(0.0);
    }
    values
}

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct OpenAIRequest {
    input: Vec<String>,
    model: String,
    dimensions: usize,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder from configuration
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "Embedding provider 'openai' requires an API key".to_string(),
            })?
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            max_retries: config.max_retries,
        })
    }

    /// Make request with retry
    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_error = None;

        for attempt in 0..self.max_retries.max(1) {
            if attempt > 0 {
                // Exponential backoff
                let delay = Duration::from_millis(100 * 2_u64.pow(attempt));
                tokio::time::sleep(delay).await;
            }

            match self.make_request(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Embedding request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::EmbeddingError {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = OpenAIRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
            dimensions: self.dimension,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::EmbeddingError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: OpenAIResponse =
            response
                .json()
                .await
                .map_err(|e| AppError::EmbeddingError {
                    message: format!("Failed to parse response: {}", e),
                })?;

        Ok(result
            .data
            .into_iter()
            .map(|e| resize_vector(e.embedding, self.dimension))
            .collect())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request_with_retry(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::EmbeddingError {
                message: "Empty response".to_string(),
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // OpenAI caps texts per request well above this
        const BATCH_SIZE: usize = 100;

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let embeddings = self.request_with_retry(chunk).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic embedder derived from a sha256 digest of the text.
/// Offline-safe and stable across processes, which keeps retrieval
/// reproducible without a hosted backend.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let digest = Sha256::digest(text.as_bytes());

        let values = (0..self.dimension)
            .map(|i| {
                let left = digest[(2 * i) % digest.len()] as u32;
                let right = digest[(2 * i + 1) % digest.len()] as u32;
                ((left << 8) | right) as f32 / 65535.0
            })
            .collect();

        Ok(values)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        "hash-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn has_api_key(config: &EmbeddingConfig) -> bool {
    config
        .api_key
        .as_deref()
        .map(str::trim)
        .is_some_and(|k| !k.is_empty())
}

/// Provider the configuration resolves to: "openai" or "hash"
pub fn resolved_provider(config: &EmbeddingConfig) -> Result<&'static str> {
    match config.provider.trim().to_lowercase().as_str() {
        "auto" => {
            if has_api_key(config) {
                Ok("openai")
            } else {
                Ok("hash")
            }
        }
        "openai" => Ok("openai"),
        "local" | "hash" => Ok("hash"),
        other => Err(AppError::Configuration {
            message: format!(
                "Unknown embedding provider '{}'. Allowed: auto, openai, local",
                other
            ),
        }),
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    if config.dimension == 0 {
        return Err(AppError::Configuration {
            message: "Embedding dimension must be at least 1".to_string(),
        });
    }

    match resolved_provider(config)? {
        "openai" => Ok(Arc::new(OpenAIEmbedder::from_config(config)?)),
        _ => Ok(Arc::new(HashEmbedder::new(config.dimension))),
    }
}

/// Query-time embedder with an optional deterministic fallback.
///
/// The fallback engages only when the primary resolved to the hosted
/// backend and the configuration allows it. Vectors always come back
/// at the configured dimension.
pub struct QueryEmbedder {
    primary: Arc<dyn Embedder>,
    fallback: Option<Arc<dyn Embedder>>,
    dimension: usize,
}

impl QueryEmbedder {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let primary = create_embedder(config)?;
        let fallback = if config.allow_hash_fallback && resolved_provider(config)? == "openai" {
            Some(Arc::new(HashEmbedder::new(config.dimension)) as Arc<dyn Embedder>)
        } else {
            None
        };

        Ok(Self {
            primary,
            fallback,
            dimension: config.dimension,
        })
    }

    /// Wrap an existing embedder without a fallback
    pub fn without_fallback(primary: Arc<dyn Embedder>) -> Self {
        let dimension = primary.dimension();
        Self {
            primary,
            fallback: None,
            dimension,
        }
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Primary embedder, for paths that must not degrade silently
    pub fn primary(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.primary)
    }

    /// Embed a query, engaging the fallback when the primary fails
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let started = Instant::now();
        let primary_err = match self.primary.embed(text).await {
            Ok(values) => {
                metrics::record_embedding(
                    started.elapsed().as_secs_f64(),
                    self.primary.model_name(),
                    true,
                );
                return Ok(resize_vector(values, self.dimension));
            }
            Err(e) => {
                metrics::record_embedding(
                    started.elapsed().as_secs_f64(),
                    self.primary.model_name(),
                    false,
                );
                e
            }
        };

        let Some(ref fallback) = self.fallback else {
            return Err(primary_err);
        };

        tracing::warn!(error = %primary_err, "Primary embedder failed, using hash fallback");

        let fallback_started = Instant::now();
        match fallback.embed(text).await {
            Ok(values) => {
                metrics::record_embedding(
                    fallback_started.elapsed().as_secs_f64(),
                    fallback.model_name(),
                    true,
                );
                Ok(resize_vector(values, self.dimension))
            }
            Err(fallback_err) => Err(AppError::EmbeddingError {
                message: format!("{} (local fallback failed: {})", primary_err, fallback_err),
            }),
        }
    }
}
