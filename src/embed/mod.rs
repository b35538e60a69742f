use crate::config::EmbeddingConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors from embedding backends.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding connection error: {0}")]
    Connection(String),
    #[error("embedding response error: {0}")]
    Response(String),
    #[error("embedding configuration error: {0}")]
    Config(String),
}

/// Maps a question string to a fixed-width vector.
///
/// Implementations must be deterministic for identical input within a session;
/// stability across model upgrades is not assumed.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Width of the vectors this embedder produces.
    fn dimension(&self) -> usize;
}

/// Selects the embedding backend named in [`EmbeddingConfig`] and fronts it
/// behind the [`Embedder`] trait.
pub struct EmbedderManager {
    embedder: Box<dyn Embedder>,
}

impl EmbedderManager {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let embedder: Box<dyn Embedder> = match config.backend.as_str() {
            "ollama" => Box::new(OllamaEmbedder::new(config)),
            _ => {
                return Err(EmbedError::Config(format!(
                    "Unsupported embedding backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self { embedder })
    }

    /// Wraps an already-built embedder, mainly so tests can substitute stubs.
    pub fn with_embedder(embedder: Box<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

impl std::fmt::Debug for EmbedderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedderManager").finish_non_exhaustive()
    }
}

#[async_trait]
impl Embedder for EmbedderManager {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embedder.embed(text).await
    }

    fn dimension(&self) -> usize {
        self.embedder.dimension()
    }
}

/// Ollama-style embeddings endpoint.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    api_url: String,
    model: String,
    dimension: usize,
}

#[derive(Serialize, Debug)]
struct EmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434/api/embeddings".to_string());

        Self {
            client: reqwest::Client::new(),
            api_url,
            model: config.model.clone(),
            dimension: config.dimension,
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        debug!("Requesting embedding from {} for {} chars", self.api_url, text.len());

        let request = EmbeddingRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbedError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbedError::Response(format!(
                "embedding API responded with status code: {}",
                response.status()
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Response(e.to_string()))?;

        if parsed.embedding.is_empty() {
            return Err(EmbedError::Response("empty embedding in response".to_string()));
        }

        Ok(parsed.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            backend: backend.to_string(),
            api_url: None,
            model: "all-minilm".to_string(),
            dimension: 384,
        }
    }

    #[test]
    fn manager_builds_ollama_backend() {
        let manager = EmbedderManager::new(&config("ollama")).unwrap();
        assert_eq!(manager.dimension(), 384);
    }

    #[test]
    fn manager_rejects_unknown_backend() {
        let err = EmbedderManager::new(&config("quantum")).unwrap_err();
        assert!(matches!(err, EmbedError::Config(_)));
    }
}
