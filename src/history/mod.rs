pub mod store;
pub mod vector;

pub use store::DuckDbHistory;
pub use vector::{MemoryVectorIndex, VectorIndex, VectorIndexError};

use crate::embed::EmbedError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("history database error: {0}")]
    Database(String),
    #[error(transparent)]
    Embedding(#[from] EmbedError),
}

/// Read-only projection of a stored record, used as few-shot context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarQuery {
    pub question: String,
    pub sql: String,
    pub was_successful: bool,
    pub execution_time: f64,
}

/// Projection returned by chronological history listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub question: String,
    pub sql: String,
    pub was_successful: bool,
    pub execution_time: f64,
    pub timestamp: String,
}

/// Durable, content-addressed storage of question/SQL outcomes with
/// similarity retrieval.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert-or-replace the record for `question`. A second call for the
    /// same question fully supersedes the first; nothing is merged.
    async fn upsert(
        &self,
        question: &str,
        sql: &str,
        execution_time: f64,
        was_successful: bool,
        result_preview: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Up to `top_k` stored records, most similar first. Vector-backend
    /// failures silently degrade to keyword search; they never surface here.
    async fn retrieve_similar(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<SimilarQuery>, StorageError>;

    /// Most recent records first, up to `limit`.
    async fn list_recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, StorageError>;
}

/// Stable identifier derived from the exact question text. Case- and
/// whitespace-sensitive; re-asking the same question overwrites its record.
pub fn record_id(question: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(question.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Keyword tokens for fallback search: lowercase whitespace-separated words
/// longer than three characters.
pub(crate) fn keyword_tokens(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split_whitespace()
        .filter(|word| word.chars().count() > 3)
        .map(|word| word.to_string())
        .collect()
}
