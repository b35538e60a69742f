use crate::history::SimilarQuery;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("vector index unavailable: {0}")]
    Unavailable(String),
}

/// Nearest-neighbor index over question embeddings.
///
/// May be entirely absent from a history store, in which case retrieval runs
/// in keyword-only mode permanently.
pub trait VectorIndex: Send + Sync {
    fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        payload: SimilarQuery,
    ) -> Result<(), VectorIndexError>;

    /// Ranked payloads for the `k` nearest stored vectors, best first.
    fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<SimilarQuery>, VectorIndexError>;
}

/// In-process cosine-similarity index. Rebuilt from the history table at
/// store construction; shared across pipeline instances via the store.
#[derive(Default)]
pub struct MemoryVectorIndex {
    entries: RwLock<HashMap<String, (Vec<f32>, SimilarQuery)>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for MemoryVectorIndex {
    fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        payload: SimilarQuery,
    ) -> Result<(), VectorIndexError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| VectorIndexError::Unavailable("index lock poisoned".to_string()))?;
        entries.insert(id.to_string(), (vector.to_vec(), payload));
        Ok(())
    }

    fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<SimilarQuery>, VectorIndexError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| VectorIndexError::Unavailable("index lock poisoned".to_string()))?;

        let mut scored: Vec<(f32, SimilarQuery)> = entries
            .values()
            .map(|(stored, payload)| (cosine_similarity(vector, stored), payload.clone()))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(k).map(|(_, payload)| payload).collect())
    }
}

/// Cosine similarity; 0.0 for mismatched widths or zero-length vectors.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
