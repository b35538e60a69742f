use crate::config::DatabaseConfig;
use crate::db::executor::DuckDbConnectionManager;
use crate::embed::Embedder;
use crate::history::{
    keyword_tokens, record_id, HistoryEntry, HistoryStore, SimilarQuery, StorageError, VectorIndex,
};
use async_trait::async_trait;
use duckdb::params;
use r2d2::Pool;
use regex::RegexBuilder;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CREATE_HISTORY_TABLE: &str = "
CREATE TABLE IF NOT EXISTS query_history (
    id VARCHAR PRIMARY KEY,
    question VARCHAR NOT NULL,
    generated_sql VARCHAR NOT NULL,
    embedding VARCHAR,
    execution_time DOUBLE NOT NULL,
    was_successful BOOLEAN NOT NULL,
    result_preview VARCHAR,
    created_at VARCHAR NOT NULL
)";

/// Query history in a DuckDB file, with an optional nearest-neighbor index
/// over question embeddings.
///
/// The index is probed when it first fails; after that the store stays in
/// keyword-only mode rather than retrying a broken backend on every call.
pub struct DuckDbHistory {
    pool: Pool<DuckDbConnectionManager>,
    embedder: Arc<dyn Embedder>,
    index: Option<Box<dyn VectorIndex>>,
    degraded: AtomicBool,
}

impl DuckDbHistory {
    pub fn new(
        config: &DatabaseConfig,
        embedder: Arc<dyn Embedder>,
        index: Option<Box<dyn VectorIndex>>,
    ) -> Result<Self, StorageError> {
        let manager = DuckDbConnectionManager::new(config.history_path.clone());
        let pool = Pool::builder()
            .max_size(config.pool_size as u32)
            .build(manager)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        {
            let conn = pool.get().map_err(|e| StorageError::Database(e.to_string()))?;
            conn.execute(CREATE_HISTORY_TABLE, [])
                .map_err(|e| StorageError::Database(e.to_string()))?;
        }

        let store = Self {
            pool,
            embedder,
            index,
            degraded: AtomicBool::new(false),
        };

        if store.index.is_some() {
            store.rebuild_index()?;
        }

        Ok(store)
    }

    /// Loads stored embeddings into the vector index. An index that cannot
    /// accept them marks the store degraded; rows without a parseable
    /// embedding are skipped.
    fn rebuild_index(&self) -> Result<(), StorageError> {
        let Some(index) = &self.index else {
            return Ok(());
        };

        let conn = self
            .pool
            .get()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, question, generated_sql, was_successful, execution_time, embedding
                 FROM query_history WHERE embedding IS NOT NULL",
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    SimilarQuery {
                        question: row.get(1)?,
                        sql: row.get(2)?,
                        was_successful: row.get(3)?,
                        execution_time: row.get(4)?,
                    },
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut loaded = 0usize;
        for row in rows {
            let (id, payload, embedding_json) =
                row.map_err(|e| StorageError::Database(e.to_string()))?;

            let Ok(vector) = serde_json::from_str::<Vec<f32>>(&embedding_json) else {
                warn!("Skipping history row {} with unparseable embedding", id);
                continue;
            };

            if let Err(e) = index.upsert(&id, &vector, payload) {
                warn!("Vector index rejected history rows, degrading to keyword search: {}", e);
                self.degraded.store(true, Ordering::Relaxed);
                return Ok(());
            }
            loaded += 1;
        }

        info!("Loaded {} embeddings into vector index", loaded);
        Ok(())
    }

    fn vector_search(&self, embedding: &[f32], top_k: usize) -> Option<Vec<SimilarQuery>> {
        let index = self.index.as_ref()?;
        if self.degraded.load(Ordering::Relaxed) {
            return None;
        }

        match index.nearest(embedding, top_k) {
            Ok(hits) if hits.is_empty() => None,
            Ok(hits) => Some(hits),
            Err(e) => {
                warn!("Vector search failed, degrading to keyword search: {}", e);
                self.degraded.store(true, Ordering::Relaxed);
                None
            }
        }
    }

    /// Keyword fallback: match any stored question containing any token of
    /// the input longer than three characters, in store-native order. Never
    /// fails; the worst case is an empty result.
    async fn keyword_search(&self, question: &str, top_k: usize) -> Vec<SimilarQuery> {
        let tokens = keyword_tokens(question);
        if tokens.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let pattern = tokens
            .iter()
            .map(|token| regex::escape(token))
            .collect::<Vec<_>>()
            .join("|");

        let matcher = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
            Ok(matcher) => matcher,
            Err(e) => {
                warn!("Could not build keyword matcher: {}", e);
                return Vec::new();
            }
        };

        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<Vec<SimilarQuery>, String> {
            let conn = pool.get().map_err(|e| e.to_string())?;
            let mut stmt = conn
                .prepare(
                    "SELECT question, generated_sql, was_successful, execution_time
                     FROM query_history",
                )
                .map_err(|e| e.to_string())?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(SimilarQuery {
                        question: row.get(0)?,
                        sql: row.get(1)?,
                        was_successful: row.get(2)?,
                        execution_time: row.get(3)?,
                    })
                })
                .map_err(|e| e.to_string())?;

            let mut matches = Vec::new();
            for row in rows {
                let record = row.map_err(|e| e.to_string())?;
                if matcher.is_match(&record.question) {
                    matches.push(record);
                    if matches.len() >= top_k {
                        break;
                    }
                }
            }
            Ok(matches)
        })
        .await;

        match result {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                warn!("Keyword search failed, returning no matches: {}", e);
                Vec::new()
            }
            Err(e) => {
                warn!("Keyword search task failed: {}", e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl HistoryStore for DuckDbHistory {
    async fn upsert(
        &self,
        question: &str,
        sql: &str,
        execution_time: f64,
        was_successful: bool,
        result_preview: Option<&str>,
    ) -> Result<(), StorageError> {
        let id = record_id(question);
        let embedding = self.embedder.embed(question).await?;
        let embedding_json = serde_json::to_string(&embedding)
            .map_err(|e| StorageError::Database(e.to_string()))?;
        // Fixed-width timestamps keep lexicographic and chronological order
        // in agreement for the ORDER BY in list_recent.
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);

        debug!("Upserting history record {} for question: {}", id, question);

        let pool = self.pool.clone();
        let row = (
            id.clone(),
            question.to_string(),
            sql.to_string(),
            embedding_json,
            execution_time,
            was_successful,
            result_preview.map(|p| p.to_string()),
            timestamp,
        );

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let conn = pool.get().map_err(|e| StorageError::Database(e.to_string()))?;
            conn.execute(
                "INSERT OR REPLACE INTO query_history
                 (id, question, generated_sql, embedding, execution_time,
                  was_successful, result_preview, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![row.0, row.1, row.2, row.3, row.4, row.5, row.6, row.7],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Database(format!("storage task failed: {}", e)))??;

        // Keep the index in step with the table. Index trouble is a retrieval
        // quality problem, not a storage failure.
        if let Some(index) = &self.index {
            if !self.degraded.load(Ordering::Relaxed) {
                let payload = SimilarQuery {
                    question: question.to_string(),
                    sql: sql.to_string(),
                    was_successful,
                    execution_time,
                };
                if let Err(e) = index.upsert(&id, &embedding, payload) {
                    warn!("Vector index upsert failed, degrading to keyword search: {}", e);
                    self.degraded.store(true, Ordering::Relaxed);
                }
            }
        }

        Ok(())
    }

    async fn retrieve_similar(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<SimilarQuery>, StorageError> {
        // Only pay for an embedding while a usable index is around; keyword
        // mode matches on text alone.
        if self.index.is_some() && !self.degraded.load(Ordering::Relaxed) {
            let embedding = self.embedder.embed(question).await?;
            if let Some(hits) = self.vector_search(&embedding, top_k) {
                return Ok(hits);
            }
        }

        Ok(self.keyword_search(question, top_k).await)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, StorageError> {
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<HistoryEntry>, StorageError> {
            let conn = pool.get().map_err(|e| StorageError::Database(e.to_string()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT question, generated_sql, was_successful, execution_time, created_at
                     FROM query_history ORDER BY created_at DESC LIMIT ?",
                )
                .map_err(|e| StorageError::Database(e.to_string()))?;

            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok(HistoryEntry {
                        question: row.get(0)?,
                        sql: row.get(1)?,
                        was_successful: row.get(2)?,
                        execution_time: row.get(3)?,
                        timestamp: row.get(4)?,
                    })
                })
                .map_err(|e| StorageError::Database(e.to_string()))?;

            let mut entries = Vec::new();
            for row in rows {
                entries.push(row.map_err(|e| StorageError::Database(e.to_string()))?);
            }
            Ok(entries)
        })
        .await
        .map_err(|e| StorageError::Database(format!("storage task failed: {}", e)))?
    }
}
