//! Shared stub collaborators for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use nl_analyst::config::AgentConfig;
use nl_analyst::db::{ExecutionError, QueryResult, SqlExecutor};
use nl_analyst::embed::{EmbedError, Embedder};
use nl_analyst::history::{
    HistoryEntry, HistoryStore, SimilarQuery, StorageError, VectorIndex, VectorIndexError,
};
use nl_analyst::llm::{ExamplePair, LlmError, SqlGenerator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn agent_config() -> AgentConfig {
    AgentConfig {
        default_top_k: 3,
        history_limit: 10,
        reuse_previewed_sql: false,
    }
}

/// Deterministic embedder: identical text always maps to the identical
/// vector, so self-similarity is exact.
pub struct StubEmbedder {
    pub calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0f32; 8];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % 8] += f32::from(byte) / 255.0;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        8
    }
}

/// Records every generation call and what examples it was given.
pub struct StubGenerator {
    pub sql: String,
    pub calls: AtomicUsize,
    pub seen_examples: Mutex<Vec<Option<Vec<ExamplePair>>>>,
    /// When set, each call returns `sql` suffixed with the call ordinal, so
    /// tests can tell regenerated SQL from reused SQL.
    pub vary_per_call: bool,
}

impl StubGenerator {
    pub fn returning(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            calls: AtomicUsize::new(0),
            seen_examples: Mutex::new(Vec::new()),
            vary_per_call: false,
        }
    }

    pub fn varying(sql: &str) -> Self {
        Self { vary_per_call: true, ..Self::returning(sql) }
    }
}

#[async_trait]
impl SqlGenerator for StubGenerator {
    async fn generate_sql(
        &self,
        _question: &str,
        examples: Option<&[ExamplePair]>,
    ) -> Result<String, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_examples
            .lock()
            .unwrap()
            .push(examples.map(|e| e.to_vec()));

        if self.vary_per_call {
            Ok(format!("{} -- attempt {}", self.sql, call))
        } else {
            Ok(self.sql.clone())
        }
    }

    async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok("{}".to_string())
    }
}

/// Adapter so a test can keep an [`std::sync::Arc`] handle on a generator
/// that has been boxed into an `LlmManager`.
pub struct SharedGenerator(pub std::sync::Arc<StubGenerator>);

#[async_trait]
impl SqlGenerator for SharedGenerator {
    async fn generate_sql(
        &self,
        question: &str,
        examples: Option<&[ExamplePair]>,
    ) -> Result<String, LlmError> {
        self.0.generate_sql(question, examples).await
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.0.complete(prompt).await
    }
}

/// Executor stub returning a canned result or a canned failure.
pub struct StubExecutor {
    pub calls: AtomicUsize,
    pub fail_with: Option<String>,
    pub rows: usize,
    pub elapsed: f64,
}

impl StubExecutor {
    pub fn succeeding(rows: usize, elapsed: f64) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_with: None,
            rows,
            elapsed,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_with: Some(message.to_string()),
            rows: 0,
            elapsed: 0.0,
        }
    }
}

#[async_trait]
impl SqlExecutor for StubExecutor {
    async fn execute(&self, _sql: &str) -> Result<(QueryResult, f64), ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.fail_with {
            return Err(ExecutionError::Query(message.clone()));
        }

        let result = QueryResult {
            columns: vec!["region".to_string(), "total".to_string()],
            rows: (0..self.rows)
                .map(|i| {
                    vec![
                        serde_json::json!(format!("region-{}", i)),
                        serde_json::json!(i * 100),
                    ]
                })
                .collect(),
        };
        Ok((result, self.elapsed))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertCall {
    pub question: String,
    pub sql: String,
    pub execution_time: f64,
    pub was_successful: bool,
    pub result_preview: Option<String>,
}

/// In-memory history with scripted similar-query responses and full
/// recording of upserts.
pub struct StubHistory {
    pub similar: Vec<SimilarQuery>,
    pub upserts: Mutex<Vec<UpsertCall>>,
    pub retrieve_calls: AtomicUsize,
    pub fail_upserts: bool,
}

impl StubHistory {
    pub fn with_similar(similar: Vec<SimilarQuery>) -> Self {
        Self {
            similar,
            upserts: Mutex::new(Vec::new()),
            retrieve_calls: AtomicUsize::new(0),
            fail_upserts: false,
        }
    }

    pub fn empty() -> Self {
        Self::with_similar(Vec::new())
    }

    pub fn failing_upserts() -> Self {
        Self { fail_upserts: true, ..Self::empty() }
    }
}

#[async_trait]
impl HistoryStore for StubHistory {
    async fn upsert(
        &self,
        question: &str,
        sql: &str,
        execution_time: f64,
        was_successful: bool,
        result_preview: Option<&str>,
    ) -> Result<(), StorageError> {
        if self.fail_upserts {
            return Err(StorageError::Database("history backend offline".to_string()));
        }

        self.upserts.lock().unwrap().push(UpsertCall {
            question: question.to_string(),
            sql: sql.to_string(),
            execution_time,
            was_successful,
            result_preview: result_preview.map(|p| p.to_string()),
        });
        Ok(())
    }

    async fn retrieve_similar(
        &self,
        _question: &str,
        top_k: usize,
    ) -> Result<Vec<SimilarQuery>, StorageError> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.similar.iter().take(top_k).cloned().collect())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, StorageError> {
        let upserts = self.upserts.lock().unwrap();
        Ok(upserts
            .iter()
            .rev()
            .take(limit)
            .map(|call| HistoryEntry {
                question: call.question.clone(),
                sql: call.sql.clone(),
                was_successful: call.was_successful,
                execution_time: call.execution_time,
                timestamp: String::new(),
            })
            .collect())
    }
}

/// Vector index that accepts writes but always fails lookups.
pub struct BrokenLookupIndex;

impl VectorIndex for BrokenLookupIndex {
    fn upsert(
        &self,
        _id: &str,
        _vector: &[f32],
        _payload: SimilarQuery,
    ) -> Result<(), VectorIndexError> {
        Ok(())
    }

    fn nearest(&self, _vector: &[f32], _k: usize) -> Result<Vec<SimilarQuery>, VectorIndexError> {
        Err(VectorIndexError::Unavailable("search node down".to_string()))
    }
}

pub fn similar(question: &str, sql: &str, was_successful: bool) -> SimilarQuery {
    SimilarQuery {
        question: question.to_string(),
        sql: sql.to_string(),
        was_successful,
        execution_time: 0.01,
    }
}
