use crate::config::AgentConfig;
use crate::db::{QueryResult, SqlExecutor};
use crate::error::AgentError;
use crate::history::{record_id, HistoryEntry, HistoryStore, SimilarQuery};
use crate::llm::{ExamplePair, LlmManager};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const PREVIEW_ROWS: usize = 5;
const PREVIEWED_SQL_CAP: usize = 64;

/// Per-invocation switches for [`QueryPipeline::run`].
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub store_results: bool,
    pub require_approval: bool,
    pub approved: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            store_results: true,
            require_approval: true,
            approved: false,
        }
    }
}

/// Transient result of one pipeline invocation. Never persisted as a whole;
/// the storage step projects the relevant fields into a history record.
#[derive(Debug, Serialize)]
pub struct PipelineResponse {
    pub question: String,
    pub sql: String,
    pub similar_queries: Vec<SimilarQuery>,
    pub requires_approval: bool,
    pub approved: bool,
    pub awaiting_approval: bool,
    /// `None` only for the transient awaiting-approval shape; never stored.
    pub was_successful: Option<bool>,
    pub execution_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<QueryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Orchestrates embed → retrieve → generate → approval gate → execute → store.
///
/// Generation and retrieval failures propagate to the caller untouched;
/// executor failures become a structured failed response and are still
/// recorded as negative examples.
pub struct QueryPipeline {
    history: Arc<dyn HistoryStore>,
    llm: Arc<LlmManager>,
    executor: Arc<dyn SqlExecutor>,
    config: AgentConfig,
    /// SQL shown at the approval gate, keyed by question id. Populated only
    /// when `reuse_previewed_sql` is on; an approved call consumes its entry,
    /// and the map is capped so abandoned previews cannot accumulate.
    previewed_sql: Mutex<HashMap<String, String>>,
}

impl QueryPipeline {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        llm: Arc<LlmManager>,
        executor: Arc<dyn SqlExecutor>,
        config: AgentConfig,
    ) -> Self {
        Self {
            history,
            llm,
            executor,
            config,
            previewed_sql: Mutex::new(HashMap::new()),
        }
    }

    /// Retrieval plus generation only: no gate, no execution, no storage.
    pub async fn generate_only(
        &self,
        question: &str,
    ) -> Result<(String, Vec<SimilarQuery>), AgentError> {
        let similar = self
            .history
            .retrieve_similar(question, self.config.default_top_k)
            .await?;

        let examples: Vec<ExamplePair> = similar
            .iter()
            .filter(|query| query.was_successful)
            .map(|query| ExamplePair {
                question: query.question.clone(),
                sql: query.sql.clone(),
            })
            .collect();

        debug!(
            "Generating SQL for question with {} similar / {} usable examples",
            similar.len(),
            examples.len()
        );

        // An empty example list and no examples must look identical to the
        // generator, so the slice is only passed when non-empty.
        let examples_arg = if examples.is_empty() {
            None
        } else {
            Some(examples.as_slice())
        };

        let sql = self.llm.generate_sql(question, examples_arg).await?;

        Ok((sql, similar))
    }

    /// Processes one natural-language question through the full state machine.
    ///
    /// With `require_approval` and no approval yet, the call stops after
    /// generation and returns the awaiting-approval shape; nothing executes
    /// and nothing is stored. By default the approved follow-up call
    /// regenerates SQL, so a non-deterministic generator may execute a
    /// statement that differs from the previewed one. Setting
    /// `reuse_previewed_sql` in [`AgentConfig`] makes the approved call reuse
    /// the previewed statement instead.
    pub async fn run(
        &self,
        question: &str,
        options: QueryOptions,
    ) -> Result<PipelineResponse, AgentError> {
        info!("Processing question: {}", question);

        let cached_sql = if self.config.reuse_previewed_sql && options.approved {
            self.previewed_sql.lock().await.remove(&record_id(question))
        } else {
            None
        };

        let (sql, similar) = match cached_sql {
            Some(sql) => {
                debug!("Reusing previewed SQL for approved question");
                let similar = self
                    .history
                    .retrieve_similar(question, self.config.default_top_k)
                    .await?;
                (sql, similar)
            }
            None => self.generate_only(question).await?,
        };

        if options.require_approval && !options.approved {
            if self.config.reuse_previewed_sql {
                let mut cache = self.previewed_sql.lock().await;
                let key = record_id(question);
                // A full cache is dropped wholesale; losing an entry only
                // means the approved call regenerates.
                if cache.len() >= PREVIEWED_SQL_CAP && !cache.contains_key(&key) {
                    cache.clear();
                }
                cache.insert(key, sql.clone());
            }

            return Ok(PipelineResponse {
                question: question.to_string(),
                sql,
                similar_queries: similar,
                requires_approval: true,
                approved: false,
                awaiting_approval: true,
                was_successful: None,
                execution_time: 0.0,
                results: None,
                result_preview: None,
                error_message: None,
            });
        }

        // Approval isn't required or has been granted; run the statement.
        let (was_successful, execution_time, results, result_preview, mut error_message) =
            match self.executor.execute(&sql).await {
                Ok((results, elapsed)) => {
                    let preview = results.preview(PREVIEW_ROWS);
                    (true, elapsed, Some(results), Some(preview), None)
                }
                Err(e) => {
                    warn!("Query execution failed: {}", e);
                    (false, 0.0, None, None, Some(e.to_string()))
                }
            };

        if options.store_results {
            let upsert = self
                .history
                .upsert(
                    question,
                    &sql,
                    execution_time,
                    was_successful,
                    result_preview.as_deref(),
                )
                .await;

            match upsert {
                Ok(()) => {}
                Err(store_err) if !was_successful => {
                    // The caller must still learn the query failed, so a
                    // follow-on storage failure is appended rather than raised.
                    warn!("Failed to store failed query: {}", store_err);
                    error_message = Some(format!(
                        "{} (history write also failed: {})",
                        error_message.unwrap_or_default(),
                        store_err
                    ));
                }
                Err(store_err) => return Err(store_err.into()),
            }
        }

        Ok(PipelineResponse {
            question: question.to_string(),
            sql,
            similar_queries: similar,
            requires_approval: options.require_approval,
            approved: options.approved,
            awaiting_approval: false,
            was_successful: Some(was_successful),
            execution_time,
            results,
            result_preview,
            error_message,
        })
    }

    /// Read-only similarity lookup, for preview endpoints.
    pub async fn retrieve_similar(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<SimilarQuery>, AgentError> {
        Ok(self.history.retrieve_similar(question, top_k).await?)
    }

    /// Chronological history listing, newest first.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, AgentError> {
        Ok(self.history.list_recent(limit).await?)
    }

    /// [`Self::list_recent`] with the configured default page size.
    pub async fn recent_history(&self) -> Result<Vec<HistoryEntry>, AgentError> {
        self.list_recent(self.config.history_limit).await
    }
}
