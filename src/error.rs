use thiserror::Error;

use crate::db::ExecutionError;
use crate::embed::EmbedError;
use crate::history::StorageError;
use crate::llm::LlmError;

/// Top-level error for a pipeline invocation.
///
/// Only generation and storage problems surface here; executor failures are
/// folded into a structured failed [`crate::pipeline::PipelineResponse`]
/// instead, and retrieval-backend failures silently degrade to keyword search.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("SQL generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("query history error: {0}")]
    Storage(#[from] StorageError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),
}
