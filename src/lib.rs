//! nl-analyst: a natural-language-to-SQL assistant library.
//!
//! A question flows through the [`pipeline::QueryPipeline`]: similar historical
//! questions are retrieved as few-shot context, an LLM backend turns the
//! question into SQL, an approval gate optionally pauses before anything runs,
//! the statement executes against a DuckDB warehouse, and the outcome is
//! written back into the query history for future retrieval.

pub mod analyze;
pub mod config;
pub mod db;
pub mod embed;
pub mod error;
pub mod history;
pub mod llm;
pub mod pipeline;
pub mod util;

pub use config::AppConfig;
pub use error::AgentError;
pub use pipeline::{PipelineResponse, QueryOptions, QueryPipeline};
