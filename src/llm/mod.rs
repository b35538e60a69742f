pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum LlmError {
    ConnectionError(String),
    ResponseError(String),
    ConfigError(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ConnectionError(msg) => write!(f, "LLM connection error: {}", msg),
            LlmError::ResponseError(msg) => write!(f, "LLM response error: {}", msg),
            LlmError::ConfigError(msg) => write!(f, "LLM configuration error: {}", msg),
        }
    }
}

impl Error for LlmError {}

/// A prior successful question/SQL pair supplied as few-shot context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExamplePair {
    pub question: String,
    pub sql: String,
}

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    /// Turns a question into a SQL statement.
    ///
    /// `examples` is either absent or non-empty; callers never pass an empty
    /// slice, so providers can branch on presence alone when building prompts.
    async fn generate_sql(
        &self,
        question: &str,
        examples: Option<&[ExamplePair]>,
    ) -> Result<String, LlmError>;

    /// Raw completion against the same backend, used for narrative insights.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

pub struct LlmManager {
    generator: Box<dyn SqlGenerator + Send + Sync>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let generator: Box<dyn SqlGenerator + Send + Sync> = match config.backend.as_str() {
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self { generator })
    }

    /// Wraps an already-built generator, mainly so tests can substitute stubs.
    pub fn with_generator(generator: Box<dyn SqlGenerator + Send + Sync>) -> Self {
        Self { generator }
    }

    pub async fn generate_sql(
        &self,
        question: &str,
        examples: Option<&[ExamplePair]>,
    ) -> Result<String, LlmError> {
        self.generator.generate_sql(question, examples).await
    }

    pub async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.generator.complete(prompt).await
    }
}
