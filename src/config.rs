use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Path to the DuckDB warehouse file queries run against.
    pub connection_string: String,
    /// Path to the DuckDB file holding query history.
    pub history_path: String,
    pub pool_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "remote" or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub backend: String, // currently "ollama"
    pub api_url: Option<String>,
    pub model: String,
    /// Vector width the history store expects from the embedder.
    pub dimension: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// How many similar historical queries to pull as few-shot context.
    pub default_top_k: usize,
    /// Default page size for history listings.
    pub history_limit: usize,
    /// When true, an approved call reuses the SQL shown at the approval gate
    /// instead of regenerating it.
    pub reuse_previewed_sql: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub agent: AgentConfig,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        if let Some(config_path) = path {
            config_builder = config_builder.add_source(File::from(config_path));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/nl-analyst/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        config_builder.build()?.try_deserialize()
    }
}

// Default implementation
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                connection_string: "warehouse.duckdb".to_string(),
                history_path: "history.duckdb".to_string(),
                pool_size: 5,
            },
            llm: LlmConfig {
                backend: "ollama".to_string(),
                model: "sqlcoder".to_string(),
                api_key: None,
                api_url: None,
            },
            embedding: EmbeddingConfig {
                backend: "ollama".to_string(),
                api_url: None,
                model: "all-minilm".to_string(),
                dimension: 384,
            },
            agent: AgentConfig {
                default_top_k: 3,
                history_limit: 10,
                reuse_previewed_sql: false,
            },
        }
    }
}
