use crate::config::DatabaseConfig;
use crate::db::QueryResult;
use async_trait::async_trait;
use duckdb::types::ValueRef;
use duckdb::Connection;
use r2d2::{ManageConnection, Pool};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("warehouse connection error: {0}")]
    Connection(String),
    #[error("SQL execution failed: {0}")]
    Query(String),
}

/// Runs a SQL string against the warehouse and reports wall-clock duration.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Executes `sql`, returning the result set and elapsed seconds.
    async fn execute(&self, sql: &str) -> Result<(QueryResult, f64), ExecutionError>;
}

pub struct DuckDbConnectionManager {
    connection_string: String,
}

impl DuckDbConnectionManager {
    pub fn new(connection_string: String) -> Self {
        Self { connection_string }
    }
}

impl ManageConnection for DuckDbConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        Connection::open(&self.connection_string)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Warehouse executor over a pooled DuckDB file.
pub struct DuckDbExecutor {
    pool: Pool<DuckDbConnectionManager>,
}

impl DuckDbExecutor {
    pub fn new(config: &DatabaseConfig) -> Result<Self, ExecutionError> {
        let manager = DuckDbConnectionManager::new(config.connection_string.clone());
        let pool = Pool::builder()
            .max_size(config.pool_size as u32)
            .build(manager)
            .map_err(|e| ExecutionError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl SqlExecutor for DuckDbExecutor {
    async fn execute(&self, sql: &str) -> Result<(QueryResult, f64), ExecutionError> {
        info!("Executing SQL against warehouse: {}", sql);

        let pool = self.pool.clone();
        let sql = sql.to_string();
        let start = Instant::now();

        let result = tokio::task::spawn_blocking(move || -> Result<QueryResult, ExecutionError> {
            let conn = pool
                .get()
                .map_err(|e| ExecutionError::Connection(e.to_string()))?;

            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| ExecutionError::Query(e.to_string()))?;

            let mut rows = stmt
                .query([])
                .map_err(|e| ExecutionError::Query(e.to_string()))?;

            let mut columns: Vec<String> = Vec::new();
            let mut out: Vec<Vec<serde_json::Value>> = Vec::new();

            while let Some(row) = rows
                .next()
                .map_err(|e| ExecutionError::Query(e.to_string()))?
            {
                let stmt_ref = row.as_ref();
                if columns.is_empty() {
                    for i in 0..stmt_ref.column_count() {
                        let name = stmt_ref
                            .column_name(i)
                            .map_err(|e| ExecutionError::Query(e.to_string()))?;
                        columns.push(name.to_string());
                    }
                }

                let mut cells = Vec::with_capacity(columns.len());
                for i in 0..columns.len() {
                    let value = row
                        .get_ref(i)
                        .map_err(|e| ExecutionError::Query(e.to_string()))?;
                    cells.push(value_to_json(value));
                }
                out.push(cells);
            }

            Ok(QueryResult { columns, rows: out })
        })
        .await
        .map_err(|e| ExecutionError::Query(format!("executor task failed: {}", e)))??;

        let elapsed = start.elapsed().as_secs_f64();
        debug!("Query returned {} rows in {:.3}s", result.row_count(), elapsed);

        Ok((result, elapsed))
    }
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Boolean(b) => serde_json::Value::Bool(b),
        ValueRef::TinyInt(n) => serde_json::json!(n),
        ValueRef::SmallInt(n) => serde_json::json!(n),
        ValueRef::Int(n) => serde_json::json!(n),
        ValueRef::BigInt(n) => serde_json::json!(n),
        ValueRef::UTinyInt(n) => serde_json::json!(n),
        ValueRef::USmallInt(n) => serde_json::json!(n),
        ValueRef::UInt(n) => serde_json::json!(n),
        ValueRef::UBigInt(n) => serde_json::json!(n),
        ValueRef::Float(n) => serde_json::Number::from_f64(n as f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Double(n) => serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(bytes) => {
            serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
        other => serde_json::Value::String(format!("{:?}", other)),
    }
}
