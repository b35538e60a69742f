pub mod executor;

pub use executor::{DuckDbExecutor, ExecutionError, SqlExecutor};

use serde::Serialize;

/// A tabular result set with JSON-typed cells.
#[derive(Debug, Clone, Serialize, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Short textual rendering of the first `max_rows` rows, for storage and
    /// display rather than re-parsing.
    pub fn preview(&self, max_rows: usize) -> String {
        if self.rows.is_empty() {
            return "No results".to_string();
        }

        let mut lines = Vec::with_capacity(max_rows + 1);
        lines.push(self.columns.join(" | "));

        for row in self.rows.iter().take(max_rows) {
            let rendered = row
                .iter()
                .map(|cell| match cell {
                    serde_json::Value::Null => "NULL".to_string(),
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(" | ");
            lines.push(rendered);
        }

        lines.join("\n")
    }
}
