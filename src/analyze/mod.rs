//! Post-hoc profiling of query results: per-column statistics, chart-type
//! heuristics, and LLM-generated narrative insights.

pub mod charts;
pub mod insights;

pub use charts::{suggest_charts, ChartSuggestion, ChartSuggestions};
pub use insights::{generate_insights, InsightReport};

use crate::db::QueryResult;
use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Datetime,
    Categorical,
    Unknown,
}

/// Statistics for one result column. Every measure is optional: a value that
/// cannot be computed for this column's data is simply absent.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ColumnProfile {
    pub kind: ColumnKind,
    pub null_count: usize,
    pub null_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub potential_outliers: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outlier_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_values: Option<Vec<(String, usize)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range_days: Option<i64>,
}

impl Default for ColumnKind {
    fn default() -> Self {
        ColumnKind::Unknown
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DataProfile {
    pub row_count: usize,
    pub column_count: usize,
    /// Column profiles in result-set order.
    pub columns: Vec<(String, ColumnProfile)>,
    pub insights: Vec<String>,
}

impl DataProfile {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, profile)| profile)
    }
}

/// Profiles a result set. Unprofilable columns degrade to `unknown` entries;
/// this never fails.
pub fn profile(result: &QueryResult) -> DataProfile {
    let row_count = result.rows.len();
    let mut columns = Vec::with_capacity(result.columns.len());
    let mut insights = Vec::new();

    for (idx, name) in result.columns.iter().enumerate() {
        let cells: Vec<serde_json::Value> = result
            .rows
            .iter()
            .map(|row| row.get(idx).cloned().unwrap_or(serde_json::Value::Null))
            .collect();
        columns.push((name.clone(), profile_column(&cells, row_count)));
    }

    if row_count > 1000 {
        insights.push(format!("Large dataset with {} rows.", row_count));
    } else if row_count < 5 {
        insights.push(format!("Very small dataset with only {} rows.", row_count));
    }

    let mut missing: Vec<(&str, f64)> = columns
        .iter()
        .filter(|(_, profile)| profile.null_percentage > 0.0)
        .map(|(name, profile)| (name.as_str(), profile.null_percentage))
        .collect();
    if !missing.is_empty() {
        missing.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let top = missing
            .iter()
            .take(3)
            .map(|(name, pct)| format!("{} ({:.1}%)", name, pct))
            .collect::<Vec<_>>()
            .join(", ");
        insights.push(format!(
            "Missing values detected in {} columns. Most affected: {}",
            missing.len(),
            top
        ));
    }

    for (name, profile) in &columns {
        if let Some(count) = profile.outlier_count {
            if count > 0 && row_count > 0 {
                let pct = (count as f64 / row_count as f64 * 1000.0).round() / 10.0;
                insights.push(format!(
                    "Potential outliers detected in '{}' ({}% of values).",
                    name, pct
                ));
            }
        }
    }

    DataProfile {
        row_count,
        column_count: result.columns.len(),
        columns,
        insights,
    }
}

fn profile_column(cells: &[serde_json::Value], row_count: usize) -> ColumnProfile {
    let null_count = cells.iter().filter(|v| v.is_null()).count();
    let null_percentage = if row_count > 0 {
        (null_count as f64 / row_count as f64 * 10_000.0).round() / 100.0
    } else {
        0.0
    };

    let mut profile = ColumnProfile {
        kind: classify(cells),
        null_count,
        null_percentage,
        ..ColumnProfile::default()
    };

    match profile.kind {
        ColumnKind::Numeric => {
            let values = numeric_values(cells);
            profile.min = min_value(&values);
            profile.max = max_value(&values);
            profile.mean = mean(&values);
            profile.median = median(&values);
            profile.std_dev = std_dev(&values);
            if let Some((outliers, count)) = outliers(&values) {
                profile.potential_outliers = Some(outliers);
                profile.outlier_count = Some(count);
            }
        }
        ColumnKind::Categorical => {
            let values = text_values(cells);
            profile.unique_count = unique_count(&values);
            profile.top_values = top_values(&values, 5);
        }
        ColumnKind::Datetime => {
            let dates = datetime_values(cells);
            profile.min_date = dates.iter().min().map(|d| d.to_string());
            profile.max_date = dates.iter().max().map(|d| d.to_string());
            profile.date_range_days = match (dates.iter().min(), dates.iter().max()) {
                (Some(min), Some(max)) => Some((*max - *min).num_days()),
                _ => None,
            };
        }
        ColumnKind::Unknown => {}
    }

    profile
}

fn classify(cells: &[serde_json::Value]) -> ColumnKind {
    let non_null: Vec<&serde_json::Value> = cells.iter().filter(|v| !v.is_null()).collect();
    if non_null.is_empty() {
        return ColumnKind::Unknown;
    }

    if non_null.iter().all(|v| v.is_number()) {
        return ColumnKind::Numeric;
    }

    let all_datetime = non_null
        .iter()
        .all(|v| v.as_str().map(|s| parse_datetime(s).is_some()).unwrap_or(false));
    if all_datetime {
        return ColumnKind::Datetime;
    }

    ColumnKind::Categorical
}

pub(crate) fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    None
}

fn numeric_values(cells: &[serde_json::Value]) -> Vec<f64> {
    cells.iter().filter_map(|v| v.as_f64()).collect()
}

fn text_values(cells: &[serde_json::Value]) -> Vec<String> {
    cells
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect()
}

fn datetime_values(cells: &[serde_json::Value]) -> Vec<NaiveDateTime> {
    cells
        .iter()
        .filter_map(|v| v.as_str())
        .filter_map(parse_datetime)
        .collect()
}

fn min_value(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

fn max_value(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Values more than three standard deviations from the mean, capped at five
/// examples. `None` when the column is too small or has no spread.
fn outliers(values: &[f64]) -> Option<(Vec<f64>, usize)> {
    if values.len() <= 2 {
        return None;
    }
    let m = mean(values)?;
    let sd = std_dev(values)?;
    if sd <= 0.0 {
        return None;
    }

    let flagged: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| ((v - m) / sd).abs() > 3.0)
        .collect();

    if flagged.is_empty() {
        return None;
    }

    let count = flagged.len();
    Some((flagged.into_iter().take(5).collect(), count))
}

fn unique_count(values: &[String]) -> Option<usize> {
    if values.is_empty() {
        return None;
    }
    let unique: std::collections::HashSet<&String> = values.iter().collect();
    Some(unique.len())
}

fn top_values(values: &[String], limit: usize) -> Option<Vec<(String, usize)>> {
    if values.is_empty() {
        return None;
    }

    let mut counts: HashMapOrdered = HashMapOrdered::default();
    for value in values {
        counts.bump(value);
    }

    Some(counts.top(limit))
}

/// Counts with first-seen tie ordering, so repeated profiling of the same
/// result is deterministic.
#[derive(Default)]
struct HashMapOrdered {
    order: Vec<String>,
    counts: std::collections::HashMap<String, usize>,
}

impl HashMapOrdered {
    fn bump(&mut self, value: &str) {
        if !self.counts.contains_key(value) {
            self.order.push(value.to_string());
        }
        *self.counts.entry(value.to_string()).or_insert(0) += 1;
    }

    fn top(self, limit: usize) -> Vec<(String, usize)> {
        let mut entries: Vec<(String, usize)> = self
            .order
            .into_iter()
            .map(|value| {
                let count = self.counts[&value];
                (value, count)
            })
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.into_iter().take(limit).collect()
    }
}
