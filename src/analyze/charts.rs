use crate::analyze::{ColumnKind, DataProfile};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Serialize)]
pub struct ChartSuggestion {
    #[serde(rename = "type")]
    pub chart_type: String,
    pub suitability: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_config: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ColumnRoles {
    pub metrics: Vec<String>,
    pub dimensions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ChartSuggestions {
    pub recommended_chart: Option<String>,
    pub possible_charts: Vec<ChartSuggestion>,
    pub column_roles: ColumnRoles,
}

/// Chart-type heuristics over a profiled result set: line for time series,
/// bar for a modest number of categories, pie for very few, scatter for
/// numeric pairs, table as the fallback.
pub fn suggest_charts(profile: &DataProfile) -> ChartSuggestions {
    let numeric: Vec<&str> = columns_of_kind(profile, ColumnKind::Numeric);
    let categorical: Vec<&str> = columns_of_kind(profile, ColumnKind::Categorical);
    let datetime: Vec<&str> = columns_of_kind(profile, ColumnKind::Datetime);

    let mut suggestions = ChartSuggestions {
        recommended_chart: None,
        possible_charts: Vec::new(),
        column_roles: ColumnRoles {
            metrics: numeric.iter().map(|c| c.to_string()).collect(),
            dimensions: categorical
                .iter()
                .chain(datetime.iter())
                .map(|c| c.to_string())
                .collect(),
        },
    };

    if !datetime.is_empty() && !numeric.is_empty() {
        suggestions.possible_charts.push(ChartSuggestion {
            chart_type: "line".to_string(),
            suitability: "high".to_string(),
            reason: "Time series data detected".to_string(),
            suggested_config: Some(json!({
                "x_axis": datetime[0],
                "y_axis": numeric[0],
                "series": categorical.first(),
            })),
        });
        suggestions.recommended_chart.get_or_insert_with(|| "line".to_string());
    }

    let category_count = categorical
        .first()
        .and_then(|name| profile.column(name))
        .and_then(|col| col.unique_count)
        .unwrap_or(0);

    if !categorical.is_empty() && !numeric.is_empty() && (1..=20).contains(&category_count) {
        suggestions.possible_charts.push(ChartSuggestion {
            chart_type: "bar".to_string(),
            suitability: if category_count <= 10 { "high" } else { "medium" }.to_string(),
            reason: format!("Categorical data with {} categories", category_count),
            suggested_config: Some(json!({
                "x_axis": categorical[0],
                "y_axis": numeric[0],
                "group_by": categorical.get(1),
            })),
        });
        suggestions.recommended_chart.get_or_insert_with(|| "bar".to_string());
    }

    if !categorical.is_empty() && !numeric.is_empty() && (2..=6).contains(&category_count) {
        suggestions.possible_charts.push(ChartSuggestion {
            chart_type: "pie".to_string(),
            suitability: "high".to_string(),
            reason: format!("Small number of categories ({})", category_count),
            suggested_config: Some(json!({
                "name": categorical[0],
                "value": numeric[0],
            })),
        });
        if category_count <= 5 {
            suggestions.recommended_chart.get_or_insert_with(|| "pie".to_string());
        }
    }

    if numeric.len() >= 2 {
        suggestions.possible_charts.push(ChartSuggestion {
            chart_type: "scatter".to_string(),
            suitability: "medium".to_string(),
            reason: "Multiple numeric columns available".to_string(),
            suggested_config: Some(json!({
                "x_axis": numeric[0],
                "y_axis": numeric[1],
                "size": numeric.get(2),
                "color": categorical.first(),
            })),
        });
    }

    if suggestions.recommended_chart.is_none() && profile.column_count > 0 {
        suggestions.recommended_chart = Some("table".to_string());
        suggestions.possible_charts.push(ChartSuggestion {
            chart_type: "table".to_string(),
            suitability: "high".to_string(),
            reason: "Data structure best represented as a table".to_string(),
            suggested_config: None,
        });
    }

    suggestions
}

fn columns_of_kind(profile: &DataProfile, kind: ColumnKind) -> Vec<&str> {
    profile
        .columns
        .iter()
        .filter(|(_, col)| col.kind == kind)
        .map(|(name, _)| name.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::profile;
    use crate::db::QueryResult;
    use serde_json::json;

    fn result(columns: &[&str], rows: Vec<Vec<serde_json::Value>>) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn time_series_recommends_line() {
        let data = result(
            &["day", "revenue"],
            vec![
                vec![json!("2024-01-01"), json!(100)],
                vec![json!("2024-01-02"), json!(110)],
            ],
        );
        let suggestions = suggest_charts(&profile(&data));
        assert_eq!(suggestions.recommended_chart.as_deref(), Some("line"));
        assert_eq!(suggestions.column_roles.metrics, vec!["revenue"]);
        assert_eq!(suggestions.column_roles.dimensions, vec!["day"]);
    }

    #[test]
    fn few_categories_offer_bar_and_pie() {
        let data = result(
            &["region", "revenue"],
            vec![
                vec![json!("north"), json!(100)],
                vec![json!("south"), json!(80)],
                vec![json!("east"), json!(120)],
            ],
        );
        let suggestions = suggest_charts(&profile(&data));
        assert_eq!(suggestions.recommended_chart.as_deref(), Some("bar"));

        let kinds: Vec<&str> = suggestions
            .possible_charts
            .iter()
            .map(|c| c.chart_type.as_str())
            .collect();
        assert!(kinds.contains(&"bar"));
        assert!(kinds.contains(&"pie"));
    }

    #[test]
    fn numeric_only_result_falls_back_to_table() {
        let data = result(&["a"], vec![vec![json!(1)], vec![json!(2)]]);
        let suggestions = suggest_charts(&profile(&data));
        assert_eq!(suggestions.recommended_chart.as_deref(), Some("table"));
    }

    #[test]
    fn two_numerics_offer_scatter() {
        let data = result(
            &["a", "b"],
            vec![vec![json!(1), json!(2)], vec![json!(3), json!(4)]],
        );
        let suggestions = suggest_charts(&profile(&data));
        assert!(suggestions
            .possible_charts
            .iter()
            .any(|c| c.chart_type == "scatter"));
    }
}
