use crate::analyze::DataProfile;
use crate::db::QueryResult;
use crate::llm::{LlmError, LlmManager};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const SAMPLE_ROWS: usize = 10;

/// Narrative reading of a result set, produced by the LLM backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightReport {
    pub executive_summary: String,
    pub key_insights: Vec<String>,
    pub recommended_steps: Vec<String>,
    pub data_limitations: Vec<String>,
}

/// Asks the LLM backend for insights over a profiled result set.
///
/// The model is prompted for a fixed JSON shape; a response that is not quite
/// that shape is patched with placeholder fields rather than rejected, and a
/// response with no JSON at all becomes the executive summary verbatim.
pub async fn generate_insights(
    llm: &LlmManager,
    result: &QueryResult,
    profile: &DataProfile,
) -> Result<InsightReport, LlmError> {
    let data_sample = result.preview(SAMPLE_ROWS);
    let profile_json = serde_json::to_string_pretty(profile)
        .map_err(|e| LlmError::ResponseError(format!("could not serialize profile: {}", e)))?;

    let prompt = format!(
        r#"I have a dataset with the following sample data:

{}

I've performed statistical analysis on this data and here are the results:

{}

Based on this data and analysis, please provide:
1. A concise executive summary of the dataset (2-3 sentences)
2. 3-5 key insights or patterns observed in the data
3. Recommended next steps for further analysis or actions
4. Any potential issues or limitations with the data

Format your response as a JSON with the following structure:
{{
    "executive_summary": "...",
    "key_insights": ["insight 1", "insight 2", ...],
    "recommended_steps": ["step 1", "step 2", ...],
    "data_limitations": ["limitation 1", "limitation 2", ...]
}}

Ensure that your insights are specific to this dataset and based on the statistical analysis provided.
"#,
        data_sample, profile_json
    );

    let content = llm.complete(&prompt).await?;
    debug!("Raw insight response: {}", content);

    Ok(parse_report(&content))
}

fn parse_report(content: &str) -> InsightReport {
    let body = strip_code_fences(content);

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => InsightReport {
            executive_summary: value
                .get("executive_summary")
                .and_then(|v| v.as_str())
                .unwrap_or("Summary not available")
                .to_string(),
            key_insights: string_list(&value, "key_insights", "No specific insights available"),
            recommended_steps: string_list(
                &value,
                "recommended_steps",
                "No specific recommendations available",
            ),
            data_limitations: string_list(
                &value,
                "data_limitations",
                "No specific limitations identified",
            ),
        },
        Err(e) => {
            warn!("Insight response was not JSON ({}), returning raw text", e);
            InsightReport {
                executive_summary: content.trim().to_string(),
                key_insights: vec!["No specific insights available".to_string()],
                recommended_steps: vec!["No specific recommendations available".to_string()],
                data_limitations: vec!["No specific limitations identified".to_string()],
            }
        }
    }
}

fn string_list(value: &serde_json::Value, key: &str, fallback: &str) -> Vec<String> {
    match value.get(key).and_then(|v| v.as_array()) {
        Some(items) if !items.is_empty() => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|s| s.to_string())
            .collect(),
        _ => vec![fallback.to_string()],
    }
}

fn strip_code_fences(content: &str) -> &str {
    if let Some(start) = content.find("```json") {
        let rest = &content[start + 7..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    if let Some(start) = content.find("```") {
        let rest = &content[start + 3..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    content.trim()
}
