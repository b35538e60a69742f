use crate::config::LlmConfig;
use crate::llm::{ExamplePair, LlmError, SqlGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

pub struct OllamaProvider {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

#[derive(Serialize, Debug)]
struct OllamaRequest {
    model: String,
    prompt: String,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434/api/generate".to_string());

        let client = reqwest::Client::new();

        Ok(Self {
            client,
            api_url,
            model: config.model.clone(),
        })
    }

    fn prepare_prompt(&self, question: &str, examples: Option<&[ExamplePair]>) -> String {
        let examples_block = match examples {
            Some(pairs) => {
                let rendered = pairs
                    .iter()
                    .map(|pair| {
                        format!("Question: {}\nSQL: {}", pair.question, pair.sql)
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n");
                format!(
                    "Here are previous questions against the same warehouse and the SQL that answered them correctly:\n\n{}\n",
                    rendered
                )
            }
            None => String::new(),
        };

        let prompt = format!(
            r#"
### Instructions:
Your task is to convert a question into a SQL query for an analytical warehouse.
Adhere to these rules:
- **Be careful with column names - they are case sensitive**
- **Deliberately go through the question word by word** to appropriately answer it
- **Use Table Aliases** to prevent ambiguity. For example, `SELECT table1.col1, table2.col1 FROM table1 JOIN table2 ON table1.id = table2.id`.
- When creating a ratio, always cast the numerator as float

### Input:
{}
Generate a SQL query that answers the question `{}`.

### Expected SQL Format:
- Use lowercase for SQL keywords (SELECT, FROM, WHERE, etc.)
- Make sure to use double quotes around column names with spaces or special characters
- End your query with a semicolon

### Response:
Based on your instructions, here is the SQL query I have generated to answer the question `{}`:
```sql
"#,
            examples_block, question, question
        );

        debug!("Prepared LLM prompt: {}", prompt);
        prompt
    }

    fn extract_sql(&self, content: &str) -> String {
        // Try to extract SQL from between ```sql and ``` markers
        if let Some(start) = content.find("```sql") {
            if let Some(end) = content.rfind("```") {
                if end > start + 6 {
                    let sql = &content[start + 6..end].trim();
                    debug!("Extracted SQL from code block markers: {}", sql);
                    return sql.to_string();
                }
            }
        }

        // Try alternate syntax without a language specifier: ``` and ```
        if let Some(start) = content.find("```") {
            let content_after_first = &content[start + 3..];
            if let Some(end) = content_after_first.find("```") {
                let sql = &content_after_first[..end].trim();
                debug!("Extracted SQL from bare code block: {}", sql);
                return sql.to_string();
            }
        }

        // No explicit code blocks; look for a line starting with a SQL keyword
        // and collect until the end of the statement
        let sql_keywords = ["SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP"];
        let lines: Vec<&str> = content.lines().collect();

        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim().to_uppercase();
            if sql_keywords.iter().any(|kw| trimmed.starts_with(kw)) {
                let mut sql = line.trim().to_string();

                for next_line in lines.iter().skip(i + 1).map(|l| l.trim()) {
                    if next_line.starts_with("```") {
                        break;
                    }

                    sql.push(' ');
                    sql.push_str(next_line);

                    if next_line.ends_with(';') {
                        break;
                    }
                }

                debug!("Extracted SQL using line scanning: {}", sql);
                return sql;
            }
        }

        info!("Could not extract SQL using usual methods, returning full content");
        content.to_string()
    }

    async fn request_completion(&self, prompt: String) -> Result<String, LlmError> {
        info!("Sending request to Ollama with model: {}", self.model);
        debug!("API URL: {}", self.api_url);

        let request = OllamaRequest {
            model: self.model.clone(),
            prompt,
            temperature: 0.1,
            stream: false, // Explicitly disable streaming
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = match response.text().await {
                Ok(body) => format!(" - Response body: {}", body),
                Err(_) => String::new(),
            };

            error!("Ollama API responded with status code: {}{}", status, error_body);
            return Err(LlmError::ResponseError(format!(
                "Ollama API responded with status code: {}{}",
                status, error_body
            )));
        }

        let response_text = response.text().await
            .map_err(|e| LlmError::ResponseError(format!("Failed to read response body: {}", e)))?;

        debug!("Raw response from Ollama: {}", response_text);

        let ollama_response = match serde_json::from_str::<OllamaResponse>(&response_text) {
            Ok(resp) => resp,
            Err(e) => {
                error!("Failed to parse Ollama response: {} - Response was: {}", e, response_text);
                return Err(LlmError::ResponseError(format!(
                    "Failed to parse Ollama response: {} - Response was: {}",
                    e, response_text
                )));
            }
        };

        Ok(ollama_response.response)
    }
}

#[async_trait]
impl SqlGenerator for OllamaProvider {
    async fn generate_sql(
        &self,
        question: &str,
        examples: Option<&[ExamplePair]>,
    ) -> Result<String, LlmError> {
        let prompt = self.prepare_prompt(question, examples);
        let content = self.request_completion(prompt).await?;

        let sql = self.extract_sql(&content);

        // Ensure we don't return empty SQL
        if sql.trim().is_empty() {
            return Err(LlmError::ResponseError(
                "Failed to extract valid SQL from response".to_string(),
            ));
        }

        Ok(sql)
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.request_completion(prompt.to_string()).await
    }
}
