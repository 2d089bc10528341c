//! SQL generation: one model call, then fenced-block extraction. Never returns an error.

use regex::Regex;
use serde::Serialize;
use sqlsage_core::TextGenerator;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GenerationResult {
    Sql {
        sql: String,
        raw_model_text: String,
    },
    Failure {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw_model_text: Option<String>,
    },
}

/// Inner text of the first ```` ```sql ```` block, trimmed. Empty blocks count as absent.
pub fn extract_sql(text: &str) -> Option<String> {
    let re = Regex::new(r"(?is)```sql\b(.*?)```").ok()?;
    let sql = re.captures(text)?.get(1)?.as_str().trim();
    if sql.is_empty() {
        None
    } else {
        Some(sql.to_string())
    }
}

pub async fn generate_sql(generator: &dyn TextGenerator, prompt: &str) -> GenerationResult {
    let raw = match generator.generate(prompt).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(generator = generator.name(), error = %e, "SQL generation failed");
            return GenerationResult::Failure {
                error: format!("AI Error: {}", e),
                raw_model_text: None,
            };
        }
    };

    match extract_sql(&raw) {
        Some(sql) => GenerationResult::Sql {
            sql,
            raw_model_text: raw,
        },
        None => {
            tracing::info!(generator = generator.name(), "Model reply contained no SQL block");
            GenerationResult::Failure {
                error: format!("No valid SQL found in response:\n{}", raw),
                raw_model_text: Some(raw),
            }
        }
    }
}
