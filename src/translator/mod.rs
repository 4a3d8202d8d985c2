//! Natural language to operation descriptor.
//!
//! The translator is an upstream collaborator of the gateway: whatever it
//! produces still goes through validation and, for writes, human approval.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::approval::descriptor::NewOperation;
use crate::config::TranslatorConfig;
use crate::database::catalog::{Catalog, ColumnInfo};
use crate::types::OperationKind;

const SYSTEM_PROMPT: &str = "You translate a user's request into exactly one SQL statement for PostgreSQL. \
Reply with a JSON object with keys: operation (one of SELECT, INSERT, UPDATE, DELETE, or UNKNOWN), \
table (primary table name or null), sql (the statement, using only tables and columns from the schema). \
Never produce DDL (CREATE, DROP, ALTER, TRUNCATE) or more than one statement. Return only JSON.";

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Translator not configured: {0}")]
    NotConfigured(String),

    #[error("Translator request failed: {0}")]
    Request(String),

    #[error("Could not interpret the request: {0}")]
    Unintelligible(String),
}

impl From<reqwest::Error> for TranslateError {
    fn from(err: reqwest::Error) -> Self {
        TranslateError::Request(err.to_string())
    }
}

/// Produces an operation descriptor from natural language
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_database: &str) -> Result<NewOperation, TranslateError>;
}

/// Translator backed by an OpenAI-compatible chat completions endpoint
pub struct LlmTranslator {
    client: reqwest::Client,
    config: TranslatorConfig,
    catalog: Option<Arc<dyn Catalog>>,
    schema_cache: RwLock<HashMap<String, String>>,
}

impl LlmTranslator {
    pub fn new(config: TranslatorConfig, catalog: Option<Arc<dyn Catalog>>) -> Result<Self, TranslateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            catalog,
            schema_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Compact `table(col type, ...)` listing for the prompt. Failures only cost prompt quality.
    async fn schema_text(&self, target_database: &str) -> Option<String> {
        if let Some(cached) = self.schema_cache.read().await.get(target_database) {
            return Some(cached.clone());
        }

        let catalog = self.catalog.as_ref()?;
        let columns = match catalog.columns(target_database).await {
            Ok(columns) => columns,
            Err(e) => {
                tracing::warn!("Schema lookup on {} failed: {}", target_database, e);
                return None;
            }
        };

        let text = render_schema(&columns);
        self.schema_cache
            .write()
            .await
            .insert(target_database.to_string(), text.clone());
        Some(text)
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(&self, text: &str, target_database: &str) -> Result<NewOperation, TranslateError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| TranslateError::NotConfigured("TRANSLATOR_API_KEY is not set".into()))?;

        let schema = self
            .schema_text(target_database)
            .await
            .unwrap_or_else(|| "(schema unavailable)".to_string());
        let user_prompt = format!(
            "Schema for target database '{}':\n{}\n\nUser request: '''{}'''",
            target_database, schema, text
        );

        let body = json!({
            "model": self.config.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt },
            ],
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TranslateError::Request(format!("{}: {}", status, detail)));
        }

        let reply: Value = response.json().await?;
        let content = reply
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| TranslateError::Unintelligible("model reply has no content".into()))?;

        tracing::debug!("Translator reply for '{}': {}", text, content);

        let op = parse_model_output(content, target_database)?;
        Ok(op.with_source(text))
    }
}

#[derive(Debug, Deserialize)]
struct ModelReply {
    operation: Option<String>,
    table: Option<String>,
    sql: Option<String>,
}

/// Turn the model's JSON (possibly wrapped in prose or code fences) into an operation
pub fn parse_model_output(text: &str, target_database: &str) -> Result<NewOperation, TranslateError> {
    let json_text = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text.trim(),
    };

    let reply: ModelReply = serde_json::from_str(json_text)
        .map_err(|e| TranslateError::Unintelligible(format!("model output is not JSON: {}", e)))?;

    if reply
        .operation
        .as_deref()
        .is_some_and(|o| o.eq_ignore_ascii_case("UNKNOWN"))
    {
        return Err(TranslateError::Unintelligible(
            "the model could not map the request to a statement".into(),
        ));
    }

    let sql = reply
        .sql
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TranslateError::Unintelligible("model did not produce a statement".into()))?;

    let leading_verb = sql.split_whitespace().next().unwrap_or_default();
    let kind = reply
        .operation
        .as_deref()
        .and_then(OperationKind::from_sql_verb)
        .or_else(|| OperationKind::from_sql_verb(leading_verb))
        .ok_or_else(|| {
            TranslateError::Unintelligible(format!(
                "unsupported operation '{}'",
                reply.operation.as_deref().unwrap_or(leading_verb)
            ))
        })?;

    Ok(NewOperation::new(kind, target_database, sql).with_metadata(json!({ "table": reply.table })))
}

fn render_schema(columns: &[ColumnInfo]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current: Option<&str> = None;

    for ColumnInfo {
        table,
        column,
        data_type,
    } in columns
    {
        if current != Some(table.as_str()) {
            lines.push(format!("{}(", table));
            current = Some(table.as_str());
        } else if let Some(last) = lines.last_mut() {
            last.push_str(", ");
        }
        if let Some(last) = lines.last_mut() {
            last.push_str(&format!("{} {}", column, data_type));
        }
    }

    lines.into_iter().map(|l| l + ")").collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json() {
        let text = "Here you go:\n```json\n{\"operation\": \"DELETE\", \"table\": \"employees\", \"sql\": \"DELETE FROM employees WHERE emp_id = 42;\"}\n```";
        let op = parse_model_output(text, "hr").unwrap();
        assert_eq!(op.kind, OperationKind::Delete);
        assert_eq!(op.target_database, "hr");
        assert_eq!(op.statement, "DELETE FROM employees WHERE emp_id = 42;");
        assert_eq!(op.metadata["table"], "employees");
    }

    #[test]
    fn maps_sql_verbs_to_kinds() {
        let op = parse_model_output(r#"{"operation":"INSERT","sql":"INSERT INTO t VALUES (1)"}"#, "hr").unwrap();
        assert_eq!(op.kind, OperationKind::Create);

        let inferred = parse_model_output(r#"{"sql":"SELECT 1"}"#, "hr").unwrap();
        assert_eq!(inferred.kind, OperationKind::Read);
    }

    #[test]
    fn unknown_operation_is_unintelligible() {
        let err = parse_model_output(r#"{"operation":"UNKNOWN","sql":"EXPLAIN nothing"}"#, "hr").unwrap_err();
        assert!(matches!(err, TranslateError::Unintelligible(_)));

        let err = parse_model_output("I cannot help with that", "hr").unwrap_err();
        assert!(matches!(err, TranslateError::Unintelligible(_)));
    }

    #[test]
    fn renders_schema_per_table() {
        let col = |table: &str, column: &str, data_type: &str| ColumnInfo {
            table: table.into(),
            column: column.into(),
            data_type: data_type.into(),
        };
        let cols = vec![
            col("employees", "emp_id", "integer"),
            col("employees", "name", "text"),
            col("departments", "name", "text"),
        ];
        assert_eq!(
            render_schema(&cols),
            "employees(emp_id integer, name text)\ndepartments(name text)"
        );
    }
}
