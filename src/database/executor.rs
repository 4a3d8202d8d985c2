// Executor - applies a resolved statement against its target database

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use sqlx::postgres::{PgArguments, PgRow, PgTypeInfo};
use sqlx::types::BigDecimal;
use sqlx::{Column, Postgres, Row, TypeInfo};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

use crate::approval::descriptor::NewOperation;
use crate::config::DatabaseConfig;
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::types::OperationKind;

static RETURNING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bRETURNING\b").expect("returning pattern"));

/// Data-layer faults while applying an operation
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("Unknown target database: {0}")]
    UnknownDatabase(String),

    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("Statement failed: {0}")]
    Statement(String),
}

impl From<DatabaseError> for ExecutionError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::UnknownTarget(name) => ExecutionError::UnknownDatabase(name),
            other => ExecutionError::Unavailable(other.to_string()),
        }
    }
}

/// Applies one operation to one target database.
///
/// Writes run inside a transaction: either the whole statement commits or
/// nothing is observable. READs run in a read-only transaction. Implementations
/// never retry.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn apply(&self, op: &NewOperation) -> Result<Value, ExecutionError>;
}

/// Executor backed by the Postgres pools of the [`DatabaseManager`]
pub struct PgExecutor {
    databases: Arc<DatabaseManager>,
    log_queries: bool,
    slow_query_threshold: Option<Duration>,
}

impl PgExecutor {
    pub fn new(databases: Arc<DatabaseManager>, config: &DatabaseConfig) -> Self {
        Self {
            databases,
            log_queries: config.enable_query_logging,
            slow_query_threshold: config
                .enable_slow_query_warning
                .then(|| Duration::from_millis(config.slow_query_threshold_ms)),
        }
    }

    async fn run(
        &self,
        conn: &mut sqlx::PgConnection,
        op: &NewOperation,
    ) -> Result<Value, ExecutionError> {
        let mut query = sqlx::query(&op.statement);
        for param in &op.params {
            query = bind_param(query, param);
        }

        if op.kind == OperationKind::Read {
            let rows = query.fetch_all(&mut *conn).await.map_err(statement_error)?;
            let rows = rows.iter().map(row_to_json).collect::<Vec<_>>();
            return Ok(json!({ "row_count": rows.len(), "rows": rows }));
        }

        if returns_rows(&op.statement) {
            let rows = query.fetch_all(&mut *conn).await.map_err(statement_error)?;
            let rows = rows.iter().map(row_to_json).collect::<Vec<_>>();
            Ok(json!({ "rows_affected": rows.len(), "rows": rows }))
        } else {
            let done = query.execute(&mut *conn).await.map_err(statement_error)?;
            Ok(json!({ "rows_affected": done.rows_affected() }))
        }
    }
}

#[async_trait]
impl Executor for PgExecutor {
    async fn apply(&self, op: &NewOperation) -> Result<Value, ExecutionError> {
        let pool = self.databases.target_pool(&op.target_database).await?;

        if self.log_queries {
            tracing::debug!("Executing {} on {}: {}", op.kind, op.target_database, op.statement);
        }

        let started = Instant::now();
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| ExecutionError::Unavailable(e.to_string()))?;

        // READs cannot reach approval, so the database must refuse any side effect
        let outcome = match access_mode(op.kind) {
            Some(mode) => match sqlx::query(mode).execute(&mut *tx).await {
                Ok(_) => self.run(&mut tx, op).await,
                Err(e) => Err(statement_error(e)),
            },
            None => self.run(&mut tx, op).await,
        };

        let outcome = match outcome {
            Ok(result) => match tx.commit().await {
                Ok(()) => Ok(result),
                Err(e) => Err(ExecutionError::Statement(format!("commit failed: {}", e))),
            },
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!("Rollback on {} failed: {}", op.target_database, rollback);
                }
                Err(err)
            }
        };

        let elapsed = started.elapsed();
        if let Some(threshold) = self.slow_query_threshold {
            if elapsed > threshold {
                tracing::warn!(
                    "Slow {} on {} took {}ms: {}",
                    op.kind,
                    op.target_database,
                    elapsed.as_millis(),
                    op.statement
                );
            }
        }

        outcome
    }
}

fn statement_error(err: sqlx::Error) -> ExecutionError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            ExecutionError::Unavailable(err.to_string())
        }
        other => ExecutionError::Statement(other.to_string()),
    }
}

/// Transaction characteristics applied before running `kind`
fn access_mode(kind: OperationKind) -> Option<&'static str> {
    match kind {
        OperationKind::Read => Some("SET TRANSACTION READ ONLY"),
        _ => None,
    }
}

/// Whether a write statement hands rows back (`... RETURNING`)
fn returns_rows(statement: &str) -> bool {
    RETURNING.is_match(statement)
}

/// Convert database row to JSON
fn row_to_json(row: &PgRow) -> Value {
    let mut record = Map::new();

    for (i, column) in row.columns().iter().enumerate() {
        let value = extract_column_value(row, i, column.type_info());
        record.insert(column.name().to_string(), value);
    }

    Value::Object(record)
}

/// Extract typed value from database column
fn extract_column_value(row: &PgRow, index: usize, type_info: &PgTypeInfo) -> Value {
    let type_name = type_info.name();

    match type_name {
        "UUID" => opt(row.try_get::<Option<Uuid>, _>(index), |u| Value::String(u.to_string())),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
            opt(row.try_get::<Option<String>, _>(index), Value::String)
        }
        "INT2" => opt(row.try_get::<Option<i16>, _>(index), |n| json!(n)),
        "INT4" => opt(row.try_get::<Option<i32>, _>(index), |n| json!(n)),
        "INT8" => opt(row.try_get::<Option<i64>, _>(index), |n| json!(n)),
        "FLOAT4" => opt(row.try_get::<Option<f32>, _>(index), |n| json!(n)),
        "FLOAT8" => opt(row.try_get::<Option<f64>, _>(index), |n| json!(n)),
        "NUMERIC" => opt(row.try_get::<Option<BigDecimal>, _>(index), |d| {
            let text = d.to_string();
            text.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::String(text))
        }),
        "BOOL" => opt(row.try_get::<Option<bool>, _>(index), Value::Bool),
        "JSONB" | "JSON" => row.try_get::<Option<Value>, _>(index).ok().flatten().unwrap_or(Value::Null),
        "TIMESTAMPTZ" => opt(
            row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index),
            |t| Value::String(t.to_rfc3339()),
        ),
        "TIMESTAMP" => opt(row.try_get::<Option<chrono::NaiveDateTime>, _>(index), |t| {
            Value::String(t.to_string())
        }),
        "DATE" => opt(row.try_get::<Option<chrono::NaiveDate>, _>(index), |d| {
            Value::String(d.to_string())
        }),
        _ => {
            // Fallback to string representation
            tracing::warn!("Unhandled PostgreSQL type: {}, falling back to string", type_name);
            row.try_get::<Option<String>, _>(index)
                .ok()
                .flatten()
                .map(Value::String)
                .unwrap_or_else(|| Value::String(format!("<unsupported type: {}>", type_name)))
        }
    }
}

fn opt<T>(value: Result<Option<T>, sqlx::Error>, to_json: impl FnOnce(T) -> Value) -> Value {
    value.ok().flatten().map(to_json).unwrap_or(Value::Null)
}

/// JSON number as the narrowest Postgres type that holds it exactly
#[derive(Debug, PartialEq)]
enum NumericParam {
    Int8(i64),
    Numeric(BigDecimal),
    Float8(f64),
}

fn numeric_param(n: &serde_json::Number) -> NumericParam {
    if let Some(i) = n.as_i64() {
        NumericParam::Int8(i)
    } else if let Some(u) = n.as_u64() {
        // Above i64::MAX
        NumericParam::Numeric(BigDecimal::from(u))
    } else {
        NumericParam::Float8(n.as_f64().unwrap_or(f64::NAN))
    }
}

/// Bind parameter to SQL query
fn bind_param<'q>(
    q: sqlx::query::Query<'q, Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => match numeric_param(n) {
            NumericParam::Int8(i) => q.bind(i),
            NumericParam::Numeric(d) => q.bind(d),
            NumericParam::Float8(f) => q.bind(f),
        },
        Value::String(s) => q.bind(s.as_str()),
        // Arrays and objects travel as JSONB
        Value::Array(_) | Value::Object(_) => q.bind(v),
    }
}
