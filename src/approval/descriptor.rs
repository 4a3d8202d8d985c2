use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::approval::error::{GatewayError, GatewayResult};
use crate::types::{OperationKind, OperationStatus};

/// Statement-level keywords that are never accepted, whatever the kind
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE", "ATTACH", "DETACH", "PRAGMA",
    "VACUUM",
];

static STRING_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'(?:[^']|'')*'").expect("literal pattern"));

static FORBIDDEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b({})\b", FORBIDDEN_KEYWORDS.join("|"))).expect("keyword pattern")
});

static WRITE_VERB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(INSERT|UPDATE|DELETE|MERGE)\b").expect("write verb pattern"));

/// Operation as produced by the query pipeline, before the gateway sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOperation {
    pub kind: OperationKind,
    pub target_database: String,
    pub statement: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub natural_language_source: String,
    #[serde(default)]
    pub metadata: Value,
}

impl NewOperation {
    pub fn new(
        kind: OperationKind,
        target_database: impl Into<String>,
        statement: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            target_database: target_database.into(),
            statement: statement.into(),
            params: Vec::new(),
            natural_language_source: String::new(),
            metadata: Value::Null,
        }
    }

    pub fn with_source(mut self, text: impl Into<String>) -> Self {
        self.natural_language_source = text.into();
        self
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check the descriptor is well formed. Does not know which databases exist;
    /// the gateway checks the target against its allow-list.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.target_database.trim().is_empty() {
            return Err(GatewayError::validation("target_database is required"));
        }
        validate_statement(self.kind, &self.statement)
    }
}

/// Operation as held by the pending store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub id: Uuid,
    pub kind: OperationKind,
    pub target_database: String,
    pub statement: String,
    pub params: Vec<Value>,
    pub natural_language_source: String,
    pub metadata: Value,
    pub status: OperationStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl OperationDescriptor {
    /// Fresh pending entry for `op`
    pub fn pending(op: NewOperation, id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: op.kind,
            target_database: op.target_database,
            statement: op.statement,
            params: op.params,
            natural_language_source: op.natural_language_source,
            metadata: op.metadata,
            status: OperationStatus::Pending,
            created_at,
            decided_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// The caller-supplied part of the descriptor
    pub fn as_new_operation(&self) -> NewOperation {
        NewOperation {
            kind: self.kind,
            target_database: self.target_database.clone(),
            statement: self.statement.clone(),
            params: self.params.clone(),
            natural_language_source: self.natural_language_source.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Local view of the entry once `outcome` is recorded
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.status = outcome.status();
        self.completed_at = Some(Utc::now());
        match outcome {
            Outcome::Executed(result) => self.result = Some(result),
            Outcome::Failed(error) => self.error = Some(error),
        }
        self
    }
}

/// Execution outcome recorded against an approved operation
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Executed(Value),
    Failed(String),
}

impl Outcome {
    pub fn status(&self) -> OperationStatus {
        match self {
            Outcome::Executed(_) => OperationStatus::Executed,
            Outcome::Failed(_) => OperationStatus::Failed,
        }
    }
}

/// Statement text with quoted literals blanked out
fn strip_literals(statement: &str) -> String {
    STRING_LITERAL.replace_all(statement, "''").into_owned()
}

fn validate_statement(kind: OperationKind, statement: &str) -> GatewayResult<()> {
    let stripped = strip_literals(statement.trim());
    let body = stripped.trim_end().trim_end_matches(';').trim_end();

    if body.is_empty() {
        return Err(GatewayError::validation("statement is required"));
    }
    if body.contains(';') {
        return Err(GatewayError::validation(
            "statement must contain a single SQL statement",
        ));
    }
    if let Some(found) = FORBIDDEN.find(body) {
        return Err(GatewayError::validation(format!(
            "statement contains forbidden keyword '{}'",
            found.as_str().to_ascii_uppercase()
        )));
    }

    let leading = body
        .split(|c: char| c.is_whitespace() || c == '(')
        .find(|word| !word.is_empty())
        .unwrap_or_default()
        .to_ascii_uppercase();
    if !kind.statement_keywords().contains(&leading.as_str()) {
        return Err(GatewayError::validation(format!(
            "{} operation cannot run a statement starting with '{}'",
            kind, leading
        )));
    }

    if kind == OperationKind::Read {
        if let Some(found) = WRITE_VERB.find(body) {
            return Err(GatewayError::validation(format!(
                "READ statement must not contain '{}'",
                found.as_str().to_ascii_uppercase()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(kind: OperationKind, statement: &str) -> GatewayResult<()> {
        NewOperation::new(kind, "hr", statement).validate()
    }

    #[test]
    fn accepts_matching_statements() {
        assert!(check(OperationKind::Read, "SELECT * FROM employees").is_ok());
        assert!(check(OperationKind::Read, "with t as (select 1) select * from t;").is_ok());
        assert!(check(OperationKind::Delete, "DELETE FROM employees WHERE id=42").is_ok());
        assert!(check(
            OperationKind::Create,
            "INSERT INTO notes (body) VALUES ('drop by; create later')"
        )
        .is_ok());
    }

    #[test]
    fn rejects_kind_mismatch() {
        let err = check(OperationKind::Read, "DELETE FROM employees").unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(check(OperationKind::Update, "INSERT INTO t VALUES (1)").is_err());
    }

    #[test]
    fn rejects_ddl_and_stacked_statements() {
        assert!(check(OperationKind::Delete, "DELETE FROM t; DROP TABLE t").is_err());
        assert!(check(OperationKind::Update, "UPDATE t SET a = 1; SELECT 1").is_err());
        assert!(check(OperationKind::Read, "SELECT * FROM t WHERE 1=1 UNION SELECT 1; TRUNCATE t").is_err());
    }

    #[test]
    fn rejects_write_hidden_in_read() {
        assert!(check(
            OperationKind::Read,
            "WITH gone AS (DELETE FROM t RETURNING *) SELECT * FROM gone"
        )
        .is_err());
    }

    #[test]
    fn requires_target_and_statement() {
        assert!(NewOperation::new(OperationKind::Read, "  ", "SELECT 1").validate().is_err());
        assert!(check(OperationKind::Read, "  ;  ").is_err());
    }

    #[test]
    fn pending_keeps_caller_fields() {
        let op = NewOperation::new(OperationKind::Delete, "hr", "DELETE FROM t WHERE id = $1")
            .with_params(vec![serde_json::json!(42)])
            .with_source("remove employee 42");
        let stored = OperationDescriptor::pending(op.clone(), Uuid::new_v4(), Utc::now());
        assert_eq!(stored.status, OperationStatus::Pending);
        assert_eq!(stored.as_new_operation(), op);
        assert!(stored.result.is_none() && stored.error.is_none());
    }
}
