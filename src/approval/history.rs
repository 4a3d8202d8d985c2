use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::collections::VecDeque;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::approval::error::{GatewayError, GatewayResult};
use crate::types::OperationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Submit,
    Decide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOutcome {
    Executed,
    RequiresHumanApproval,
    Rejected,
    Failed,
    Invalid,
}

impl HistoryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryOutcome::Executed => "executed",
            HistoryOutcome::RequiresHumanApproval => "requires_human_approval",
            HistoryOutcome::Rejected => "rejected",
            HistoryOutcome::Failed => "failed",
            HistoryOutcome::Invalid => "invalid",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "executed" => Some(HistoryOutcome::Executed),
            "requires_human_approval" => Some(HistoryOutcome::RequiresHumanApproval),
            "rejected" => Some(HistoryOutcome::Rejected),
            "failed" => Some(HistoryOutcome::Failed),
            "invalid" => Some(HistoryOutcome::Invalid),
            _ => None,
        }
    }
}

/// One audited submission or decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub recorded_at: DateTime<Utc>,
    pub action: HistoryAction,
    pub outcome: HistoryOutcome,
    pub operation_id: Option<Uuid>,
    pub kind: Option<OperationKind>,
    pub target_database: String,
    pub statement: String,
    pub natural_language_source: String,
    pub detail: Option<String>,
}

impl HistoryEntry {
    pub fn new(action: HistoryAction, outcome: HistoryOutcome) -> Self {
        Self {
            recorded_at: Utc::now(),
            action,
            outcome,
            operation_id: None,
            kind: None,
            target_database: String::new(),
            statement: String::new(),
            natural_language_source: String::new(),
            detail: None,
        }
    }

    pub fn operation(
        mut self,
        kind: OperationKind,
        target_database: &str,
        statement: &str,
        natural_language_source: &str,
    ) -> Self {
        self.kind = Some(kind);
        self.target_database = target_database.to_string();
        self.statement = statement.to_string();
        self.natural_language_source = natural_language_source.to_string();
        self
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.operation_id = Some(id);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Bounded audit log of past submissions and decisions, oldest first
#[async_trait]
pub trait HistoryLog: Send + Sync {
    async fn record(&self, entry: HistoryEntry) -> GatewayResult<()>;

    async fn list(&self) -> GatewayResult<Vec<HistoryEntry>>;

    /// Remove every entry, returning how many were dropped
    async fn clear(&self) -> GatewayResult<usize>;
}

pub struct MemoryHistory {
    limit: usize,
    entries: RwLock<VecDeque<HistoryEntry>>,
}

impl MemoryHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            entries: RwLock::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl HistoryLog for MemoryHistory {
    async fn record(&self, entry: HistoryEntry) -> GatewayResult<()> {
        let mut entries = self.entries.write().await;
        entries.push_back(entry);
        while entries.len() > self.limit {
            entries.pop_front();
        }
        Ok(())
    }

    async fn list(&self) -> GatewayResult<Vec<HistoryEntry>> {
        Ok(self.entries.read().await.iter().cloned().collect())
    }

    async fn clear(&self) -> GatewayResult<usize> {
        let mut entries = self.entries.write().await;
        let dropped = entries.len();
        entries.clear();
        Ok(dropped)
    }
}

const CREATE_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS operation_history (
    seq BIGSERIAL PRIMARY KEY,
    recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    action VARCHAR(16) NOT NULL,
    outcome VARCHAR(32) NOT NULL,
    operation_id UUID,
    kind VARCHAR(16),
    target_database TEXT NOT NULL,
    statement TEXT NOT NULL,
    natural_language_source TEXT NOT NULL,
    detail TEXT
)"#;

#[derive(Debug, FromRow)]
struct HistoryRow {
    recorded_at: DateTime<Utc>,
    action: String,
    outcome: String,
    operation_id: Option<Uuid>,
    kind: Option<String>,
    target_database: String,
    statement: String,
    natural_language_source: String,
    detail: Option<String>,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = GatewayError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let action = match row.action.as_str() {
            "submit" => HistoryAction::Submit,
            "decide" => HistoryAction::Decide,
            other => return Err(GatewayError::Storage(format!("unknown history action '{}'", other))),
        };
        let outcome = HistoryOutcome::parse(&row.outcome)
            .ok_or_else(|| GatewayError::Storage(format!("unknown history outcome '{}'", row.outcome)))?;
        let kind = row
            .kind
            .map(|k| k.parse::<OperationKind>())
            .transpose()
            .map_err(GatewayError::Storage)?;

        Ok(HistoryEntry {
            recorded_at: row.recorded_at,
            action,
            outcome,
            operation_id: row.operation_id,
            kind,
            target_database: row.target_database,
            statement: row.statement,
            natural_language_source: row.natural_language_source,
            detail: row.detail,
        })
    }
}

/// History persisted next to the Postgres pending store
pub struct PgHistory {
    pool: PgPool,
    limit: i64,
}

impl PgHistory {
    pub fn new(pool: PgPool, limit: usize) -> Self {
        Self {
            pool,
            limit: limit.max(1) as i64,
        }
    }

    pub async fn init(&self) -> GatewayResult<()> {
        sqlx::query(CREATE_HISTORY_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryLog for PgHistory {
    async fn record(&self, entry: HistoryEntry) -> GatewayResult<()> {
        let action = match entry.action {
            HistoryAction::Submit => "submit",
            HistoryAction::Decide => "decide",
        };

        sqlx::query(
            r#"INSERT INTO operation_history
                   (recorded_at, action, outcome, operation_id, kind, target_database,
                    statement, natural_language_source, detail)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(entry.recorded_at)
        .bind(action)
        .bind(entry.outcome.as_str())
        .bind(entry.operation_id)
        .bind(entry.kind.map(|k| k.as_str()))
        .bind(&entry.target_database)
        .bind(&entry.statement)
        .bind(&entry.natural_language_source)
        .bind(&entry.detail)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"DELETE FROM operation_history
               WHERE seq <= (SELECT MAX(seq) FROM operation_history) - $1"#,
        )
        .bind(self.limit)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> GatewayResult<Vec<HistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>("SELECT * FROM operation_history ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(HistoryEntry::try_from).collect()
    }

    async fn clear(&self) -> GatewayResult<usize> {
        let done = sqlx::query("DELETE FROM operation_history")
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() as usize)
    }
}
