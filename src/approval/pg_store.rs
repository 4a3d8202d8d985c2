use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::approval::descriptor::{NewOperation, OperationDescriptor, Outcome};
use crate::approval::error::{GatewayError, GatewayResult};
use crate::approval::store::PendingStore;
use crate::types::{Decision, OperationStatus};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pending_operations (
    seq BIGSERIAL NOT NULL,
    id UUID PRIMARY KEY,
    kind VARCHAR(16) NOT NULL,
    target_database TEXT NOT NULL,
    statement TEXT NOT NULL,
    params JSONB NOT NULL DEFAULT '[]',
    natural_language_source TEXT NOT NULL DEFAULT '',
    metadata JSONB NOT NULL DEFAULT 'null',
    status VARCHAR(16) NOT NULL DEFAULT 'PENDING',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    decided_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ,
    result JSONB,
    error TEXT
)"#;

const CREATE_STATUS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS pending_operations_status_seq ON pending_operations (status, seq)";

#[derive(Debug, FromRow)]
struct PendingRow {
    id: Uuid,
    kind: String,
    target_database: String,
    statement: String,
    params: Value,
    natural_language_source: String,
    metadata: Value,
    status: String,
    created_at: DateTime<Utc>,
    decided_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<Value>,
    error: Option<String>,
}

impl TryFrom<PendingRow> for OperationDescriptor {
    type Error = GatewayError;

    fn try_from(row: PendingRow) -> Result<Self, Self::Error> {
        let kind = row.kind.parse().map_err(GatewayError::Storage)?;
        let status = row.status.parse().map_err(GatewayError::Storage)?;
        let params = match row.params {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };

        Ok(OperationDescriptor {
            id: row.id,
            kind,
            target_database: row.target_database,
            statement: row.statement,
            params,
            natural_language_source: row.natural_language_source,
            metadata: row.metadata,
            status,
            created_at: row.created_at,
            decided_at: row.decided_at,
            completed_at: row.completed_at,
            result: row.result,
            error: row.error,
        })
    }
}

/// Pending store persisted in the system database so entries survive restarts
pub struct PgPendingStore {
    pool: PgPool,
}

impl PgPendingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table if it does not exist yet
    pub async fn init(&self) -> GatewayResult<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_STATUS_INDEX).execute(&self.pool).await?;
        info!("Pending store table ready");
        Ok(())
    }

    async fn current_status(&self, id: Uuid) -> GatewayResult<OperationStatus> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM pending_operations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match status {
            Some(s) => s.parse().map_err(GatewayError::Storage),
            None => Err(GatewayError::NotFound(id)),
        }
    }
}

#[async_trait]
impl PendingStore for PgPendingStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn enqueue(&self, op: NewOperation) -> GatewayResult<Uuid> {
        let params = Value::Array(op.params);

        loop {
            let id = Uuid::new_v4();
            let inserted: Option<Uuid> = sqlx::query_scalar(
                r#"INSERT INTO pending_operations
                       (id, kind, target_database, statement, params, natural_language_source, metadata)
                   VALUES ($1, $2, $3, $4, $5, $6, $7)
                   ON CONFLICT (id) DO NOTHING
                   RETURNING id"#,
            )
            .bind(id)
            .bind(op.kind.as_str())
            .bind(&op.target_database)
            .bind(&op.statement)
            .bind(&params)
            .bind(&op.natural_language_source)
            .bind(&op.metadata)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(id) = inserted {
                debug!("Enqueued {} on {}: {}", op.kind, op.target_database, op.statement);
                return Ok(id);
            }
        }
    }

    async fn get(&self, id: Uuid) -> GatewayResult<OperationDescriptor> {
        let row = sqlx::query_as::<_, PendingRow>("SELECT * FROM pending_operations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or(GatewayError::NotFound(id))?.try_into()
    }

    async fn list(&self, status: Option<OperationStatus>) -> GatewayResult<Vec<OperationDescriptor>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, PendingRow>(
                    "SELECT * FROM pending_operations WHERE status = $1 ORDER BY seq ASC",
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, PendingRow>("SELECT * FROM pending_operations ORDER BY seq ASC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(OperationDescriptor::try_from).collect()
    }

    async fn mark_decided(&self, id: Uuid, decision: Decision) -> GatewayResult<OperationDescriptor> {
        // Single conditional UPDATE: only one concurrent caller can match status = 'PENDING'
        let row = sqlx::query_as::<_, PendingRow>(
            r#"UPDATE pending_operations
               SET status = $1, decided_at = NOW()
               WHERE id = $2 AND status = 'PENDING'
               RETURNING *"#,
        )
        .bind(decision.status().as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                info!("Operation {} marked {}", id, decision.status());
                row.try_into()
            }
            None => {
                let status = self.current_status(id).await?;
                Err(GatewayError::AlreadyResolved { id, status })
            }
        }
    }

    async fn mark_outcome(&self, id: Uuid, outcome: Outcome) -> GatewayResult<OperationDescriptor> {
        let next = outcome.status();
        let (result, error) = match outcome {
            Outcome::Executed(result) => (Some(result), None),
            Outcome::Failed(error) => (None, Some(error)),
        };

        let row = sqlx::query_as::<_, PendingRow>(
            r#"UPDATE pending_operations
               SET status = $1, result = $2, error = $3, completed_at = NOW()
               WHERE id = $4 AND status = 'APPROVED'
               RETURNING *"#,
        )
        .bind(next.as_str())
        .bind(result)
        .bind(error)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                info!("Operation {} finished as {}", id, next);
                row.try_into()
            }
            None => {
                let from = self.current_status(id).await?;
                Err(GatewayError::InvalidTransition { id, from, to: next })
            }
        }
    }

    async fn health_check(&self) -> GatewayResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
