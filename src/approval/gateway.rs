use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::approval::descriptor::{NewOperation, OperationDescriptor, Outcome};
use crate::approval::error::{GatewayError, GatewayResult};
use crate::approval::history::{HistoryAction, HistoryEntry, HistoryLog, HistoryOutcome};
use crate::approval::preview::{preview, OperationPreview};
use crate::approval::store::PendingStore;
use crate::config::GatewayConfig;
use crate::database::executor::Executor;
use crate::types::{Decision, OperationStatus};

/// Result of handing an operation to the gateway
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "execution_status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// READ operations run straight away
    Executed { result: Value },
    /// Writes wait in the pending store for an operator
    RequiresHumanApproval {
        pending_id: Uuid,
        preview: OperationPreview,
    },
}

/// Result of a successful decision. Execution failures come back as
/// [`GatewayError::Execution`] after the entry is marked FAILED.
#[derive(Debug, Clone)]
pub enum DecisionOutcome {
    Executed(OperationDescriptor),
    Rejected(OperationDescriptor),
}

impl DecisionOutcome {
    pub fn descriptor(&self) -> &OperationDescriptor {
        match self {
            DecisionOutcome::Executed(d) | DecisionOutcome::Rejected(d) => d,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub total_operations: usize,
    pub by_status: BTreeMap<OperationStatus, usize>,
    pub by_kind: BTreeMap<String, usize>,
    pub by_database: BTreeMap<String, usize>,
    pub recent_operations: Vec<OperationDescriptor>,
}

/// Single entry point for operations coming out of the query pipeline.
///
/// `submit` either runs a READ or parks a write in the pending store;
/// `decide` later approves (and executes) or rejects it. The two calls are
/// connected only by the stored id.
pub struct ApprovalGateway {
    store: Arc<dyn PendingStore>,
    executor: Arc<dyn Executor>,
    history: Arc<dyn HistoryLog>,
    databases: BTreeSet<String>,
    sensitive_databases: Vec<String>,
}

impl ApprovalGateway {
    const RECENT_LIMIT: usize = 10;

    pub fn new(
        store: Arc<dyn PendingStore>,
        executor: Arc<dyn Executor>,
        history: Arc<dyn HistoryLog>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            store,
            executor,
            history,
            databases: config.databases.keys().cloned().collect(),
            sensitive_databases: config.sensitive_databases.clone(),
        }
    }

    pub fn store(&self) -> &Arc<dyn PendingStore> {
        &self.store
    }

    pub fn history(&self) -> &Arc<dyn HistoryLog> {
        &self.history
    }

    pub fn databases(&self) -> impl Iterator<Item = &str> {
        self.databases.iter().map(String::as_str)
    }

    pub async fn submit(&self, op: NewOperation) -> GatewayResult<SubmitOutcome> {
        if let Err(err) = self.validate(&op) {
            warn!("Rejected invalid {} on '{}': {}", op.kind, op.target_database, err);
            self.audit(
                Self::entry(HistoryAction::Submit, HistoryOutcome::Invalid, &op).with_detail(err.to_string()),
            )
            .await;
            return Err(err);
        }

        if !op.kind.requires_approval() {
            return match self.executor.apply(&op).await {
                Ok(result) => {
                    info!("Executed READ on {}", op.target_database);
                    self.audit(Self::entry(HistoryAction::Submit, HistoryOutcome::Executed, &op)).await;
                    Ok(SubmitOutcome::Executed { result })
                }
                Err(err) => {
                    warn!("READ on {} failed: {}", op.target_database, err);
                    self.audit(
                        Self::entry(HistoryAction::Submit, HistoryOutcome::Failed, &op)
                            .with_detail(err.to_string()),
                    )
                    .await;
                    Err(GatewayError::execution(None, err))
                }
            };
        }

        let preview = preview(&op, &self.sensitive_databases);
        let id = self.store.enqueue(op.clone()).await?;
        info!("Holding {} for approval as {}: {}", op.kind, id, preview.summary);

        self.audit(
            Self::entry(HistoryAction::Submit, HistoryOutcome::RequiresHumanApproval, &op).with_id(id),
        )
        .await;

        Ok(SubmitOutcome::RequiresHumanApproval {
            pending_id: id,
            preview,
        })
    }

    pub async fn decide(&self, id: Uuid, approve: bool) -> GatewayResult<DecisionOutcome> {
        let decided = self.store.mark_decided(id, Decision::from_approve(approve)).await?;
        let op = decided.as_new_operation();

        if !approve {
            info!("Operation {} rejected", id);
            self.audit(Self::entry(HistoryAction::Decide, HistoryOutcome::Rejected, &op).with_id(id))
                .await;
            return Ok(DecisionOutcome::Rejected(decided));
        }

        // Execution and outcome recording run on their own task so a dropped
        // request cannot leave the entry stuck at APPROVED.
        let store = self.store.clone();
        let executor = self.executor.clone();
        let history = self.history.clone();
        let task = tokio::spawn(async move { Self::execute_approved(store, executor, history, decided).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Execution task for operation {} did not finish: {}", id, err);
                Err(GatewayError::Storage(format!("execution task for {} aborted", id)))
            }
        }
    }

    async fn execute_approved(
        store: Arc<dyn PendingStore>,
        executor: Arc<dyn Executor>,
        history: Arc<dyn HistoryLog>,
        decided: OperationDescriptor,
    ) -> GatewayResult<DecisionOutcome> {
        let id = decided.id;
        let op = decided.as_new_operation();

        match executor.apply(&op).await {
            Ok(result) => {
                let outcome = Outcome::Executed(result);
                let done = match store.mark_outcome(id, outcome.clone()).await {
                    Ok(done) => done,
                    Err(err) => {
                        error!("Operation {} executed but its outcome was not stored: {}", id, err);
                        decided.with_outcome(outcome)
                    }
                };
                Self::audit_to(
                    &history,
                    Self::entry(HistoryAction::Decide, HistoryOutcome::Executed, &op).with_id(id),
                )
                .await;
                Ok(DecisionOutcome::Executed(done))
            }
            Err(err) => {
                warn!("Approved operation {} failed: {}", id, err);
                if let Err(store_err) = store.mark_outcome(id, Outcome::Failed(err.to_string())).await {
                    error!("Operation {} failed but its outcome was not stored: {}", id, store_err);
                }
                Self::audit_to(
                    &history,
                    Self::entry(HistoryAction::Decide, HistoryOutcome::Failed, &op)
                        .with_id(id)
                        .with_detail(err.to_string()),
                )
                .await;
                Err(GatewayError::execution(Some(id), err))
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> GatewayResult<OperationDescriptor> {
        self.store.get(id).await
    }

    pub async fn list(&self, status: Option<OperationStatus>) -> GatewayResult<Vec<OperationDescriptor>> {
        self.store.list(status).await
    }

    /// Stored entry together with its rendered preview
    pub async fn details(&self, id: Uuid) -> GatewayResult<(OperationDescriptor, OperationPreview)> {
        let descriptor = self.store.get(id).await?;
        let preview = preview(&descriptor.as_new_operation(), &self.sensitive_databases);
        Ok((descriptor, preview))
    }

    pub async fn stats(&self) -> GatewayResult<GatewayStats> {
        let all = self.store.list(None).await?;

        let mut by_status = BTreeMap::new();
        let mut by_kind = BTreeMap::new();
        let mut by_database = BTreeMap::new();
        for status in OperationStatus::ALL {
            by_status.insert(status, 0);
        }
        for op in &all {
            *by_status.entry(op.status).or_insert(0) += 1;
            *by_kind.entry(op.kind.to_string()).or_insert(0) += 1;
            *by_database.entry(op.target_database.clone()).or_insert(0) += 1;
        }

        let recent_operations = all[all.len().saturating_sub(Self::RECENT_LIMIT)..].to_vec();

        Ok(GatewayStats {
            total_operations: all.len(),
            by_status,
            by_kind,
            by_database,
            recent_operations,
        })
    }

    fn validate(&self, op: &NewOperation) -> GatewayResult<()> {
        op.validate()?;
        if !self.databases.contains(&op.target_database) {
            return Err(GatewayError::validation(format!(
                "unknown target database '{}'",
                op.target_database
            )));
        }
        Ok(())
    }

    fn entry(action: HistoryAction, outcome: HistoryOutcome, op: &NewOperation) -> HistoryEntry {
        HistoryEntry::new(action, outcome).operation(
            op.kind,
            &op.target_database,
            &op.statement,
            &op.natural_language_source,
        )
    }

    /// Audit writes never change the outcome of the call being audited
    async fn audit(&self, entry: HistoryEntry) {
        Self::audit_to(&self.history, entry).await;
    }

    async fn audit_to(history: &Arc<dyn HistoryLog>, entry: HistoryEntry) {
        if let Err(err) = history.record(entry).await {
            error!("Failed to record history entry: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::history::MemoryHistory;
    use crate::approval::store::MemoryPendingStore;
    use crate::config::AppConfig;
    use crate::database::executor::ExecutionError;
    use crate::types::OperationKind;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<String>>,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl Executor for RecordingExecutor {
        async fn apply(&self, op: &NewOperation) -> Result<Value, ExecutionError> {
            self.calls.lock().unwrap().push(op.statement.clone());
            match &self.fail_with {
                Some(msg) => Err(ExecutionError::Statement(msg.clone())),
                None => Ok(json!({ "rows_affected": 1 })),
            }
        }
    }

    fn gateway(executor: Arc<RecordingExecutor>) -> ApprovalGateway {
        let config = AppConfig::defaults();
        ApprovalGateway::new(
            Arc::new(MemoryPendingStore::new()),
            executor,
            Arc::new(MemoryHistory::new(50)),
            &config.gateway,
        )
    }

    struct SlowExecutor {
        delay: std::time::Duration,
    }

    #[async_trait]
    impl Executor for SlowExecutor {
        async fn apply(&self, _op: &NewOperation) -> Result<Value, ExecutionError> {
            tokio::time::sleep(self.delay).await;
            Ok(json!({ "rows_affected": 1 }))
        }
    }

    /// Store that loses every outcome write
    struct ForgetfulStore {
        inner: MemoryPendingStore,
    }

    #[async_trait]
    impl PendingStore for ForgetfulStore {
        fn backend(&self) -> &'static str {
            "forgetful"
        }

        async fn enqueue(&self, op: NewOperation) -> GatewayResult<Uuid> {
            self.inner.enqueue(op).await
        }

        async fn get(&self, id: Uuid) -> GatewayResult<OperationDescriptor> {
            self.inner.get(id).await
        }

        async fn list(&self, status: Option<OperationStatus>) -> GatewayResult<Vec<OperationDescriptor>> {
            self.inner.list(status).await
        }

        async fn mark_decided(&self, id: Uuid, decision: Decision) -> GatewayResult<OperationDescriptor> {
            self.inner.mark_decided(id, decision).await
        }

        async fn mark_outcome(&self, _id: Uuid, _outcome: Outcome) -> GatewayResult<OperationDescriptor> {
            Err(GatewayError::Storage("connection reset".into()))
        }
    }

    fn delete_op() -> NewOperation {
        NewOperation::new(OperationKind::Delete, "hr", "DELETE FROM employees WHERE id=42")
    }

    #[tokio::test]
    async fn read_executes_without_pending_entry() {
        let executor = Arc::new(RecordingExecutor::default());
        let gw = gateway(executor.clone());

        let out = gw
            .submit(NewOperation::new(OperationKind::Read, "hr", "SELECT * FROM employees"))
            .await
            .unwrap();

        assert!(matches!(out, SubmitOutcome::Executed { .. }));
        assert!(gw.list(None).await.unwrap().is_empty());
        assert_eq!(executor.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn write_is_held_until_decided() {
        let executor = Arc::new(RecordingExecutor::default());
        let gw = gateway(executor.clone());

        let out = gw.submit(delete_op()).await.unwrap();
        let SubmitOutcome::RequiresHumanApproval { pending_id, preview } = out else {
            panic!("expected pending outcome");
        };
        assert_eq!(preview.tables, vec!["employees"]);
        assert!(executor.calls.lock().unwrap().is_empty());
        assert_eq!(gw.get(pending_id).await.unwrap().status, OperationStatus::Pending);

        let decided = gw.decide(pending_id, true).await.unwrap();
        assert!(matches!(decided, DecisionOutcome::Executed(_)));
        assert_eq!(decided.descriptor().status, OperationStatus::Executed);
        assert_eq!(executor.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejection_never_reaches_executor() {
        let executor = Arc::new(RecordingExecutor::default());
        let gw = gateway(executor.clone());

        let SubmitOutcome::RequiresHumanApproval { pending_id, .. } = gw.submit(delete_op()).await.unwrap() else {
            panic!("expected pending outcome");
        };
        let decided = gw.decide(pending_id, false).await.unwrap();

        assert_eq!(decided.descriptor().status, OperationStatus::Rejected);
        assert!(executor.calls.lock().unwrap().is_empty());
        assert!(matches!(
            gw.decide(pending_id, true).await,
            Err(GatewayError::AlreadyResolved { .. })
        ));
    }

    #[tokio::test]
    async fn failed_execution_is_terminal_and_surfaced() {
        let executor = Arc::new(RecordingExecutor {
            fail_with: Some("foreign key violation".into()),
            ..Default::default()
        });
        let gw = gateway(executor);

        let SubmitOutcome::RequiresHumanApproval { pending_id, .. } = gw.submit(delete_op()).await.unwrap() else {
            panic!("expected pending outcome");
        };
        let err = gw.decide(pending_id, true).await.unwrap_err();
        assert_eq!(err.operation_id(), Some(pending_id));
        assert!(matches!(err, GatewayError::Execution { .. }));

        let stored = gw.get(pending_id).await.unwrap();
        assert_eq!(stored.status, OperationStatus::Failed);
        assert!(stored.error.as_deref().unwrap().contains("foreign key violation"));
        assert!(stored.result.is_none());
    }

    #[tokio::test]
    async fn invalid_operations_never_reach_the_store() {
        let executor = Arc::new(RecordingExecutor::default());
        let gw = gateway(executor.clone());

        let unknown_db = NewOperation::new(OperationKind::Delete, "payroll", "DELETE FROM pay WHERE id = 1");
        assert!(matches!(gw.submit(unknown_db).await, Err(GatewayError::Validation(_))));

        let ddl = NewOperation::new(OperationKind::Delete, "hr", "DROP TABLE employees");
        assert!(matches!(gw.submit(ddl).await, Err(GatewayError::Validation(_))));

        assert!(gw.list(None).await.unwrap().is_empty());
        assert!(executor.calls.lock().unwrap().is_empty());

        let history = gw.history().list().await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|e| e.outcome == HistoryOutcome::Invalid));
    }

    #[tokio::test]
    async fn stats_count_every_status() {
        let executor = Arc::new(RecordingExecutor::default());
        let gw = gateway(executor);

        for _ in 0..3 {
            gw.submit(delete_op()).await.unwrap();
        }
        let first = gw.list(None).await.unwrap()[0].id;
        gw.decide(first, false).await.unwrap();

        let stats = gw.stats().await.unwrap();
        assert_eq!(stats.total_operations, 3);
        assert_eq!(stats.by_status[&OperationStatus::Pending], 2);
        assert_eq!(stats.by_status[&OperationStatus::Rejected], 1);
        assert_eq!(stats.by_status[&OperationStatus::Executed], 0);
        assert_eq!(stats.by_kind["DELETE"], 3);
        assert_eq!(stats.by_database["hr"], 3);
    }

    #[tokio::test]
    async fn dropped_decision_still_reaches_a_terminal_state() {
        let config = AppConfig::defaults();
        let gw = ApprovalGateway::new(
            Arc::new(MemoryPendingStore::new()),
            Arc::new(SlowExecutor {
                delay: std::time::Duration::from_millis(200),
            }),
            Arc::new(MemoryHistory::new(50)),
            &config.gateway,
        );

        let SubmitOutcome::RequiresHumanApproval { pending_id, .. } = gw.submit(delete_op()).await.unwrap() else {
            panic!("expected pending outcome");
        };

        let dropped = tokio::time::timeout(std::time::Duration::from_millis(20), gw.decide(pending_id, true)).await;
        assert!(dropped.is_err(), "decision should still be running");

        let mut status = gw.get(pending_id).await.unwrap().status;
        for _ in 0..100 {
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            status = gw.get(pending_id).await.unwrap().status;
        }
        assert_eq!(status, OperationStatus::Executed);
    }

    #[tokio::test]
    async fn lost_outcome_write_still_reports_execution() {
        let executor = Arc::new(RecordingExecutor::default());
        let config = AppConfig::defaults();
        let gw = ApprovalGateway::new(
            Arc::new(ForgetfulStore {
                inner: MemoryPendingStore::new(),
            }),
            executor.clone(),
            Arc::new(MemoryHistory::new(50)),
            &config.gateway,
        );

        let SubmitOutcome::RequiresHumanApproval { pending_id, .. } = gw.submit(delete_op()).await.unwrap() else {
            panic!("expected pending outcome");
        };
        let decided = gw.decide(pending_id, true).await.unwrap();

        assert!(matches!(decided, DecisionOutcome::Executed(_)));
        assert_eq!(decided.descriptor().status, OperationStatus::Executed);
        assert_eq!(decided.descriptor().result, Some(json!({ "rows_affected": 1 })));
        assert_eq!(executor.calls.lock().unwrap().len(), 1);
    }
}
