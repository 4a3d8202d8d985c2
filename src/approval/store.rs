use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::approval::descriptor::{NewOperation, OperationDescriptor, Outcome};
use crate::approval::error::{GatewayError, GatewayResult};
use crate::types::{Decision, OperationStatus};

/// Keyed registry of write operations awaiting, or past, a human decision.
///
/// Implementations must make `mark_decided` an atomic compare-and-set on the
/// status: of two concurrent decisions on one id exactly one succeeds and the
/// other sees `AlreadyResolved`.
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Short backend name for logs and the health endpoint
    fn backend(&self) -> &'static str;

    /// Store `op` as PENDING under a fresh id
    async fn enqueue(&self, op: NewOperation) -> GatewayResult<Uuid>;

    async fn get(&self, id: Uuid) -> GatewayResult<OperationDescriptor>;

    /// All entries oldest first, optionally restricted to one status
    async fn list(&self, status: Option<OperationStatus>) -> GatewayResult<Vec<OperationDescriptor>>;

    /// PENDING -> APPROVED | REJECTED
    async fn mark_decided(&self, id: Uuid, decision: Decision) -> GatewayResult<OperationDescriptor>;

    /// APPROVED -> EXECUTED | FAILED
    async fn mark_outcome(&self, id: Uuid, outcome: Outcome) -> GatewayResult<OperationDescriptor>;

    async fn health_check(&self) -> GatewayResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct MemoryEntries {
    order: Vec<Uuid>,
    by_id: HashMap<Uuid, OperationDescriptor>,
}

/// Process-lifetime pending store. The write lock spans each check-and-update,
/// which is what makes decisions atomic.
#[derive(Default)]
pub struct MemoryPendingStore {
    entries: RwLock<MemoryEntries>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingStore for MemoryPendingStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn enqueue(&self, op: NewOperation) -> GatewayResult<Uuid> {
        let mut entries = self.entries.write().await;

        let mut id = Uuid::new_v4();
        while entries.by_id.contains_key(&id) {
            id = Uuid::new_v4();
        }

        let descriptor = OperationDescriptor::pending(op, id, Utc::now());
        debug!(
            "Enqueued {} on {}: {}",
            descriptor.kind, descriptor.target_database, descriptor.statement
        );
        entries.order.push(id);
        entries.by_id.insert(id, descriptor);

        Ok(id)
    }

    async fn get(&self, id: Uuid) -> GatewayResult<OperationDescriptor> {
        let entries = self.entries.read().await;
        entries
            .by_id
            .get(&id)
            .cloned()
            .ok_or(GatewayError::NotFound(id))
    }

    async fn list(&self, status: Option<OperationStatus>) -> GatewayResult<Vec<OperationDescriptor>> {
        let entries = self.entries.read().await;
        Ok(entries
            .order
            .iter()
            .filter_map(|id| entries.by_id.get(id))
            .filter(|d| status.map_or(true, |s| d.status == s))
            .cloned()
            .collect())
    }

    async fn mark_decided(&self, id: Uuid, decision: Decision) -> GatewayResult<OperationDescriptor> {
        let mut entries = self.entries.write().await;
        let entry = entries.by_id.get_mut(&id).ok_or(GatewayError::NotFound(id))?;

        if entry.status != OperationStatus::Pending {
            return Err(GatewayError::AlreadyResolved {
                id,
                status: entry.status,
            });
        }

        entry.status = decision.status();
        entry.decided_at = Some(Utc::now());
        info!("Operation {} marked {}", id, entry.status);

        Ok(entry.clone())
    }

    async fn mark_outcome(&self, id: Uuid, outcome: Outcome) -> GatewayResult<OperationDescriptor> {
        let mut entries = self.entries.write().await;
        let entry = entries.by_id.get_mut(&id).ok_or(GatewayError::NotFound(id))?;

        let next = outcome.status();
        if !entry.status.can_transition_to(next) {
            return Err(GatewayError::InvalidTransition {
                id,
                from: entry.status,
                to: next,
            });
        }

        entry.status = next;
        entry.completed_at = Some(Utc::now());
        match outcome {
            Outcome::Executed(result) => entry.result = Some(result),
            Outcome::Failed(error) => entry.error = Some(error),
        }
        info!("Operation {} finished as {}", id, entry.status);

        Ok(entry.clone())
    }
}
