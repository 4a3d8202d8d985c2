pub mod descriptor;
pub mod error;
pub mod gateway;
pub mod history;
pub mod pg_store;
pub mod preview;
pub mod store;

pub use descriptor::{NewOperation, OperationDescriptor, Outcome};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{ApprovalGateway, DecisionOutcome, GatewayStats, SubmitOutcome};
pub use history::{HistoryAction, HistoryEntry, HistoryLog, HistoryOutcome, MemoryHistory, PgHistory};
pub use pg_store::PgPendingStore;
pub use preview::{OperationPreview, RiskAssessment, RiskLevel};
pub use store::{MemoryPendingStore, PendingStore};
