use thiserror::Error;
use uuid::Uuid;

use crate::database::executor::ExecutionError;
use crate::types::OperationStatus;

/// Errors raised by the pending store and the approval gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Operation not found: {0}")]
    NotFound(Uuid),

    #[error("Operation {id} already resolved with status {status}")]
    AlreadyResolved { id: Uuid, status: OperationStatus },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Illegal transition for operation {id}: {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: OperationStatus,
        to: OperationStatus,
    },

    #[error("Execution error: {source}")]
    Execution {
        id: Option<Uuid>,
        #[source]
        source: ExecutionError,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        GatewayError::Validation(message.into())
    }

    pub fn execution(id: Option<Uuid>, source: ExecutionError) -> Self {
        GatewayError::Execution { id, source }
    }

    /// Operation id the error refers to, when there is one
    pub fn operation_id(&self) -> Option<Uuid> {
        match self {
            GatewayError::NotFound(id) => Some(*id),
            GatewayError::AlreadyResolved { id, .. } => Some(*id),
            GatewayError::InvalidTransition { id, .. } => Some(*id),
            GatewayError::Execution { id, .. } => *id,
            GatewayError::Validation(_) | GatewayError::Storage(_) => None,
        }
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        GatewayError::Storage(err.to_string())
    }
}

impl From<crate::database::manager::DatabaseError> for GatewayError {
    fn from(err: crate::database::manager::DatabaseError) -> Self {
        GatewayError::Storage(err.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
