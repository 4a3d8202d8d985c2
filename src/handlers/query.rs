use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::approval::{NewOperation, SubmitOutcome};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::types::OperationKind;

#[derive(Debug, Deserialize)]
pub struct NlQueryRequest {
    pub text: String,
    pub target_db: String,
}

/// Descriptor submitted directly, bypassing the translator
#[derive(Debug, Deserialize)]
pub struct OperationRequest {
    pub kind: String,
    pub target_database: String,
    pub statement: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub natural_language_source: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl OperationRequest {
    fn into_operation(self) -> Result<NewOperation, ApiError> {
        let kind: OperationKind = self.kind.parse().map_err(|_| {
            let allowed: Vec<&str> = OperationKind::ALL.iter().map(|k| k.as_str()).collect();
            ApiError::field_error(
                "kind",
                format!("Unknown operation kind '{}' (expected one of {})", self.kind, allowed.join(", ")),
            )
        })?;

        let mut op = NewOperation::new(kind, self.target_database, self.statement).with_params(self.params);
        if let Some(text) = self.natural_language_source {
            op = op.with_source(text);
        }
        if let Some(metadata) = self.metadata {
            op = op.with_metadata(metadata);
        }
        Ok(op)
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    #[serde(flatten)]
    pub outcome: SubmitOutcome,
    pub operation: NewOperation,
}

/// POST /nl-query - translate text, then hand the result to the gateway
pub async fn nl_query(
    State(state): State<AppState>,
    payload: Result<Json<NlQueryRequest>, JsonRejection>,
) -> ApiResult<SubmitResponse> {
    let Json(payload) = payload?;
    if payload.text.trim().is_empty() {
        return Err(ApiError::field_error("text", "Query text is required"));
    }

    let op = state.translator.translate(&payload.text, &payload.target_db).await?;
    tracing::info!("Translated '{}' into {} on {}", payload.text, op.kind, op.target_database);

    submit(&state, op).await
}

/// POST /operations - submit an already-resolved operation descriptor
pub async fn submit_operation(
    State(state): State<AppState>,
    payload: Result<Json<OperationRequest>, JsonRejection>,
) -> ApiResult<SubmitResponse> {
    let Json(payload) = payload?;
    let op = payload.into_operation()?;
    submit(&state, op).await
}

async fn submit(state: &AppState, op: NewOperation) -> ApiResult<SubmitResponse> {
    let outcome = state.gateway.submit(op.clone()).await?;
    let held = matches!(outcome, SubmitOutcome::RequiresHumanApproval { .. });

    let response = SubmitResponse { outcome, operation: op };
    if held {
        Ok(ApiResponse::accepted(response))
    } else {
        Ok(ApiResponse::success(response))
    }
}
