use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::approval::{OperationDescriptor, OperationPreview};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::types::OperationStatus;

use super::parse_id;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// PENDING, APPROVED, ... or `all`; omitted means all
    pub status: Option<String>,
}

impl ListQuery {
    fn status_filter(&self) -> Result<Option<OperationStatus>, ApiError> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
            Some(s) => s.parse().map(Some).map_err(|e: String| ApiError::field_error("status", e)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub approve: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub pending_id: Uuid,
    pub approve: bool,
}

#[derive(Debug, Serialize)]
pub struct DetailsResponse {
    pub operation: OperationDescriptor,
    pub preview: OperationPreview,
}

/// GET /pending - list stored operations, oldest first
pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Vec<OperationDescriptor>> {
    let status = query.status_filter()?;
    let operations = state.gateway.list(status).await?;
    Ok(ApiResponse::success(operations))
}

/// GET /pending/:id
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<OperationDescriptor> {
    let id = parse_id(&id)?;
    Ok(ApiResponse::success(state.gateway.get(id).await?))
}

/// GET /pending/:id/details - entry plus the operator preview
pub async fn details(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<DetailsResponse> {
    let id = parse_id(&id)?;
    let (operation, preview) = state.gateway.details(id).await?;
    Ok(ApiResponse::success(DetailsResponse { operation, preview }))
}

/// POST /pending/:id/decision
pub async fn decide(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
) -> ApiResult<OperationDescriptor> {
    let id = parse_id(&id)?;
    let Json(payload) = payload?;
    apply_decision(&state, id, payload.approve).await
}

/// POST /confirm - same as the decision route with the id in the body
pub async fn confirm(
    State(state): State<AppState>,
    payload: Result<Json<ConfirmRequest>, JsonRejection>,
) -> ApiResult<OperationDescriptor> {
    let Json(payload) = payload?;
    apply_decision(&state, payload.pending_id, payload.approve).await
}

async fn apply_decision(state: &AppState, id: Uuid, approve: bool) -> ApiResult<OperationDescriptor> {
    let outcome = state.gateway.decide(id, approve).await?;
    Ok(ApiResponse::success(outcome.descriptor().clone()))
}
