use axum::extract::State;
use serde_json::{json, Value};

use crate::approval::HistoryEntry;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

/// GET /history - audit log, oldest first
pub async fn get(State(state): State<AppState>) -> ApiResult<Vec<HistoryEntry>> {
    let entries = state.gateway.history().list().await?;
    Ok(ApiResponse::success(entries))
}

/// DELETE /history
pub async fn clear(State(state): State<AppState>) -> ApiResult<Value> {
    let cleared = state.gateway.history().clear().await?;
    tracing::info!("Cleared {} history entries", cleared);
    Ok(ApiResponse::success(json!({ "cleared": cleared })))
}
