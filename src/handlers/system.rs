use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::approval::GatewayStats;
use crate::database::{DatabaseInfo, ExecutionError};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TargetDatabase {
    pub name: String,
    pub database: String,
    pub sensitive: bool,
}

/// GET /
pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "SQL Approval Gate",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Human-in-the-loop approval gateway for natural-language database operations",
            "endpoints": {
                "query": "POST /nl-query, POST /operations",
                "pending": "GET /pending[?status=], GET /pending/:id[/details]",
                "decision": "POST /pending/:id/decision, POST /confirm",
                "history": "GET /history, DELETE /history",
                "system": "GET /health, GET /stats, GET /databases, GET /databases/:name/info",
            }
        }
    }))
}

/// GET /health - 503 when the pending store is unreachable
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let store = state.gateway.store();

    match store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "store": store.backend(),
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            let mut body = ApiError::service_unavailable("pending store unavailable").to_json();
            body["data"] = json!({
                "status": "degraded",
                "timestamp": now,
                "store": store.backend(),
            });
            (StatusCode::SERVICE_UNAVAILABLE, Json(body))
        }
    }
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> ApiResult<GatewayStats> {
    Ok(ApiResponse::success(state.gateway.stats().await?))
}

/// GET /databases - configured target databases
pub async fn databases(State(state): State<AppState>) -> ApiResult<Vec<TargetDatabase>> {
    let gateway = &state.config.gateway;
    let targets = gateway
        .databases
        .iter()
        .map(|(name, database)| TargetDatabase {
            name: name.clone(),
            database: database.clone(),
            sensitive: gateway.sensitive_databases.contains(name),
        })
        .collect();
    Ok(ApiResponse::success(targets))
}

/// GET /databases/:name/info - tables, row counts and columns of one target
pub async fn database_info(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<DatabaseInfo> {
    if !state.config.gateway.databases.contains_key(&name) {
        return Err(ApiError::not_found(format!("Database '{}' not found", name)));
    }
    let catalog = state
        .catalog
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Database introspection is not configured"))?;

    let info = catalog.describe(&name).await.map_err(|err| match err {
        ExecutionError::UnknownDatabase(_) => ApiError::not_found(format!("Database '{}' not found", name)),
        ExecutionError::Unavailable(msg) => {
            tracing::warn!("Database {} unavailable: {}", name, msg);
            ApiError::service_unavailable(format!("Database '{}' is unavailable", name))
        }
        ExecutionError::Statement(msg) => {
            tracing::error!("Introspection of {} failed: {}", name, msg);
            ApiError::internal_server_error(format!("Error accessing database '{}'", name))
        }
    })?;
    Ok(ApiResponse::success(info))
}

/// Fallback for unknown routes
pub async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
