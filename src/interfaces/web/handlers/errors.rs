use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::super::AppState;
use crate::core::pipeline::{ListQuery, PipelineError};
use crate::core::remediation::RemediationMode;

type ApiResponse = (StatusCode, Json<serde_json::Value>);

fn failure(e: anyhow::Error) -> ApiResponse {
    let status = match PipelineError::of(&e) {
        Some(PipelineError::UnknownSignature(_)) => StatusCode::NOT_FOUND,
        Some(PipelineError::InvalidArgument(_)) => StatusCode::BAD_REQUEST,
        None => {
            error!("Error pipeline request failed: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(serde_json::json!({
            "success": false,
            "error": e.to_string()
        })),
    )
}

fn ok(body: serde_json::Value) -> ApiResponse {
    (StatusCode::OK, Json(body))
}

pub async fn sync_endpoint(State(state): State<AppState>) -> ApiResponse {
    match state.pipeline.sync(CancellationToken::new()).await {
        Ok(result) => ok(serde_json::json!({
            "success": true,
            "result": result
        })),
        Err(e) => failure(e),
    }
}

pub async fn list_signatures_endpoint(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResponse {
    match state.pipeline.list(&query).await {
        Ok(list) => ok(serde_json::json!({
            "success": true,
            "signatures": list.signatures,
            "meta": list.meta
        })),
        Err(e) => failure(e),
    }
}

#[derive(serde::Deserialize)]
pub struct SummaryQuery {
    #[serde(default)]
    days: Option<u32>,
}

pub async fn summary_endpoint(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> ApiResponse {
    match state.pipeline.summary(query.days).await {
        Ok(summary) => ok(serde_json::json!({
            "success": true,
            "summary": summary
        })),
        Err(e) => failure(e),
    }
}

#[derive(serde::Deserialize, Default)]
pub struct RemediateRequest {
    #[serde(default)]
    mode: RemediationMode,
}

pub async fn remediate_endpoint(
    Path(hash): Path<String>,
    State(state): State<AppState>,
    payload: Option<Json<RemediateRequest>>,
) -> ApiResponse {
    let mode = payload.map(|Json(p)| p.mode).unwrap_or_default();
    match state.pipeline.remediate(hash.trim(), mode).await {
        Ok(result) => ok(serde_json::json!({
            "success": true,
            "result": result
        })),
        Err(e) => failure(e),
    }
}

#[derive(serde::Deserialize)]
pub struct ActivityQuery {
    #[serde(default)]
    limit: Option<usize>,
}

pub async fn activity_endpoint(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> ApiResponse {
    match state.pipeline.recent_activity(query.limit).await {
        Ok(events) => ok(serde_json::json!({
            "success": true,
            "events": events
        })),
        Err(e) => failure(e),
    }
}
