//! HTTP request handlers

use super::types::{
    ErrorResponse, StatsResponse, SubmissionListResponse, SubmissionsQuery, WebhookResponse,
};
use super::AppState;
use crate::runtime::Dispatch;
use crate::session::Session;
use crate::state_machine::InboundEvent;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

const DEFAULT_SUBMISSION_LIMIT: usize = 50;
const MAX_SUBMISSION_LIMIT: usize = 500;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(receive_event))
        .route("/api/stats", get(get_stats))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/submissions", get(list_submissions))
        .route("/version", get(get_version))
        .with_state(state)
}

async fn receive_event(
    State(state): State<AppState>,
    Json(inbound): Json<InboundEvent>,
) -> Result<Json<WebhookResponse>, AppError> {
    let outcome = state
        .runtime
        .dispatch(inbound)
        .await
        .map_err(AppError::BadRequest)?;

    Ok(Json(WebhookResponse {
        queued: outcome == Dispatch::Queued,
        rate_limited: outcome == Dispatch::RateLimited,
    }))
}

async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        sessions: state.runtime.stats(),
        active_runtimes: state.runtime.active_runtimes().await,
    })
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, AppError> {
    state
        .runtime
        .store()
        .peek(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No session for {id}")))
}

async fn list_submissions(
    State(state): State<AppState>,
    Query(query): Query<SubmissionsQuery>,
) -> Result<Json<SubmissionListResponse>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_SUBMISSION_LIMIT)
        .clamp(1, MAX_SUBMISSION_LIMIT);
    let submissions = state
        .db
        .recent_submissions(limit)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(SubmissionListResponse { submissions }))
}

async fn get_version() -> &'static str {
    concat!("doc-intake ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal API error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
