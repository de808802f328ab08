use axum::{
    extract::State,
    Json,
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::query::{SearchOutcome, SearchParameters};
use crate::server::AppState;
use crate::Error;

#[derive(Debug, Deserialize)]
pub struct IndexParams {
    pub repo: String,
    pub commit: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn status_code(error: &Error) -> StatusCode {
    match error {
        Error::InvalidQuery(_) | Error::Regex(_) => StatusCode::BAD_REQUEST,
        Error::DeletionInProgress(_) => StatusCode::CONFLICT,
        Error::QueueFull(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::Cancelled => StatusCode::REQUEST_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(error: Error) -> ApiError {
    let code = status_code(&error);
    if code.is_server_error() {
        tracing::warn!(error = %error, "request failed");
    }
    (code, Json(ErrorResponse { error: error.to_string() }))
}

/// Token cancelled when the handler future is dropped, i.e. when the client goes away
fn request_token() -> (CancellationToken, tokio_util::sync::DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

pub async fn healthz() -> &'static str {
    "OK"
}

pub async fn status(State(state): State<Arc<AppState>>) -> Result<String, ApiError> {
    state.service.status_page().map_err(api_error)
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(params): Json<SearchParameters>,
) -> Result<Json<SearchOutcome>, ApiError> {
    let (cancel, _guard) = request_token();
    let outcome = state
        .service
        .search_with_outcome(&cancel, params)
        .await
        .map_err(api_error)?;
    Ok(Json(outcome))
}

pub async fn index(
    State(state): State<Arc<AppState>>,
    Json(params): Json<IndexParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (cancel, _guard) = request_token();
    state
        .service
        .index(&cancel, &params.repo, &params.commit)
        .await
        .map_err(api_error)?;
    Ok(Json(serde_json::json!({"status": "indexed", "repo": params.repo, "commit": params.commit})))
}
