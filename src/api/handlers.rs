//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{ErrorResponse, HealthResponse, StreamQuery, ToolResultsRequest};
use super::AppState;
use crate::db::{Chat, Message};
use crate::llm::LlmErrorKind;
use crate::relay::RelayError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Chat lifecycle
        .route("/chat", post(create_chat).get(list_chats))
        .route("/chat/:id/messages", get(get_messages))
        // SSE streaming
        .route("/chat/stream", get(stream_chat))
        // Externally-resolved tool calls
        .route("/chat/:id/tool-results", post(submit_tool_results))
        .route("/health", get(health))
        .with_state(state)
}

// ============================================================
// Chat Lifecycle
// ============================================================

async fn create_chat(State(state): State<AppState>) -> Result<(StatusCode, Json<Chat>), AppError> {
    let chat = state.chats.create_chat().await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

async fn list_chats(State(state): State<AppState>) -> Result<Json<Vec<Chat>>, AppError> {
    Ok(Json(state.chats.list_chats().await?))
}

async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, AppError> {
    Ok(Json(state.chats.get_messages(&id).await?))
}

// ============================================================
// Streaming
// ============================================================

async fn stream_chat(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, AppError> {
    let events = state
        .chats
        .open_stream(&query.chat_id, &query.message)
        .await?;
    Ok(sse_stream(events).into_response())
}

// ============================================================
// Tool Results
// ============================================================

async fn submit_tool_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ToolResultsRequest>,
) -> Result<(StatusCode, Json<Vec<Message>>), AppError> {
    let stored = state.chats.submit_tool_results(&id, &req.results).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

// ============================================================
// Health
// ============================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    BadGateway(String),
    Unavailable(String),
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::InvalidInput(_) => AppError::BadRequest(err.to_string()),
            RelayError::ChatNotFound(_) => AppError::NotFound(err.to_string()),
            RelayError::Provider(ref e) => {
                if e.kind == LlmErrorKind::Auth {
                    tracing::error!(error = %e, "Provider rejected credentials");
                } else {
                    tracing::warn!(error = %e, kind = ?e.kind, "Provider failed to open stream");
                }
                AppError::BadGateway(err.to_string())
            }
            RelayError::StoreUnavailable(ref e) => {
                tracing::error!(error = %e, "Store failure");
                AppError::Unavailable(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
