//! Axum handlers for `/api/*` routes.
//!
//! Each handler receives [`AxumState`] via [`axum::extract::State`] and
//! returns an axum [`Response`].

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::AxumState;
use crate::subsystems::docs::IndexBuildError;

// ── Request types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct MessageRequest {
    message: String,
    session_id: Option<String>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// GET /api/health
pub(super) async fn health(State(state): State<AxumState>) -> Response {
    Json(json!({
        "status": "ok",
        "bot_name": state.comms.bot_name(),
        "sessions": state.comms.session_count(),
    }))
    .into_response()
}

/// POST /api/message: one chat turn. Without a `session_id` a new session
/// is started; the response carries its id.
pub(super) async fn message(State(state): State<AxumState>, Json(req): Json<MessageRequest>) -> Response {
    let reply = state.comms.send_message(req.session_id.as_deref(), &req.message).await;
    debug!(channel_id = %state.channel_id, session_id = %reply.session_id, "api message handled");
    (StatusCode::OK, Json(reply)).into_response()
}

/// GET /api/session/{session_id}
pub(super) async fn session_detail(State(state): State<AxumState>, Path(session_id): Path<String>) -> Response {
    match state.comms.session_snapshot(&session_id).await {
        Some(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        None => {
            warn!(channel_id = %state.channel_id, %session_id, "session not found");
            (StatusCode::NOT_FOUND, json_error("not_found", format!("no session {session_id}"))).into_response()
        }
    }
}

/// DELETE /api/session/{session_id}
pub(super) async fn end_session(State(state): State<AxumState>, Path(session_id): Path<String>) -> Response {
    if state.comms.end_session(&session_id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (StatusCode::NOT_FOUND, json_error("not_found", format!("no session {session_id}"))).into_response()
    }
}

/// POST /api/context: rebuild the document index.
pub(super) async fn rebuild_context(State(state): State<AxumState>) -> Response {
    let report = state.comms.rebuild_index().await;
    match report.result {
        Ok(summary) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "message": report.status,
                "documents": summary.documents,
                "chunks": summary.chunks,
            })),
        )
            .into_response(),
        Err(e) => {
            let code = match e {
                IndexBuildError::EmptyCorpus(_) => StatusCode::UNPROCESSABLE_ENTITY,
                IndexBuildError::IndexBuildFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (code, Json(json!({ "status": "error", "message": report.status }))).into_response()
        }
    }
}
