//! Follow-up endpoints on completed runs.
//!
//! - `POST /v1/runs/:id/chat`       — `{question} → {answer}`, stateless
//! - `POST /v1/runs/:id/regenerate` — `{feedback} → {runId}` of a fresh run

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use ds_domain::Error;

use super::runs::api_error;
use crate::auth::Caller;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub question: String,
}

pub async fn chat(
    State(state): State<AppState>,
    caller: Caller,
    Path(run_id): Path<Uuid>,
    Json(body): Json<ChatBody>,
) -> Response {
    if body.question.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "question must not be empty");
    }

    match state
        .engine
        .follow_up(run_id, &caller.user_id, &body.question)
        .await
    {
        Ok(answer) => Json(json!({ "answer": answer })).into_response(),
        Err(e) => followup_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct RegenerateBody {
    #[serde(default)]
    pub feedback: String,
}

pub async fn regenerate(
    State(state): State<AppState>,
    caller: Caller,
    Path(run_id): Path<Uuid>,
    Json(body): Json<RegenerateBody>,
) -> Response {
    if body.feedback.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "feedback must not be empty");
    }

    match state
        .engine
        .regenerate(run_id, &caller.user_id, &body.feedback)
    {
        Ok(new_id) => Json(json!({ "runId": new_id, "status": "running" })).into_response(),
        Err(e) => followup_error(e),
    }
}

fn followup_error(e: Error) -> Response {
    match &e {
        Error::Validation(msg) if msg.contains("not found") => {
            api_error(StatusCode::NOT_FOUND, "run not found")
        }
        Error::Validation(msg) => api_error(StatusCode::BAD_REQUEST, msg.clone()),
        Error::Capability { .. } => api_error(
            StatusCode::BAD_GATEWAY,
            "the language model is unavailable",
        ),
        _ => {
            tracing::error!(error = %e, "follow-up failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}
