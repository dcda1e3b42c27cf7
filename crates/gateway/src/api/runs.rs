//! Run lifecycle endpoints.
//!
//! - `POST /v1/runs`            — start a run (generic)
//! - mode aliases: `/v1/research/start`, `/v1/reports/generate`,
//!   `/v1/templates/generate`, `/v1/agentic/start`, `/v1/plans/generate`
//! - `GET  /v1/runs`            — list the caller's runs
//! - `GET  /v1/runs/:id`        — status + cursor poll
//! - `POST /v1/runs/:id/cancel` — signal cancellation

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use ds_domain::activity::Activity;
use ds_domain::chart::ChartKind;
use ds_domain::mode::{Depth, Mode};
use ds_domain::run::{Run, RunFile, RunParams, RunStatus};
use ds_domain::template::TemplateType;
use ds_domain::Error;
use ds_engine::StartRequest;

use crate::auth::Caller;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Fetch a run the caller owns. Non-owned runs read as not-found — the
/// API never distinguishes "forbidden" from "missing".
pub fn owned_run(state: &AppState, caller: &Caller, run_id: Uuid) -> Result<Run, Response> {
    state
        .engine
        .store
        .get_run(run_id)
        .filter(|r| r.user_id == caller.user_id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "run not found"))
}

/// The stable wire envelope for one activity.
pub fn activity_frame(a: &Activity) -> serde_json::Value {
    json!({
        "seq": a.seq,
        "kind": a.kind,
        "data": a.payload,
        "timestamp": a.timestamp,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/runs (and mode aliases)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct FileBody {
    #[serde(default, alias = "uploadId")]
    pub upload_id: Option<String>,
    #[serde(alias = "fileName")]
    pub file_name: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct StartBody {
    #[serde(default)]
    pub mode: Option<String>,
    /// Defaulted so a missing field surfaces as a 400 from validation
    /// rather than a body-rejection 422.
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub depth: Option<String>,
    #[serde(default)]
    pub focus: Option<String>,
    #[serde(default)]
    pub files: Option<Vec<FileBody>>,
    #[serde(default, alias = "chartTypes")]
    pub chart_types: Option<Vec<String>>,
    #[serde(default, alias = "templateType")]
    pub template_type: Option<String>,
    #[serde(default, alias = "planFormat")]
    pub plan_format: Option<String>,
    #[serde(default, alias = "allowWeb")]
    pub allow_web: bool,
}

pub async fn start(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<StartBody>,
) -> Response {
    start_with_mode(&state, &caller, body, None)
}

macro_rules! mode_alias {
    ($name:ident, $mode:expr) => {
        pub async fn $name(
            State(state): State<AppState>,
            caller: Caller,
            Json(body): Json<StartBody>,
        ) -> Response {
            start_with_mode(&state, &caller, body, Some($mode))
        }
    };
}

mode_alias!(research_start, Mode::Research);
mode_alias!(reports_generate, Mode::Report);
mode_alias!(templates_generate, Mode::Template);
mode_alias!(agentic_start, Mode::Charts);
mode_alias!(plans_generate, Mode::Plan);

fn start_with_mode(
    state: &AppState,
    caller: &Caller,
    body: StartBody,
    forced_mode: Option<Mode>,
) -> Response {
    let mode = match forced_mode {
        Some(m) => m,
        None => {
            let Some(raw) = body.mode.as_deref() else {
                return api_error(StatusCode::BAD_REQUEST, "mode is required");
            };
            match Mode::parse(raw) {
                Some(m) => m,
                None => return api_error(StatusCode::BAD_REQUEST, format!("unknown mode {raw:?}")),
            }
        }
    };

    let depth = match &body.depth {
        None => Depth::default(),
        Some(raw) => match Depth::parse(raw) {
            Some(d) => d,
            None => return api_error(StatusCode::BAD_REQUEST, format!("unknown depth {raw:?}")),
        },
    };

    let mut chart_kinds = Vec::new();
    for raw in body.chart_types.iter().flatten() {
        match ChartKind::parse(raw) {
            Some(kind) => {
                if !chart_kinds.contains(&kind) {
                    chart_kinds.push(kind);
                }
            }
            None => {
                return api_error(
                    StatusCode::BAD_REQUEST,
                    format!("unknown chart type {raw:?}"),
                )
            }
        }
    }

    let template_type = match &body.template_type {
        None => None,
        Some(raw) => match TemplateType::parse(raw) {
            Some(t) => Some(t),
            None => {
                return api_error(
                    StatusCode::BAD_REQUEST,
                    format!("unknown template type {raw:?}"),
                )
            }
        },
    };

    let files: Vec<RunFile> = body
        .files
        .unwrap_or_default()
        .into_iter()
        .map(|f| RunFile {
            upload_id: f.upload_id.unwrap_or_default(),
            file_name: f.file_name,
            content: f.content,
        })
        .collect();

    // Oversized uploads are their own status, distinct from plain 400s.
    let files_bytes: usize = files.iter().map(|f| f.content.len()).sum();
    if files_bytes > state.config.limits.max_files_bytes {
        return api_error(StatusCode::PAYLOAD_TOO_LARGE, "uploaded files too large");
    }

    let request = StartRequest {
        user_id: caller.user_id.clone(),
        org_id: caller.org_id.clone(),
        mode,
        goal: body.goal,
        params: RunParams {
            depth,
            focus: body.focus,
            template_type,
            chart_kinds,
            plan_format: body.plan_format,
            allow_web: body.allow_web,
        },
        files,
        regenerated_from: None,
    };

    match state.engine.start_run(request) {
        Ok(run_id) => Json(json!({ "runId": run_id, "status": "running" })).into_response(),
        Err(Error::Validation(msg)) => api_error(StatusCode::BAD_REQUEST, msg),
        Err(e) => {
            tracing::error!(error = %e, "run start failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "could not start run")
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/runs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn list_runs(
    State(state): State<AppState>,
    caller: Caller,
    Query(q): Query<ListQuery>,
) -> impl IntoResponse {
    let status = q.status.as_deref().and_then(parse_status);
    let mode = q.mode.as_deref().and_then(Mode::parse);
    let limit = q.limit.min(200);

    let (runs, total) =
        state
            .engine
            .store
            .list_runs(Some(&caller.user_id), status, mode, limit, q.offset);

    // Lightweight list view — no files, findings, or content bodies.
    let items: Vec<serde_json::Value> = runs
        .iter()
        .map(|r| {
            json!({
                "runId": r.id,
                "mode": r.mode,
                "status": r.status,
                "goal": r.goal,
                "depth": r.params.depth,
                "createdAt": r.created_at,
                "completedAt": r.completed_at,
                "errorKind": r.error_kind,
                "counts": {
                    "findings": r.findings.len(),
                    "sources": r.sources.len(),
                    "charts": r.chart_artifacts.len(),
                },
            })
        })
        .collect();

    Json(json!({
        "runs": items,
        "total": total,
        "limit": limit,
        "offset": q.offset,
    }))
}

fn parse_status(s: &str) -> Option<RunStatus> {
    match s {
        "queued" => Some(RunStatus::Queued),
        "running" => Some(RunStatus::Running),
        "completed" => Some(RunStatus::Completed),
        "failed" => Some(RunStatus::Failed),
        "cancelled" => Some(RunStatus::Cancelled),
        _ => None,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/runs/:id (poll)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    #[serde(default, alias = "sinceSeq")]
    pub since_seq: Option<u64>,
}

pub async fn poll_run(
    State(state): State<AppState>,
    caller: Caller,
    Path(run_id): Path<Uuid>,
    Query(q): Query<PollQuery>,
) -> Response {
    let run = match owned_run(&state, &caller, run_id) {
        Ok(run) => run,
        Err(resp) => return resp,
    };

    let since = q.since_seq.unwrap_or(0);
    let activities = state
        .engine
        .store
        .list_activities_since(run_id, since, usize::MAX);
    let next_cursor = activities.last().map(|a| a.seq).unwrap_or(since);
    let frames: Vec<serde_json::Value> = activities.iter().map(activity_frame).collect();
    let terminal = run.status.is_terminal();

    let mut body = json!({
        "status": run.status,
        "activities": frames,
        "nextCursor": next_cursor,
        "terminal": terminal,
    });
    if run.status == RunStatus::Completed {
        body["finalContent"] = json!(run.final_content);
    }
    if run.status == RunStatus::Failed {
        body["errorKind"] = json!(run.error_kind);
        body["errorMessage"] = json!(run.error_message);
    }
    Json(body).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/runs/:id/cancel
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn cancel_run(
    State(state): State<AppState>,
    caller: Caller,
    Path(run_id): Path<Uuid>,
) -> Response {
    if let Err(resp) = owned_run(&state, &caller, run_id) {
        return resp;
    }
    let cancelled = state.engine.cancel_run(run_id);
    Json(json!({ "runId": run_id, "cancelled": cancelled })).into_response()
}
