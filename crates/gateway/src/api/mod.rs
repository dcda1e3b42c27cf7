pub mod chat;
pub mod runs;
pub mod stream;

use axum::middleware;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;

use crate::auth;
use crate::state::AppState;

/// Build the full API router. Routes split into **public** (health) and
/// **protected** (everything else, behind the bearer-token middleware).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/v1/health", get(health));

    let protected = Router::new()
        // Runs
        .route("/v1/runs", post(runs::start))
        .route("/v1/runs", get(runs::list_runs))
        .route("/v1/runs/:id", get(runs::poll_run))
        .route("/v1/runs/:id/stream", get(stream::stream_run))
        .route("/v1/runs/:id/cancel", post(runs::cancel_run))
        .route("/v1/runs/:id/chat", post(chat::chat))
        .route("/v1/runs/:id/regenerate", post(chat::regenerate))
        // Mode-specific aliases
        .route("/v1/research/start", post(runs::research_start))
        .route("/v1/reports/generate", post(runs::reports_generate))
        .route("/v1/templates/generate", post(runs::templates_generate))
        .route("/v1/agentic/start", post(runs::agentic_start))
        .route("/v1/plans/generate", post(runs::plans_generate))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
