//! API authentication.
//!
//! Two layers, both thin by design: an optional gateway bearer token
//! (hash compared in constant time; unset token = dev mode), and the
//! caller identity injected by the front door as `x-user-id`/`x-org-id`
//! headers. JWT validation itself is the front door's job — the core only
//! trusts its verdict.

use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Axum middleware enforcing the gateway bearer token on protected
/// routes. Attach via `axum::middleware::from_fn_with_state`.
pub async fn require_api_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let expected_hash = match &state.api_token_hash {
        Some(h) => h,
        None => return next.run(req).await,
    };

    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    // Compare fixed-length digests in constant time.
    let provided_hash = Sha256::digest(provided.as_bytes());
    if !bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
        return (
            axum::http::StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "invalid or missing API token" })),
        )
            .into_response();
    }

    next.run(req).await
}

/// The authenticated caller, resolved from front-door headers.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub org_id: Option<String>,
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);

        match user_id {
            Some(user_id) => Ok(Caller {
                user_id,
                org_id: parts
                    .headers
                    .get("x-org-id")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from),
            }),
            None => Err((
                axum::http::StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "unauthenticated" })),
            )
                .into_response()),
        }
    }
}

/// Hash the configured bearer token once at startup. Empty or unset
/// tokens leave the gateway in dev mode.
pub fn token_hash_from_env(env_var: &str) -> Option<Vec<u8>> {
    match std::env::var(env_var) {
        Ok(token) if !token.trim().is_empty() => {
            Some(Sha256::digest(token.trim().as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!(env_var, "no API token configured; auth disabled (dev mode)");
            None
        }
    }
}
