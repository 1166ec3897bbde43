//! API authentication middleware.
//!
//! `main.rs` resolves `config.server.api_key` (settable via the
//! `ORCH_API_KEY`/`SA_API_TOKEN` env vars through
//! [`sa_domain::config::Config::apply_env_overrides`]) once at startup
//! and caches its SHA-256 digest on [`AppState::api_token_hash`]. If no
//! key is configured, the server logs a warning once at startup and
//! allows unauthenticated access (dev mode) — protected handlers never
//! see the difference.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

pub async fn require_api_token(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let expected_hash = match &state.api_token_hash {
        Some(h) => h,
        None => return next.run(req).await,
    };

    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v: &axum::http::HeaderValue| v.to_str().ok())
        .and_then(|v: &str| v.strip_prefix("Bearer "))
        .unwrap_or("");

    let provided_hash = Sha256::digest(provided.as_bytes());

    if !bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
        return (
            axum::http::StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({ "error": "invalid or missing API token" })),
        )
            .into_response();
    }

    next.run(req).await
}
