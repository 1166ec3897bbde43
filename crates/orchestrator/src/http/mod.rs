pub mod agents;
pub mod approvals;
pub mod chat;
pub mod health;
pub mod runs;
pub mod tools;

use axum::middleware;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;

use crate::auth;
use crate::state::AppState;

/// Build the full API router.
///
/// `/health` is public; everything else is gated behind the bearer-token
/// middleware (a no-op when no API key is configured).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(health::health));

    let protected = Router::new()
        .route("/v1/agents/register", post(agents::register))
        .route("/v1/agents", get(agents::list))
        .route("/v1/agents/:agent_id", get(agents::get_one))
        .route("/v1/runs/:run_id/events", get(runs::run_events))
        .route("/v1/sessions/:session_id/messages", get(runs::session_messages))
        .route("/v1/tools/:tool_name/invoke", post(tools::invoke))
        .route("/v1/tool_calls/:tool_call_id", get(tools::get_tool_call))
        .route("/v1/tool_calls/:tool_call_id/wait", post(tools::wait))
        .route("/v1/approvals/:approval_id/decide", post(approvals::decide))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/models", get(chat::list_models))
        .route_layer(middleware::from_fn_with_state(state, auth::require_api_token));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Map a domain [`sa_domain::error::Error`] to an HTTP response with the
/// shared `{error: {code, message}}` wire shape.
pub fn error_response(e: sa_domain::error::Error) -> axum::response::Response {
    use axum::http::StatusCode;
    use sa_domain::error::ErrorKind;

    let status = match e.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Policy => StatusCode::FORBIDDEN,
        ErrorKind::Upstream | ErrorKind::Transport => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(serde_json::json!({ "error": { "code": e.code(), "message": e.to_string() } })),
    )
        .into_response()
}
