pub mod health;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the full router: `/health` for monitoring and `/ws` for the
/// client duplex connection. Unlike the orchestrator's HTTP API, there is
/// no bearer-token middleware here — auth happens once at `hello` time
/// inside the socket itself.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/ws", get(ws::handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
