//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the game websocket, a liveness check, and a stats endpoint under a
//! single Axum router. Anything else falls through to the static client
//! directory.

pub mod ws;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::frame::{ErrorCode, ErrorReport};
use crate::state::AppState;

/// Full application router: API routes plus the static client fallback.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let static_files = ServeDir::new(&state.config.static_dir).append_index_html_on_directories(true);

    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .route("/api/stats", get(stats))
        .layer(cors)
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Current player, session, and queue counts from the hub.
async fn stats(State(state): State<AppState>) -> Response {
    match state.hub.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "stats: hub unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorReport::from_error(&e))).into_response()
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
