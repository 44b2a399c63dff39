//! HTTP route handlers.
//!
//! All handlers are thin - they read from the registry and never mutate it.
//! Session mutation happens only over the WebSocket protocol.

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::{SyncError, SyncResult};
use crate::model::SessionSnapshot;
use crate::protocol_constants::SERVICE_ID;
use crate::state::Config;

/// Builds the router with CORS and request tracing applied.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.read());

    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .route("/api/stats", get(get_stats))
        .route("/api/sessions/{code}", get(get_session))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS from the configured allowlist. `*` allows any origin.
fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if config.allows_any_origin() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("[Server] Ignoring invalid CORS origin: {:?}", origin);
                None
            }
        })
        .collect();
    log::info!("[Server] CORS allowlist: {:?}", config.cors_origins);
    layer.allow_origin(AllowOrigin::list(origins))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe.
async fn health_check() -> &'static str {
    "ok\n"
}

async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.registry.stats();
    Json(json!({
        "service": SERVICE_ID,
        "sessions": stats.sessions,
        "members": stats.members,
        "connections": stats.connections,
        "wsConnections": state.ws_manager.connection_count(),
    }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> SyncResult<Json<SessionSnapshot>> {
    state
        .registry
        .snapshot(&code)
        .map(Json)
        .ok_or_else(|| SyncError::NotFound("Session not found".into()))
}
