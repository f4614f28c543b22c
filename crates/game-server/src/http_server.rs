//! HTTP Status Server
//!
//! Read-only view of the round for dashboards and health checks.

use crate::{error::ServerError, sessions::HubStats, SessionHub};
use axum::{
    extract::State,
    http::{header, Method},
    routing::get,
    Json, Router,
};
use crash_protocol::{GameState, HistoryEntry};
use round_engine::RoundHandle;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
struct StatusContext {
    handle: RoundHandle,
    hub: Arc<SessionHub>,
}

/// HTTP Status Server
pub struct HttpServer {
    context: StatusContext,
}

impl HttpServer {
    pub fn new(handle: RoundHandle, hub: Arc<SessionHub>) -> Self {
        Self {
            context: StatusContext { handle, hub },
        }
    }

    /// Create the Axum router
    pub fn router(self) -> Router {
        // CORS layer to allow browser clients
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

        Router::new()
            .route("/health", get(get_health))
            .route("/state", get(get_state))
            .route("/history", get(get_history))
            .route("/stats", get(get_stats))
            .layer(cors)
            .with_state(self.context)
    }

    /// Run the server
    pub async fn run(self, addr: &str) -> Result<(), ServerError> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        tracing::info!("HTTP status server listening on {}", addr);

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn get_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_state(State(ctx): State<StatusContext>) -> Result<Json<GameState>, ServerError> {
    Ok(Json(ctx.handle.snapshot().await?))
}

async fn get_history(
    State(ctx): State<StatusContext>,
) -> Result<Json<Vec<HistoryEntry>>, ServerError> {
    Ok(Json(ctx.handle.history().await?))
}

async fn get_stats(State(ctx): State<StatusContext>) -> Json<HubStats> {
    Json(ctx.hub.stats())
}
