//! HTTP server wiring
//!
//! Binds the rendezvous protocol to routes: slot creation, the listener
//! WebSocket, delivery, the two HTML pages and static assets.

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{ws::WebSocketUpgrade, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mole_rendezvous::{Rendezvous, RendezvousError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::{
    config::ServerConfig,
    pages::{self, PageContext},
    websocket::ListenHandler,
};

/// Shared server state for Axum handlers
#[derive(Clone)]
pub struct ServerState {
    /// The process-wide rendezvous service
    pub rendezvous: Rendezvous,
    /// Public URLs for rendered pages
    pub pages: Arc<PageContext>,
}

/// Response body for slot creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSlotResponse {
    /// Fresh slot identifier
    pub id: String,
}

/// Request body for delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverRequest {
    /// Target slot
    pub id: String,
    /// Payload for the listener
    pub url: String,
}

/// A [`RendezvousError`] reported as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub RendezvousError);

impl From<RendezvousError> for ApiError {
    fn from(error: RendezvousError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

/// The mole HTTP server
pub struct MoleServer {
    config: ServerConfig,
    rendezvous: Rendezvous,
}

impl MoleServer {
    /// Create a server with a fresh slot store
    pub fn new(config: ServerConfig) -> Self {
        let rendezvous = Rendezvous::new(config.rendezvous_config());
        Self { config, rendezvous }
    }

    /// The rendezvous service backing this server
    pub fn rendezvous(&self) -> &Rendezvous {
        &self.rendezvous
    }

    /// Router with all routes and layers installed
    pub fn router(&self) -> Router {
        let state = ServerState {
            rendezvous: self.rendezvous.clone(),
            pages: Arc::new(PageContext {
                base_url: self.config.base_url.clone(),
                ws_base_url: self.config.ws_base_url.clone(),
            }),
        };
        build_router(state, &self.config.static_dir)
    }

    /// Bind, start the sweeper and serve until Ctrl+C
    pub async fn start(self) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind listener on {addr}"))?;

        let sweeper = self.rendezvous.spawn_sweeper();
        let app = self.router();

        info!("Listening on {}", addr);

        let server = axum::serve(listener, app);
        let result = tokio::select! {
            result = server => result.context("server exited with error"),
            _ = signal::ctrl_c() => {
                warn!("received Ctrl+C, shutting down");
                Ok(())
            }
        };

        sweeper.abort();
        result
    }
}

/// Assemble the router over `state`, serving assets from `static_dir`
pub fn build_router(state: ServerState, static_dir: &Path) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/api/slots", post(create_slot))
        .route("/listen", get(listen_handler))
        .route("/send", get(send_page).post(deliver))
        .route("/health", get(health_check))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Create a slot and render the listener page for it
async fn index_page(State(state): State<ServerState>) -> Html<String> {
    let id = state.rendezvous.create();
    Html(pages::render_index(&state.pages, &id))
}

/// Create a slot and return its identifier as JSON
async fn create_slot(State(state): State<ServerState>) -> impl IntoResponse {
    let id = state.rendezvous.create();
    (
        StatusCode::CREATED,
        Json(CreateSlotResponse { id: id.to_string() }),
    )
}

/// WebSocket upgrade for a waiting listener
async fn listen_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let handler = ListenHandler::new(state.rendezvous);
        if let Err(e) = handler.handle_connection(socket).await {
            match &e {
                RendezvousError::Upstream { .. } => warn!("Listener connection error: {}", e),
                _ => debug!("Listener rejected: {}", e),
            }
        }
    })
}

/// Render the sender page
async fn send_page(State(state): State<ServerState>) -> Html<String> {
    Html(pages::render_send(&state.pages))
}

/// Deliver a URL to a waiting listener
///
/// The body is parsed by hand so that every malformed envelope maps to
/// `400 Bad Request`.
async fn deliver(State(state): State<ServerState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let request: DeliverRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!("Malformed send body: {}", e);
        RendezvousError::malformed(e.to_string())
    })?;

    let id = Rendezvous::parse_id(&request.id)?;
    state.rendezvous.deliver(&id, request.url).await?;

    Ok(StatusCode::OK)
}

/// Health check endpoint
async fn health_check(State(state): State<ServerState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "live_slots": state.rendezvous.live_slots(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status() {
        let response = ApiError(RendezvousError::not_found("x")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError(RendezvousError::malformed("bad")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_server_creation() {
        let server = MoleServer::new(ServerConfig::default());
        assert_eq!(server.rendezvous().live_slots(), 0);
        assert_eq!(
            server.rendezvous().config().slot_ttl,
            std::time::Duration::from_secs(600)
        );
    }
}
