//! `ChatServer`: Axum HTTP + WebSocket listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::registry::{NamePolicy, Registry};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{ConnectionContext, serve_connection};

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live session table.
    pub registry: Arc<Registry>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
}

impl AppState {
    fn connection_context(&self) -> ConnectionContext {
        ConnectionContext {
            registry: self.registry.clone(),
            profile: self.config.profile,
            send_queue_capacity: self.config.send_queue_capacity,
            shutdown: self.shutdown.token(),
        }
    }
}

/// The chat server.
pub struct ChatServer {
    config: Arc<ServerConfig>,
    registry: Arc<Registry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl ChatServer {
    /// Create a new server.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Registry::new(NamePolicy::from(config.profile));
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            shutdown: self.shutdown.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/", get(index_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task,
    /// which finishes after shutdown is initiated.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local = listener.local_addr()?;

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server stopped with error");
            }
        });

        info!(addr = %local, profile = %self.config.profile, "chat server listening");
        Ok((local, handle))
    }

    /// Stop accepting connections, close every session, and wait up to the
    /// configured timeout. Returns `false` on timeout.
    pub async fn graceful_shutdown(&self) -> bool {
        info!(connections = self.registry.len(), "shutting down");
        self.shutdown
            .graceful_shutdown(self.config.shutdown_timeout())
            .await
    }

    /// Live session table.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.len(),
        state.registry.registered_count(),
        state.registry.dropped_frames(),
    ))
}

/// GET /ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        debug!(remote = %remote, "rejecting upgrade during shutdown");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let ctx = state.connection_context();
    let shutdown = state.shutdown.clone();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| shutdown.track(serve_connection(socket, remote, ctx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use lanchat_core::Profile;
    use tower::ServiceExt;

    fn make_server() -> ChatServer {
        ChatServer::new(ServerConfig::default())
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert!(server.registry().is_empty());
        assert_eq!(server.registry().policy(), NamePolicy::Unique);
        assert!(!server.shutdown().is_shutting_down());
    }

    #[test]
    fn basic_profile_shares_names() {
        let server = ChatServer::new(ServerConfig {
            profile: Profile::Basic,
            ..ServerConfig::default()
        });
        assert_eq!(server.registry().policy(), NamePolicy::Shared);
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let (status, body) = get_body(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["registered"], 0);
        assert_eq!(parsed["droppedFrames"], 0);
    }

    #[tokio::test]
    async fn index_serves_client_page() {
        let server = make_server();
        let (status, body) = get_body(server.router(), "/").await;
        assert_eq!(status, StatusCode::OK);
        let html = String::from_utf8(body).unwrap();
        assert!(html.contains("<html"));
        assert!(html.contains("/ws"));
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let (status, _) = get_body(server.router(), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(server.graceful_shutdown().await);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn listen_reports_bind_failure() {
        let first = make_server();
        let (addr, handle) = first.listen().await.unwrap();

        let second = ChatServer::new(ServerConfig {
            port: addr.port(),
            ..ServerConfig::default()
        });
        let err = second.listen().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));

        first.shutdown().shutdown();
        handle.await.unwrap();
    }
}
