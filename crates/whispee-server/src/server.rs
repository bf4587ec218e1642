use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use whispee_store::StorageGateway;

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::legacy;
use crate::presence::PresenceRouter;
use crate::registry::ConnectionRegistry;
use crate::sessions::SessionStore;
use crate::shutdown::ShutdownCoordinator;
use crate::socket::{self, SocketContext};

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub socket: SocketContext,
    pub sessions: Arc<SessionStore>,
    pub shutdown: ShutdownCoordinator,
    pub started_at: Instant,
    pub max_message_size: usize,
}

impl AppState {
    /// Wire the realtime services together around `gateway`.
    pub fn new(config: &ServerConfig, gateway: Arc<dyn StorageGateway>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.max_send_queue));
        let sessions = Arc::new(SessionStore::new());
        let presence = Arc::new(PresenceRouter::new(Arc::clone(&registry), Arc::clone(&sessions)));
        let dispatcher = Arc::new(Dispatcher::new(gateway, Arc::clone(&sessions), presence));
        let shutdown = ShutdownCoordinator::new();

        Self {
            socket: SocketContext {
                registry,
                dispatcher,
                token: shutdown.token(),
                heartbeat_interval: config.heartbeat_interval(),
            },
            sessions,
            shutdown,
            started_at: Instant::now(),
            max_message_size: config.max_message_size,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind the listeners and start serving. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    gateway: Arc<dyn StorageGateway>,
) -> Result<ServerHandle, std::io::Error> {
    let state = AppState::new(&config, gateway);
    let shutdown = state.shutdown.clone();
    let registry = Arc::clone(&state.socket.registry);
    let sessions = Arc::clone(&state.sessions);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;

    let legacy_addr = match config.legacy_port {
        Some(port) => {
            let legacy_listener = legacy::bind(&config.host, port).await?;
            let legacy_addr = legacy_listener.local_addr()?;
            let _ = shutdown.spawn(legacy::run(legacy_listener, shutdown.token()));
            Some(legacy_addr)
        }
        None => None,
    };

    let router = build_router(state);
    let token = shutdown.token();
    let _ = shutdown.spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(token.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "http server failed");
        }
    });

    tracing::info!(
        addr = %addr,
        legacy_addr = ?legacy_addr,
        "Whispee server started"
    );

    Ok(ServerHandle {
        addr,
        legacy_addr,
        shutdown,
        shutdown_timeout: config.shutdown_timeout(),
        registry,
        sessions,
    })
}

/// Handle returned by `start()`; owns the shutdown path.
pub struct ServerHandle {
    pub addr: SocketAddr,
    pub legacy_addr: Option<SocketAddr>,
    shutdown: ShutdownCoordinator,
    shutdown_timeout: Duration,
    registry: Arc<ConnectionRegistry>,
    sessions: Arc<SessionStore>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.count()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Stop accepting, close every connection, and wait for their tasks.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn shutdown(self) -> bool {
        tracing::info!(connections = self.registry.count(), "shutting down");
        let clean = self.shutdown.graceful_shutdown(self.shutdown_timeout).await;
        tracing::info!(clean, "server stopped");
        clean
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let ctx = state.socket.clone();
    let shutdown = state.shutdown.clone();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |ws| shutdown.track(socket::handle_socket(ws, ctx)))
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    uptime_secs: u64,
    connections: usize,
    sessions: usize,
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let shutting_down = state.shutdown.is_shutting_down();
    let body = Health {
        status: if shutting_down { "shutting_down" } else { "healthy" },
        uptime_secs: state.started_at.elapsed().as_secs(),
        connections: state.socket.registry.count(),
        sessions: state.sessions.len(),
    };
    let status = if shutting_down {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(body))
}
