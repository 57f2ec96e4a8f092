//! HTTP surface of the relay: the `/ws` upgrade and a health check

use crate::error::{ConfigError, SignalingError};
use crate::state::ServerState;
use crate::ws;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::get;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// How often each connection is pinged
    pub heartbeat_interval: Duration,
    /// Silence after which a connection is presumed dead
    pub heartbeat_timeout: Duration,
    /// Outbound frames buffered per connection
    pub send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 5000)),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            send_queue: 256,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroHeartbeatInterval);
        }
        if self.heartbeat_timeout < self.heartbeat_interval {
            return Err(ConfigError::HeartbeatTimeoutTooShort {
                interval: self.heartbeat_interval.as_secs(),
                timeout: self.heartbeat_timeout.as_secs(),
            });
        }
        if self.send_queue == 0 {
            return Err(ConfigError::ZeroSendQueue);
        }
        Ok(())
    }
}

/// Shared state handed to every axum handler
#[derive(Clone)]
pub struct AppState {
    pub registry: ServerState,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            registry: ServerState::new(),
            config: Arc::new(config),
        }
    }
}

/// Build the axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::handle_socket(socket, state))
}

async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

/// Run the relay until `shutdown` resolves
pub async fn serve<F>(config: ServerConfig, shutdown: F) -> Result<(), SignalingError>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;

    let listener = TcpListener::bind(config.listen).await?;
    info!(addr = %listener.local_addr()?, "signaling server listening");

    let app = build_router(AppState::new(config));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("signaling server stopped");
    Ok(())
}

/// Bind and run the relay in the background
pub async fn start(config: ServerConfig) -> Result<ServerHandle, SignalingError> {
    config.validate()?;
    let listener = TcpListener::bind(config.listen).await?;
    let addr = listener.local_addr()?;
    let state = AppState::new(config);
    let registry = state.registry.clone();
    let app = build_router(state);

    info!(%addr, "signaling server started");
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("signaling server failed: {e}");
        }
    });

    Ok(ServerHandle {
        addr,
        registry,
        task,
    })
}

/// Handle returned by [`start`]; aborts the server when dropped.
pub struct ServerHandle {
    addr: SocketAddr,
    registry: ServerState,
    task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn registry(&self) -> &ServerState {
        &self.registry
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
