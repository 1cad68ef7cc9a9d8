//! Live-reload server
//!
//! Provides the endpoint browsers connect to during `watch`:
//! - WebSocket at `/livereload` speaking the LiveReload protocol
//! - `/changed?files=a,b` to trigger reloads over HTTP

mod livereload;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::config::LiveReloadConfig;

pub use livereload::{LiveReloadMessage, PROTOCOL};

/// Shared server state
struct ServerState {
    /// Reload broadcast channel
    reload_tx: broadcast::Sender<LiveReloadMessage>,

    /// Connected clients that completed the handshake
    clients: AtomicUsize,
}

/// Live-reload server
pub struct LiveReloadServer {
    options: LiveReloadConfig,
    state: Arc<ServerState>,
}

/// Cheap handle for announcing changes to connected browsers
#[derive(Clone)]
pub struct ReloadHandle {
    state: Arc<ServerState>,
}

impl ReloadHandle {
    /// Tell every connected client that `path` changed
    pub fn changed(&self, path: &str) {
        debug!("Reload: {}", path);
        // No receivers just means no browser is connected
        let _ = self.state.reload_tx.send(LiveReloadMessage::reload(path));
    }

    /// Number of connected clients
    pub fn clients(&self) -> usize {
        self.state.clients.load(Ordering::SeqCst)
    }
}

impl LiveReloadServer {
    /// Create a new live-reload server
    pub fn new(options: LiveReloadConfig) -> Self {
        let (reload_tx, _) = broadcast::channel::<LiveReloadMessage>(100);
        Self {
            options,
            state: Arc::new(ServerState {
                reload_tx,
                clients: AtomicUsize::new(0),
            }),
        }
    }

    pub fn handle(&self) -> ReloadHandle {
        ReloadHandle {
            state: self.state.clone(),
        }
    }

    /// Subscribe to the messages sent to clients
    pub fn reload_receiver(&self) -> broadcast::Receiver<LiveReloadMessage> {
        self.state.reload_tx.subscribe()
    }

    /// Routes of the server
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(serve_info))
            .route("/changed", get(serve_changed))
            .route("/livereload", get(livereload::livereload_websocket))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind and serve until the task is dropped
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.options.host, self.options.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: tokio::net::TcpListener) -> Result<()> {
        info!("Live reload listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Server identification
async fn serve_info() -> Json<Value> {
    Json(json!({
        "server": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "protocols": [PROTOCOL],
    }))
}

#[derive(Debug, Deserialize)]
struct ChangedQuery {
    #[serde(default)]
    files: String,
}

/// Trigger reloads for a comma-separated list of files
async fn serve_changed(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ChangedQuery>,
) -> Json<Value> {
    let files: Vec<&str> = query
        .files
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect();

    let handle = ReloadHandle { state: state.clone() };
    for file in &files {
        handle.changed(file);
    }

    Json(json!({
        "clients": handle.clients(),
        "files": files,
    }))
}
