//! LiveReload protocol support

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ServerState;

/// Protocol spoken by the server
pub const PROTOCOL: &str = "http://livereload.com/protocols/official-7";

/// LiveReload protocol messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum LiveReloadMessage {
    /// Handshake, sent by both sides
    Hello {
        protocols: Vec<String>,
        #[serde(rename = "serverName", default, skip_serializing_if = "Option::is_none")]
        server_name: Option<String>,
    },

    /// A file changed; stylesheets are swapped in place when `liveCSS` is set
    Reload {
        path: String,
        #[serde(rename = "liveCSS", default = "default_live_css")]
        live_css: bool,
    },

    /// Show a message in the browser
    Alert { message: String },
}

fn default_live_css() -> bool {
    true
}

impl LiveReloadMessage {
    pub fn server_hello() -> Self {
        LiveReloadMessage::Hello {
            protocols: vec![PROTOCOL.to_string()],
            server_name: Some(env!("CARGO_PKG_NAME").to_string()),
        }
    }

    pub fn reload(path: impl Into<String>) -> Self {
        LiveReloadMessage::Reload {
            path: path.into(),
            live_css: true,
        }
    }
}

/// Handle WebSocket upgrade for live reload
pub(super) async fn livereload_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a live-reload client connection
async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut sender, mut receiver) = socket.split();

    // Wait for the client handshake before sending anything
    let mut greeted = false;
    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => {
                if let Ok(LiveReloadMessage::Hello { .. }) = serde_json::from_str(&text) {
                    greeted = true;
                    break;
                }
                debug!("Ignoring message before handshake: {}", text);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    if !greeted {
        return;
    }

    let mut reload_rx = state.reload_tx.subscribe();
    if let Ok(json) = serde_json::to_string(&LiveReloadMessage::server_hello()) {
        if sender.send(Message::Text(json)).await.is_err() {
            return;
        }
    }

    state.clients.fetch_add(1, Ordering::SeqCst);
    debug!("Live-reload client connected");

    // Forward reload messages to the client
    let mut send_task = tokio::spawn(async move {
        while let Ok(message) = reload_rx.recv().await {
            if let Ok(json) = serde_json::to_string(&message) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Drain client messages (`info`, `url`) until it disconnects
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => debug!("Live-reload client says: {}", text),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.clients.fetch_sub(1, Ordering::SeqCst);
    debug!("Live-reload client disconnected");
}
