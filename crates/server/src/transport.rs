//! Agent transport mount: `/ws/agent?name=<session>`
//!
//! One WebSocket per agent session. Inbound text frames are fed to the bridge
//! as raw NDJSON; outbound lines queued by the bridge are written by a
//! dedicated writer task. A missing `name` is rejected before the upgrade.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use muxdeck_bridge::SessionBridge;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::http::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AgentParams {
    pub name: Option<String>,
}

/// The session name from the query string, trimmed and non-empty.
pub fn require_session_name(params: &AgentParams) -> Result<String, ApiError> {
    params
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("missing required query parameter: name".into()))
}

pub async fn agent_ws_handler(
    State(state): State<AppState>,
    Query(params): Query<AgentParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let name = match require_session_name(&params) {
        Ok(name) => name,
        Err(err) => {
            warn!(
                component = "transport",
                event = "transport.rejected",
                reason = "missing_name",
                "Agent connection without session name"
            );
            return err.into_response();
        }
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let bridge = state.bridge.clone();
    ws.on_upgrade(move |socket| handle_agent_socket(socket, bridge, name))
}

async fn handle_agent_socket(socket: WebSocket, bridge: Arc<SessionBridge>, name: String) {
    let (mut connection, mut outbound_rx) = bridge.connect(&name);
    let connection_id = connection.id();
    info!(
        component = "transport",
        event = "transport.connection.opened",
        session_name = %name,
        connection_id = %connection_id,
        "Agent transport opened"
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Ends when the bridge drops the handle (disconnect, replacement or removal).
    let send_task = tokio::spawn(async move {
        while let Some(line) = outbound_rx.recv().await {
            if ws_tx.send(Message::Text(line.into())).await.is_err() {
                debug!(
                    component = "transport",
                    event = "transport.send.disconnected",
                    connection_id = %connection_id,
                    "Agent socket send failed"
                );
                return;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(Message::Text(text)) => {
                bridge.handle_transport_message(&mut connection, text.as_str());
            }
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => bridge.handle_transport_message(&mut connection, text),
                Err(_) => debug!(
                    component = "transport",
                    event = "transport.frame.non_utf8",
                    connection_id = %connection_id,
                    bytes = bytes.len(),
                    "Ignoring non-UTF-8 binary frame"
                ),
            },
            Ok(Message::Close(_)) => {
                info!(
                    component = "transport",
                    event = "transport.connection.close_frame",
                    session_name = %name,
                    connection_id = %connection_id,
                    "Agent sent close frame"
                );
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(
                    component = "transport",
                    event = "transport.connection.error",
                    session_name = %name,
                    connection_id = %connection_id,
                    error = %e,
                    "Agent socket error"
                );
                break;
            }
        }
    }

    bridge.disconnect(&connection);
    send_task.abort();
    info!(
        component = "transport",
        event = "transport.connection.closed",
        session_name = %name,
        connection_id = %connection_id,
        "Agent transport closed"
    );
}
