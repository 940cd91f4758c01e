//! Dashboard WebSocket: `/ws/dashboard`
//!
//! Each connection gets the session list, every domain event, and a live log
//! for whichever session the client chose to observe.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use muxdeck_bridge::{LiveLog, LogChange, LogEntry};
use muxdeck_protocol::{now_millis, DomainEvent, SessionSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Server -> dashboard messages
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardMessage {
    Sessions {
        sessions: Vec<SessionSnapshot>,
    },
    Event {
        event: DomainEvent,
    },
    LogReset {
        name: String,
        entries: Vec<LogEntry>,
        streaming: String,
    },
    LogEntry {
        name: String,
        entry: LogEntry,
    },
    Streaming {
        name: String,
        text: String,
    },
    Error {
        message: String,
    },
}

/// Dashboard -> server messages
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardRequest {
    Observe { name: String },
}

/// Per-connection state, independent of the socket.
pub struct DashboardSession {
    log: LiveLog,
}

impl DashboardSession {
    pub fn new(capacity: usize) -> Self {
        Self {
            log: LiveLog::new(capacity),
        }
    }

    pub fn on_event(&mut self, event: &DomainEvent, now_ms: u64) -> Vec<DashboardMessage> {
        let mut out = vec![DashboardMessage::Event {
            event: event.clone(),
        }];
        let name = event.session_name();
        for change in self.log.apply(event, now_ms) {
            out.push(match change {
                LogChange::Appended(entry) => DashboardMessage::LogEntry {
                    name: name.to_string(),
                    entry,
                },
                LogChange::Streaming(text) => DashboardMessage::Streaming {
                    name: name.to_string(),
                    text,
                },
            });
        }
        out
    }

    pub fn on_request(&mut self, raw: &str) -> Vec<DashboardMessage> {
        match serde_json::from_str::<DashboardRequest>(raw) {
            Ok(DashboardRequest::Observe { name }) => {
                self.log.observe(&name);
                vec![DashboardMessage::LogReset {
                    entries: self.log.entries().cloned().collect(),
                    streaming: self.log.streaming().to_string(),
                    name,
                }]
            }
            Err(e) => vec![DashboardMessage::Error {
                message: format!("invalid request: {e}"),
            }],
        }
    }
}

pub async fn dashboard_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_dashboard_socket(socket, state))
}

async fn handle_dashboard_socket(socket: WebSocket, state: AppState) {
    let (subscription, mut events, sessions) = state.bridge.subscribe_channel();
    let mut session = DashboardSession::new(state.live_log_capacity);
    let (mut ws_tx, mut ws_rx) = socket.split();

    info!(
        component = "dashboard",
        event = "dashboard.connected",
        sessions = sessions.len(),
        "Dashboard connected"
    );

    if send_all(&mut ws_tx, vec![DashboardMessage::Sessions { sessions }])
        .await
        .is_err()
    {
        subscription.unsubscribe();
        return;
    }

    loop {
        let outgoing = tokio::select! {
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => session.on_request(text.as_str()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(
                        component = "dashboard",
                        event = "dashboard.socket_error",
                        error = %e,
                        "Dashboard socket error"
                    );
                    break;
                }
            },
            event = events.recv() => match event {
                Some(event) => session.on_event(&event, now_millis()),
                None => break,
            },
        };
        if send_all(&mut ws_tx, outgoing).await.is_err() {
            break;
        }
    }

    subscription.unsubscribe();
    info!(
        component = "dashboard",
        event = "dashboard.disconnected",
        observed = session.log.observed().unwrap_or(""),
        "Dashboard disconnected"
    );
}

async fn send_all<S>(ws_tx: &mut S, messages: Vec<DashboardMessage>) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    for message in messages {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                warn!(
                    component = "dashboard",
                    event = "dashboard.serialize_failed",
                    error = %e,
                    "Failed to serialize dashboard message"
                );
                continue;
            }
        };
        if ws_tx.send(Message::Text(json.into())).await.is_err() {
            debug!(
                component = "dashboard",
                event = "dashboard.send_failed",
                "Dashboard send failed"
            );
            return Err(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxdeck_protocol::SessionStatus;
    use serde_json::json;

    fn status(name: &str) -> DomainEvent {
        DomainEvent::StatusChanged {
            session_name: name.into(),
            previous: SessionStatus::Ready,
            status: SessionStatus::Working,
        }
    }

    #[test]
    fn events_forward_before_observe_without_log_output() {
        let mut session = DashboardSession::new(10);
        let out = session.on_event(&status("s1"), 1);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], DashboardMessage::Event { .. }));
    }

    #[test]
    fn observe_resets_and_projects() {
        let mut session = DashboardSession::new(10);
        let reset = session.on_request(r#"{"type":"observe","name":"s1"}"#);
        assert_eq!(
            reset,
            vec![DashboardMessage::LogReset {
                name: "s1".into(),
                entries: vec![],
                streaming: String::new(),
            }]
        );

        let out = session.on_event(&status("s1"), 5);
        assert_eq!(out.len(), 2);
        match &out[1] {
            DashboardMessage::LogEntry { name, entry } => {
                assert_eq!(name, "s1");
                assert_eq!(entry.at_ms, 5);
            }
            other => panic!("unexpected {other:?}"),
        }

        let delta = DomainEvent::StreamDelta {
            session_name: "s1".into(),
            text: "He".into(),
            accumulated: "He".into(),
        };
        let out = session.on_event(&delta, 6);
        assert_eq!(
            out[1],
            DashboardMessage::Streaming {
                name: "s1".into(),
                text: "He".into()
            }
        );

        // another session's events are forwarded but not projected
        assert_eq!(session.on_event(&status("s2"), 7).len(), 1);
    }

    #[test]
    fn bad_request_yields_error_message() {
        let mut session = DashboardSession::new(10);
        let out = session.on_request("{\"type\":\"nope\"}");
        assert!(matches!(out[0], DashboardMessage::Error { .. }));
    }

    #[test]
    fn wire_shapes() {
        let value = serde_json::to_value(DashboardMessage::Streaming {
            name: "s1".into(),
            text: "x".into(),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "streaming", "name": "s1", "text": "x"}));

        let value = serde_json::to_value(DashboardMessage::Event { event: status("s1") }).unwrap();
        assert_eq!(value["type"], "event");
        assert_eq!(value["event"]["type"], "status_changed");
    }
}
