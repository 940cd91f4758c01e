//! Domain events fanned out to bridge consumers

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{PendingToolApproval, SessionStatus};

/// Events published on the bridge's event bus. Every variant names its session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    SessionConnected {
        session_name: String,
        claude_session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    StatusChanged {
        session_name: String,
        previous: SessionStatus,
        status: SessionStatus,
    },
    AssistantMessage {
        session_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        content: Vec<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },
    StreamDelta {
        session_name: String,
        text: String,
        accumulated: String,
    },
    Result {
        session_name: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        errors: Vec<String>,
        duration_ms: u64,
        num_turns: u64,
        total_cost_usd: f64,
    },
    Error {
        session_name: String,
        message: String,
    },
    ToolApprovalNeeded {
        session_name: String,
        approval: PendingToolApproval,
    },
    ToolApprovalResolved {
        session_name: String,
        request_id: String,
    },
    SessionDisconnected {
        session_name: String,
    },
}

impl DomainEvent {
    pub fn session_name(&self) -> &str {
        match self {
            DomainEvent::SessionConnected { session_name, .. }
            | DomainEvent::StatusChanged { session_name, .. }
            | DomainEvent::AssistantMessage { session_name, .. }
            | DomainEvent::StreamDelta { session_name, .. }
            | DomainEvent::Result { session_name, .. }
            | DomainEvent::Error { session_name, .. }
            | DomainEvent::ToolApprovalNeeded { session_name, .. }
            | DomainEvent::ToolApprovalResolved { session_name, .. }
            | DomainEvent::SessionDisconnected { session_name } => session_name,
        }
    }

    /// Wire tag, also used as the persisted event type.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::SessionConnected { .. } => "session_connected",
            DomainEvent::StatusChanged { .. } => "status_changed",
            DomainEvent::AssistantMessage { .. } => "assistant_message",
            DomainEvent::StreamDelta { .. } => "stream_delta",
            DomainEvent::Result { .. } => "result",
            DomainEvent::Error { .. } => "error",
            DomainEvent::ToolApprovalNeeded { .. } => "tool_approval_needed",
            DomainEvent::ToolApprovalResolved { .. } => "tool_approval_resolved",
            DomainEvent::SessionDisconnected { .. } => "session_disconnected",
        }
    }
}
