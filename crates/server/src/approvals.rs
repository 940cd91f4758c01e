//! Cross-session approval inbox
//!
//! Aggregates pending tool approvals from the event bus alone. A disconnect
//! drops approvals without a resolution event, so `session_disconnected`
//! purges everything held for that session.

use std::sync::Arc;

use dashmap::DashMap;
use muxdeck_bridge::{SessionBridge, Subscription};
use muxdeck_protocol::{DomainEvent, PendingToolApproval, SessionSnapshot};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboxApproval {
    pub session_name: String,
    #[serde(flatten)]
    pub approval: PendingToolApproval,
}

/// Keyed by (session name, request id).
#[derive(Debug, Default)]
pub struct ApprovalInbox {
    pending: DashMap<(String, String), PendingToolApproval>,
}

impl ApprovalInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the bridge and seed from its snapshot.
    pub fn attach(self: &Arc<Self>, bridge: &SessionBridge) -> Subscription {
        let inbox = Arc::clone(self);
        let (subscription, snapshot) =
            bridge.subscribe_with_snapshot(move |event| inbox.apply(event));
        self.seed(&snapshot);
        subscription
    }

    pub fn seed(&self, sessions: &[SessionSnapshot]) {
        for session in sessions.iter().filter(|s| s.connected) {
            if let Some(approval) = &session.state.pending_tool_approval {
                self.pending.insert(
                    (session.state.name.clone(), approval.request_id.clone()),
                    approval.clone(),
                );
            }
        }
    }

    pub fn apply(&self, event: &DomainEvent) {
        match event {
            DomainEvent::ToolApprovalNeeded {
                session_name,
                approval,
            } => {
                self.pending.insert(
                    (session_name.clone(), approval.request_id.clone()),
                    approval.clone(),
                );
            }
            DomainEvent::ToolApprovalResolved {
                session_name,
                request_id,
            } => {
                self.pending
                    .remove(&(session_name.clone(), request_id.clone()));
            }
            DomainEvent::SessionDisconnected { session_name } => {
                self.purge_session(session_name);
            }
            _ => {}
        }
    }

    pub fn purge_session(&self, session_name: &str) {
        self.pending.retain(|(name, _), _| name != session_name);
    }

    /// All pending approvals, oldest first.
    pub fn list(&self) -> Vec<InboxApproval> {
        let mut approvals: Vec<InboxApproval> = self
            .pending
            .iter()
            .map(|entry| InboxApproval {
                session_name: entry.key().0.clone(),
                approval: entry.value().clone(),
            })
            .collect();
        approvals.sort_by(|a, b| {
            a.approval
                .received_at
                .cmp(&b.approval.received_at)
                .then_with(|| a.session_name.cmp(&b.session_name))
        });
        approvals
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
