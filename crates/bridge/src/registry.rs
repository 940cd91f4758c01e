//! Connection registry
//!
//! Owns name → session entry (state plus transport handle) and the reverse
//! correlation id → name index. Each entry sits behind its own mutex; the
//! maps themselves are sharded so different sessions never contend.

use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use muxdeck_protocol::{OutboundFrame, SessionSnapshot, SessionState, SessionStatus};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::BridgeError;

/// Write side of one transport connection. Frames are NDJSON lines.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    connection_id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

impl TransportHandle {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Queue one frame for the socket writer. Never blocks.
    pub fn write(&self, frame: &OutboundFrame) -> Result<(), BridgeError> {
        let line = frame.to_line()?;
        self.tx.send(line).map_err(|_| BridgeError::TransportClosed)
    }
}

#[derive(Debug)]
pub struct SessionEntry {
    pub state: SessionState,
    pub transport: Option<TransportHandle>,
}

impl SessionEntry {
    pub fn new(name: &str, transport: TransportHandle) -> Self {
        Self {
            state: SessionState::new(name),
            transport: Some(transport),
        }
    }

    /// A live handle exists and the session has not reached `disconnected`.
    pub fn is_connected(&self) -> bool {
        self.transport.is_some() && self.state.status != SessionStatus::Disconnected
    }

    /// True when `connection_id` is the currently attached transport.
    pub fn owned_by(&self, connection_id: Uuid) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|t| t.connection_id() == connection_id)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.clone(),
            connected: self.is_connected(),
        }
    }
}

pub type SharedEntry = Arc<Mutex<SessionEntry>>;

/// Lock a session entry, recovering the data if a previous holder panicked.
pub fn lock_entry(entry: &Mutex<SessionEntry>) -> MutexGuard<'_, SessionEntry> {
    entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SharedEntry>,
    by_claude_id: DashMap<String, String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `entry` under `name`, returning the entry it replaced.
    pub fn insert(&self, name: &str, entry: SessionEntry) -> Option<SharedEntry> {
        self.sessions
            .insert(name.to_string(), Arc::new(Mutex::new(entry)))
    }

    pub fn get(&self, name: &str) -> Option<SharedEntry> {
        self.sessions.get(name).map(|e| e.value().clone())
    }

    pub fn remove(&self, name: &str) -> Option<SharedEntry> {
        self.sessions.remove(name).map(|(_, e)| e)
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn index_correlation(&self, claude_session_id: &str, name: &str) {
        self.by_claude_id
            .insert(claude_session_id.to_string(), name.to_string());
    }

    /// Remove the index entry, but only while it still points at `name`.
    pub fn drop_correlation(&self, claude_session_id: &str, name: &str) {
        self.by_claude_id
            .remove_if(claude_session_id, |_, owner| owner == name);
    }

    pub fn name_for_claude_id(&self, claude_session_id: &str) -> Option<String> {
        self.by_claude_id
            .get(claude_session_id)
            .map(|name| name.value().clone())
    }

    pub fn snapshot(&self, name: &str) -> Option<SessionSnapshot> {
        let entry = self.get(name)?;
        let guard = lock_entry(&entry);
        Some(guard.snapshot())
    }

    /// Copy of every session, sorted by name.
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        let entries: Vec<SharedEntry> = self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut snapshots: Vec<SessionSnapshot> = entries
            .iter()
            .map(|entry| lock_entry(entry).snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.state.name.cmp(&b.state.name));
        snapshots
    }
}
