//! Live log projector
//!
//! Derives a bounded, human-readable log for one observed session purely from
//! domain events. Owned by a single consumer (one per dashboard connection).

use std::collections::VecDeque;

use muxdeck_protocol::DomainEvent;
use serde::Serialize;

pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Assistant,
    ToolApproval,
    Result,
    Status,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Unix epoch millis at which the projector observed the event
    pub at_ms: u64,
    pub kind: LogKind,
    pub text: String,
}

/// What a single event changed in the projection.
#[derive(Debug, Clone, PartialEq)]
pub enum LogChange {
    Appended(LogEntry),
    Streaming(String),
}

#[derive(Debug)]
pub struct LiveLog {
    capacity: usize,
    observed: Option<String>,
    entries: VecDeque<LogEntry>,
    streaming: String,
}

impl LiveLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            observed: None,
            entries: VecDeque::new(),
            streaming: String::new(),
        }
    }

    pub fn observed(&self) -> Option<&str> {
        self.observed.as_deref()
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn streaming(&self) -> &str {
        &self.streaming
    }

    /// Switch to `name`. Returns true if the projection was reset.
    pub fn observe(&mut self, name: &str) -> bool {
        if self.observed.as_deref() == Some(name) {
            return false;
        }
        self.observed = Some(name.to_string());
        self.entries.clear();
        self.streaming.clear();
        true
    }

    /// Fold one event into the projection. Events for other sessions are ignored.
    pub fn apply(&mut self, event: &DomainEvent, now_ms: u64) -> Vec<LogChange> {
        if self.observed.as_deref() != Some(event.session_name()) {
            return Vec::new();
        }

        let mut changes = Vec::new();
        let entry = match event {
            DomainEvent::SessionConnected { model, .. } => Some((
                LogKind::Status,
                match model {
                    Some(model) => format!("Connected ({model})"),
                    None => "Connected".to_string(),
                },
            )),
            DomainEvent::StatusChanged {
                previous, status, ..
            } => Some((LogKind::Status, format!("{previous} -> {status}"))),
            DomainEvent::AssistantMessage { text, .. } => {
                text.as_ref().map(|text| (LogKind::Assistant, text.clone()))
            }
            DomainEvent::StreamDelta { accumulated, .. } => {
                self.streaming = accumulated.clone();
                changes.push(LogChange::Streaming(self.streaming.clone()));
                None
            }
            DomainEvent::Result {
                success,
                num_turns,
                total_cost_usd,
                ..
            } => {
                self.streaming.clear();
                changes.push(LogChange::Streaming(String::new()));
                let outcome = if *success { "Turn complete" } else { "Turn failed" };
                Some((
                    LogKind::Result,
                    format!("{outcome} ({num_turns} turns, ${total_cost_usd:.4})"),
                ))
            }
            DomainEvent::Error { message, .. } => Some((LogKind::Error, message.clone())),
            DomainEvent::ToolApprovalNeeded { approval, .. } => Some((
                LogKind::ToolApproval,
                format!("Approval needed: {}", approval.tool_name),
            )),
            DomainEvent::ToolApprovalResolved { request_id, .. } => Some((
                LogKind::ToolApproval,
                format!("Approval resolved: {request_id}"),
            )),
            DomainEvent::SessionDisconnected { .. } => {
                Some((LogKind::Status, "Disconnected".to_string()))
            }
        };

        if let Some((kind, text)) = entry {
            let entry = LogEntry {
                at_ms: now_ms,
                kind,
                text,
            };
            self.push(entry.clone());
            changes.push(LogChange::Appended(entry));
        }
        changes
    }

    fn push(&mut self, entry: LogEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }
}

impl Default for LiveLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxdeck_protocol::SessionStatus;

    fn error(name: &str, message: &str) -> DomainEvent {
        DomainEvent::Error {
            session_name: name.into(),
            message: message.into(),
        }
    }

    fn delta(name: &str, accumulated: &str) -> DomainEvent {
        DomainEvent::StreamDelta {
            session_name: name.into(),
            text: String::new(),
            accumulated: accumulated.into(),
        }
    }

    fn result(name: &str) -> DomainEvent {
        DomainEvent::Result {
            session_name: name.into(),
            success: true,
            result: Some("ok".into()),
            errors: Vec::new(),
            duration_ms: 1,
            num_turns: 2,
            total_cost_usd: 0.5,
        }
    }

    #[test]
    fn ignores_events_until_observing() {
        let mut log = LiveLog::new(10);
        assert!(log.apply(&error("s1", "x"), 1).is_empty());
        assert!(log.observe("s1"));
        assert!(!log.observe("s1"));
        assert!(log.apply(&error("s2", "x"), 2).is_empty());
        assert_eq!(log.apply(&error("s1", "boom"), 3).len(), 1);
        assert_eq!(log.entries().count(), 1);
    }

    #[test]
    fn caps_entries_dropping_oldest() {
        let mut log = LiveLog::new(3);
        log.observe("s1");
        for i in 0..5u64 {
            log.apply(&error("s1", &format!("e{i}")), i);
        }
        let texts: Vec<_> = log.entries().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["e2", "e3", "e4"]);
        assert_eq!(log.entries().next().unwrap().at_ms, 2);
    }

    #[test]
    fn streaming_tracks_accumulator_and_clears_on_result() {
        let mut log = LiveLog::new(10);
        log.observe("s1");
        assert_eq!(
            log.apply(&delta("s1", "ab"), 1),
            vec![LogChange::Streaming("ab".into())]
        );
        assert_eq!(log.streaming(), "ab");

        let changes = log.apply(&result("s1"), 2);
        assert_eq!(changes[0], LogChange::Streaming(String::new()));
        assert!(matches!(&changes[1], LogChange::Appended(e) if e.kind == LogKind::Result));
        assert_eq!(log.streaming(), "");
    }

    #[test]
    fn switching_session_resets_everything() {
        let mut log = LiveLog::new(10);
        log.observe("s1");
        log.apply(&delta("s1", "partial"), 1);
        log.apply(
            &DomainEvent::StatusChanged {
                session_name: "s1".into(),
                previous: SessionStatus::Ready,
                status: SessionStatus::Working,
            },
            2,
        );
        assert!(log.observe("s2"));
        assert_eq!(log.entries().count(), 0);
        assert_eq!(log.streaming(), "");
        assert_eq!(log.observed(), Some("s2"));
    }

    #[test]
    fn assistant_without_text_adds_no_entry() {
        let mut log = LiveLog::new(10);
        log.observe("s1");
        let changes = log.apply(
            &DomainEvent::AssistantMessage {
                session_name: "s1".into(),
                text: None,
                content: Vec::new(),
                stop_reason: None,
            },
            1,
        );
        assert!(changes.is_empty());
    }
}
