//! SessionBridge: the consumer-facing facade
//!
//! Records from one connection are applied strictly in order. Each input
//! locks only its own session, runs `transition`, applies index effects and
//! releases the guard before dispatching events, so listeners are free to
//! call back into the bridge.

use muxdeck_protocol::{
    now_millis, ApprovalDecision, DomainEvent, OutboundFrame, SessionSnapshot, SessionState,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::decoder::LineDecoder;
use crate::event_bus::{EventBus, Subscription};
use crate::prompt_queue::PromptQueue;
use crate::registry::{lock_entry, SessionEntry, SessionRegistry, TransportHandle};
use crate::transition::{transition, Effect, Input};

/// Read side of one attached transport. Owned by the socket reader task.
#[derive(Debug)]
pub struct Connection {
    name: String,
    connection_id: Uuid,
    decoder: LineDecoder,
}

impl Connection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Uuid {
        self.connection_id
    }
}

#[derive(Default)]
pub struct SessionBridge {
    registry: SessionRegistry,
    prompts: PromptQueue,
    bus: EventBus,
}

impl SessionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Transport side -----------------------------------------------------

    /// Attach a new transport under `name`, replacing any previous state.
    ///
    /// Returns the connection (fed by the reader) and the receiver of
    /// outbound NDJSON lines (drained by the writer).
    pub fn connect(&self, name: &str) -> (Connection, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = TransportHandle::new(tx);
        let connection_id = transport.connection_id();

        if let Some(previous) = self
            .registry
            .insert(name, SessionEntry::new(name, transport))
        {
            let mut old = lock_entry(&previous);
            if let Some(id) = old.state.claude_session_id.as_deref() {
                self.registry.drop_correlation(id, name);
            }
            old.transport = None;
        }

        info!(
            component = "bridge",
            event = "bridge.session.attached",
            session_name = %name,
            connection_id = %connection_id,
            sessions = self.registry.len(),
            "Transport attached"
        );

        (
            Connection {
                name: name.to_string(),
                connection_id,
                decoder: LineDecoder::new(),
            },
            rx,
        )
    }

    /// Decode one raw transport message and apply its records in order.
    pub fn handle_transport_message(&self, connection: &mut Connection, raw: &str) {
        for record in connection.decoder.decode(raw) {
            let kind = record.kind();
            let Some(input) = Input::from_record(record) else {
                debug!(
                    component = "bridge",
                    event = "bridge.record.ignored",
                    session_name = %connection.name,
                    record_type = kind,
                    "Record has no effect"
                );
                continue;
            };
            if !self.apply(&connection.name, Some(connection.connection_id), input) {
                debug!(
                    component = "bridge",
                    event = "bridge.record.stale",
                    session_name = %connection.name,
                    connection_id = %connection.connection_id,
                    "Dropping record from replaced connection"
                );
                return;
            }
        }
    }

    /// Mark the session disconnected. No-op if a newer connection took over.
    pub fn disconnect(&self, connection: &Connection) {
        if self.apply(
            &connection.name,
            Some(connection.connection_id),
            Input::TransportClosed,
        ) {
            info!(
                component = "bridge",
                event = "bridge.session.disconnected",
                session_name = %connection.name,
                connection_id = %connection.connection_id,
                "Transport closed"
            );
        }
    }

    // -- Subscription -------------------------------------------------------

    pub fn on<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        self.bus.on(listener)
    }

    /// Register `listener`, then read the snapshot. Nothing published after
    /// the snapshot can be missed; an event may appear in both.
    pub fn subscribe_with_snapshot<F>(&self, listener: F) -> (Subscription, Vec<SessionSnapshot>)
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        let subscription = self.bus.on(listener);
        (subscription, self.registry.snapshots())
    }

    /// Channel flavour of [`Self::subscribe_with_snapshot`].
    pub fn subscribe_channel(
        &self,
    ) -> (
        Subscription,
        mpsc::UnboundedReceiver<DomainEvent>,
        Vec<SessionSnapshot>,
    ) {
        let (subscription, rx) = self.bus.channel();
        (subscription, rx, self.registry.snapshots())
    }

    // -- Accessors ----------------------------------------------------------

    pub fn get_all_sessions(&self) -> Vec<SessionSnapshot> {
        self.registry.snapshots()
    }

    pub fn get_session_state(&self, name: &str) -> Option<SessionSnapshot> {
        self.registry.snapshot(name)
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.registry
            .get(name)
            .is_some_and(|entry| lock_entry(&entry).is_connected())
    }

    pub fn get_session_name_by_claude_id(&self, claude_session_id: &str) -> Option<String> {
        self.registry.name_for_claude_id(claude_session_id)
    }

    // -- Commands -----------------------------------------------------------

    /// Send a user turn. False means unknown or not connected, or the write failed.
    pub fn send_user_message(&self, name: &str, text: &str) -> bool {
        self.deliver_user_message(name, text, None)
    }

    /// With `connection_id` set, delivers only while that connection is
    /// still the one attached.
    fn deliver_user_message(&self, name: &str, text: &str, connection_id: Option<Uuid>) -> bool {
        let Some(entry) = self.registry.get(name) else {
            return false;
        };
        let events = {
            let mut guard = lock_entry(&entry);
            if !guard.is_connected() || connection_id.is_some_and(|id| !guard.owned_by(id)) {
                return false;
            }
            let frame = OutboundFrame::user_message(text, guard.state.claude_session_id.as_deref());
            let written = guard
                .transport
                .as_ref()
                .map(|transport| transport.write(&frame));
            if let Some(Err(err)) = written {
                warn!(
                    component = "bridge",
                    event = "bridge.user_message.write_failed",
                    session_name = %name,
                    error = %err,
                    "Failed to write user message"
                );
                return false;
            }
            let (events, _) = self.step(name, &mut guard, Input::UserMessageSent);
            events
        };

        debug!(
            component = "bridge",
            event = "bridge.user_message.sent",
            session_name = %name,
            text_len = text.len(),
            "User message sent"
        );
        self.publish(&events);
        true
    }

    /// Answer the outstanding approval. `request_id` must match it exactly.
    pub fn respond_to_tool_approval(
        &self,
        name: &str,
        request_id: &str,
        decision: ApprovalDecision,
        message: Option<&str>,
    ) -> bool {
        let Some(entry) = self.registry.get(name) else {
            return false;
        };
        let events = {
            let mut guard = lock_entry(&entry);
            let Some(pending) = guard.state.pending_tool_approval.as_ref() else {
                return false;
            };
            if pending.request_id != request_id {
                warn!(
                    component = "bridge",
                    event = "bridge.approval.mismatch",
                    session_name = %name,
                    request_id = %request_id,
                    pending_request_id = %pending.request_id,
                    "Approval does not match the pending request"
                );
                return false;
            }
            let frame =
                OutboundFrame::tool_approval(request_id, decision, &pending.tool_input, message);
            let Some(transport) = guard.transport.as_ref().filter(|_| guard.is_connected()) else {
                return false;
            };
            if let Err(err) = transport.write(&frame) {
                warn!(
                    component = "bridge",
                    event = "bridge.approval.write_failed",
                    session_name = %name,
                    request_id = %request_id,
                    error = %err,
                    "Failed to write control response"
                );
                return false;
            }
            let (events, _) = self.step(
                name,
                &mut guard,
                Input::ApprovalResolved {
                    request_id: request_id.to_string(),
                },
            );
            events
        };

        info!(
            component = "bridge",
            event = "bridge.approval.resolved",
            session_name = %name,
            request_id = %request_id,
            decision = decision.behavior(),
            "Tool approval answered"
        );
        self.publish(&events);
        true
    }

    /// Hold `text` until the session's next init. Overwrites an unconsumed prompt.
    pub fn queue_initial_prompt(&self, name: &str, text: &str) {
        let replaced = self.prompts.queue(name, text);
        debug!(
            component = "bridge",
            event = "bridge.prompt.queued",
            session_name = %name,
            replaced,
            "Initial prompt queued"
        );
    }

    /// Abrupt teardown: state, transport, correlation entry and queued prompt.
    /// Emits no events.
    pub fn remove_session(&self, name: &str) {
        self.prompts.remove(name);
        let Some(entry) = self.registry.remove(name) else {
            return;
        };
        let mut guard = lock_entry(&entry);
        if let Some(id) = guard.state.claude_session_id.as_deref() {
            self.registry.drop_correlation(id, name);
        }
        guard.transport = None;
        info!(
            component = "bridge",
            event = "bridge.session.removed",
            session_name = %name,
            "Session removed"
        );
    }

    // -- Internals ----------------------------------------------------------

    /// Apply one input under the session guard, then dispatch its events.
    /// Returns false when the session is gone or `connection_id` is stale.
    fn apply(&self, name: &str, connection_id: Option<Uuid>, input: Input) -> bool {
        let Some(entry) = self.registry.get(name) else {
            return false;
        };
        let (events, flush) = {
            let mut guard = lock_entry(&entry);
            if connection_id.is_some_and(|id| !guard.owned_by(id)) {
                return false;
            }
            let closing = matches!(input, Input::TransportClosed);
            let stepped = self.step(name, &mut guard, input);
            if closing {
                guard.transport = None;
            }
            stepped
        };

        self.publish(&events);

        // The prompt is consumed even if delivery fails; it never goes to a
        // connection other than the one whose init requested the flush.
        if flush {
            if let Some(prompt) = self.prompts.take(name) {
                let delivered = self.deliver_user_message(name, &prompt, connection_id);
                info!(
                    component = "bridge",
                    event = "bridge.prompt.flushed",
                    session_name = %name,
                    delivered,
                    "Queued prompt flushed on ready"
                );
            }
        }
        true
    }

    /// Run `transition` against a locked entry and apply index effects.
    /// Returns the events to publish and whether a prompt flush was requested.
    fn step(&self, name: &str, entry: &mut SessionEntry, input: Input) -> (Vec<DomainEvent>, bool) {
        let state = std::mem::replace(&mut entry.state, SessionState::new(name));
        let (next, effects) = transition(state, input, now_millis());
        entry.state = next;

        let mut events = Vec::new();
        let mut flush = false;
        for effect in effects {
            match effect {
                Effect::Emit(event) => events.push(event),
                Effect::IndexCorrelation(id) => self.registry.index_correlation(&id, name),
                Effect::DropCorrelation(id) => self.registry.drop_correlation(&id, name),
                Effect::FlushQueuedPrompt => flush = true,
            }
        }
        (events, flush)
    }

    fn publish(&self, events: &[DomainEvent]) {
        for event in events {
            self.bus.publish(event);
        }
    }
}
