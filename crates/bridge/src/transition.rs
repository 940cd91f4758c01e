//! Pure session state transition function
//!
//! Every lifecycle rule lives here as a synchronous function:
//! `transition(state, input, now_ms) -> (state, effects)`.
//! No IO and no locking. The caller applies effects (index updates, prompt
//! flush) and dispatches emitted events after releasing the session guard.

use muxdeck_protocol::inbound::{
    AssistantRecord, ControlRequestBody, InitRecord, ResultRecord, SystemRecord,
};
use muxdeck_protocol::{
    DomainEvent, InboundRecord, PendingToolApproval, SessionState, SessionStatus, TurnOutcome,
};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One thing that can happen to a session: a decoded record or a direct call.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Initialized(InitRecord),
    AssistantMessage(AssistantRecord),
    TextDelta(String),
    TurnResult(ResultRecord),
    ToolPermissionRequested {
        request_id: String,
        tool_name: String,
        tool_input: Value,
        tool_use_id: Option<String>,
    },
    UserMessageSent,
    ApprovalResolved {
        request_id: String,
    },
    TransportClosed,
}

impl Input {
    /// Map a decoded record onto an input. Records with no effect yield `None`.
    pub fn from_record(record: InboundRecord) -> Option<Input> {
        match record {
            InboundRecord::System(SystemRecord::Init(init)) => Some(Input::Initialized(init)),
            InboundRecord::Assistant(assistant) => Some(Input::AssistantMessage(assistant)),
            InboundRecord::StreamEvent(stream) => {
                stream.text_delta().map(|text| Input::TextDelta(text.to_string()))
            }
            InboundRecord::Result(result) => Some(Input::TurnResult(result)),
            InboundRecord::ControlRequest(control) => match control.request {
                ControlRequestBody::CanUseTool(permission) => {
                    Some(Input::ToolPermissionRequested {
                        request_id: control.request_id,
                        tool_name: permission.tool_name,
                        tool_input: permission.input,
                        tool_use_id: permission.tool_use_id,
                    })
                }
                ControlRequestBody::Other => None,
            },
            InboundRecord::System(SystemRecord::Other)
            | InboundRecord::KeepAlive
            | InboundRecord::Unknown => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Emit(DomainEvent),
    /// Point the correlation index entry at this session.
    IndexCorrelation(String),
    /// Remove a correlation index entry owned by this session.
    DropCorrelation(String),
    /// Deliver the queued initial prompt, if any, once events are dispatched.
    FlushQueuedPrompt,
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

pub fn transition(mut state: SessionState, input: Input, now_ms: u64) -> (SessionState, Vec<Effect>) {
    let name = state.name.clone();
    let mut effects = Vec::new();

    if state.status == SessionStatus::Disconnected {
        return (state, effects);
    }

    match input {
        Input::Initialized(init) => {
            if let Some(previous) = state.claude_session_id.take() {
                if previous != init.session_id {
                    effects.push(Effect::DropCorrelation(previous));
                }
            }
            state.claude_session_id = Some(init.session_id.clone());
            state.model = init.model.clone();
            state.tools = init.tools;
            state.mcp_servers = init.mcp_servers;
            state.cwd = init.cwd;
            effects.push(Effect::IndexCorrelation(init.session_id.clone()));

            effects.push(Effect::Emit(DomainEvent::SessionConnected {
                session_name: name.clone(),
                claude_session_id: init.session_id,
                model: init.model,
            }));
            set_status(&mut state, SessionStatus::Ready, &mut effects);
            effects.push(Effect::FlushQueuedPrompt);
        }

        Input::AssistantMessage(assistant) => {
            set_status(&mut state, SessionStatus::Working, &mut effects);
            let text = assistant.message.first_text().map(str::to_string);
            if let Some(text) = &text {
                state.last_assistant_message = Some(text.clone());
            }
            state.streaming_text.clear();
            if let Some(usage) = &assistant.message.usage {
                state.total_usage.add(usage);
            }
            effects.push(Effect::Emit(DomainEvent::AssistantMessage {
                session_name: name,
                text,
                content: assistant.message.content,
                stop_reason: assistant.message.stop_reason,
            }));
        }

        Input::TextDelta(text) => {
            state.streaming_text.push_str(&text);
            effects.push(Effect::Emit(DomainEvent::StreamDelta {
                session_name: name,
                text,
                accumulated: state.streaming_text.clone(),
            }));
        }

        Input::TurnResult(result) => {
            set_status(&mut state, SessionStatus::WaitingForInput, &mut effects);
            state.turn_count += 1;
            state.total_cost_usd = result.total_cost_usd;
            state.streaming_text.clear();

            let outcome = result.outcome();
            let (success, text, errors) = match &outcome {
                TurnOutcome::Success { result } => (true, result.clone(), Vec::new()),
                TurnOutcome::Error { errors, .. } => (false, None, errors.clone()),
            };
            effects.push(Effect::Emit(DomainEvent::Result {
                session_name: name.clone(),
                success,
                result: text,
                errors,
                duration_ms: result.duration_ms,
                num_turns: result.num_turns,
                total_cost_usd: result.total_cost_usd,
            }));
            if let TurnOutcome::Error { subtype, errors } = outcome {
                effects.push(Effect::Emit(DomainEvent::Error {
                    session_name: name,
                    message: error_message(&subtype, &errors),
                }));
            }
        }

        Input::ToolPermissionRequested {
            request_id,
            tool_name,
            tool_input,
            tool_use_id,
        } => {
            let approval = PendingToolApproval {
                request_id,
                tool_name,
                tool_input,
                tool_use_id,
                received_at: now_ms,
            };
            if state.pending_tool_approval.is_some() {
                state.queued_tool_approvals.push(approval);
            } else {
                state.pending_tool_approval = Some(approval.clone());
                effects.push(Effect::Emit(DomainEvent::ToolApprovalNeeded {
                    session_name: name,
                    approval,
                }));
            }
        }

        Input::UserMessageSent => {
            set_status(&mut state, SessionStatus::Working, &mut effects);
        }

        Input::ApprovalResolved { request_id } => {
            let is_head = state
                .pending_tool_approval
                .as_ref()
                .is_some_and(|pending| pending.request_id == request_id);
            if !is_head {
                return (state, effects);
            }
            state.pending_tool_approval = None;
            effects.push(Effect::Emit(DomainEvent::ToolApprovalResolved {
                session_name: name.clone(),
                request_id,
            }));
            if !state.queued_tool_approvals.is_empty() {
                let next = state.queued_tool_approvals.remove(0);
                state.pending_tool_approval = Some(next.clone());
                effects.push(Effect::Emit(DomainEvent::ToolApprovalNeeded {
                    session_name: name,
                    approval: next,
                }));
            }
        }

        Input::TransportClosed => {
            state.pending_tool_approval = None;
            state.queued_tool_approvals.clear();
            if let Some(id) = &state.claude_session_id {
                effects.push(Effect::DropCorrelation(id.clone()));
            }
            effects.push(Effect::Emit(DomainEvent::SessionDisconnected {
                session_name: name,
            }));
            set_status(&mut state, SessionStatus::Disconnected, &mut effects);
        }
    }

    (state, effects)
}

/// Move to `next`, emitting `status_changed` only when the status differs.
fn set_status(state: &mut SessionState, next: SessionStatus, effects: &mut Vec<Effect>) {
    if state.status == next {
        return;
    }
    let previous = state.status;
    state.status = next;
    effects.push(Effect::Emit(DomainEvent::StatusChanged {
        session_name: state.name.clone(),
        previous,
        status: next,
    }));
}

fn error_message(subtype: &str, errors: &[String]) -> String {
    if errors.is_empty() {
        format!("Agent turn failed ({subtype})")
    } else {
        format!("Agent turn failed: {}", errors.join("; "))
    }
}
