//! Agent → bridge records (one NDJSON line each)
//!
//! Decoding happens in two steps: the line is parsed into a `serde_json::Value`
//! first, then `InboundRecord::from_value` dispatches on the `type` discriminant.
//! Unknown discriminants, and known ones whose shape doesn't match, become
//! `InboundRecord::Unknown` so a single odd record never blocks the stream.

use serde::Deserialize;
use serde_json::Value;

use crate::types::{lenient_amount, lenient_count, null_as_default, McpServerStatus, TokenUsage};

/// Top-level inbound record from the agent's stream-json output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundRecord {
    System(SystemRecord),
    Assistant(AssistantRecord),
    StreamEvent(StreamEventRecord),
    Result(ResultRecord),
    ControlRequest(ControlRequestRecord),
    KeepAlive,
    #[serde(other)]
    Unknown,
}

impl InboundRecord {
    /// Convert an already-parsed JSON value into a typed record.
    pub fn from_value(value: Value) -> Self {
        if value.get("type").and_then(Value::as_str).is_none() {
            return InboundRecord::Unknown;
        }
        serde_json::from_value(value).unwrap_or(InboundRecord::Unknown)
    }

    /// Wire discriminant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundRecord::System(_) => "system",
            InboundRecord::Assistant(_) => "assistant",
            InboundRecord::StreamEvent(_) => "stream_event",
            InboundRecord::Result(_) => "result",
            InboundRecord::ControlRequest(_) => "control_request",
            InboundRecord::KeepAlive => "keep_alive",
            InboundRecord::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum SystemRecord {
    Init(InitRecord),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InitRecord {
    pub session_id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub tools: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mcp_servers: Vec<McpServerStatus>,
    #[serde(default)]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssistantRecord {
    pub message: AssistantBody,
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssistantBody {
    /// Content blocks kept verbatim so consumers see every block type.
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: Vec<Value>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl AssistantBody {
    /// Text of the first `text` block, scanning in order.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| {
            if block.get("type").and_then(Value::as_str) == Some("text") {
                block.get("text").and_then(Value::as_str)
            } else {
                None
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamEventRecord {
    pub event: StreamPayload,
}

/// Inner payload of a stream event (the raw model API event).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamPayload {
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub event_type: String,
    #[serde(default)]
    pub delta: Option<StreamDelta>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamDelta {
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub delta_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl StreamEventRecord {
    /// The delta text if this is a content-block text delta.
    pub fn text_delta(&self) -> Option<&str> {
        if self.event.event_type != "content_block_delta" {
            return None;
        }
        let delta = self.event.delta.as_ref()?;
        if delta.delta_type != "text_delta" {
            return None;
        }
        delta.text.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub subtype: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_error: bool,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub errors: Vec<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub duration_ms: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub num_turns: u64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_cost_usd: f64,
}

/// How a turn ended, as reported by a `result` record
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Success { result: Option<String> },
    Error { subtype: String, errors: Vec<String> },
}

impl ResultRecord {
    pub fn outcome(&self) -> TurnOutcome {
        if self.is_error || self.subtype.starts_with("error") {
            TurnOutcome::Error {
                subtype: self.subtype.clone(),
                errors: self.errors.clone(),
            }
        } else {
            TurnOutcome::Success {
                result: self.result.clone(),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ControlRequestRecord {
    pub request_id: String,
    pub request: ControlRequestBody,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ControlRequestBody {
    CanUseTool(ToolPermissionRequest),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolPermissionRequest {
    pub tool_name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub tool_use_id: Option<String>,
}

/// Accept arrays that mix strings with other values, keeping only the strings.
fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_init_with_capabilities() {
        let record = InboundRecord::from_value(json!({
            "type": "system",
            "subtype": "init",
            "session_id": "c1",
            "model": "claude-sonnet",
            "tools": ["Bash", "Edit"],
            "mcp_servers": [{"name": "github", "status": "connected"}],
            "cwd": "/repo",
            "permissionMode": "default"
        }));
        let InboundRecord::System(SystemRecord::Init(init)) = record else {
            panic!("expected init, got {record:?}");
        };
        assert_eq!(init.session_id, "c1");
        assert_eq!(init.model.as_deref(), Some("claude-sonnet"));
        assert_eq!(init.tools, vec!["Bash", "Edit"]);
        assert_eq!(init.mcp_servers[0].name, "github");
        assert_eq!(init.cwd.as_deref(), Some("/repo"));
    }

    #[test]
    fn other_system_subtypes_are_not_init() {
        let record = InboundRecord::from_value(json!({"type": "system", "subtype": "status"}));
        assert_eq!(record, InboundRecord::System(SystemRecord::Other));
    }

    #[test]
    fn unknown_type_maps_to_unknown() {
        let record = InboundRecord::from_value(json!({"type": "rate_limit_event", "x": 1}));
        assert_eq!(record, InboundRecord::Unknown);
        assert_eq!(InboundRecord::from_value(json!([1, 2])), InboundRecord::Unknown);
        assert_eq!(InboundRecord::from_value(json!({"no_type": true})), InboundRecord::Unknown);
    }

    #[test]
    fn known_type_with_bad_shape_maps_to_unknown() {
        let record = InboundRecord::from_value(json!({"type": "assistant", "message": 42}));
        assert_eq!(record, InboundRecord::Unknown);
    }

    #[test]
    fn keep_alive_tolerates_extra_fields() {
        let record = InboundRecord::from_value(json!({"type": "keep_alive", "ts": 5}));
        assert_eq!(record, InboundRecord::KeepAlive);
    }

    #[test]
    fn assistant_first_text_skips_tool_blocks() {
        let record = InboundRecord::from_value(json!({
            "type": "assistant",
            "message": {
                "content": [
                    {"type": "tool_use", "id": "t1", "name": "Bash", "input": {}},
                    {"type": "text", "text": "first"},
                    {"type": "text", "text": "second"}
                ],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 3, "output_tokens": 4}
            }
        }));
        let InboundRecord::Assistant(assistant) = record else {
            panic!("expected assistant");
        };
        assert_eq!(assistant.message.first_text(), Some("first"));
        assert_eq!(assistant.message.content.len(), 3);
        assert_eq!(assistant.message.usage.unwrap().output_tokens, 4);
    }

    #[test]
    fn only_text_deltas_are_extracted() {
        let text = StreamEventRecord {
            event: StreamPayload {
                event_type: "content_block_delta".into(),
                delta: Some(StreamDelta {
                    delta_type: "text_delta".into(),
                    text: Some("ab".into()),
                }),
            },
        };
        assert_eq!(text.text_delta(), Some("ab"));

        let json_delta = StreamEventRecord {
            event: StreamPayload {
                event_type: "content_block_delta".into(),
                delta: Some(StreamDelta {
                    delta_type: "input_json_delta".into(),
                    text: None,
                }),
            },
        };
        assert_eq!(json_delta.text_delta(), None);

        let start = StreamEventRecord {
            event: StreamPayload {
                event_type: "message_start".into(),
                delta: None,
            },
        };
        assert_eq!(start.text_delta(), None);
    }

    #[test]
    fn result_outcome_splits_success_and_error() {
        let InboundRecord::Result(ok) = InboundRecord::from_value(json!({
            "type": "result", "subtype": "success", "is_error": false,
            "result": "done", "duration_ms": 1200, "num_turns": 2, "total_cost_usd": 0.5
        })) else {
            panic!("expected result");
        };
        assert_eq!(
            ok.outcome(),
            TurnOutcome::Success {
                result: Some("done".into())
            }
        );

        let InboundRecord::Result(err) = InboundRecord::from_value(json!({
            "type": "result", "subtype": "error_during_execution", "is_error": true,
            "errors": ["boom", 7, "bang"]
        })) else {
            panic!("expected result");
        };
        assert_eq!(
            err.outcome(),
            TurnOutcome::Error {
                subtype: "error_during_execution".into(),
                errors: vec!["boom".into(), "bang".into()],
            }
        );
    }

    #[test]
    fn assistant_with_null_usage_fields_still_decodes() {
        let record = InboundRecord::from_value(json!({
            "type": "assistant",
            "message": {
                "content": [{"type": "text", "text": "hi"}],
                "stop_reason": null,
                "usage": {"input_tokens": 1, "output_tokens": 2, "cache_creation_input_tokens": null}
            }
        }));
        let InboundRecord::Assistant(assistant) = record else {
            panic!("expected assistant, got {record:?}");
        };
        assert_eq!(assistant.message.first_text(), Some("hi"));
        let usage = assistant.message.usage.unwrap();
        assert_eq!(usage.output_tokens, 2);
        assert_eq!(usage.cache_creation_input_tokens, 0);

        let record = InboundRecord::from_value(json!({
            "type": "assistant",
            "message": {"content": null, "usage": null}
        }));
        let InboundRecord::Assistant(assistant) = record else {
            panic!("expected assistant, got {record:?}");
        };
        assert!(assistant.message.content.is_empty());
        assert!(assistant.message.usage.is_none());
    }

    #[test]
    fn result_with_null_numbers_still_decodes() {
        let record = InboundRecord::from_value(json!({
            "type": "result", "subtype": "success", "is_error": null,
            "duration_ms": null, "num_turns": null, "total_cost_usd": null
        }));
        let InboundRecord::Result(result) = record else {
            panic!("expected result, got {record:?}");
        };
        assert_eq!(result.total_cost_usd, 0.0);
        assert_eq!(result.num_turns, 0);
        assert_eq!(result.duration_ms, 0);
        assert_eq!(result.outcome(), TurnOutcome::Success { result: None });
    }

    #[test]
    fn control_request_can_use_tool() {
        let record = InboundRecord::from_value(json!({
            "type": "control_request",
            "request_id": "r1",
            "request": {
                "subtype": "can_use_tool",
                "tool_name": "Bash",
                "input": {"command": "ls"},
                "tool_use_id": "toolu_1",
                "permission_suggestions": []
            }
        }));
        let InboundRecord::ControlRequest(req) = record else {
            panic!("expected control request");
        };
        assert_eq!(req.request_id, "r1");
        let ControlRequestBody::CanUseTool(perm) = req.request else {
            panic!("expected can_use_tool");
        };
        assert_eq!(perm.tool_name, "Bash");
        assert_eq!(perm.input["command"], "ls");
        assert_eq!(perm.tool_use_id.as_deref(), Some("toolu_1"));
    }

    #[test]
    fn control_request_other_subtype() {
        let record = InboundRecord::from_value(json!({
            "type": "control_request",
            "request_id": "r2",
            "request": {"subtype": "hook_callback"}
        }));
        let InboundRecord::ControlRequest(req) = record else {
            panic!("expected control request");
        };
        assert_eq!(req.request, ControlRequestBody::Other);
    }
}
