//! Bridge → agent frames

use serde::Serialize;
use serde_json::Value;

use crate::types::ApprovalDecision;

/// Default reason shown to the agent when a deny carries no message.
pub const DEFAULT_DENY_MESSAGE: &str = "User denied this operation";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    User {
        message: UserMessagePayload,
        parent_tool_use_id: Option<String>,
        session_id: String,
    },
    ControlResponse {
        response: ControlResponsePayload,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserMessagePayload {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ControlResponsePayload {
    Success {
        request_id: String,
        response: PermissionResult,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "behavior", rename_all = "snake_case")]
pub enum PermissionResult {
    Allow {
        #[serde(rename = "updatedInput")]
        updated_input: Value,
    },
    Deny {
        message: String,
    },
}

impl OutboundFrame {
    /// A user turn carrying `text`, tagged with the agent's correlation id.
    pub fn user_message(text: &str, claude_session_id: Option<&str>) -> Self {
        OutboundFrame::User {
            message: UserMessagePayload {
                role: "user",
                content: text.to_string(),
            },
            parent_tool_use_id: None,
            session_id: claude_session_id.unwrap_or_default().to_string(),
        }
    }

    /// The answer to a `can_use_tool` control request.
    ///
    /// An allow echoes the original tool input back as `updatedInput`; a deny
    /// carries `message`, falling back to a generic reason.
    pub fn tool_approval(
        request_id: &str,
        decision: ApprovalDecision,
        tool_input: &Value,
        message: Option<&str>,
    ) -> Self {
        let response = match decision {
            ApprovalDecision::Allow => PermissionResult::Allow {
                updated_input: tool_input.clone(),
            },
            ApprovalDecision::Deny => PermissionResult::Deny {
                message: message.unwrap_or(DEFAULT_DENY_MESSAGE).to_string(),
            },
        };
        OutboundFrame::ControlResponse {
            response: ControlResponsePayload::Success {
                request_id: request_id.to_string(),
                response,
            },
        }
    }

    /// Serialize as one newline-terminated NDJSON line.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(frame: &OutboundFrame) -> Value {
        let line = frame.to_line().unwrap();
        assert!(line.ends_with('\n'));
        serde_json::from_str(line.trim_end()).unwrap()
    }

    #[test]
    fn user_message_shape() {
        let value = parse(&OutboundFrame::user_message("hello \"world\"", Some("c1")));
        assert_eq!(
            value,
            json!({
                "type": "user",
                "message": {"role": "user", "content": "hello \"world\""},
                "parent_tool_use_id": null,
                "session_id": "c1"
            })
        );
    }

    #[test]
    fn user_message_without_correlation_id_sends_empty_session() {
        let value = parse(&OutboundFrame::user_message("hi", None));
        assert_eq!(value["session_id"], "");
    }

    #[test]
    fn allow_echoes_tool_input() {
        let value = parse(&OutboundFrame::tool_approval(
            "r1",
            ApprovalDecision::Allow,
            &json!({"command": "ls"}),
            Some("ignored"),
        ));
        assert_eq!(
            value,
            json!({
                "type": "control_response",
                "response": {
                    "subtype": "success",
                    "request_id": "r1",
                    "response": {"behavior": "allow", "updatedInput": {"command": "ls"}}
                }
            })
        );
    }

    #[test]
    fn deny_carries_message_or_default() {
        let with_message = parse(&OutboundFrame::tool_approval(
            "r2",
            ApprovalDecision::Deny,
            &Value::Null,
            Some("not in prod"),
        ));
        assert_eq!(with_message["response"]["response"]["behavior"], "deny");
        assert_eq!(with_message["response"]["response"]["message"], "not in prod");

        let without = parse(&OutboundFrame::tool_approval(
            "r3",
            ApprovalDecision::Deny,
            &Value::Null,
            None,
        ));
        assert_eq!(
            without["response"]["response"]["message"],
            DEFAULT_DENY_MESSAGE
        );
    }
}
