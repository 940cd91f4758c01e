//! Core types shared across the protocol

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of one agent session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Connecting,
    Ready,
    Working,
    WaitingForInput,
    Disconnected,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Connecting => "connecting",
            SessionStatus::Ready => "ready",
            SessionStatus::Working => "working",
            SessionStatus::WaitingForInput => "waiting_for_input",
            SessionStatus::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running token counters, summed over assistant messages
///
/// Counters the agent reports as `null`, or omits, count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default, deserialize_with = "lenient_count")]
    pub input_tokens: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub output_tokens: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub cache_creation_input_tokens: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub cache_read_input_tokens: u64,
}

impl TokenUsage {
    /// Saturates instead of overflowing; the counts come off the wire.
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_creation_input_tokens = self
            .cache_creation_input_tokens
            .saturating_add(other.cache_creation_input_tokens);
        self.cache_read_input_tokens = self
            .cache_read_input_tokens
            .saturating_add(other.cache_read_input_tokens);
    }

    pub fn total(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_creation_input_tokens)
            .saturating_add(self.cache_read_input_tokens)
    }
}

/// Non-negative integer, or 0 for `null` and anything that isn't a count.
pub(crate) fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
        .unwrap_or(0))
}

/// Finite number, or 0.0 for `null` and non-numbers.
pub(crate) fn lenient_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_f64().filter(|f| f.is_finite()).unwrap_or(0.0))
}

/// `T::default()` when the field is `null`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One MCP server reported at init
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerStatus {
    pub name: String,
    #[serde(default)]
    pub status: String,
}

/// A tool-use permission request awaiting an allow/deny decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingToolApproval {
    pub request_id: String,
    pub tool_name: String,
    pub tool_input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    /// Unix epoch millis at which the bridge observed the request
    pub received_at: u64,
}

/// Decision carried back to the agent in a control response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Allow,
    Deny,
}

impl ApprovalDecision {
    pub fn behavior(&self) -> &'static str {
        match self {
            ApprovalDecision::Allow => "allow",
            ApprovalDecision::Deny => "deny",
        }
    }
}

/// Live state of one session, keyed by its caller-chosen name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub name: String,
    pub status: SessionStatus,
    pub claude_session_id: Option<String>,
    pub model: Option<String>,
    pub tools: Vec<String>,
    pub mcp_servers: Vec<McpServerStatus>,
    pub cwd: Option<String>,
    pub last_assistant_message: Option<String>,
    pub streaming_text: String,
    pub total_usage: TokenUsage,
    pub total_cost_usd: f64,
    pub turn_count: u64,
    pub pending_tool_approval: Option<PendingToolApproval>,
    /// Requests that arrived while another approval was outstanding, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queued_tool_approvals: Vec<PendingToolApproval>,
}

impl SessionState {
    /// Fresh state for a newly attached transport
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: SessionStatus::Connecting,
            claude_session_id: None,
            model: None,
            tools: Vec::new(),
            mcp_servers: Vec::new(),
            cwd: None,
            last_assistant_message: None,
            streaming_text: String::new(),
            total_usage: TokenUsage::default(),
            total_cost_usd: 0.0,
            turn_count: 0,
            pending_tool_approval: None,
            queued_tool_approvals: Vec::new(),
        }
    }
}

/// Read-only view handed to consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(flatten)]
    pub state: SessionState,
    /// True only while a live transport handle exists and status is not disconnected
    pub connected: bool,
}
