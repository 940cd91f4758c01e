//! muxdeck session bridge
//!
//! Sits between one duplex transport per agent session and every consumer
//! that observes or drives those sessions. Decodes the agent's NDJSON stream,
//! runs the per-session state machine, correlates tool approvals and fans
//! domain events out over a synchronous event bus.

pub mod bridge;
pub mod decoder;
pub mod event_bus;
pub mod live_log;
pub mod prompt_queue;
pub mod registry;
pub mod transition;

pub use bridge::{Connection, SessionBridge};
pub use event_bus::{EventBus, Subscription};
pub use live_log::{LiveLog, LogChange, LogEntry, LogKind};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("transport closed")]
    TransportClosed,
    #[error("failed to serialize frame: {0}")]
    Serialize(#[from] serde_json::Error),
}
