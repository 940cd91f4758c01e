//! muxdeck protocol
//!
//! Wire records exchanged with agent processes (newline-delimited JSON),
//! plus the session state and domain event types the bridge hands to its
//! consumers. These types are serialized as JSON over WebSocket and HTTP.

pub mod events;
pub mod inbound;
pub mod outbound;
pub mod types;

pub use events::DomainEvent;
pub use inbound::{InboundRecord, TurnOutcome};
pub use outbound::OutboundFrame;
pub use types::*;

/// Current time as Unix epoch milliseconds
pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
