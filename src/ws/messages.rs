//! WebSocket message types: envelope and commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

impl WsMessage {
    /// Builds a server message stamped with the current time.
    #[must_use]
    pub fn new(id: String, msg_type: WsMessageType, payload: serde_json::Value) -> Self {
        Self {
            id,
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Builds an error reply.
    #[must_use]
    pub fn error(id: String, code: u32, message: &str) -> Self {
        Self::new(
            id,
            WsMessageType::Error,
            serde_json::json!({ "code": code, "message": message }),
        )
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands carried in the payload of a `command` message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Subscribe to events of specific deals. Use `["*"]` for all deals.
    Subscribe {
        /// Deal IDs to subscribe to.
        deal_ids: Vec<String>,
    },
    /// Stop receiving events of specific deals.
    Unsubscribe {
        /// Deal IDs to unsubscribe from.
        deal_ids: Vec<String>,
    },
    /// Fetch the current state of one deal.
    GetDeal {
        /// Deal ID.
        deal_id: String,
    },
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_command_parses() {
        let cmd: Result<WsCommand, _> =
            serde_json::from_str(r#"{"command":"subscribe","deal_ids":["*"]}"#);
        let Ok(WsCommand::Subscribe { deal_ids }) = cmd else {
            panic!("expected subscribe");
        };
        assert_eq!(deal_ids, vec!["*".to_string()]);
    }

    #[test]
    fn unknown_command_fails() {
        assert!(serde_json::from_str::<WsCommand>(r#"{"command":"teleport"}"#).is_err());
    }
}
