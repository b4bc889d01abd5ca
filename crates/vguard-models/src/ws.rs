//! WebSocket control messages for the progress event transport.
//!
//! Progress events themselves are sent as [`ProgressEvent`](crate::ProgressEvent)
//! JSON; these types cover the room join/leave handshake around them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Messages sent by a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to a user's events
    Join {
        #[serde(rename = "userId")]
        user_id: String,
    },
    /// Unsubscribe from a user's events
    Leave {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Ping,
}

/// Control messages sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Joined {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Left {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Pong,
    Error { message: String },
}

impl ServerMessage {
    pub fn joined(user_id: impl Into<String>) -> Self {
        Self::Joined {
            user_id: user_id.into(),
        }
    }

    pub fn left(user_id: impl Into<String>) -> Self {
        Self::Left {
            user_id: user_id.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
