//! WebSocket message protocol definitions.
//!
//! All messages are JSON-encoded and use snake_case for field names.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wordcloud_engine::DocumentId;

/// Messages sent from client to server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keep-alive ping.
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full contents of the subscribed document.
    Snapshot {
        document_id: DocumentId,
        /// Increases with every change to the document
        revision: i64,
        /// Document fields, `{}` if the document does not exist yet
        fields: Value,
    },

    /// Response to ping.
    Pong,

    /// Error message.
    Error { message: String },
}

impl ServerMessage {
    /// Create an error message.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Create a snapshot message.
    pub fn snapshot(document_id: DocumentId, revision: i64, fields: Value) -> Self {
        ServerMessage::Snapshot {
            document_id,
            revision,
            fields,
        }
    }
}
