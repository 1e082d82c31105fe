//! Chat wire models shared by clients of the chat service.

use serde::{Deserialize, Serialize};

/// A chat line as the server records and relays it.
///
/// Every field is optional on the wire; the server omits what it does not
/// know and may add fields the client ignores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatMessage {
    pub timestamp: i64,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_room: Option<String>,
    pub message: String,
}

/// Client → server envelope for a line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub user_id: String,
    pub message: String,
    /// Generation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// A chat room as listed by the room directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: String,
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
