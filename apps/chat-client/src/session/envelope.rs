//! Inbound frame decoding.

use chat_common::{ChatMessage, EventId};
use serde_json::{Map, Value};

use crate::error::SessionError;

/// A decoded inbound frame, ready for the collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Server-assigned event id. `None` for unstructured frames, which are
    /// never deduplicated.
    pub event_id: Option<EventId>,
    pub body: MessageBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// A chat line, either nested (`{"message": {...}}`) or flat
    /// (`{"message": "text", "userId": ...}`).
    Chat(ChatMessage),
    /// Any other JSON object, minus the event id fields.
    Fields(Map<String, Value>),
    /// A frame that is not a JSON object.
    Text(String),
}

impl InboundMessage {
    /// The human-readable text of the frame, if it has one.
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Chat(chat) => Some(&chat.message),
            MessageBody::Text(text) => Some(text),
            MessageBody::Fields(_) => None,
        }
    }
}

/// Decode one text frame.
///
/// JSON objects are envelopes: the event id is read from `eventId`, falling
/// back to `lastEventId` (older servers stamp each envelope with its own id
/// under that name). Frames that do not look like JSON objects are legacy
/// payloads and pass through as text. A frame that opens like an object but
/// does not parse is malformed.
pub fn decode_frame(raw: &str) -> Result<InboundMessage, SessionError> {
    if !raw.trim_start().starts_with('{') {
        let body = match serde_json::from_str::<Value>(raw) {
            Ok(Value::String(s)) => MessageBody::Text(s),
            _ => MessageBody::Text(raw.to_string()),
        };
        return Ok(InboundMessage { event_id: None, body });
    }

    let mut fields = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(SessionError::malformed("expected a JSON object")),
        Err(e) => return Err(SessionError::malformed(e.to_string())),
    };

    let event_id = take_event_id(&mut fields)?;
    let body = chat_body(fields)?;

    Ok(InboundMessage { event_id, body })
}

fn take_event_id(fields: &mut Map<String, Value>) -> Result<Option<EventId>, SessionError> {
    let own = fields.remove("eventId");
    let previous = fields.remove("lastEventId");

    for candidate in [own, previous].into_iter().flatten() {
        if let Some(id) = EventId::from_json(&candidate).map_err(SessionError::malformed)? {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

fn chat_body(fields: Map<String, Value>) -> Result<MessageBody, SessionError> {
    match fields.get("message") {
        Some(Value::Object(nested)) => {
            let chat = serde_json::from_value(Value::Object(nested.clone()))
                .map_err(|e| SessionError::malformed(e.to_string()))?;
            Ok(MessageBody::Chat(chat))
        }
        Some(Value::String(_)) => {
            let chat = serde_json::from_value(Value::Object(fields))
                .map_err(|e| SessionError::malformed(e.to_string()))?;
            Ok(MessageBody::Chat(chat))
        }
        _ => Ok(MessageBody::Fields(fields)),
    }
}
