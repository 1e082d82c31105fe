//! Server-assigned event identifiers used as resume tokens.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque identifier of a server event.
///
/// Only equality matters to the client: ids are compared for duplicate
/// detection and echoed back verbatim when asking the server to replay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read an id from a JSON field. Strings are taken as-is and numbers are
    /// stringified; `null` means "no id". Anything else is not an id.
    pub fn from_json(value: &Value) -> Result<Option<Self>, &'static str> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if s.is_empty() => Ok(None),
            Value::String(s) => Ok(Some(Self(s.clone()))),
            Value::Number(n) => Ok(Some(Self(n.to_string()))),
            _ => Err("event id must be a string or a number"),
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
