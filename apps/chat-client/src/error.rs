use tokio_tungstenite::tungstenite;

/// Errors produced by the chat session client.
///
/// Only `InvalidParameter` and `NotConnected` ever reach the caller of a
/// session operation. Transport failures and malformed frames are absorbed
/// by the session driver (retry and drop, respectively) and only logged.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid {field}: {reason}")]
    InvalidParameter {
        field: &'static str,
        reason: &'static str,
    },

    #[error("no chat connection is open")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("room directory request failed: {0}")]
    Directory(#[from] reqwest::Error),
}

impl SessionError {
    pub fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::InvalidParameter { field, reason }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedEnvelope(message.into())
    }
}

impl From<tungstenite::Error> for SessionError {
    fn from(err: tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameter_names_the_field() {
        let err = SessionError::invalid("room", "must not be empty");
        assert_eq!(err.to_string(), "invalid room: must not be empty");
    }

    #[test]
    fn tungstenite_errors_become_transport_errors() {
        let err: SessionError = tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(err, SessionError::Transport(_)));
    }
}
