//! Room directory client.

use chat_common::ChatRoom;
use url::Url;

use crate::error::SessionError;

const ROOMS_PATH: &str = "/api/chatrooms";

/// Lists the rooms a chat server hosts.
#[derive(Debug, Clone)]
pub struct RoomDirectory {
    base_url: String,
    http: reqwest::Client,
}

impl RoomDirectory {
    /// `base_url` is the HTTP origin of the chat server, e.g. `http://localhost:9091`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Directory on the same server a session endpoint points at.
    ///
    /// `ws` maps to `http` and `wss` to `https`.
    pub fn from_endpoint(scheme: &str, host: &str, port: u16) -> Result<Self, SessionError> {
        let http_scheme = match scheme {
            "ws" | "http" => "http",
            "wss" | "https" => "https",
            _ => return Err(SessionError::invalid("scheme", "expected ws or wss")),
        };
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        let base = Url::parse(&format!("{http_scheme}://{host}:{port}"))
            .map_err(|_| SessionError::invalid("host", "not a valid host name"))?;
        Ok(Self::new(base.as_str()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list_rooms(&self) -> Result<Vec<ChatRoom>, SessionError> {
        let url = format!("{}{ROOMS_PATH}", self.base_url);
        let rooms = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<ChatRoom>>()
            .await?;

        tracing::debug!(count = rooms.len(), %url, "fetched chat rooms");
        Ok(rooms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_schemes_map_to_http() {
        let dir = RoomDirectory::from_endpoint("ws", "localhost", 9091).unwrap();
        assert_eq!(dir.base_url(), "http://localhost:9091");

        let dir = RoomDirectory::from_endpoint("wss", "chat.example.com", 443).unwrap();
        // Default port is dropped by the URL parser.
        assert_eq!(dir.base_url(), "https://chat.example.com");
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let dir = RoomDirectory::from_endpoint("ws", "::1", 9091).unwrap();
        assert_eq!(dir.base_url(), "http://[::1]:9091");
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let err = RoomDirectory::from_endpoint("ftp", "localhost", 21).unwrap_err();
        assert!(matches!(err, SessionError::InvalidParameter { field: "scheme", .. }));
    }
}
