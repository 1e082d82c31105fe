//! Transport seam.
//!
//! The session driver only sees a [`Connector`] that yields a text-frame
//! sink and a text-frame stream. The WebSocket implementation lives here;
//! tests substitute their own.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future;
use futures_util::sink::{Sink, SinkExt};
use futures_util::stream::{BoxStream, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::SessionError;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = SessionError> + Send>>;
pub type FrameStream = BoxStream<'static, Result<String, SessionError>>;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// An open connection, split into its write and read halves.
pub struct Connection {
    pub sink: FrameSink,
    /// Ends with `None` on a clean close and `Some(Err(_))` on a transport
    /// failure.
    pub frames: FrameStream,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &Url) -> Result<Connection, SessionError>;
}

/// Connects over WebSocket (text frames only).
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    handshake_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self {
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &Url) -> Result<Connection, SessionError> {
        let handshake = tokio_tungstenite::connect_async(url.as_str());
        let (ws, _response) = tokio::time::timeout(self.handshake_timeout, handshake)
            .await
            .map_err(|_| SessionError::transport("handshake timed out"))??;

        let (write, read) = ws.split();

        let sink = write
            .sink_map_err(SessionError::from)
            .with(|text: String| future::ready(Ok::<_, SessionError>(Message::Text(text.into()))));

        let frames = read
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(Message::Binary(bytes)) => Some(
                        String::from_utf8(bytes.to_vec())
                            .map_err(|_| SessionError::malformed("binary frame is not UTF-8")),
                    ),
                    // Control frames are answered by tungstenite itself.
                    Ok(_) => None,
                    Err(e) => Some(Err(e.into())),
                })
            })
            .boxed();

        Ok(Connection {
            sink: Box::pin(sink),
            frames,
        })
    }
}
