//! Resumable, deduplicated chat session.

pub mod client;
pub mod dedupe;
pub mod endpoint;
pub mod envelope;
pub mod events;
pub mod machine;
pub mod options;
pub mod transport;

pub use client::SessionClient;
pub use endpoint::ConnectParams;
pub use envelope::{InboundMessage, MessageBody};
pub use events::{ChannelHandler, SessionEvent, SessionHandler};
pub use machine::Phase;
pub use options::SessionOptions;
pub use transport::{Connection, Connector, WebSocketConnector};
