pub mod config;
pub mod error;
pub mod rooms;
pub mod session;

pub use error::SessionError;
pub use session::{ConnectParams, SessionClient, SessionEvent, SessionHandler, SessionOptions};
