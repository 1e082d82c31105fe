pub mod event;
pub mod id;
pub mod message;

pub use event::EventId;
pub use message::{now_millis, ChatMessage, ChatRoom, OutgoingMessage};
