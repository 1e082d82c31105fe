//! Collaborator notifications.

use tokio::sync::mpsc;

use super::envelope::InboundMessage;

/// Receives session lifecycle notifications and delivered messages.
///
/// Callbacks run on the session driver task, one at a time and in order.
/// They must not block; hand heavy work off to another task.
pub trait SessionHandler: Send + 'static {
    fn on_connected(&mut self) {}

    fn on_message(&mut self, message: InboundMessage);

    /// The connection dropped without `disconnect()`; a reconnect is
    /// scheduled.
    fn on_interrupted(&mut self) {}

    /// The session ended after `disconnect()`.
    fn on_closed(&mut self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    Message(InboundMessage),
    Interrupted,
    Closed,
}

/// Forwards every notification into an unbounded channel.
#[derive(Debug)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SessionEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl SessionHandler for ChannelHandler {
    fn on_connected(&mut self) {
        self.forward(SessionEvent::Connected);
    }

    fn on_message(&mut self, message: InboundMessage) {
        self.forward(SessionEvent::Message(message));
    }

    fn on_interrupted(&mut self) {
        self.forward(SessionEvent::Interrupted);
    }

    fn on_closed(&mut self) {
        self.forward(SessionEvent::Closed);
    }
}
