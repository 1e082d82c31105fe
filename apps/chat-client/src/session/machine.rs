//! Session state machine.
//!
//! `SessionState::handle` is a pure function of the current state and one
//! input. It never touches the network or the clock; it returns the effects
//! the driver has to carry out, in order.

use std::time::Duration;

use chat_common::{EventId, OutgoingMessage};
use url::Url;

use super::dedupe::SeenEvents;
use super::endpoint::{session_url, ConnectParams};
use super::envelope::{decode_frame, InboundMessage};
use super::options::SessionOptions;

/// Connection attempt counter. Every attempt gets a fresh number so late
/// events from a superseded connection can be recognised and ignored.
pub type Attempt = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    Connected,
    Interrupted,
}

/// Everything that can happen to a session.
#[derive(Debug)]
pub enum Input<'a> {
    Connect(ConnectParams),
    Disconnect,
    Send { message: String, timestamp: i64 },
    ReconnectDue,
    Opened(Attempt),
    Frame { attempt: Attempt, text: &'a str },
    Closed(Attempt),
    Failed { attempt: Attempt, reason: &'a str },
}

/// Work for the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start a connection attempt.
    Open { attempt: Attempt, url: Url },
    /// Abandon the attempt in flight.
    AbortAttempt,
    /// Keep the connection that just opened.
    Install,
    /// Write a text frame on the live connection.
    Write(String),
    /// Close the live connection and wait for it to report closed.
    Close,
    /// Close and forget the live connection.
    Discard,
    Deliver(InboundMessage),
    NotifyConnected,
    NotifyInterrupted,
    NotifyClosed,
    ArmReconnect(Duration),
    CancelReconnect,
}

/// State of one logical chat session.
#[derive(Debug)]
pub struct SessionState {
    options: SessionOptions,
    phase: Phase,
    params: Option<ConnectParams>,
    last_event_id: Option<EventId>,
    seen: SeenEvents,
    close_requested: bool,
    attempt: Attempt,
    /// A connection for the current attempt is installed and not yet handed
    /// back for closing.
    live: bool,
}

impl SessionState {
    pub fn new(options: SessionOptions) -> Self {
        let seen = SeenEvents::new(options.dedupe_window);
        Self {
            options,
            phase: Phase::Disconnected,
            params: None,
            last_event_id: None,
            seen,
            close_requested: false,
            attempt: 0,
            live: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_event_id(&self) -> Option<&EventId> {
        self.last_event_id.as_ref()
    }

    pub fn params(&self) -> Option<&ConnectParams> {
        self.params.as_ref()
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    /// True when a connection is up and usable for sending.
    pub fn is_open(&self) -> bool {
        self.phase == Phase::Connected && self.live && !self.close_requested
    }

    pub fn handle(&mut self, input: Input<'_>) -> Vec<Effect> {
        match input {
            Input::Connect(params) => self.on_connect(params),
            Input::Disconnect => self.on_disconnect(),
            Input::Send { message, timestamp } => self.on_send(message, timestamp),
            Input::ReconnectDue => self.on_reconnect_due(),
            Input::Opened(attempt) => self.on_opened(attempt),
            Input::Frame { attempt, text } => self.on_frame(attempt, text),
            Input::Closed(attempt) => self.on_lost(attempt, None),
            Input::Failed { attempt, reason } => self.on_lost(attempt, Some(reason)),
        }
    }

    fn on_connect(&mut self, params: ConnectParams) -> Vec<Effect> {
        let mut effects = match self.phase {
            Phase::Disconnected => Vec::new(),
            Phase::Connecting => vec![Effect::AbortAttempt],
            Phase::Interrupted => vec![Effect::CancelReconnect],
            Phase::Connected if self.live => vec![Effect::Discard],
            // A disconnect is still closing; that session ends here.
            Phase::Connected => {
                self.forget_events();
                tracing::info!("chat session closed");
                vec![Effect::NotifyClosed]
            }
        };
        self.live = false;

        // A different user or room is a different conversation.
        if self.params.as_ref() != Some(&params) {
            self.forget_events();
        }
        self.params = Some(params);
        self.close_requested = false;

        effects.extend(self.open());
        effects
    }

    fn on_disconnect(&mut self) -> Vec<Effect> {
        self.close_requested = true;
        match self.phase {
            Phase::Disconnected => Vec::new(),
            Phase::Connecting => {
                self.attempt += 1;
                let mut effects = vec![Effect::AbortAttempt];
                effects.extend(self.finish());
                effects
            }
            Phase::Interrupted => {
                let mut effects = vec![Effect::CancelReconnect];
                effects.extend(self.finish());
                effects
            }
            Phase::Connected if self.live => {
                self.live = false;
                tracing::info!(attempt = self.attempt, "closing chat session");
                vec![Effect::Close]
            }
            // Already closing.
            Phase::Connected => Vec::new(),
        }
    }

    fn on_send(&mut self, message: String, timestamp: i64) -> Vec<Effect> {
        let Some(params) = self.params.as_ref().filter(|_| self.is_open()) else {
            tracing::debug!("dropping outbound message, no open connection");
            return Vec::new();
        };

        let envelope = OutgoingMessage {
            user_id: params.user_id.clone(),
            message,
            timestamp,
        };
        match serde_json::to_string(&envelope) {
            Ok(json) => vec![Effect::Write(json)],
            Err(e) => {
                tracing::warn!(?e, "failed to encode outbound message");
                Vec::new()
            }
        }
    }

    fn on_reconnect_due(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Interrupted || self.close_requested {
            return Vec::new();
        }
        self.open()
    }

    fn on_opened(&mut self, attempt: Attempt) -> Vec<Effect> {
        if attempt != self.attempt || self.phase != Phase::Connecting {
            tracing::debug!(attempt, current = self.attempt, "ignoring stale connection");
            return Vec::new();
        }
        self.phase = Phase::Connected;
        self.live = true;
        tracing::info!(
            attempt,
            resumed_from = self.last_event_id.as_ref().map(EventId::as_str),
            "chat session connected"
        );
        vec![Effect::Install, Effect::NotifyConnected]
    }

    fn on_frame(&mut self, attempt: Attempt, text: &str) -> Vec<Effect> {
        if attempt != self.attempt {
            return Vec::new();
        }

        let message = match decode_frame(text) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(%e, "dropping inbound frame");
                return Vec::new();
            }
        };

        if let Some(id) = &message.event_id {
            if !self.seen.insert(id.clone()) {
                tracing::debug!(event_id = %id, "dropping duplicate event");
                return Vec::new();
            }
            self.last_event_id = Some(id.clone());
        }

        vec![Effect::Deliver(message)]
    }

    fn on_lost(&mut self, attempt: Attempt, reason: Option<&str>) -> Vec<Effect> {
        if attempt != self.attempt
            || matches!(self.phase, Phase::Disconnected | Phase::Interrupted)
        {
            return Vec::new();
        }

        let mut effects = Vec::new();
        if self.live {
            effects.push(Effect::Discard);
            self.live = false;
        }

        if self.close_requested {
            effects.extend(self.finish());
            return effects;
        }

        let delay = self.options.reconnect_delay;
        match reason {
            Some(reason) => tracing::warn!(
                attempt,
                %reason,
                delay_ms = delay.as_millis() as u64,
                "chat connection failed, will reconnect"
            ),
            None => tracing::info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "chat connection lost, will reconnect"
            ),
        }

        self.phase = Phase::Interrupted;
        effects.push(Effect::NotifyInterrupted);
        effects.push(Effect::ArmReconnect(delay));
        effects
    }

    /// Start a new attempt with the stored parameters.
    fn open(&mut self) -> Vec<Effect> {
        let Some(params) = self.params.as_ref() else {
            return Vec::new();
        };

        let url = match session_url(
            &self.options.scheme,
            &self.options.app_path,
            params,
            self.last_event_id.as_ref(),
        ) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(%e, "cannot build session endpoint");
                self.phase = Phase::Disconnected;
                return Vec::new();
            }
        };

        self.attempt += 1;
        self.phase = Phase::Connecting;
        vec![Effect::Open {
            attempt: self.attempt,
            url,
        }]
    }

    /// Terminal close: the logical session ends here.
    fn finish(&mut self) -> Vec<Effect> {
        self.phase = Phase::Disconnected;
        self.close_requested = false;
        self.live = false;
        self.params = None;
        self.forget_events();
        tracing::info!("chat session closed");
        vec![Effect::NotifyClosed]
    }

    fn forget_events(&mut self) {
        self.last_event_id = None;
        self.seen.clear();
    }
}
