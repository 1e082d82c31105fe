//! Session client handle and its background driver.
//!
//! `SessionClient` is a cheap handle: every operation validates what it can
//! synchronously and then posts a command to the driver task, which owns the
//! state machine, the live connection and the reconnect timer. Connection
//! attempts and frame readers run as separate tasks and report back through
//! a second channel, tagged with their attempt number.

use std::sync::Arc;
use std::time::Duration;

use chat_common::id::{prefix, prefixed_ulid};
use chat_common::{now_millis, EventId};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::Instrument;

use super::endpoint::{session_url, ConnectParams};
use super::events::{ChannelHandler, SessionEvent, SessionHandler};
use super::machine::{Attempt, Effect, Input, Phase, SessionState};
use super::options::SessionOptions;
use super::transport::{Connection, Connector, FrameSink, WebSocketConnector};
use crate::error::SessionError;

/// How long a closing connection gets to finish its close handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

enum Command {
    Connect(ConnectParams),
    Disconnect,
    Send { message: String, timestamp: i64 },
}

enum LinkEvent {
    Opened {
        attempt: Attempt,
        connection: Connection,
    },
    Failed {
        attempt: Attempt,
        error: SessionError,
    },
    Frame {
        attempt: Attempt,
        text: String,
    },
    Closed {
        attempt: Attempt,
    },
}

/// What the handle can read without asking the driver.
#[derive(Debug, Clone)]
struct Snapshot {
    phase: Phase,
    open: bool,
    last_event_id: Option<EventId>,
}

/// A resumable chat session.
///
/// Must be created inside a Tokio runtime. Dropping every clone of the
/// handle stops the driver and drops the connection without notifying the
/// handler.
#[derive(Clone)]
pub struct SessionClient {
    session_id: String,
    options: SessionOptions,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: Arc<RwLock<Snapshot>>,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("session_id", &self.session_id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Session over WebSocket, reporting to `handler`.
    pub fn new<H: SessionHandler>(handler: H, options: SessionOptions) -> Self {
        Self::with_connector(Arc::new(WebSocketConnector::new()), handler, options)
    }

    /// Session over WebSocket whose notifications arrive on a channel.
    pub fn channel(options: SessionOptions) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (handler, events) = ChannelHandler::new();
        (Self::new(handler, options), events)
    }

    pub fn with_connector<H: SessionHandler>(
        connector: Arc<dyn Connector>,
        handler: H,
        options: SessionOptions,
    ) -> Self {
        let session_id = prefixed_ulid(prefix::SESSION);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let snapshot = Arc::new(RwLock::new(Snapshot {
            phase: Phase::Disconnected,
            open: false,
            last_event_id: None,
        }));

        let driver = Driver {
            state: SessionState::new(options.clone()),
            handler,
            connector,
            snapshot: snapshot.clone(),
            events_tx,
            pending: None,
            opened: None,
            link: None,
            reconnect_at: None,
        };
        let span = tracing::info_span!("chat_session", %session_id);
        tokio::spawn(driver.run(commands_rx, events_rx).instrument(span));

        Self {
            session_id,
            options,
            commands: commands_tx,
            snapshot,
        }
    }

    /// Open (or replace) the connection to `params.room` as `params.user_id`.
    ///
    /// Returns once the attempt is scheduled. Success is reported through
    /// `on_connected`, failure through `on_interrupted` followed by
    /// automatic retries.
    pub fn connect(&self, params: ConnectParams) -> Result<(), SessionError> {
        session_url(&self.options.scheme, &self.options.app_path, &params, None)?;
        tracing::debug!(
            session_id = %self.session_id,
            user_id = %params.user_id,
            room = %params.room,
            "connect requested"
        );
        self.post(Command::Connect(params))
    }

    /// End the session. Idempotent; `on_closed` fires once the connection
    /// is gone.
    pub fn disconnect(&self) {
        // A stopped driver has nothing left to close.
        let _ = self.post(Command::Disconnect);
    }

    /// Queue `message` for the server, stamped with the current time.
    pub fn send(&self, message: &str) -> Result<(), SessionError> {
        if !self.snapshot.read().open {
            return Err(SessionError::NotConnected);
        }
        self.post(Command::Send {
            message: message.to_string(),
            timestamp: now_millis(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.snapshot.read().phase
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot.read().open
    }

    /// Newest event id accepted in this session, if any.
    pub fn last_event_id(&self) -> Option<EventId> {
        self.snapshot.read().last_event_id.clone()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn post(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::NotConnected)
    }
}

/// The installed connection for the current attempt.
///
/// Writes go through `outbound` to a writer task so a peer that stops
/// reading never holds up the driver. Dropping `outbound` lets the writer
/// flush what is queued and close the sink.
struct Link {
    attempt: Attempt,
    outbound: mpsc::UnboundedSender<String>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

struct Driver<H> {
    state: SessionState,
    handler: H,
    connector: Arc<dyn Connector>,
    snapshot: Arc<RwLock<Snapshot>>,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    /// Connection attempt in flight.
    pending: Option<JoinHandle<()>>,
    /// Connection that just opened, waiting for the machine to accept it.
    opened: Option<Connection>,
    link: Option<Link>,
    reconnect_at: Option<Instant>,
}

impl<H: SessionHandler> Driver<H> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<LinkEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                Some(event) = events.recv() => self.on_link_event(event).await,
                _ = sleep_until(self.reconnect_at.unwrap_or_else(Instant::now)), if self.reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    self.apply(Input::ReconnectDue).await;
                }
            }
        }

        tracing::debug!("session handle dropped, stopping driver");
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        if let Some(link) = self.link.take() {
            discard(link);
        }
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect(params) => self.apply(Input::Connect(params)).await,
            Command::Disconnect => self.apply(Input::Disconnect).await,
            Command::Send { message, timestamp } => {
                self.apply(Input::Send { message, timestamp }).await
            }
        }
    }

    async fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened {
                attempt,
                connection,
            } => {
                self.settle_attempt(attempt);
                self.opened = Some(connection);
                self.apply(Input::Opened(attempt)).await;
                // Not installed means superseded.
                if let Some(stale) = self.opened.take() {
                    let Connection { mut sink, .. } = stale;
                    tokio::spawn(async move {
                        let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
                    });
                }
            }
            LinkEvent::Failed { attempt, error } => {
                self.settle_attempt(attempt);
                let reason = error.to_string();
                self.apply(Input::Failed {
                    attempt,
                    reason: &reason,
                })
                .await;
            }
            LinkEvent::Frame { attempt, text } => {
                self.apply(Input::Frame {
                    attempt,
                    text: &text,
                })
                .await
            }
            LinkEvent::Closed { attempt } => self.apply(Input::Closed(attempt)).await,
        }
    }

    /// The attempt task has reported and is about to exit.
    fn settle_attempt(&mut self, attempt: Attempt) {
        if attempt == self.state.attempt() {
            self.pending = None;
        }
    }

    async fn apply(&mut self, input: Input<'_>) {
        let effects = self.state.handle(input);
        self.publish();
        for effect in effects {
            self.execute(effect).await;
        }
    }

    fn publish(&self) {
        let mut snapshot = self.snapshot.write();
        snapshot.phase = self.state.phase();
        snapshot.open = self.state.is_open();
        snapshot.last_event_id = self.state.last_event_id().cloned();
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Open { attempt, url } => {
                tracing::debug!(attempt, %url, "opening connection");
                let connector = self.connector.clone();
                let events = self.events_tx.clone();
                self.pending = Some(tokio::spawn(async move {
                    let event = match connector.open(&url).await {
                        Ok(connection) => LinkEvent::Opened {
                            attempt,
                            connection,
                        },
                        Err(error) => LinkEvent::Failed { attempt, error },
                    };
                    let _ = events.send(event);
                }));
            }
            Effect::AbortAttempt => {
                if let Some(pending) = self.pending.take() {
                    pending.abort();
                }
            }
            Effect::Install => {
                if let Some(connection) = self.opened.take() {
                    self.install(connection);
                }
            }
            Effect::Write(json) => {
                if let Some(link) = self.link.as_ref() {
                    if link.outbound.send(json).is_err() {
                        tracing::debug!(attempt = link.attempt, "writer gone, dropping outbound message");
                    }
                }
            }
            Effect::Close => {
                if let Some(link) = self.link.take() {
                    self.close(link);
                }
            }
            Effect::Discard => {
                if let Some(link) = self.link.take() {
                    discard(link);
                }
            }
            Effect::Deliver(message) => self.handler.on_message(message),
            Effect::NotifyConnected => self.handler.on_connected(),
            Effect::NotifyInterrupted => self.handler.on_interrupted(),
            Effect::NotifyClosed => self.handler.on_closed(),
            Effect::ArmReconnect(delay) => self.reconnect_at = Some(Instant::now() + delay),
            Effect::CancelReconnect => self.reconnect_at = None,
        }
    }

    fn install(&mut self, connection: Connection) {
        let attempt = self.state.attempt();
        let Connection { sink, mut frames } = connection;
        let events = self.events_tx.clone();

        let reader = tokio::spawn(
            async move {
                while let Some(frame) = frames.next().await {
                    match frame {
                        Ok(text) => {
                            if events.send(LinkEvent::Frame { attempt, text }).is_err() {
                                return;
                            }
                        }
                        Err(SessionError::MalformedEnvelope(reason)) => {
                            tracing::debug!(%reason, "skipping undecodable frame");
                        }
                        Err(error) => {
                            let _ = events.send(LinkEvent::Failed { attempt, error });
                            return;
                        }
                    }
                }
                let _ = events.send(LinkEvent::Closed { attempt });
            }
            .in_current_span(),
        );

        let (outbound, queued) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_frames(sink, queued).in_current_span());

        self.link = Some(Link {
            attempt,
            outbound,
            writer,
            reader,
        });
    }

    /// Close gracefully and let the reader report the end of the
    /// connection. A peer that never completes the handshake is cut off
    /// after [`CLOSE_GRACE`].
    fn close(&self, link: Link) {
        let Link {
            attempt,
            outbound,
            mut writer,
            mut reader,
        } = link;
        drop(outbound);
        let events = self.events_tx.clone();
        tokio::spawn(
            async move {
                if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
                    tracing::debug!(attempt, "pending writes stalled, dropping them");
                    writer.abort();
                }
                if tokio::time::timeout(CLOSE_GRACE, &mut reader).await.is_err() {
                    tracing::debug!(attempt, "peer did not finish closing, dropping connection");
                    reader.abort();
                    let _ = events.send(LinkEvent::Closed { attempt });
                }
            }
            .in_current_span(),
        );
    }
}

fn discard(link: Link) {
    let Link {
        outbound,
        mut writer,
        reader,
        ..
    } = link;
    drop(outbound);
    reader.abort();
    tokio::spawn(async move {
        if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
            writer.abort();
        }
    });
}

/// Drain queued frames into the sink, then close it.
async fn write_frames(mut sink: FrameSink, mut queued: mpsc::UnboundedReceiver<String>) {
    while let Some(json) = queued.recv().await {
        // A broken connection also ends the reader, which reports it.
        if let Err(e) = sink.send(json).await {
            tracing::warn!(%e, "failed to write chat message");
            return;
        }
    }
    let _ = sink.close().await;
}
