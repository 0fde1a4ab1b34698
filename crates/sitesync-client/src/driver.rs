//! The driver: a single Tokio task that owns the connection.
//!
//! Every client handle talks to the driver over an mpsc channel; sockets
//! report to it over a second channel; the reconnect timer is polled in the
//! same loop. Nothing else touches the socket, the outbound queue, or the
//! timer, so all state changes happen one at a time on this task.
//!
//! ```text
//!   handles ──Command──┐
//!                      ├──► select! ──► state machine ──► socket / subscribers
//!   socket ──Event─────┤
//!   timer ─────────────┘
//! ```
//!
//! Events are polled before commands, so an event that was already
//! delivered when a command arrives is applied first.

use std::sync::Arc;

use sitesync_protocol::{Codec, JsonCodec, Message};
use sitesync_transport::{
    CloseInfo, ConnectionId, Connector, Socket, SocketEvent, SocketEventKind, SocketEvents,
};
use tokio::sync::{mpsc, oneshot};

use crate::config::DISCONNECT_REASON;
use crate::reconnect::ReconnectTimer;
use crate::registry::SubscriberRegistry;
use crate::{ClientConfig, ClientError, ConnectionState, OutboundQueue};

/// Close reason for a socket that is replaced by an explicit `connect()`
/// before its handshake finished.
const SUPERSEDED_REASON: &str = "Superseded by a new connection attempt";

/// Close reason used when every client handle has been dropped.
const DROPPED_REASON: &str = "Client dropped";

/// Requests from client handles to the driver.
pub(crate) enum Command {
    /// Ensure a connection exists; reply with its id.
    Connect {
        reply: oneshot::Sender<Result<ConnectionId, ClientError>>,
    },
    /// Intentional teardown.
    Disconnect,
    /// Transmit now or queue.
    Send(Message),
    /// Report the current connection state.
    State {
        reply: oneshot::Sender<ConnectionState>,
    },
}

pub(crate) struct Driver<C: Connector> {
    config: ClientConfig,
    connector: C,
    codec: JsonCodec,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Cloned into every socket's `SocketEvents`.
    events_tx: mpsc::UnboundedSender<SocketEvent>,
    events: mpsc::UnboundedReceiver<SocketEvent>,
    /// The one live socket, if any. Events from any other socket are stale.
    socket: Option<C::Socket>,
    state: ConnectionState,
    queue: OutboundQueue,
    registry: Arc<SubscriberRegistry>,
    reconnect: ReconnectTimer,
}

impl<C: Connector> Driver<C> {
    pub(crate) fn new(
        config: ClientConfig,
        connector: C,
        commands: mpsc::UnboundedReceiver<Command>,
        registry: Arc<SubscriberRegistry>,
    ) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let reconnect = ReconnectTimer::new(config.reconnect_delay);
        Self {
            config,
            connector,
            codec: JsonCodec,
            commands,
            events_tx,
            events,
            socket: None,
            state: ConnectionState::Unconnected,
            queue: OutboundQueue::new(),
            registry,
            reconnect,
        }
    }

    /// Runs the event loop until every client handle is dropped.
    pub(crate) async fn run(mut self) {
        tracing::debug!(endpoint = %self.config.endpoint, "transport client started");

        loop {
            tokio::select! {
                biased;

                Some(event) = self.events.recv() => self.handle_event(event),
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                () = self.reconnect.wait() => self.handle_reconnect_due(),
            }
        }

        self.shutdown();
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => {
                let result = self.connect();
                let _ = reply.send(result);
            }
            Command::Disconnect => self.disconnect(),
            Command::Send(message) => self.send(message),
            Command::State { reply } => {
                let _ = reply.send(self.state);
            }
        }
    }

    /// Ensures a connection exists and returns its id.
    ///
    /// An open connection is reused as is. A socket that is still
    /// connecting is closed and replaced, so there is never more than one.
    fn connect(&mut self) -> Result<ConnectionId, ClientError> {
        if self.reconnect.cancel() {
            tracing::debug!("pending reconnect cancelled by connect");
        }

        if self.state.is_open() {
            if let Some(socket) = &self.socket {
                return Ok(socket.id());
            }
        }

        if let Some(stale) = self.socket.take() {
            tracing::debug!(socket = %stale.id(), state = %self.state, "replacing socket");
            stale.close(CloseInfo::NORMAL_CLOSURE, SUPERSEDED_REASON);
            self.state = ConnectionState::Closed;
        }

        let url = self.config.endpoint.url()?;
        let id = ConnectionId::next();
        let socket = self
            .connector
            .open(&url, SocketEvents::new(id, self.events_tx.clone()))?;

        tracing::info!(socket = %id, %url, "connecting");
        self.socket = Some(socket);
        self.state = ConnectionState::Connecting;
        Ok(id)
    }

    /// Intentional teardown. Queued messages are discarded, not retried.
    fn disconnect(&mut self) {
        if self.reconnect.cancel() {
            tracing::debug!("pending reconnect cancelled by disconnect");
        }

        if let Some(socket) = self.socket.take() {
            socket.close(CloseInfo::NORMAL_CLOSURE, DISCONNECT_REASON);
            self.state = ConnectionState::Closed;
            tracing::info!(socket = %socket.id(), "disconnected intentionally");
        }

        let dropped = self.queue.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "discarded queued messages on disconnect");
        }
    }

    fn send(&mut self, message: Message) {
        if self.state.is_open() && self.socket.is_some() {
            self.transmit(&message);
            return;
        }

        self.queue.push(message);
        tracing::trace!(queued = self.queue.len(), state = %self.state, "queued outbound message");

        // A handshake already in flight will drain the queue when it opens.
        if self.socket.is_none() {
            if let Err(e) = self.connect() {
                tracing::warn!(error = %e, "implicit connect failed; message stays queued");
            }
        }
    }

    fn transmit(&self, message: &Message) {
        let Some(socket) = &self.socket else {
            return;
        };
        match self.codec.encode(message) {
            Ok(text) => {
                if let Err(e) = socket.send_text(text) {
                    let err = ClientError::from(e);
                    tracing::warn!(
                        socket = %socket.id(),
                        kind = message.kind(),
                        error = %err,
                        "failed to transmit message"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(kind = message.kind(), error = %e, "failed to encode message");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Socket events
    // -----------------------------------------------------------------------

    fn handle_event(&mut self, event: SocketEvent) {
        let current = self.socket.as_ref().map(|s| s.id());
        if current != Some(event.socket) {
            tracing::trace!(socket = %event.socket, "ignoring event from retired socket");
            return;
        }

        match event.kind {
            SocketEventKind::Open => self.on_open(event.socket),
            SocketEventKind::Text(text) => self.on_text(&text),
            SocketEventKind::Error(e) => {
                let err = ClientError::from(e);
                tracing::warn!(socket = %event.socket, error = %err, "socket error");
            }
            SocketEventKind::Closed(info) => self.on_close(event.socket, info),
        }
    }

    fn on_open(&mut self, socket: ConnectionId) {
        self.state = ConnectionState::Open;
        let backlog: Vec<Message> = self.queue.drain().collect();
        tracing::info!(%socket, backlog = backlog.len(), "connection open");

        for message in &backlog {
            self.transmit(message);
        }
    }

    fn on_text(&self, text: &str) {
        match self.codec.decode::<Message>(text) {
            Ok(message) => {
                let delivered = self.registry.dispatch(&message);
                tracing::trace!(kind = message.kind(), delivered, "dispatched inbound message");
            }
            Err(e) => {
                let err = ClientError::Decode(e);
                tracing::warn!(len = text.len(), error = %err, "dropping undecodable frame");
            }
        }
    }

    /// The live socket closed without `disconnect()` being called.
    fn on_close(&mut self, socket: ConnectionId, info: CloseInfo) {
        self.socket = None;
        self.state = ConnectionState::Closed;
        self.reconnect.schedule();
        tracing::warn!(
            %socket,
            close = %info,
            retry_in_ms = self.reconnect.delay().as_millis() as u64,
            "connection lost; reconnect scheduled"
        );
    }

    fn handle_reconnect_due(&mut self) {
        tracing::info!(queued = self.queue.len(), "reconnecting");
        if let Err(e) = self.connect() {
            tracing::warn!(error = %e, "reconnect attempt failed");
        }
    }

    /// Every handle is gone; nobody can observe the connection any more.
    fn shutdown(&mut self) {
        self.reconnect.cancel();
        if let Some(socket) = self.socket.take() {
            socket.close(CloseInfo::NORMAL_CLOSURE, DROPPED_REASON);
        }
        let dropped = self.queue.clear();
        tracing::debug!(dropped, "transport client stopped");
    }
}
