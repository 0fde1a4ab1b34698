//! `TransportClient`: the handle consumers hold.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use sitesync_protocol::Message;
use sitesync_transport::{ConnectionId, Connector};
#[cfg(feature = "websocket")]
use sitesync_transport::WebSocketConnector;
use tokio::sync::{mpsc, oneshot};

use crate::driver::{Command, Driver};
use crate::registry::{SubscriberRegistry, Subscription};
use crate::{ClientConfig, ClientError, ConnectionState, Endpoint};

type DriverFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Shared {
    commands: mpsc::UnboundedSender<Command>,
    registry: Arc<SubscriberRegistry>,
    /// The driver until it is spawned. Construction has no side effects;
    /// the first operation that needs the connection starts it.
    driver: Mutex<Option<DriverFuture>>,
    endpoint: Endpoint,
}

/// A real-time connection to the sitesync server, shared by any number of
/// consumers.
///
/// Cloning is cheap and every clone drives the same single connection,
/// outbound queue, and subscriber list. Consumers never see the socket:
///
/// - [`send_message`](Self::send_message) transmits right away when the
///   connection is open, and otherwise queues the message and connects.
/// - [`on_message`](Self::on_message) registers a callback for every inbound
///   message.
/// - An unexpected close is followed by a reconnect after a fixed delay,
///   forever, until [`disconnect`](Self::disconnect) is called.
///
/// Messages still queued when `disconnect` is called are discarded. A later
/// `connect` starts with an empty queue.
///
/// # Example
///
/// ```rust,no_run
/// use sitesync_client::{ClientConfig, Endpoint, TransportClient};
/// use sitesync_protocol::{Message, RawMessage};
///
/// # async fn run() -> Result<(), sitesync_client::ClientError> {
/// let endpoint = Endpoint::from_origin("https://sites.example.com")?;
/// let client = TransportClient::websocket(ClientConfig::new(endpoint));
///
/// let sub = client.on_message(|msg: &Message| println!("got {}", msg.kind()));
/// client.connect().await?;
/// // Queued until the handshake completes, then sent on the same socket.
/// client.send_message(Message::Unknown(RawMessage::new("hello")));
///
/// sub.unsubscribe();
/// client.disconnect();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TransportClient {
    shared: Arc<Shared>,
}

impl TransportClient {
    /// Creates a client that opens sockets through `connector`.
    ///
    /// Nothing is connected or spawned yet.
    pub fn new<C: Connector>(config: ClientConfig, connector: C) -> Self {
        let config = config.validated();
        let endpoint = config.endpoint.clone();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(SubscriberRegistry::new());
        let driver = Driver::new(config, connector, commands_rx, Arc::clone(&registry));

        Self {
            shared: Arc::new(Shared {
                commands,
                registry,
                driver: Mutex::new(Some(Box::pin(driver.run()))),
                endpoint,
            }),
        }
    }

    /// Creates a client that connects over WebSocket.
    #[cfg(feature = "websocket")]
    pub fn websocket(config: ClientConfig) -> Self {
        Self::new(config, WebSocketConnector)
    }

    /// The endpoint this client connects to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    /// Ensures there is a connection and returns its id.
    ///
    /// Cancels any pending reconnect. Returns the existing id if the
    /// connection is already open; otherwise starts a new connection
    /// attempt (closing a socket that is still connecting) and returns the
    /// new id without waiting for the handshake.
    ///
    /// # Errors
    /// [`ClientError::Environment`] if there is no Tokio runtime or the
    /// endpoint has no usable host. [`ClientError::Stopped`] if the driver
    /// has exited.
    pub async fn connect(&self) -> Result<ConnectionId, ClientError> {
        self.start_driver()?;
        let (reply, rx) = oneshot::channel();
        self.shared
            .commands
            .send(Command::Connect { reply })
            .map_err(|_| ClientError::Stopped)?;
        rx.await.map_err(|_| ClientError::Stopped)?
    }

    /// Closes the connection on purpose.
    ///
    /// Cancels any pending reconnect, closes the socket with code 1000 and
    /// reason `"Client disconnected intentionally"`, and discards every
    /// queued message. No reconnect follows. Safe to call when already
    /// disconnected.
    pub fn disconnect(&self) {
        if let Err(e) = self.start_driver() {
            tracing::debug!(error = %e, "disconnect before the client ever started");
        }
        let _ = self.shared.commands.send(Command::Disconnect);
    }

    /// Sends `message` now if the connection is open, otherwise queues it
    /// and connects if no attempt is in flight.
    ///
    /// Never blocks and never fails for a transient disconnect. Delivery is
    /// best effort: a queued message is lost if `disconnect` is called
    /// before the connection opens.
    pub fn send_message(&self, message: Message) {
        if let Err(e) = self.start_driver() {
            tracing::warn!(kind = message.kind(), error = %e, "message held until the client can start");
        }
        if self.shared.commands.send(Command::Send(message)).is_err() {
            tracing::warn!("transport client has stopped; message dropped");
        }
    }

    /// Registers `callback` for every inbound message.
    ///
    /// Callbacks run on the client's driver task, one message at a time, in
    /// registration order. A callback that panics is logged and does not
    /// affect the others.
    ///
    /// A callback that needs to reply should capture a
    /// [`WeakTransportClient`] from [`downgrade`](Self::downgrade). A
    /// `TransportClient` captured by a callback keeps the connection alive
    /// after every other handle has been dropped.
    pub fn on_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = self.shared.registry.register(Arc::new(callback));
        tracing::debug!(subscriber = %id, "subscribed");
        Subscription::new(id, Arc::clone(&self.shared.registry))
    }

    /// Current state of the connection.
    pub async fn state(&self) -> ConnectionState {
        if !self.driver_started() {
            return ConnectionState::Unconnected;
        }
        let (reply, rx) = oneshot::channel();
        if self.shared.commands.send(Command::State { reply }).is_err() {
            return ConnectionState::Closed;
        }
        rx.await.unwrap_or(ConnectionState::Closed)
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// A handle that does not keep the connection alive.
    pub fn downgrade(&self) -> WeakTransportClient {
        WeakTransportClient {
            shared: Arc::downgrade(&self.shared),
        }
    }

    fn driver_started(&self) -> bool {
        self.shared.driver.lock().is_none()
    }

    /// Spawns the driver on the current runtime if it is not running yet.
    fn start_driver(&self) -> Result<(), ClientError> {
        let mut pending = self.shared.driver.lock();
        if pending.is_none() {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ClientError::Environment("no Tokio runtime is running".into()))?;
        if let Some(driver) = pending.take() {
            runtime.spawn(driver);
        }
        Ok(())
    }
}

impl fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportClient")
            .field("endpoint", &self.shared.endpoint)
            .field("started", &self.driver_started())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// A non-owning [`TransportClient`] handle.
///
/// Once every `TransportClient` is dropped the driver closes the socket and
/// stops, and [`upgrade`](Self::upgrade) returns `None`.
#[derive(Clone, Debug)]
pub struct WeakTransportClient {
    shared: Weak<Shared>,
}

impl WeakTransportClient {
    /// The client, if any strong handle is still alive.
    pub fn upgrade(&self) -> Option<TransportClient> {
        self.shared.upgrade().map(|shared| TransportClient { shared })
    }
}
