//! Client-side transport abstraction for sitesync.
//!
//! Provides the [`Connector`] and [`Socket`] traits that hide which network
//! library actually carries the frames. A socket behaves like a browser
//! WebSocket: [`Connector::open`] returns immediately with a socket that is
//! still connecting, and everything that happens afterwards (handshake done,
//! text received, error, close) is reported as a [`SocketEvent`] on a
//! channel owned by the caller.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnector, WebSocketSocket};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use url::Url;

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for one underlying socket.
///
/// Every connection attempt gets a fresh id, so events from a socket that
/// has since been replaced can be told apart from events of the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide unique id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Close information
// ---------------------------------------------------------------------------

/// Why a socket closed: a WebSocket close code plus reason text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    /// Normal closure (RFC 6455 §7.4.1).
    pub const NORMAL_CLOSURE: u16 = 1000;
    /// The peer closed without sending a status code.
    pub const NO_STATUS: u16 = 1005;
    /// The connection dropped without a close handshake.
    pub const ABNORMAL_CLOSURE: u16 = 1006;

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// A close that never went through the close handshake.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(Self::ABNORMAL_CLOSURE, reason)
    }

    /// Returns `true` for code 1000.
    pub fn is_normal(&self) -> bool {
        self.code == Self::NORMAL_CLOSURE
    }
}

impl fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

// ---------------------------------------------------------------------------
// Socket events
// ---------------------------------------------------------------------------

/// Something that happened on a socket.
#[derive(Debug)]
pub enum SocketEventKind {
    /// The handshake completed; frames may now be sent.
    Open,
    /// A text frame arrived.
    Text(String),
    /// A socket-level error. A `Closed` event always follows if the error
    /// ended the connection.
    Error(TransportError),
    /// The socket is closed. No further events follow for this socket.
    Closed(CloseInfo),
}

/// An event tagged with the socket that produced it.
#[derive(Debug)]
pub struct SocketEvent {
    pub socket: ConnectionId,
    pub kind: SocketEventKind,
}

/// Emitter handed to a [`Connector`] so its socket can report events.
#[derive(Debug, Clone)]
pub struct SocketEvents {
    socket: ConnectionId,
    sender: mpsc::UnboundedSender<SocketEvent>,
}

impl SocketEvents {
    pub fn new(socket: ConnectionId, sender: mpsc::UnboundedSender<SocketEvent>) -> Self {
        Self { socket, sender }
    }

    /// The socket these events belong to.
    pub fn socket(&self) -> ConnectionId {
        self.socket
    }

    pub fn opened(&self) {
        self.emit(SocketEventKind::Open);
    }

    pub fn text(&self, text: impl Into<String>) {
        self.emit(SocketEventKind::Text(text.into()));
    }

    pub fn error(&self, error: TransportError) {
        self.emit(SocketEventKind::Error(error));
    }

    pub fn closed(&self, info: CloseInfo) {
        self.emit(SocketEventKind::Closed(info));
    }

    fn emit(&self, kind: SocketEventKind) {
        // The listener may already be gone; there is nobody left to tell.
        let _ = self.sender.send(SocketEvent {
            socket: self.socket,
            kind,
        });
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Opens outbound sockets.
pub trait Connector: Send + Sync + 'static {
    /// The socket type produced by this connector.
    type Socket: Socket;

    /// Starts connecting to `url` and returns the socket right away.
    ///
    /// The returned socket is connecting; `events` receives `Open` once the
    /// handshake completes, or `Error` + `Closed` if it never does.
    ///
    /// # Errors
    /// Returns [`TransportError::NoRuntime`] if the environment cannot drive
    /// a socket at all.
    fn open(&self, url: &Url, events: SocketEvents) -> Result<Self::Socket, TransportError>;
}

/// A single outbound socket that can send text frames.
pub trait Socket: Send + 'static {
    /// Returns the unique identifier for this socket.
    fn id(&self) -> ConnectionId;

    /// Queues a text frame for the remote peer.
    ///
    /// Only meaningful once the socket reported `Open`.
    fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Starts the close handshake with the given code and reason.
    ///
    /// A `Closed` event follows once the socket is down. Calling this more
    /// than once has no further effect.
    fn close(&self, code: u16, reason: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_next_is_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.into_inner() > a.into_inner());
    }

    #[test]
    fn test_close_info_normal_and_abnormal() {
        assert!(CloseInfo::new(1000, "bye").is_normal());
        let lost = CloseInfo::abnormal("reset");
        assert_eq!(lost.code, CloseInfo::ABNORMAL_CLOSURE);
        assert!(!lost.is_normal());
    }

    #[test]
    fn test_close_info_display() {
        assert_eq!(CloseInfo::new(1000, "bye").to_string(), "1000 (bye)");
        assert_eq!(CloseInfo::new(1005, "").to_string(), "1005");
    }

    #[test]
    fn test_socket_events_are_tagged_with_socket_id() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = ConnectionId::new(9);
        let events = SocketEvents::new(id, tx);

        events.opened();
        events.text("hi");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.socket, id);
        assert!(matches!(first.kind, SocketEventKind::Open));

        let second = rx.try_recv().unwrap();
        assert!(matches!(second.kind, SocketEventKind::Text(ref t) if t == "hi"));
    }

    #[test]
    fn test_socket_events_after_listener_dropped_do_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let events = SocketEvents::new(ConnectionId::new(1), tx);
        events.closed(CloseInfo::abnormal("gone"));
    }
}
