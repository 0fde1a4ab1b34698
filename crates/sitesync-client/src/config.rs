//! Client configuration and connection state.

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::ClientError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Path of the real-time endpoint on the host.
pub const ENDPOINT_PATH: &str = "/ws";

/// Fixed delay between an unexpected close and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Reason text sent with the close frame of an intentional disconnect.
pub const DISCONNECT_REASON: &str = "Client disconnected intentionally";

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// The host context the client connects back to.
///
/// A page served over `https` talks to `wss://{host}/ws`; anything else
/// talks to `ws://{host}/ws`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host with optional port, e.g. `"sites.example.com"` or
    /// `"127.0.0.1:8080"`.
    pub host: String,
    /// Whether the hosting context was loaded over a secure transport.
    pub secure: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, secure: bool) -> Self {
        Self {
            host: host.into(),
            secure,
        }
    }

    /// Derives the endpoint from a page origin such as
    /// `https://sites.example.com`.
    ///
    /// # Errors
    /// Returns [`ClientError::Environment`] if the origin is not an
    /// `http(s)`/`ws(s)` URL with a host.
    pub fn from_origin(origin: &str) -> Result<Self, ClientError> {
        let url = Url::parse(origin)
            .map_err(|e| ClientError::Environment(format!("invalid origin {origin:?}: {e}")))?;

        let secure = match url.scheme() {
            "https" | "wss" => true,
            "http" | "ws" => false,
            other => {
                return Err(ClientError::Environment(format!(
                    "unsupported origin scheme {other:?}"
                )));
            }
        };

        let host = url
            .host_str()
            .ok_or_else(|| ClientError::Environment(format!("origin {origin:?} has no host")))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self { host, secure })
    }

    /// `"wss"` for secure contexts, `"ws"` otherwise.
    pub fn scheme(&self) -> &'static str {
        if self.secure { "wss" } else { "ws" }
    }

    /// The full socket URL, `{scheme}://{host}/ws`.
    ///
    /// # Errors
    /// Returns [`ClientError::Environment`] if the host is empty or does
    /// not form a valid URL on its own.
    pub fn url(&self) -> Result<Url, ClientError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(ClientError::Environment("no host to connect to".into()));
        }

        let url = Url::parse(&format!("{}://{}{}", self.scheme(), host, ENDPOINT_PATH))
            .map_err(|e| ClientError::Environment(format!("invalid host {host:?}: {e}")))?;

        // A host like "a/b" would parse but silently change the path.
        if url.path() != ENDPOINT_PATH || url.query().is_some() || url.fragment().is_some() {
            return Err(ClientError::Environment(format!(
                "host {host:?} is not a plain host[:port]"
            )));
        }
        Ok(url)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme(), self.host, ENDPOINT_PATH)
    }
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`TransportClient`](crate::TransportClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Where to connect.
    pub endpoint: Endpoint,

    /// How long to wait after an unexpected close before reconnecting.
    /// The delay never grows and retries never stop on their own.
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::new("127.0.0.1:8080", false),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ClientConfig {
    /// Config for the given endpoint with default timing.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Default::default()
        }
    }

    /// Fix out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`TransportClient::new`](crate::TransportClient::new).
    /// A zero reconnect delay would retry in a hot loop, so it is reset to
    /// [`DEFAULT_RECONNECT_DELAY`].
    pub fn validated(mut self) -> Self {
        if self.reconnect_delay.is_zero() {
            tracing::warn!(
                default_ms = DEFAULT_RECONNECT_DELAY.as_millis() as u64,
                "reconnect_delay is zero, using default"
            );
            self.reconnect_delay = DEFAULT_RECONNECT_DELAY;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Lifecycle of the client's single logical connection.
///
/// ```text
/// Unconnected → Connecting → Open → Closed
///                    ↑                 │
///                    └── reconnect ────┘   (unless closed by disconnect)
/// ```
///
/// - **Unconnected**: nothing has been attempted yet.
/// - **Connecting**: a socket exists and its handshake is in flight.
/// - **Open**: frames flow both ways; the outbound queue is empty.
/// - **Closed**: the last socket is gone. Either a reconnect is pending
///   (unexpected close) or the client idles until the next `connect` or
///   `send_message` (intentional disconnect).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    /// Returns `true` if messages are transmitted immediately.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if a handshake is in flight.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconnected => write!(f, "Unconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}
