//! Error type for the client layer.

use sitesync_protocol::ProtocolError;
use sitesync_transport::TransportError;

/// Errors produced by the transport client.
///
/// Only [`Environment`](Self::Environment) and [`Stopped`](Self::Stopped)
/// are ever returned to a caller. The others describe failures the client
/// recovers from locally; they exist so those failures are logged with a
/// consistent shape.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The environment cannot open a socket (no async runtime, or no usable
    /// host to derive the endpoint from).
    #[error("cannot open a socket here: {0}")]
    Environment(String),

    /// An inbound frame was not a valid message. The frame is dropped.
    #[error(transparent)]
    Decode(ProtocolError),

    /// A subscriber panicked while handling a message. The remaining
    /// subscribers still receive it.
    #[error("subscriber panicked: {0}")]
    Subscriber(String),

    /// A socket-level error. The close that follows drives reconnects.
    #[error(transparent)]
    Transport(TransportError),

    /// The client's driver task is gone.
    #[error("transport client has stopped")]
    Stopped,
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NoRuntime => Self::Environment(err.to_string()),
            other => Self::Transport(other),
        }
    }
}
