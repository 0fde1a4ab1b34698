/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// There is no async runtime to drive a socket on.
    #[error("no async runtime available to drive the socket")]
    NoRuntime,

    /// The connection attempt (TCP connect or handshake) failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The socket is already closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}
