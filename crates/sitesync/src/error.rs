//! Unified error type for sitesync.

use sitesync_client::ClientError;
use sitesync_protocol::ProtocolError;
use sitesync_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `sitesync` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate; `?` converts them.
#[derive(Debug, thiserror::Error)]
pub enum SitesyncError {
    /// A transport-level error (connect, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A client-level error (environment, stopped driver).
    #[error(transparent)]
    Client(#[from] ClientError),
}
