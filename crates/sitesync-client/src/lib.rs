//! The sitesync transport client.
//!
//! One long-lived, auto-reconnecting connection to the sitesync server,
//! shared by every part of an application that needs real-time updates.
//!
//! - [`TransportClient`]: the cloneable handle (`connect`, `disconnect`,
//!   `send_message`, `on_message`).
//! - [`OutboundQueue`]: messages sent while the connection was down, flushed
//!   in order once it opens.
//! - [`Subscription`]: returned by `on_message`; unsubscribes by id.
//! - [`ReconnectTimer`]: the single pending retry after an unexpected close.
//!
//! All connection state lives on one driver task spawned on the caller's
//! Tokio runtime the first time the client is used.

mod client;
mod config;
mod driver;
mod error;
mod queue;
mod reconnect;
mod registry;

pub use client::{TransportClient, WeakTransportClient};
pub use config::{
    ClientConfig, ConnectionState, DEFAULT_RECONNECT_DELAY, DISCONNECT_REASON, ENDPOINT_PATH,
    Endpoint,
};
pub use error::ClientError;
pub use queue::OutboundQueue;
pub use reconnect::ReconnectTimer;
pub use registry::{SubscriberId, Subscription};

pub use sitesync_protocol::Message;
pub use sitesync_transport::ConnectionId;
