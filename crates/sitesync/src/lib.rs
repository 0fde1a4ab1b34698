//! # Sitesync
//!
//! Real-time updates for sitesync applications over one shared,
//! auto-reconnecting connection.
//!
//! Most applications only need [`TransportClient`]: send messages with
//! [`send_message`](TransportClient::send_message) whether or not the
//! connection is up, and react to server pushes with
//! [`on_message`](TransportClient::on_message).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sitesync::prelude::*;
//!
//! # async fn run() -> Result<(), SitesyncError> {
//! sitesync::logging::init("info");
//!
//! let endpoint = Endpoint::from_origin("https://sites.example.com")?;
//! let client = TransportClient::websocket(ClientConfig::new(endpoint));
//!
//! client.on_message(|msg: &Message| {
//!     if let Message::Change(change) = msg {
//!         println!("{} {} changed", change.collection, change.document_id);
//!     }
//! });
//! client.connect().await?;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod logging;

pub use error::SitesyncError;

pub use sitesync_client as client;
pub use sitesync_protocol as protocol;
pub use sitesync_transport as transport;

pub use sitesync_client::{
    ClientConfig, ClientError, ConnectionState, Endpoint, Subscription, TransportClient,
    WeakTransportClient,
};
pub use sitesync_protocol::{ChangeOperation, DocumentChange, Message, RawMessage, ServerError};
pub use sitesync_transport::ConnectionId;

/// Everything a typical consumer needs, in one import.
pub mod prelude {
    pub use crate::SitesyncError;
    pub use sitesync_client::{
        ClientConfig, ConnectionState, Endpoint, Subscription, TransportClient,
        WeakTransportClient,
    };
    pub use sitesync_protocol::{ChangeOperation, DocumentChange, Message, RawMessage};
}
