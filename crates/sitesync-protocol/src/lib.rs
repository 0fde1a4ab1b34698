//! Wire protocol for sitesync.
//!
//! This crate defines what travels over the real-time channel between the
//! browser-facing server and every client:
//!
//! - **Types** ([`Message`], [`DocumentChange`], [`RawMessage`]): the
//!   discriminated messages exchanged as text frames.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to and from text.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding or
//!   decoding.
//!
//! The protocol layer knows nothing about sockets or reconnects. It only
//! turns frames into messages and back.
//!
//! ```text
//! Transport (text frames) → Protocol (Message) → Client (subscribers)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod message;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use message::{
    ChangeOperation, DocumentChange, Message, RawMessage, ServerError,
    KIND_FIELD, TYPE_FIELD,
};
