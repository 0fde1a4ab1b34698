//! Subscription registry: who gets inbound messages, in what order.
//!
//! Subscribers are stored in registration order, each under a
//! [`SubscriberId`] handed out once and never reused. Removal goes by id,
//! so two subscribers that happen to be identical closures stay distinct.
//!
//! # Reentrancy
//!
//! Dispatch never holds the lock while a callback runs. It takes a snapshot
//! of the entries, then checks before each call that the entry is still
//! registered. A callback may therefore unsubscribe itself or anyone else,
//! register new subscribers, or call back into the client, and dispatch
//! carries on with whoever is still registered.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use sitesync_protocol::Message;

use crate::ClientError;

/// A registered inbound-message callback.
pub(crate) type Callback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Stable token identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Default)]
struct Entries {
    next_id: u64,
    callbacks: Vec<(SubscriberId, Callback)>,
}

/// Ordered collection of subscribers shared by every client handle and
/// the driver.
#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    entries: Mutex<Entries>,
}

impl SubscriberRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, callback: Callback) -> SubscriberId {
        let mut entries = self.entries.lock();
        entries.next_id += 1;
        let id = SubscriberId(entries.next_id);
        entries.callbacks.push((id, callback));
        id
    }

    /// Removes exactly the entry registered under `id`.
    ///
    /// Returns `false` if it was already gone.
    pub(crate) fn unregister(&self, id: SubscriberId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.callbacks.len();
        entries.callbacks.retain(|(entry, _)| *entry != id);
        entries.callbacks.len() != before
    }

    pub(crate) fn contains(&self, id: SubscriberId) -> bool {
        self.entries
            .lock()
            .callbacks
            .iter()
            .any(|(entry, _)| *entry == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().callbacks.len()
    }

    /// Invokes every live subscriber, in registration order, with `message`.
    ///
    /// A panicking subscriber is logged and skipped; the rest still run.
    /// Returns how many subscribers handled the message without panicking.
    pub(crate) fn dispatch(&self, message: &Message) -> usize {
        let snapshot = self.entries.lock().callbacks.clone();
        let mut delivered = 0;

        for (id, callback) in snapshot {
            if !self.contains(id) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| callback(message))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    let err = ClientError::Subscriber(panic_message(payload.as_ref()));
                    tracing::error!(
                        subscriber = %id,
                        kind = message.kind(),
                        error = %err,
                        "subscriber failed; continuing dispatch"
                    );
                }
            }
        }

        delivered
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle returned by [`TransportClient::on_message`](crate::TransportClient::on_message).
///
/// Call [`unsubscribe`](Self::unsubscribe) to stop receiving messages.
/// Dropping the handle does *not* unsubscribe.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriberId,
    registry: Arc<SubscriberRegistry>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, registry: Arc<SubscriberRegistry>) -> Self {
        Self { id, registry }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Removes this subscriber. Safe to call from inside its own callback
    /// and safe to call more than once.
    ///
    /// Returns `true` the first time, `false` afterwards.
    pub fn unsubscribe(&self) -> bool {
        let removed = self.registry.unregister(self.id);
        if removed {
            tracing::debug!(subscriber = %self.id, "unsubscribed");
        }
        removed
    }

    /// Whether this subscriber is still registered.
    pub fn is_active(&self) -> bool {
        self.registry.contains(self.id)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
