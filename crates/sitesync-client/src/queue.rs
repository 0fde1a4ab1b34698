//! Outbound queue: messages waiting for the connection to open.

use std::collections::VecDeque;

use sitesync_protocol::Message;

/// FIFO of messages sent while the connection was not open.
///
/// Appended to while disconnected, drained in enqueue order the moment the
/// connection opens, and cleared outright by an intentional disconnect.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    messages: VecDeque<Message>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message behind everything already queued.
    pub fn push(&mut self, message: Message) {
        self.messages.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Removes every message, oldest first. The queue is empty afterwards.
    pub fn drain(&mut self) -> impl Iterator<Item = Message> + '_ {
        self.messages.drain(..)
    }

    /// Drops every queued message and returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.messages.len();
        self.messages.clear();
        dropped
    }
}
