// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local bus contract.
//!
//! This engine does not ship a publish-subscribe implementation of its own: it bridges whatever
//! bus already runs on this processor. [`LocalBus`] is the seam an embedder fills in; the engine
//! only ever publishes frames it received from a peer and subscribes/unsubscribes on a peer's
//! behalf.

use crate::error::Result;

/// One message read from (or to be written to) the local bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMessage {
    pub msg_id: u32,
    pub payload: Vec<u8>,
    /// App-name of whoever published this message, as the local bus reports it.
    pub sender: String,
}

impl LocalMessage {
    #[must_use]
    pub fn new(msg_id: u32, payload: Vec<u8>, sender: impl Into<String>) -> Self {
        LocalMessage {
            msg_id,
            payload,
            sender: sender.into(),
        }
    }
}

/// The local publish-subscribe bus this processor already runs, as seen by the bridge.
///
/// Implementations are expected to be cheap to poll repeatedly; the engine calls `poll` once per
/// scheduler tick per configured local subscription.
pub trait LocalBus: Send {
    /// Subscribe this bridge to `msg_id` on the local bus, on behalf of a remote peer.
    fn subscribe(&mut self, msg_id: u32) -> Result<()>;

    /// Remove a subscription previously added with `subscribe`.
    fn unsubscribe(&mut self, msg_id: u32) -> Result<()>;

    /// Publish a message onto the local bus, as received from a peer.
    fn publish(&mut self, message: LocalMessage) -> Result<()>;

    /// Non-blocking poll for one locally published message this bridge is subscribed to.
    fn poll(&mut self) -> Result<Option<LocalMessage>>;

    /// App-name of whoever published the message most recently returned by `poll`, if the bus
    /// tracks that. The send pipeline checks this against its own app name before forwarding, so
    /// it never re-sends a frame it just delivered onto the bus itself.
    fn last_sender(&self) -> Option<&str>;
}

/// An in-memory [`LocalBus`] double: `publish` calls from peers land in `received`, and
/// `injected` is drained by `poll` to simulate local application traffic. Used by engine and
/// integration tests that need a bus without a real IPC mechanism.
#[derive(Default)]
pub struct InMemoryBus {
    pub subscriptions: std::collections::BTreeSet<u32>,
    pub received: Vec<LocalMessage>,
    pub injected: std::collections::VecDeque<LocalMessage>,
    last_sender: Option<String>,
}

impl InMemoryBus {
    #[must_use]
    pub fn new() -> Self {
        InMemoryBus::default()
    }

    /// Queue a message as if published locally, for the next `poll` to pick up.
    pub fn inject(&mut self, message: LocalMessage) {
        self.injected.push_back(message);
    }
}

impl LocalBus for InMemoryBus {
    fn subscribe(&mut self, msg_id: u32) -> Result<()> {
        self.subscriptions.insert(msg_id);
        Ok(())
    }

    fn unsubscribe(&mut self, msg_id: u32) -> Result<()> {
        self.subscriptions.remove(&msg_id);
        Ok(())
    }

    fn publish(&mut self, message: LocalMessage) -> Result<()> {
        self.received.push(message);
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<LocalMessage>> {
        let message = self.injected.pop_front();
        self.last_sender = message.as_ref().map(|m| m.sender.clone());
        Ok(message)
    }

    fn last_sender(&self) -> Option<&str> {
        self.last_sender.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_lands_in_received() {
        let mut bus = InMemoryBus::new();
        bus.publish(LocalMessage::new(1, vec![9], "ground")).unwrap();
        assert_eq!(bus.received.len(), 1);
    }

    #[test]
    fn poll_drains_injected_queue_in_order() {
        let mut bus = InMemoryBus::new();
        bus.inject(LocalMessage::new(1, vec![], "ground"));
        bus.inject(LocalMessage::new(2, vec![], "ground"));
        assert_eq!(bus.poll().unwrap().unwrap().msg_id, 1);
        assert_eq!(bus.poll().unwrap().unwrap().msg_id, 2);
        assert!(bus.poll().unwrap().is_none());
    }

    #[test]
    fn last_sender_reflects_most_recently_polled_message() {
        let mut bus = InMemoryBus::new();
        bus.inject(LocalMessage::new(1, vec![], "ground"));
        bus.inject(LocalMessage::new(2, vec![], "SBN"));
        bus.poll().unwrap();
        assert_eq!(bus.last_sender(), Some("ground"));
        bus.poll().unwrap();
        assert_eq!(bus.last_sender(), Some("SBN"));
    }

    #[test]
    fn subscribe_and_unsubscribe_update_set() {
        let mut bus = InMemoryBus::new();
        bus.subscribe(5).unwrap();
        assert!(bus.subscriptions.contains(&5));
        bus.unsubscribe(5).unwrap();
        assert!(!bus.subscriptions.contains(&5));
    }
}
