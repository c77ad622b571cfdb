// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Send pipeline (C7): turns a locally published message into a framed, peer-addressed send.

use crate::error::Result;
use crate::pipeline::recv::SEQ_MODULUS;
use crate::remap::RemapTable;
use crate::subscription::SubscriptionSet;
use crate::transport::{PrivateBlock, Transport};
use crate::wire::{self, MsgType, TimeWidth};
use std::collections::{BTreeMap, VecDeque};

/// Outcome of attempting to forward one local message to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Sent on the wire.
    Sent,
    /// The peer has no subscription for this message id; nothing was sent.
    NotSubscribed,
    /// The remap table's default policy dropped this message id.
    RemappedAway,
}

/// How many previously sent `AppMessage` frames a peer's send history keeps on hand to answer a
/// retransmit request. Oldest frames are evicted first once the ring fills.
pub const MAX_SENT_FRAMES: usize = 64;

/// A bounded, FIFO-evicting ring of fully framed outbound `AppMessage` frames, keyed by the
/// sequence number stamped into them, so a peer's retransmit request can be answered by
/// resending history rather than re-reading the local bus.
#[derive(Default)]
pub struct SentBuf {
    frames: BTreeMap<u16, Vec<u8>>,
    order: VecDeque<u16>,
}

impl SentBuf {
    #[must_use]
    pub fn new() -> Self {
        SentBuf::default()
    }

    /// Record a frame sent under sequence number `seq`, evicting the oldest entry if the ring
    /// is already at capacity.
    pub fn store(&mut self, seq: u16, frame: Vec<u8>) {
        if self.order.len() >= MAX_SENT_FRAMES {
            if let Some(oldest) = self.order.pop_front() {
                self.frames.remove(&oldest);
            }
        }
        self.order.push_back(seq);
        self.frames.insert(seq, frame);
    }

    /// Collect the frames covering sequence numbers `from..=to` (wrapping), in sequence order.
    /// Sequence numbers no longer held (evicted, or never sent) are simply skipped, matching a
    /// best-effort resend: the caller gets whatever history remains.
    #[must_use]
    pub fn range(&self, from: u16, to: u16) -> Vec<&Vec<u8>> {
        let span = (u32::from(to) + SEQ_MODULUS - u32::from(from)) % SEQ_MODULUS;
        let mut out = Vec::new();
        let mut seq = from;
        for _ in 0..=span {
            if let Some(frame) = self.frames.get(&seq) {
                out.push(frame);
            }
            seq = ((u32::from(seq) + 1) % SEQ_MODULUS) as u16;
        }
        out
    }
}

/// Forward one local message to a peer if, and only if, the peer is subscribed to it and the
/// peer's remap table doesn't drop it. Subscription is checked before remap lookup: a peer that
/// never asked for a message id should not pay for a remap lookup at all, matching how the
/// original subscription filter ran ahead of the message id translation step.
///
/// On a successful send, the frame is stamped with `next_tx_seq`, the counter is advanced, and
/// the frame is kept in `sent_buf` in case the peer later asks for a resend.
#[allow(clippy::too_many_arguments)]
pub fn forward_local_message(
    transport: &mut dyn Transport,
    block: &mut PrivateBlock,
    subscriptions: &SubscriptionSet,
    remap: &RemapTable,
    cpu_id: u32,
    local_msg_id: u32,
    payload: &[u8],
    time_width: TimeWidth,
    next_tx_seq: &mut u16,
    sent_buf: &mut SentBuf,
) -> Result<SendOutcome> {
    if !subscriptions.peer_wants(local_msg_id) {
        return Ok(SendOutcome::NotSubscribed);
    }

    let Some(peer_msg_id) = remap.remap(local_msg_id) else {
        return Ok(SendOutcome::RemappedAway);
    };

    // AppMessage payload layout: [0..2) reserved, [2..4) sequence count, [4..8) message id,
    // [8..) application bytes — sequence lives where wire::ccsds_sequence_count expects it.
    let mut framed_payload = payload.to_vec();
    if framed_payload.len() >= 8 {
        let seq = *next_tx_seq;
        framed_payload[2] = ((seq >> 8) & 0x3F) as u8;
        framed_payload[3] = (seq & 0xFF) as u8;
        framed_payload[4..8].copy_from_slice(&peer_msg_id.to_be_bytes());
    }

    let frame = wire::pack(MsgType::AppMessage, cpu_id, &framed_payload, time_width)?;
    transport.send(block, &frame)?;

    if framed_payload.len() >= 8 {
        let seq = *next_tx_seq;
        sent_buf.store(seq, frame);
        *next_tx_seq = ((u32::from(seq) + 1) % SEQ_MODULUS) as u16;
    }

    Ok(SendOutcome::Sent)
}

/// Send a control frame (announce, heartbeat, subscribe/unsubscribe) with an empty or
/// caller-supplied payload. Control frames are never remapped or subscription-gated.
pub fn send_control(
    transport: &mut dyn Transport,
    block: &mut PrivateBlock,
    msg_type: MsgType,
    cpu_id: u32,
    payload: &[u8],
) -> Result<()> {
    let frame = wire::pack(msg_type, cpu_id, payload, TimeWidth::SixByte)?;
    transport.send(block, &frame)
}

/// Send a batch of `Subscribe` control frames, one per message id, so a newly heartbeating peer
/// learns this bridge's full current set of local subscriptions in one burst rather than one at
/// a time as each local subscribe happens to occur.
pub fn send_subscribe_batch(
    transport: &mut dyn Transport,
    block: &mut PrivateBlock,
    cpu_id: u32,
    msg_ids: &[u32],
) -> Result<()> {
    for msg_id in msg_ids {
        send_control(transport, block, MsgType::Subscribe, cpu_id, &msg_id.to_be_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remap::DefaultPolicy;
    use crate::transport::test_support::LoopbackTransport;

    fn transport_and_block() -> (LoopbackTransport, PrivateBlock) {
        (LoopbackTransport::default(), Vec::new())
    }

    #[test]
    fn unsubscribed_message_is_not_sent() {
        let (mut transport, mut block) = transport_and_block();
        let subs = SubscriptionSet::default();
        let remap = RemapTable::build(Vec::new(), DefaultPolicy::PassThrough);
        let mut next_tx_seq = 0;
        let mut sent_buf = SentBuf::new();
        let outcome = forward_local_message(
            &mut transport,
            &mut block,
            &subs,
            &remap,
            1,
            42,
            &[0; 8],
            TimeWidth::SixByte,
            &mut next_tx_seq,
            &mut sent_buf,
        )
        .unwrap();
        assert_eq!(outcome, SendOutcome::NotSubscribed);
    }

    #[test]
    fn subscribed_and_pass_through_sends() {
        let (mut transport, mut block) = transport_and_block();
        let mut subs = SubscriptionSet::default();
        subs.subscribe_incoming(42).unwrap();
        let remap = RemapTable::build(Vec::new(), DefaultPolicy::PassThrough);
        let mut next_tx_seq = 0;
        let mut sent_buf = SentBuf::new();
        let outcome = forward_local_message(
            &mut transport,
            &mut block,
            &subs,
            &remap,
            1,
            42,
            &[0; 8],
            TimeWidth::SixByte,
            &mut next_tx_seq,
            &mut sent_buf,
        )
        .unwrap();
        assert_eq!(outcome, SendOutcome::Sent);
        assert_eq!(next_tx_seq, 1);
        assert_eq!(sent_buf.range(0, 0).len(), 1);
    }

    #[test]
    fn subscribed_but_dropped_by_remap_is_not_sent() {
        let (mut transport, mut block) = transport_and_block();
        let mut subs = SubscriptionSet::default();
        subs.subscribe_incoming(42).unwrap();
        let remap = RemapTable::build(Vec::new(), DefaultPolicy::Drop);
        let mut next_tx_seq = 0;
        let mut sent_buf = SentBuf::new();
        let outcome = forward_local_message(
            &mut transport,
            &mut block,
            &subs,
            &remap,
            1,
            42,
            &[0; 8],
            TimeWidth::SixByte,
            &mut next_tx_seq,
            &mut sent_buf,
        )
        .unwrap();
        assert_eq!(outcome, SendOutcome::RemappedAway);
    }

    #[test]
    fn sent_buf_evicts_oldest_once_full() {
        let mut buf = SentBuf::new();
        for seq in 0..(MAX_SENT_FRAMES as u16 + 1) {
            buf.store(seq, vec![seq as u8]);
        }
        assert!(buf.range(0, 0).is_empty());
        assert_eq!(buf.range(1, 1).len(), 1);
    }

    #[test]
    fn sent_buf_range_returns_contiguous_span_in_order() {
        let mut buf = SentBuf::new();
        buf.store(5, vec![5]);
        buf.store(6, vec![6]);
        buf.store(7, vec![7]);
        let frames = buf.range(5, 7);
        assert_eq!(frames, vec![&vec![5u8], &vec![6u8], &vec![7u8]]);
    }
}
