// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Receive pipeline (C8): inbound frame dispatch, plus the sequence gap tracker that flags
//! missing `AppMessage` frames on a peer's inbound stream.
//!
//! Grounded on the same leading-edge-plus-deferred-buffer shape as the reliability layer's gap
//! tracker: a frame that arrives ahead of `next_rx_seq` is parked rather than delivered
//! out-of-order, and draining resumes automatically the moment the gap closes.

use crate::error::Result;
use crate::event::{Event, EventSink};
use crate::remap::RemapTable;
use crate::wire::{self, MsgType, TimeWidth};
use std::collections::BTreeMap;

/// Sequence numbers are CCSDS 14-bit counters; they wrap rather than grow without bound.
pub(crate) const SEQ_MODULUS: u32 = 1 << 14;

fn seq_distance(from: u16, to: u16) -> u32 {
    (u32::from(to) + SEQ_MODULUS - u32::from(from)) % SEQ_MODULUS
}

/// Number of sequence numbers spanned by a gap from `gap_after` (last good frame) to `gap_to`
/// (last missing frame before the one that revealed the gap), inclusive.
#[must_use]
pub fn gap_length(gap_after: u16, gap_to: u16) -> u32 {
    seq_distance(gap_after, gap_to) + 1
}

/// How many out-of-order frames a peer's gap tracker will hold before it gives up waiting for
/// the gap to close and delivers what it has anyway. Bounds memory for a peer that never
/// recovers a lost frame.
pub const MAX_DEFERRED_FRAMES: usize = 64;

/// One peer's inbound sequence tracking.
#[derive(Default)]
pub struct GapTracker {
    next_rx_seq: Option<u16>,
    deferred: BTreeMap<u16, Vec<u8>>,
}

/// What happened to one inbound `AppMessage` payload after gap tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GapOutcome {
    /// In order; delivered immediately, and zero or more previously deferred frames drained
    /// along with it, in sequence order.
    Delivered(Vec<Vec<u8>>),
    /// Ahead of the expected sequence; parked until the gap closes. Carries the missing range
    /// so the caller can ask the peer to resend it.
    Deferred { gap_after: u16, gap_to: u16 },
    /// Behind the expected sequence — a duplicate or very late retransmit. Not delivered.
    Duplicate,
}

impl GapTracker {
    #[must_use]
    pub fn new() -> Self {
        GapTracker::default()
    }

    /// Feed one inbound `AppMessage` payload through gap tracking, keyed by its CCSDS sequence
    /// count. Payloads that carry no recognizable sequence count (too short) are delivered
    /// immediately and never gap-tracked.
    pub fn accept(&mut self, payload: Vec<u8>, peer_name: &str, sink: &mut dyn EventSink) -> GapOutcome {
        let Some(seq) = wire::ccsds_sequence_count(&payload) else {
            return GapOutcome::Delivered(vec![payload]);
        };

        let expected = match self.next_rx_seq {
            None => {
                self.next_rx_seq = Some((seq + 1) % SEQ_MODULUS as u16);
                return GapOutcome::Delivered(vec![payload]);
            }
            Some(e) => e,
        };

        if seq == expected {
            self.next_rx_seq = Some((seq + 1) % SEQ_MODULUS as u16);
            let mut delivered = vec![payload];
            delivered.extend(self.drain_contiguous());
            GapOutcome::Delivered(delivered)
        } else {
            let forward_gap = seq_distance(expected, seq);
            let backward_gap = seq_distance(seq, expected);

            if backward_gap < forward_gap {
                // seq is behind expected: already delivered or a duplicate retransmit.
                GapOutcome::Duplicate
            } else {
                let gap_to = (u32::from(seq).wrapping_sub(1) % SEQ_MODULUS) as u16;
                sink.report(Event::SequenceGapDetected {
                    peer: peer_name.to_string(),
                    from_seq: u32::from(expected),
                    to_seq: u32::from(gap_to),
                });

                if self.deferred.len() >= MAX_DEFERRED_FRAMES {
                    // give up waiting for the gap to close; jump forward and deliver what we have.
                    self.next_rx_seq = Some((seq + 1) % SEQ_MODULUS as u16);
                    let mut delivered = vec![payload];
                    delivered.extend(self.drain_contiguous());
                    return GapOutcome::Delivered(delivered);
                }

                self.deferred.insert(seq, payload);
                GapOutcome::Deferred {
                    gap_after: expected.wrapping_sub(1),
                    gap_to,
                }
            }
        }
    }

    fn drain_contiguous(&mut self) -> Vec<Vec<u8>> {
        let mut drained = Vec::new();
        while let Some(expected) = self.next_rx_seq {
            match self.deferred.remove(&expected) {
                Some(payload) => {
                    drained.push(payload);
                    self.next_rx_seq = Some((expected + 1) % SEQ_MODULUS as u16);
                }
                None => break,
            }
        }
        drained
    }
}

/// Decode one raw inbound frame and, for `AppMessage` frames, translate the peer's message id
/// back into this processor's local id via `remap` — callers pass the peer's
/// [`RemapTable::inverted`] table, not the outbound one. Control frame types (`Subscribe`,
/// `Unsubscribe`, `Announce`, `Heartbeat`, `RetransmitRequest`) are returned as their raw payload
/// — the caller dispatches those directly rather than through the local-bus delivery path.
pub fn decode_inbound(raw: &[u8], remap: &RemapTable, time_width: TimeWidth) -> Result<(MsgType, u32, Vec<u8>)> {
    let (msg_type, cpu_id, mut payload) = wire::unpack(raw, time_width)?;

    if msg_type == MsgType::AppMessage && payload.len() >= 8 {
        let peer_msg_id = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
        if let Some(local_id) = remap.remap(peer_msg_id) {
            payload[4..8].copy_from_slice(&local_id.to_be_bytes());
        }
    }

    Ok((msg_type, cpu_id, payload))
}
