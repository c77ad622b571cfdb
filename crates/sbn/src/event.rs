// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Operator-facing event reporting.
//!
//! [`log`] carries ambient internal diagnostics (the kind a developer greps for); [`EventSink`]
//! is the separate, narrower contract for the handful of state changes an operator actually
//! cares about — a peer going unreachable, a row getting dropped at load time. An embedder who
//! forwards these into a telemetry/event service plugs in here instead of scraping log output.

use crate::state_machine::PeerState;

/// One reportable occurrence. Kept small and enumerable on purpose: an [`EventSink`] should be
/// able to match on this exhaustively rather than parse a message string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A peer's liveness state changed.
    PeerStateChanged { peer: String, from: PeerState, to: PeerState },
    /// A configuration row was dropped while loading the peer table.
    ConfigRowDropped { row: usize, reason: String },
    /// A send to a peer failed and was counted rather than retried inline.
    SendFailed { peer: String, reason: String },
    /// A sequence gap was detected on a peer's inbound stream.
    SequenceGapDetected { peer: String, from_seq: u32, to_seq: u32 },
}

/// Destination for [`Event`]s. Implementations must not block the caller for long; the engine
/// invokes this synchronously from the pipeline that observed the event.
pub trait EventSink: Send {
    fn report(&mut self, event: Event);
}

/// Default sink: every event becomes one `log` record at a severity matching how serious the
/// event is.
#[derive(Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn report(&mut self, event: Event) {
        match event {
            Event::PeerStateChanged { peer, from, to } => {
                log::info!("peer {peer}: {from:?} -> {to:?}");
            }
            Event::ConfigRowDropped { row, reason } => {
                log::warn!("config row {row} dropped: {reason}");
            }
            Event::SendFailed { peer, reason } => {
                log::warn!("send to {peer} failed: {reason}");
            }
            Event::SequenceGapDetected { peer, from_seq, to_seq } => {
                log::warn!("sequence gap on {peer}: {from_seq}..{to_seq}");
            }
        }
    }
}

/// An in-memory [`EventSink`] double that just accumulates events, for tests that want to assert
/// on what was reported.
#[derive(Default)]
pub struct RecordingEventSink {
    pub events: Vec<Event>,
}

impl EventSink for RecordingEventSink {
    fn report(&mut self, event: Event) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_accumulates_in_order() {
        let mut sink = RecordingEventSink::default();
        sink.report(Event::ConfigRowDropped { row: 1, reason: "bad".to_string() });
        sink.report(Event::ConfigRowDropped { row: 2, reason: "worse".to_string() });
        assert_eq!(sink.events.len(), 2);
    }
}
