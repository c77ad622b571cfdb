// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine scheduler (C9).
//!
//! Ties the peer table, remap tables, subscription mirrors, liveness state machines, and the
//! send/receive pipelines together into one runnable unit. Two scheduling strategies are
//! available behind Cargo features, matching two different deployment shapes for the same
//! bridging logic:
//!
//! - `scheduler-tasks` (default): one OS thread per peer, blocking on that peer's transport
//!   recv call; sends are serialized through a process-wide [`parking_lot::Mutex`] so a slow
//!   peer cannot starve the others' sends. Fits a host where threads are cheap.
//! - `scheduler-poll`: a single thread cooperatively polls every peer's transport each tick.
//!   Fits a constrained host, or a process that must not spawn threads of its own.

use crate::error::Result;
use crate::event::{Event, EventSink};
use crate::local_bus::{LocalBus, LocalMessage};
use crate::peer_table::PeerRecord;
use crate::pipeline::recv::GapTracker;
use crate::pipeline::send::SentBuf;
use crate::remap::RemapTable;
use crate::state_machine::{Action, Intervals, PeerLiveness, PeerState};
use crate::subscription::SubscriptionSet;
use crate::transport::{PrivateBlock, RecvOutcome, Transport};
use crate::wire::{self, MsgType, TimeWidth};
use std::time::Duration;

/// App-name this bridge stamps on messages it publishes to the local bus, and checks for on the
/// sender of anything it polls back off the bus, so it never re-forwards its own delivery.
pub const SBN_APP_NAME: &str = "SBN";

/// Per-peer runtime state the engine owns for the lifetime of a session.
pub struct PeerConnection {
    pub record: PeerRecord,
    pub block: PrivateBlock,
    pub outbound_remap: RemapTable,
    pub inbound_remap: RemapTable,
    pub subscriptions: SubscriptionSet,
    pub liveness: PeerLiveness,
    pub gap_tracker: GapTracker,
    pub next_tx_seq: u16,
    pub sent_buf: SentBuf,
}

impl PeerConnection {
    #[must_use]
    pub fn new(record: PeerRecord, block: PrivateBlock, outbound_remap: RemapTable, intervals: Intervals) -> Self {
        let inbound_remap = outbound_remap.inverted(crate::remap::DefaultPolicy::PassThrough);
        PeerConnection {
            record,
            block,
            outbound_remap,
            inbound_remap,
            subscriptions: SubscriptionSet::default(),
            liveness: PeerLiveness::new(intervals),
            gap_tracker: GapTracker::new(),
            next_tx_seq: 0,
            sent_buf: SentBuf::new(),
        }
    }
}

/// Operator-issued commands the engine accepts at runtime, independent of the scheduler loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Request a transport-level status check for one peer, by name.
    Status(String),
    /// Force a transport reset for one peer, by name.
    ResetPeer(String),
    /// Stop the engine's scheduling loop.
    Shutdown,
}

/// A bounded channel for delivering [`OperatorCommand`]s into a running scheduler loop from
/// outside it (a CLI thread, a signal handler). Bounded so a stalled scheduler applies
/// backpressure to the operator rather than growing memory without limit.
pub struct CommandChannel {
    sender: crossbeam::channel::Sender<OperatorCommand>,
    receiver: crossbeam::channel::Receiver<OperatorCommand>,
}

impl CommandChannel {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam::channel::bounded(capacity);
        CommandChannel { sender, receiver }
    }

    #[must_use]
    pub fn sender(&self) -> crossbeam::channel::Sender<OperatorCommand> {
        self.sender.clone()
    }

    /// Drain every command currently queued, without blocking.
    pub fn drain(&self) -> Vec<OperatorCommand> {
        self.receiver.try_iter().collect()
    }
}

/// The running bridge: one [`PeerConnection`] per configured peer, a local bus, an event sink,
/// and the transport all peers share.
pub struct Engine {
    pub local_cpu_id: u32,
    pub time_width: TimeWidth,
    pub peers: Vec<PeerConnection>,
    pub host_block: PrivateBlock,
    pub tick_interval: Duration,
    /// Logical session clock, advanced by `dt` on every liveness tick. Stands in for wall-clock
    /// time so `LastSent`/`LastReceived` stay deterministic under test.
    pub elapsed: Duration,
}

impl Engine {
    #[must_use]
    pub fn new(local_cpu_id: u32, time_width: TimeWidth, host_block: PrivateBlock, tick_interval: Duration) -> Self {
        Engine {
            local_cpu_id,
            time_width,
            peers: Vec::new(),
            host_block,
            tick_interval,
            elapsed: Duration::ZERO,
        }
    }

    pub fn add_peer(&mut self, peer: PeerConnection) {
        self.peers.push(peer);
    }

    fn find_peer_mut(&mut self, name: &str) -> Option<&mut PeerConnection> {
        self.peers.iter_mut().find(|p| p.record.name == name)
    }

    /// Advance every peer's liveness state machine by `dt`, sending announce/heartbeat frames
    /// as needed and reporting state transitions to `sink`. Does not touch application traffic.
    pub fn tick_liveness(
        &mut self,
        dt: Duration,
        transport: &mut dyn Transport,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        let local_cpu_id = self.local_cpu_id;
        let time_width = self.time_width;
        self.elapsed += dt;
        let elapsed = self.elapsed;

        for peer in &mut self.peers {
            let before = peer.liveness.state();
            let action = peer.liveness.tick(dt);
            let after = peer.liveness.state();

            if before != after {
                sink.report(Event::PeerStateChanged {
                    peer: peer.record.name.clone(),
                    from: before,
                    to: after,
                });
                if before == PeerState::Heartbeating && after == PeerState::Announcing {
                    peer.subscriptions.clear();
                }
            }

            let control_send = match action {
                Action::SendAnnounce => Some(MsgType::Announce),
                Action::SendHeartbeat => Some(MsgType::Heartbeat),
                Action::LossDetected | Action::None => None,
            };

            if let Some(msg_type) = control_send {
                match crate::pipeline::send::send_control(transport, &mut peer.block, msg_type, local_cpu_id, &[]) {
                    Ok(()) => {
                        peer.record.sent_count += 1;
                        peer.record.last_sent = Some(elapsed);
                    }
                    Err(err) => {
                        peer.record.send_err_count += 1;
                        sink.report(Event::SendFailed {
                            peer: peer.record.name.clone(),
                            reason: err.to_string(),
                        });
                        log::warn!("control send to {} failed: {err}", peer.record.name);
                    }
                }
            }
        }

        let _ = time_width;
        Ok(())
    }

    /// Drain locally published messages for every subscribed-to peer, forwarding each one
    /// through the send pipeline. A message whose last sender on the bus was this bridge itself
    /// is discarded before framing, so a frame this engine just delivered never loops back out.
    pub fn pump_local_bus(&mut self, bus: &mut dyn LocalBus, transport: &mut dyn Transport) -> Result<usize> {
        let local_cpu_id = self.local_cpu_id;
        let time_width = self.time_width;
        let elapsed = self.elapsed;
        let mut sent = 0;

        while let Some(message) = bus.poll()? {
            if bus.last_sender().is_some_and(|name| name.starts_with(SBN_APP_NAME)) {
                continue;
            }

            for peer in &mut self.peers {
                let outcome = crate::pipeline::send::forward_local_message(
                    transport,
                    &mut peer.block,
                    &peer.subscriptions,
                    &peer.outbound_remap,
                    local_cpu_id,
                    message.msg_id,
                    &message.payload,
                    time_width,
                    &mut peer.next_tx_seq,
                    &mut peer.sent_buf,
                );
                match outcome {
                    Ok(crate::pipeline::send::SendOutcome::Sent) => {
                        sent += 1;
                        peer.record.sent_count += 1;
                        peer.record.last_sent = Some(elapsed);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        peer.record.send_err_count += 1;
                        log::warn!("forwarding message {} to {} failed: {err}", message.msg_id, peer.record.name);
                    }
                }
            }
        }

        Ok(sent)
    }

    /// Poll the shared host transport once for an inbound frame and dispatch it to whichever
    /// peer it named, publishing `AppMessage` payloads onto the local bus.
    ///
    /// Only [`crate::error::Error::Fatal`] ever escapes this call. A stray datagram from an
    /// unconfigured processor, a truncated or oversized frame, or a decode fault is counted on
    /// the responsible peer (or simply logged, if no peer can be identified yet) and absorbed —
    /// one bad frame must not take the whole bridge down.
    pub fn pump_inbound(
        &mut self,
        transport: &mut dyn Transport,
        bus: &mut dyn LocalBus,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        let outcome = match transport.recv(&mut self.host_block) {
            Ok(outcome) => outcome,
            Err(err) => {
                log::warn!("inbound poll failed: {err}");
                return Ok(());
            }
        };
        let (cpu_id, raw) = match outcome {
            RecvOutcome::Frame { cpu_id, data } => (cpu_id, data),
            RecvOutcome::WouldBlock | RecvOutcome::Disconnected => return Ok(()),
        };

        let time_width = self.time_width;
        let elapsed = self.elapsed;
        let Some(peer) = self.peers.iter_mut().find(|p| p.record.processor_id == cpu_id) else {
            log::warn!("dropping frame from unconfigured processor id {cpu_id}");
            return Ok(());
        };

        let peer_name = peer.record.name.clone();
        let local_cpu_id = self.local_cpu_id;
        let decoded = crate::pipeline::recv::decode_inbound(&raw, &peer.inbound_remap, time_width);
        let (msg_type, _sender, payload) = match decoded {
            Ok(decoded) => decoded,
            Err(err) => {
                peer.record.recv_err_count += 1;
                log::warn!("dropping unreadable frame from {peer_name}: {err}");
                return Ok(());
            }
        };

        peer.record.recv_count += 1;
        peer.record.last_received = Some(elapsed);

        match msg_type {
            MsgType::Announce | MsgType::Heartbeat => {
                let before = peer.liveness.state();
                peer.liveness.record_heard();
                let after = peer.liveness.state();

                if before != after {
                    sink.report(Event::PeerStateChanged {
                        peer: peer_name.clone(),
                        from: before,
                        to: after,
                    });
                }

                if before == PeerState::Announcing && after == PeerState::Heartbeating {
                    let batch = peer.subscriptions.outgoing_snapshot();
                    if let Err(err) = crate::pipeline::send::send_subscribe_batch(
                        transport,
                        &mut peer.block,
                        local_cpu_id,
                        &batch,
                    ) {
                        peer.record.send_err_count += 1;
                        log::warn!("subscribe burst to {peer_name} failed: {err}");
                    }
                }
            }
            MsgType::Subscribe => {
                if payload.len() >= 4 {
                    let msg_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                    peer.subscriptions.subscribe_incoming(msg_id)?;
                    if let Err(err) = bus.subscribe(msg_id) {
                        log::warn!("local bus subscribe for {msg_id} ({peer_name}) failed: {err}");
                    }
                }
            }
            MsgType::Unsubscribe => {
                if payload.len() >= 4 {
                    let msg_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                    peer.subscriptions.unsubscribe_incoming(msg_id);
                    if let Err(err) = bus.unsubscribe(msg_id) {
                        log::warn!("local bus unsubscribe for {msg_id} ({peer_name}) failed: {err}");
                    }
                }
            }
            MsgType::RetransmitRequest => {
                if payload.len() >= 4 {
                    let gap_after = u16::from_be_bytes([payload[0], payload[1]]);
                    let gap_to = u16::from_be_bytes([payload[2], payload[3]]);
                    let resend_from = gap_after.wrapping_add(1);
                    let frames: Vec<Vec<u8>> =
                        peer.sent_buf.range(resend_from, gap_to).into_iter().cloned().collect();
                    for frame in frames {
                        match transport.send(&mut peer.block, &frame) {
                            Ok(()) => {
                                peer.record.sent_count += 1;
                                peer.record.last_sent = Some(elapsed);
                            }
                            Err(err) => {
                                peer.record.send_err_count += 1;
                                log::warn!("resend to {peer_name} failed: {err}");
                            }
                        }
                    }
                }
            }
            MsgType::AppMessage => match peer.gap_tracker.accept(payload, &peer_name, sink) {
                crate::pipeline::recv::GapOutcome::Delivered(frames) => {
                    peer.record.in_order_count += frames.len() as u64;
                    for frame in frames {
                        if frame.len() >= 8 {
                            let msg_id = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);
                            bus.publish(LocalMessage::new(msg_id, frame, SBN_APP_NAME))?;
                        }
                    }
                }
                crate::pipeline::recv::GapOutcome::Deferred { gap_after, gap_to } => {
                    peer.record.miss_count += u64::from(crate::pipeline::recv::gap_length(gap_after, gap_to));

                    let mut request_payload = Vec::with_capacity(4);
                    request_payload.extend_from_slice(&gap_after.to_be_bytes());
                    request_payload.extend_from_slice(&gap_to.to_be_bytes());
                    if let Err(err) = crate::pipeline::send::send_control(
                        transport,
                        &mut peer.block,
                        MsgType::RetransmitRequest,
                        local_cpu_id,
                        &request_payload,
                    ) {
                        peer.record.send_err_count += 1;
                        log::warn!("retransmit request to {peer_name} failed: {err}");
                    }
                }
                crate::pipeline::recv::GapOutcome::Duplicate => {
                    peer.record.recv_err_count += 1;
                }
            },
        }

        Ok(())
    }

    /// Record a local subscription to `msg_id` and mirror a `Subscribe` frame out to every peer
    /// currently heartbeating, so peers learn about new local interest as it happens rather than
    /// only at connect time.
    pub fn subscribe_outgoing(&mut self, msg_id: u32, transport: &mut dyn Transport) -> Result<()> {
        let local_cpu_id = self.local_cpu_id;
        for peer in &mut self.peers {
            peer.subscriptions.subscribe_outgoing(msg_id)?;
            if peer.liveness.state() == PeerState::Heartbeating {
                crate::pipeline::send::send_control(
                    transport,
                    &mut peer.block,
                    MsgType::Subscribe,
                    local_cpu_id,
                    &msg_id.to_be_bytes(),
                )?;
            }
        }
        Ok(())
    }

    /// Drop a local subscription to `msg_id` and mirror an `Unsubscribe` frame out to every peer
    /// currently heartbeating.
    pub fn unsubscribe_outgoing(&mut self, msg_id: u32, transport: &mut dyn Transport) -> Result<()> {
        let local_cpu_id = self.local_cpu_id;
        for peer in &mut self.peers {
            peer.subscriptions.unsubscribe_outgoing(msg_id);
            if peer.liveness.state() == PeerState::Heartbeating {
                crate::pipeline::send::send_control(
                    transport,
                    &mut peer.block,
                    MsgType::Unsubscribe,
                    local_cpu_id,
                    &msg_id.to_be_bytes(),
                )?;
            }
        }
        Ok(())
    }

    /// Handle one operator command synchronously.
    pub fn handle_command(&mut self, command: OperatorCommand, transport: &mut dyn Transport) -> Result<()> {
        match command {
            OperatorCommand::Status(name) => {
                if let Some(peer) = self.find_peer_mut(&name) {
                    let _ = transport.report_status(&mut peer.block)?;
                }
                Ok(())
            }
            OperatorCommand::ResetPeer(name) => {
                if let Some(peer) = self.find_peer_mut(&name) {
                    transport.reset_peer(&mut peer.block)?;
                    peer.subscriptions.clear();
                    peer.gap_tracker = GapTracker::new();
                    peer.liveness.reset();
                    peer.next_tx_seq = 0;
                    peer.sent_buf = SentBuf::new();
                    peer.record.sent_count = 0;
                    peer.record.recv_count = 0;
                    peer.record.miss_count = 0;
                    peer.record.in_order_count = 0;
                    peer.record.send_err_count = 0;
                    peer.record.recv_err_count = 0;
                    peer.record.last_sent = None;
                    peer.record.last_received = None;
                }
                Ok(())
            }
            OperatorCommand::Shutdown => Ok(()),
        }
    }

    /// Run the engine's scheduling loop cooperatively: one pass over liveness, the local bus,
    /// and one inbound poll, then return. `scheduler-poll` callers drive this from their own
    /// loop; `scheduler-tasks` callers (see [`crate::engine::tasks`]) call it from a worker
    /// thread per peer instead.
    pub fn run_once(
        &mut self,
        dt: Duration,
        transport: &mut dyn Transport,
        bus: &mut dyn LocalBus,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        self.tick_liveness(dt, transport, sink)?;
        self.pump_local_bus(bus, transport)?;
        self.pump_inbound(transport, bus, sink)?;
        Ok(())
    }
}

/// Thread-per-peer scheduling helpers, gated behind `scheduler-tasks`.
///
/// Each peer gets its own OS thread looping [`Engine::pump_inbound`]-equivalent work against a
/// per-peer transport clone; a process-wide mutex serializes outbound sends the way the default
/// task scheduler is expected to, since most [`crate::transport::Transport`] impls are not safe
/// to call concurrently from multiple peers over the same socket.
#[cfg(feature = "scheduler-tasks")]
pub mod tasks {
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Shared send-side lock. Transports that genuinely support concurrent sends may ignore
    /// this and synchronize internally instead; the engine does not assume either way.
    #[derive(Default)]
    pub struct SendGate(Mutex<()>);

    impl SendGate {
        #[must_use]
        pub fn new() -> Arc<Self> {
            Arc::new(SendGate::default())
        }

        pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
            let _guard = self.0.lock();
            f()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RecordingEventSink;
    use crate::local_bus::{InMemoryBus, LocalMessage};
    use crate::peer_table::PeerRecord;
    use crate::remap::DefaultPolicy;
    use crate::transport::test_support::LoopbackTransport;

    fn make_peer(name: &str, processor_id: u32) -> PeerConnection {
        let record = PeerRecord::new(name.to_string(), processor_id, 10, vec![]);
        let remap = RemapTable::build(Vec::new(), DefaultPolicy::PassThrough);
        let intervals = Intervals::new(Duration::from_secs(4), Duration::from_secs(1), Duration::from_secs(3));
        PeerConnection::new(record, Vec::new(), remap, intervals)
    }

    #[test]
    fn pump_local_bus_forwards_to_subscribed_peer_only() {
        let mut engine = Engine::new(1, TimeWidth::SixByte, Vec::new(), Duration::from_millis(100));
        let mut peer = make_peer("CPU2", 2);
        peer.subscriptions.subscribe_incoming(99).unwrap();
        engine.add_peer(peer);

        let mut bus = InMemoryBus::new();
        bus.inject(LocalMessage::new(99, vec![0; 8], "ground"));

        let mut transport = LoopbackTransport::default();
        let sent = engine.pump_local_bus(&mut bus, &mut transport).unwrap();
        assert_eq!(sent, 1);
        assert_eq!(engine.peers[0].record.sent_count, 1);
    }

    #[test]
    fn pump_local_bus_discards_messages_this_bridge_just_published() {
        let mut engine = Engine::new(1, TimeWidth::SixByte, Vec::new(), Duration::from_millis(100));
        let mut peer = make_peer("CPU2", 2);
        peer.subscriptions.subscribe_incoming(99).unwrap();
        engine.add_peer(peer);

        let mut bus = InMemoryBus::new();
        bus.inject(LocalMessage::new(99, vec![0; 8], SBN_APP_NAME));

        let mut transport = LoopbackTransport::default();
        let sent = engine.pump_local_bus(&mut bus, &mut transport).unwrap();
        assert_eq!(sent, 0);
    }

    #[test]
    fn pump_inbound_absorbs_frame_from_unknown_sender() {
        let mut engine = Engine::new(1, TimeWidth::SixByte, Vec::new(), Duration::from_millis(100));
        engine.add_peer(make_peer("CPU2", 2));

        let frame = wire::pack(MsgType::Heartbeat, 77, &[], TimeWidth::SixByte).unwrap();
        let mut transport = LoopbackTransport::default();
        transport.inbox.borrow_mut().push_back((77, frame));

        let mut bus = InMemoryBus::new();
        let mut sink = RecordingEventSink::default();
        engine.pump_inbound(&mut transport, &mut bus, &mut sink).unwrap();
    }

    #[test]
    fn pump_inbound_publishes_app_message_from_known_peer() {
        let mut engine = Engine::new(1, TimeWidth::SixByte, Vec::new(), Duration::from_millis(100));
        engine.add_peer(make_peer("CPU2", 2));

        let mut payload = vec![0u8; 8];
        payload[4..8].copy_from_slice(&55u32.to_be_bytes());
        let frame = wire::pack(MsgType::AppMessage, 2, &payload, TimeWidth::SixByte).unwrap();

        let mut transport = LoopbackTransport::default();
        transport.inbox.borrow_mut().push_back((2, frame));

        let mut bus = InMemoryBus::new();
        let mut sink = RecordingEventSink::default();
        engine.pump_inbound(&mut transport, &mut bus, &mut sink).unwrap();
        assert_eq!(bus.received.len(), 1);
        assert_eq!(bus.received[0].msg_id, 55);
    }

    #[test]
    fn subscribe_control_frame_updates_peer_subscriptions() {
        let mut engine = Engine::new(1, TimeWidth::SixByte, Vec::new(), Duration::from_millis(100));
        engine.add_peer(make_peer("CPU2", 2));

        let mut payload = vec![0u8; 4];
        payload.copy_from_slice(&7u32.to_be_bytes());
        let frame = wire::pack(MsgType::Subscribe, 2, &payload, TimeWidth::SixByte).unwrap();

        let mut transport = LoopbackTransport::default();
        transport.inbox.borrow_mut().push_back((2, frame));

        let mut bus = InMemoryBus::new();
        let mut sink = RecordingEventSink::default();
        engine.pump_inbound(&mut transport, &mut bus, &mut sink).unwrap();
        assert!(engine.peers[0].subscriptions.peer_wants(7));
    }

    #[test]
    fn command_channel_drains_queued_commands_in_order() {
        let channel = CommandChannel::new(4);
        channel.sender().send(OperatorCommand::Status("CPU2".to_string())).unwrap();
        channel.sender().send(OperatorCommand::Shutdown).unwrap();
        let drained = channel.drain();
        assert_eq!(drained, vec![OperatorCommand::Status("CPU2".to_string()), OperatorCommand::Shutdown]);
    }

    #[test]
    fn reset_peer_command_clears_subscriptions() {
        let mut engine = Engine::new(1, TimeWidth::SixByte, Vec::new(), Duration::from_millis(100));
        let mut peer = make_peer("CPU2", 2);
        peer.subscriptions.subscribe_incoming(1).unwrap();
        engine.add_peer(peer);

        let mut transport = LoopbackTransport::default();
        engine
            .handle_command(OperatorCommand::ResetPeer("CPU2".to_string()), &mut transport)
            .unwrap();
        assert!(!engine.peers[0].subscriptions.peer_wants(1));
        assert_eq!(engine.peers[0].liveness.state(), PeerState::Announcing);
    }

    #[test]
    fn announce_to_heartbeat_transition_sends_batched_subscribe_burst() {
        let mut engine = Engine::new(1, TimeWidth::SixByte, Vec::new(), Duration::from_millis(100));
        let mut peer = make_peer("CPU2", 2);
        peer.subscriptions.subscribe_outgoing(10).unwrap();
        peer.subscriptions.subscribe_outgoing(20).unwrap();
        engine.add_peer(peer);
        assert_eq!(engine.peers[0].liveness.state(), PeerState::Announcing);

        let frame = wire::pack(MsgType::Announce, 2, &[], TimeWidth::SixByte).unwrap();
        let mut transport = LoopbackTransport::default();
        transport.inbox.borrow_mut().push_back((2, frame));

        let mut bus = InMemoryBus::new();
        let mut sink = RecordingEventSink::default();
        engine.pump_inbound(&mut transport, &mut bus, &mut sink).unwrap();

        assert_eq!(engine.peers[0].liveness.state(), PeerState::Heartbeating);
        assert_eq!(transport.inbox.borrow().len(), 2);
    }

    #[test]
    fn local_subscribe_mirrors_subscribe_frame_to_heartbeating_peers() {
        let mut engine = Engine::new(1, TimeWidth::SixByte, Vec::new(), Duration::from_millis(100));
        let mut peer = make_peer("CPU2", 2);
        peer.liveness.record_heard();
        engine.add_peer(peer);

        let mut transport = LoopbackTransport::default();
        engine.subscribe_outgoing(42, &mut transport).unwrap();

        assert!(engine.peers[0].subscriptions.outgoing_snapshot().contains(&42));
        assert_eq!(transport.inbox.borrow().len(), 1);
    }

    #[test]
    fn deferred_app_message_counts_miss_and_emits_retransmit_request() {
        let mut engine = Engine::new(2, TimeWidth::SixByte, Vec::new(), Duration::from_millis(100));
        engine.add_peer(make_peer("CPU1", 1));

        let frame_for_seq = |seq: u16| {
            let mut payload = vec![0u8; 8];
            payload[2] = (seq >> 8) as u8 & 0x3F;
            payload[3] = (seq & 0xFF) as u8;
            payload[4..8].copy_from_slice(&7u32.to_be_bytes());
            wire::pack(MsgType::AppMessage, 1, &payload, TimeWidth::SixByte).unwrap()
        };

        let mut transport = LoopbackTransport::default();
        // seq 0 establishes the baseline, seq 2 arrives ahead of seq 1: a gap opens.
        transport.inbox.borrow_mut().push_back((1, frame_for_seq(0)));
        transport.inbox.borrow_mut().push_back((1, frame_for_seq(2)));

        let mut bus = InMemoryBus::new();
        let mut sink = RecordingEventSink::default();
        engine.pump_inbound(&mut transport, &mut bus, &mut sink).unwrap();
        engine.pump_inbound(&mut transport, &mut bus, &mut sink).unwrap();

        assert_eq!(bus.received.len(), 1);
        assert_eq!(engine.peers[0].record.miss_count, 1);

        // the gap triggered a RetransmitRequest control frame back to the peer.
        let (_, frame) = transport.inbox.borrow_mut().pop_front().unwrap();
        let (msg_type, _, payload) = wire::unpack(&frame, TimeWidth::SixByte).unwrap();
        assert_eq!(msg_type, MsgType::RetransmitRequest);
        let gap_after = u16::from_be_bytes([payload[0], payload[1]]);
        let gap_to = u16::from_be_bytes([payload[2], payload[3]]);
        assert_eq!((gap_after, gap_to), (0, 1));
    }

    #[test]
    fn retransmit_request_resends_held_frames_from_sent_buf() {
        let mut engine = Engine::new(1, TimeWidth::SixByte, Vec::new(), Duration::from_millis(100));
        let mut peer = make_peer("CPU2", 2);
        peer.subscriptions.subscribe_incoming(7).unwrap();
        engine.add_peer(peer);

        let mut bus = InMemoryBus::new();
        bus.inject(LocalMessage::new(7, vec![0u8; 8], "ground"));
        bus.inject(LocalMessage::new(7, vec![0u8; 8], "ground"));
        let mut transport = LoopbackTransport::default();
        engine.pump_local_bus(&mut bus, &mut transport).unwrap();
        // two frames sent (seq 0, seq 1); drop them from the wire, keeping only sent_buf history.
        transport.inbox.borrow_mut().clear();

        let mut request_payload = vec![0u8; 4];
        request_payload[0..2].copy_from_slice(&u16::MAX.to_be_bytes()); // gap_after = -1 -> resend from 0
        request_payload[2..4].copy_from_slice(&1u16.to_be_bytes());
        let request_frame =
            wire::pack(MsgType::RetransmitRequest, 2, &request_payload, TimeWidth::SixByte).unwrap();
        transport.inbox.borrow_mut().push_back((2, request_frame));

        let mut sink = RecordingEventSink::default();
        engine.pump_inbound(&mut transport, &mut bus, &mut sink).unwrap();

        assert_eq!(transport.inbox.borrow().len(), 2);
        assert_eq!(engine.peers[0].record.sent_count, 4); // 2 original sends + 2 resends
    }
}
