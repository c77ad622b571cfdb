// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read-only session snapshots for operator housekeeping requests.

use crate::engine::Engine;
use crate::state_machine::PeerState;
use std::time::Duration;

/// One peer's status as of the moment [`Engine::housekeeping`] was called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub name: String,
    pub processor_id: u32,
    pub state: PeerState,
    pub outgoing_subscriptions: usize,
    pub incoming_subscriptions: usize,
    pub sent_count: u64,
    pub recv_count: u64,
    pub miss_count: u64,
    pub in_order_count: u64,
    pub send_err_count: u64,
    pub recv_err_count: u64,
    pub last_sent: Option<Duration>,
    pub last_received: Option<Duration>,
}

/// A point-in-time snapshot of every peer the engine tracks.
#[derive(Debug, Clone, Default)]
pub struct HousekeepingSnapshot {
    pub peers: Vec<PeerSnapshot>,
}

impl Engine {
    /// Build a read-only snapshot of every peer's liveness state and subscription counts, for an
    /// operator status request. Does not touch the transport.
    #[must_use]
    pub fn housekeeping(&self) -> HousekeepingSnapshot {
        let peers = self
            .peers
            .iter()
            .map(|peer| PeerSnapshot {
                name: peer.record.name.clone(),
                processor_id: peer.record.processor_id,
                state: peer.liveness.state(),
                outgoing_subscriptions: peer.subscriptions.outgoing_snapshot().len(),
                incoming_subscriptions: peer.subscriptions.incoming_count(),
                sent_count: peer.record.sent_count,
                recv_count: peer.record.recv_count,
                miss_count: peer.record.miss_count,
                in_order_count: peer.record.in_order_count,
                send_err_count: peer.record.send_err_count,
                recv_err_count: peer.record.recv_err_count,
                last_sent: peer.record.last_sent,
                last_received: peer.record.last_received,
            })
            .collect();
        HousekeepingSnapshot { peers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PeerConnection;
    use crate::peer_table::PeerRecord;
    use crate::remap::{DefaultPolicy, RemapTable};
    use crate::state_machine::Intervals;
    use crate::wire::TimeWidth;
    use std::time::Duration;

    #[test]
    fn snapshot_reflects_peer_count_and_state() {
        let mut engine = Engine::new(1, TimeWidth::SixByte, Vec::new(), Duration::from_millis(100));
        let record = PeerRecord::new("CPU2".to_string(), 2, 10, vec![]);
        let remap = RemapTable::build(Vec::new(), DefaultPolicy::PassThrough);
        let intervals = Intervals::new(Duration::from_secs(4), Duration::from_secs(1), Duration::from_secs(3));
        engine.add_peer(PeerConnection::new(record, Vec::new(), remap, intervals));

        let snapshot = engine.housekeeping();
        assert_eq!(snapshot.peers.len(), 1);
        assert_eq!(snapshot.peers[0].name, "CPU2");
        assert_eq!(snapshot.peers[0].state, PeerState::Announcing);
        assert_eq!(snapshot.peers[0].sent_count, 0);
        assert_eq!(snapshot.peers[0].last_sent, None);
    }

    #[test]
    fn snapshot_surfaces_counters_from_peer_record() {
        let mut engine = Engine::new(1, TimeWidth::SixByte, Vec::new(), Duration::from_millis(100));
        let record = PeerRecord::new("CPU2".to_string(), 2, 10, vec![]);
        let remap = RemapTable::build(Vec::new(), DefaultPolicy::PassThrough);
        let intervals = Intervals::new(Duration::from_secs(4), Duration::from_secs(1), Duration::from_secs(3));
        let mut peer = PeerConnection::new(record, Vec::new(), remap, intervals);
        peer.record.sent_count = 3;
        peer.record.miss_count = 1;
        peer.record.last_received = Some(Duration::from_secs(5));
        engine.add_peer(peer);

        let snapshot = engine.housekeeping();
        assert_eq!(snapshot.peers[0].sent_count, 3);
        assert_eq!(snapshot.peers[0].miss_count, 1);
        assert_eq!(snapshot.peers[0].last_received, Some(Duration::from_secs(5)));
    }
}
