// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer and host table (C3): the processors this bridge knows about, loaded once at startup
//! from a [`crate::config`] table and consulted by name or processor id for the rest of the
//! session.

use crate::config::{parse_number, parse_table, ConfigRow};
use crate::error::{Error, Result};
use std::time::Duration;

/// Maximum number of peer entries a single table may hold. Chosen to match the host table's own
/// bounded array of interface records; an operator who needs more is misconfiguring one bridge
/// instead of running two.
pub const MAX_PEERS: usize = 64;

/// Maximum number of local host entries a single table may hold (normally exactly one, but a
/// multi-homed bridge may list more than one local interface).
pub const MAX_HOSTS: usize = 8;

/// One row describing this bridge's own interface on a given medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    pub name: String,
    pub processor_id: u32,
    pub spacecraft_id: u32,
    pub raw_fields: Vec<String>,
}

/// One row describing a remote processor this bridge federates with, plus the runtime
/// counters and timestamps housekeeping reports on for that peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub name: String,
    pub processor_id: u32,
    pub spacecraft_id: u32,
    pub raw_fields: Vec<String>,
    /// AppMessage frames forwarded to this peer.
    pub sent_count: u64,
    /// Frames of any type received from this peer.
    pub recv_count: u64,
    /// AppMessage sequence numbers detected as missing on this peer's inbound stream.
    pub miss_count: u64,
    /// AppMessage payloads delivered to the local bus in sequence order (includes frames
    /// drained from the deferred buffer once a gap closed).
    pub in_order_count: u64,
    /// Failed `transport.send` attempts for this peer, counted rather than propagated.
    pub send_err_count: u64,
    /// Failed or discarded inbound frames attributed to this peer (decode faults, duplicates).
    pub recv_err_count: u64,
    pub last_sent: Option<Duration>,
    pub last_received: Option<Duration>,
}

impl PeerRecord {
    /// Build a freshly configured peer record with all counters and timestamps zeroed.
    #[must_use]
    pub fn new(name: String, processor_id: u32, spacecraft_id: u32, raw_fields: Vec<String>) -> Self {
        PeerRecord {
            name,
            processor_id,
            spacecraft_id,
            raw_fields,
            sent_count: 0,
            recv_count: 0,
            miss_count: 0,
            in_order_count: 0,
            send_err_count: 0,
            recv_err_count: 0,
            last_sent: None,
            last_received: None,
        }
    }
}

/// The loaded set of hosts and peers for one bridge session, filtered to a single spacecraft id.
#[derive(Debug, Clone, Default)]
pub struct PeerTable {
    pub hosts: Vec<HostRecord>,
    pub peers: Vec<PeerRecord>,
}

/// Minimum fields a row must carry to be classifiable at all: name, processor id, spacecraft id.
const MIN_FIELDS: usize = 3;

/// A processor id that appears in the local host section is a host; everything else configured
/// for the same spacecraft id is a peer. This mirrors how the table distinguishes "me" from
/// "them" by position rather than by an explicit marker column.
fn classify(fields: &[String], row: usize) -> Result<(String, u32, u32)> {
    if fields.len() < MIN_FIELDS {
        return Err(Error::ConfigInvalid {
            row,
            reason: format!("expected at least {MIN_FIELDS} fields, got {}", fields.len()),
        });
    }
    let name = fields[0].clone();
    let processor_id = parse_number(&fields[1], row)?;
    let spacecraft_id = parse_number(&fields[2], row)?;
    Ok((name, processor_id, spacecraft_id))
}

impl PeerTable {
    /// Load a peer table from table text, keeping only rows whose spacecraft id matches
    /// `local_spacecraft_id` and splitting the remainder into hosts (processor id ==
    /// `local_processor_id`) and peers (everything else). Rows that fail to parse, or that would
    /// exceed [`MAX_HOSTS`]/[`MAX_PEERS`], are dropped; loading continues with what remains,
    /// since one bad row should not keep the rest of the bus from coming up.
    pub fn load(text: &str, local_spacecraft_id: u32, local_processor_id: u32) -> Self {
        let mut table = PeerTable::default();

        for ConfigRow { row_index, fields } in parse_table(text) {
            let (name, processor_id, spacecraft_id) = match classify(&fields, row_index) {
                Ok(parsed) => parsed,
                Err(err) => {
                    log::warn!("dropping peer table row {row_index}: {err}");
                    continue;
                }
            };

            if spacecraft_id != local_spacecraft_id {
                continue;
            }

            if processor_id == local_processor_id {
                if table.hosts.len() >= MAX_HOSTS {
                    log::warn!("dropping host row {row_index}: table already holds {MAX_HOSTS} hosts");
                    continue;
                }
                table.hosts.push(HostRecord {
                    name,
                    processor_id,
                    spacecraft_id,
                    raw_fields: fields,
                });
            } else {
                if table.peers.len() >= MAX_PEERS {
                    log::warn!("dropping peer row {row_index}: table already holds {MAX_PEERS} peers");
                    continue;
                }
                table.peers.push(PeerRecord::new(name, processor_id, spacecraft_id, fields));
            }
        }

        table
    }

    /// Look up a configured peer by processor id.
    #[must_use]
    pub fn find_by_processor_id(&self, processor_id: u32) -> Option<&PeerRecord> {
        self.peers.iter().find(|p| p.processor_id == processor_id)
    }

    /// Look up a configured peer by name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&PeerRecord> {
        self.peers.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
CPU1, 1, 10, host-medium-field\n\
CPU2, 2, 10, peer-medium-field\n\
CPU3, 3, 10, peer-medium-field\n\
CPU9, 9, 99, other-spacecraft-field\n\
";

    #[test]
    fn classifies_local_processor_as_host_and_rest_as_peers() {
        let table = PeerTable::load(TABLE, 10, 1);
        assert_eq!(table.hosts.len(), 1);
        assert_eq!(table.hosts[0].name, "CPU1");
        assert_eq!(table.peers.len(), 2);
        assert!(table.find_by_processor_id(2).is_some());
        assert!(table.find_by_processor_id(3).is_some());
    }

    #[test]
    fn rows_from_other_spacecraft_ids_are_dropped() {
        let table = PeerTable::load(TABLE, 10, 1);
        assert!(table.find_by_processor_id(9).is_none());
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let text = "CPU1, 1, 10, host\nbad-row-only-one-field\nCPU2, 2, 10, peer\n";
        let table = PeerTable::load(text, 10, 1);
        assert_eq!(table.peers.len(), 1);
    }

    #[test]
    fn find_by_name_and_processor_id_agree() {
        let table = PeerTable::load(TABLE, 10, 1);
        let by_id = table.find_by_processor_id(2).unwrap();
        let by_name = table.find_by_name("CPU2").unwrap();
        assert_eq!(by_id, by_name);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut text = String::new();
        for i in 1..=(MAX_PEERS + 5) {
            text.push_str(&format!("CPU{i}, {i}, 10, field\n"));
        }
        // processor id 1 is the local host, so it won't count toward MAX_PEERS
        let table = PeerTable::load(&text, 10, 1);
        assert!(table.peers.len() <= MAX_PEERS);
    }
}
