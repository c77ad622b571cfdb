// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message-id remap table (C4).
//!
//! A peer-specific sorted table translating this processor's local message ids into ids the
//! remote processor expects, and back. The original lookup bisected a sorted array by hand and
//! mishandled the two-element case, silently returning the wrong entry at a boundary; here the
//! same sorted-array contract is expressed with [`slice::binary_search_by`], which has no such
//! corner case.

/// What to do with a message id that has no entry in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultPolicy {
    /// Pass the id through unchanged.
    PassThrough,
    /// Drop the message; it is not forwarded.
    Drop,
}

/// One entry translating a local id to its peer-facing counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemapEntry {
    pub local_id: u32,
    pub peer_id: u32,
}

/// A sorted, per-peer remap table.
#[derive(Debug, Clone)]
pub struct RemapTable {
    entries: Vec<RemapEntry>,
    default_policy: DefaultPolicy,
}

impl RemapTable {
    /// Build a table from unsorted entries, sorting by `local_id`. Later duplicate `local_id`
    /// entries overwrite earlier ones, matching last-entry-wins table loading.
    #[must_use]
    pub fn build(mut entries: Vec<RemapEntry>, default_policy: DefaultPolicy) -> Self {
        entries.sort_by_key(|e| e.local_id);
        entries.dedup_by(|a, b| {
            if a.local_id == b.local_id {
                *b = *a;
                true
            } else {
                false
            }
        });
        RemapTable {
            entries,
            default_policy,
        }
    }

    /// Translate a local message id into the id the peer expects, or apply the table's default
    /// policy if no entry matches.
    #[must_use]
    pub fn remap(&self, local_id: u32) -> Option<u32> {
        match self
            .entries
            .binary_search_by(|entry| entry.local_id.cmp(&local_id))
        {
            Ok(idx) => Some(self.entries[idx].peer_id),
            Err(_) => match self.default_policy {
                DefaultPolicy::PassThrough => Some(local_id),
                DefaultPolicy::Drop => None,
            },
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the reverse-direction table: a frame arriving from the peer carries *their* local
    /// id, which this table's `peer_id` column names, and needs translating back to *our* local
    /// id. One configured table drives both directions of a link this way, rather than an
    /// operator maintaining two tables that could drift apart.
    #[must_use]
    pub fn inverted(&self, default_policy: DefaultPolicy) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|e| RemapEntry {
                local_id: e.peer_id,
                peer_id: e.local_id,
            })
            .collect();
        RemapTable::build(entries, default_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(policy: DefaultPolicy) -> RemapTable {
        RemapTable::build(
            vec![
                RemapEntry { local_id: 100, peer_id: 900 },
                RemapEntry { local_id: 10, peer_id: 910 },
                RemapEntry { local_id: 50, peer_id: 920 },
            ],
            policy,
        )
    }

    #[test]
    fn exact_hits_translate() {
        let t = table(DefaultPolicy::Drop);
        assert_eq!(t.remap(10), Some(910));
        assert_eq!(t.remap(50), Some(920));
        assert_eq!(t.remap(100), Some(900));
    }

    #[test]
    fn miss_with_drop_policy_yields_none() {
        let t = table(DefaultPolicy::Drop);
        assert_eq!(t.remap(11), None);
    }

    #[test]
    fn miss_with_pass_through_policy_returns_input() {
        let t = table(DefaultPolicy::PassThrough);
        assert_eq!(t.remap(11), Some(11));
    }

    #[test]
    fn two_element_table_has_no_degenerate_bisection_case() {
        let t = RemapTable::build(
            vec![
                RemapEntry { local_id: 1, peer_id: 101 },
                RemapEntry { local_id: 2, peer_id: 102 },
            ],
            DefaultPolicy::Drop,
        );
        assert_eq!(t.remap(1), Some(101));
        assert_eq!(t.remap(2), Some(102));
        assert_eq!(t.remap(0), None);
        assert_eq!(t.remap(3), None);
    }

    #[test]
    fn single_element_table() {
        let t = RemapTable::build(vec![RemapEntry { local_id: 7, peer_id: 70 }], DefaultPolicy::Drop);
        assert_eq!(t.remap(7), Some(70));
        assert_eq!(t.remap(6), None);
    }

    #[test]
    fn empty_table_always_falls_to_default_policy() {
        let t = RemapTable::build(Vec::new(), DefaultPolicy::PassThrough);
        assert!(t.is_empty());
        assert_eq!(t.remap(42), Some(42));
    }

    #[test]
    fn later_duplicate_entry_overwrites_earlier_one() {
        let t = RemapTable::build(
            vec![
                RemapEntry { local_id: 5, peer_id: 1 },
                RemapEntry { local_id: 5, peer_id: 2 },
            ],
            DefaultPolicy::Drop,
        );
        assert_eq!(t.len(), 1);
        assert_eq!(t.remap(5), Some(2));
    }
}
