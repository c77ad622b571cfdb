// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types shared across the engine.
//!
//! Per the error handling design, only [`Error::Fatal`] is meant to escape a running session:
//! everything else is counted, logged, and absorbed by the component that observed it. Variants
//! still carry enough context (row index, processor id, peer name) for an [`crate::event::EventSink`]
//! to report something useful to an operator.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Distinct error kinds produced by the engine.
///
/// These are kinds, not type names: several components (config loading, the wire codec, the
/// receive pipeline) can all produce a [`Error::ConfigInvalid`] or a [`Error::TruncatedFrame`].
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration row failed to parse or was out of range. The row is dropped and loading
    /// continues.
    #[error("invalid configuration at row {row}: {reason}")]
    ConfigInvalid {
        /// Record index within the config file (not a physical line number — see `config::parse`).
        row: usize,
        reason: String,
    },

    /// Too many peers, hosts, or subscriptions were configured; the excess entry was dropped.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A transport `send` or `recv` call failed. Never propagated past the pipeline that
    /// observed it — the peer state machine owns liveness, not the transport.
    #[error("transport fault on peer {peer}: {reason}")]
    TransportFault { peer: String, reason: String },

    /// Fewer bytes were available than the fixed frame header requires.
    #[error("truncated frame: need at least {needed} bytes, got {got}")]
    TruncatedFrame { needed: usize, got: usize },

    /// `MsgSize` in a frame header exceeds the maximum payload capacity.
    #[error("payload overflow: {size} exceeds the {max} byte maximum")]
    PayloadOverflow { size: usize, max: usize },

    /// An inbound frame named a `CpuId` with no matching configured peer.
    #[error("frame from unconfigured processor id {0}")]
    UnknownSender(u32),

    /// No configuration file could be opened, or task/thread creation failed during init.
    /// This is the only variant meant to propagate out of a session and terminate the process.
    #[error("fatal initialization error: {0}")]
    Fatal(String),
}

impl Error {
    /// True for the single variant that should abort startup rather than be absorbed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}
