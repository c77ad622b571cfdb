// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer lifecycle state machine (C6).
//!
//! Every configured peer tracks announce/heartbeat liveness independently of message traffic:
//! data flowing in either direction does not by itself prove the peer is alive, since a
//! misconfigured remap or an empty subscription set can leave a healthy link silent for a long
//! time.

use std::time::Duration;

/// Liveness state for one peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// No announce has been heard yet; the engine is periodically resending its own announce.
    Announcing,
    /// An announce exchange completed; heartbeats are now the liveness signal.
    Heartbeating,
    /// Held out of the regular liveness cycle; only an operator reset returns the peer to
    /// [`PeerState::Announcing`]. Losing heartbeats on its own re-enters `Announcing` rather than
    /// landing here — nothing in this module produces `Unreachable` automatically.
    Unreachable,
}

/// Timing parameters governing one peer's state machine.
///
/// `loss_interval` must exceed `heartbeat_interval`, or a single delayed heartbeat would flap the
/// peer back to [`PeerState::Announcing`] and into [`PeerState::Heartbeating`] again on every
/// tick; [`Intervals::new`] enforces this.
#[derive(Debug, Clone, Copy)]
pub struct Intervals {
    pub announce_interval: Duration,
    pub heartbeat_interval: Duration,
    pub loss_interval: Duration,
}

impl Intervals {
    /// Construct intervals, clamping `loss_interval` up to `heartbeat_interval * 2` if the
    /// caller supplied a value that would make the peer flap.
    #[must_use]
    pub fn new(announce_interval: Duration, heartbeat_interval: Duration, loss_interval: Duration) -> Self {
        let min_loss = heartbeat_interval.saturating_mul(2);
        let loss_interval = if loss_interval <= heartbeat_interval {
            min_loss
        } else {
            loss_interval
        };
        Intervals {
            announce_interval,
            heartbeat_interval,
            loss_interval,
        }
    }
}

/// Action a caller should take in response to a state machine tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing to send this tick.
    None,
    /// (Re)send an announce frame.
    SendAnnounce,
    /// Send a heartbeat frame.
    SendHeartbeat,
    /// The peer just fell silent past its loss interval and dropped back to announcing; clear
    /// its subscriptions and drain anything queued for it.
    LossDetected,
}

/// One peer's liveness tracking.
#[derive(Debug, Clone)]
pub struct PeerLiveness {
    state: PeerState,
    intervals: Intervals,
    elapsed_since_announce_sent: Duration,
    elapsed_since_heartbeat_sent: Duration,
    elapsed_since_last_heard: Duration,
}

impl PeerLiveness {
    #[must_use]
    pub fn new(intervals: Intervals) -> Self {
        PeerLiveness {
            state: PeerState::Announcing,
            intervals,
            elapsed_since_announce_sent: intervals.announce_interval,
            elapsed_since_heartbeat_sent: Duration::ZERO,
            elapsed_since_last_heard: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn state(&self) -> PeerState {
        self.state
    }

    /// An announce or heartbeat was received from the peer; resets the loss clock and, if this
    /// is the first contact, advances out of [`PeerState::Announcing`].
    pub fn record_heard(&mut self) {
        self.elapsed_since_last_heard = Duration::ZERO;
        if self.state != PeerState::Heartbeating {
            self.state = PeerState::Heartbeating;
        }
    }

    /// Force the peer back to [`PeerState::Announcing`] with all clocks cleared, as an operator
    /// reset does regardless of the state the peer was previously in.
    pub fn reset(&mut self) {
        self.state = PeerState::Announcing;
        self.elapsed_since_announce_sent = self.intervals.announce_interval;
        self.elapsed_since_heartbeat_sent = Duration::ZERO;
        self.elapsed_since_last_heard = Duration::ZERO;
    }

    /// Advance the state machine by `dt` and report what, if anything, the caller should send.
    pub fn tick(&mut self, dt: Duration) -> Action {
        self.elapsed_since_announce_sent += dt;
        self.elapsed_since_heartbeat_sent += dt;
        self.elapsed_since_last_heard += dt;

        match self.state {
            PeerState::Announcing => {
                if self.elapsed_since_announce_sent >= self.intervals.announce_interval {
                    self.elapsed_since_announce_sent = Duration::ZERO;
                    Action::SendAnnounce
                } else {
                    Action::None
                }
            }
            PeerState::Heartbeating => {
                if self.elapsed_since_last_heard >= self.intervals.loss_interval {
                    self.state = PeerState::Announcing;
                    self.elapsed_since_announce_sent = Duration::ZERO;
                    Action::LossDetected
                } else if self.elapsed_since_heartbeat_sent >= self.intervals.heartbeat_interval {
                    self.elapsed_since_heartbeat_sent = Duration::ZERO;
                    Action::SendHeartbeat
                } else {
                    Action::None
                }
            }
            PeerState::Unreachable => {
                if self.elapsed_since_announce_sent >= self.intervals.announce_interval {
                    self.elapsed_since_announce_sent = Duration::ZERO;
                    self.state = PeerState::Announcing;
                    Action::SendAnnounce
                } else {
                    Action::None
                }
            }
        }
    }
}
