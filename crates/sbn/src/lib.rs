// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Software Bus Network core.
//!
//! This crate federates per-processor publish-subscribe buses into one logical network bus: a
//! [`engine::Engine`] holds one [`engine::PeerConnection`] per configured remote processor,
//! translating message ids through a [`remap::RemapTable`], mirroring subscriptions through
//! [`subscription::SubscriptionSet`], and tracking liveness through
//! [`state_machine::PeerLiveness`] — all independent of which [`transport::Transport`] actually
//! carries the bytes.
//!
//! Embedders provide a [`local_bus::LocalBus`] (the pub/sub bus already running on this
//! processor) and, optionally, an [`event::EventSink`] to receive operator-relevant state
//! changes. Everything else — wire framing, the peer/host table format, message-id remap
//! bisection, sequence gap tracking — is owned by this crate.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod housekeeping;
pub mod local_bus;
pub mod peer_table;
pub mod pipeline;
pub mod remap;
pub mod state_machine;
pub mod subscription;
pub mod transport;
pub mod wire;

pub use error::{Error, Result};
