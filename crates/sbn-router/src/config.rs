// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Router settings: the small, serde-driven knobs that govern how `sbn-router` runs a session,
//! as distinct from the peer/host table itself (which keeps its own line-oriented format shared
//! with the processors being bridged, see [`sbn::config`]).

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors loading or validating router settings.
#[derive(Debug, Error)]
pub enum RouterConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Top-level settings document, loaded from a TOML file named on the command line.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterSettings {
    pub local_spacecraft_id: u32,
    pub local_processor_id: u32,
    #[serde(default = "default_time_width")]
    pub time_width_bytes: u8,
    #[serde(default)]
    pub intervals: IntervalSettings,
}

fn default_time_width() -> u8 {
    6
}

/// Liveness timing, in whole seconds (sub-second precision is not meaningful for the heartbeat
/// cadences this bridges between).
#[derive(Debug, Clone, Deserialize)]
pub struct IntervalSettings {
    #[serde(default = "default_announce_secs")]
    pub announce_secs: u64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_loss_secs")]
    pub loss_secs: u64,
}

fn default_announce_secs() -> u64 {
    4
}
fn default_heartbeat_secs() -> u64 {
    1
}
fn default_loss_secs() -> u64 {
    3
}

impl Default for IntervalSettings {
    fn default() -> Self {
        IntervalSettings {
            announce_secs: default_announce_secs(),
            heartbeat_secs: default_heartbeat_secs(),
            loss_secs: default_loss_secs(),
        }
    }
}

impl IntervalSettings {
    #[must_use]
    pub fn to_intervals(&self) -> sbn::state_machine::Intervals {
        sbn::state_machine::Intervals::new(
            Duration::from_secs(self.announce_secs),
            Duration::from_secs(self.heartbeat_secs),
            Duration::from_secs(self.loss_secs),
        )
    }
}

impl RouterSettings {
    /// Load and validate settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RouterConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| RouterConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let settings: RouterSettings = toml::from_str(&text).map_err(|source| RouterConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), RouterConfigError> {
        if self.time_width_bytes != 4 && self.time_width_bytes != 6 {
            return Err(RouterConfigError::Invalid(format!(
                "time_width_bytes must be 4 or 6, got {}",
                self.time_width_bytes
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn time_width(&self) -> sbn::wire::TimeWidth {
        match self.time_width_bytes {
            4 => sbn::wire::TimeWidth::FourByte,
            _ => sbn::wire::TimeWidth::SixByte,
        }
    }
}
