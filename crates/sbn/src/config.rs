// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer/host table tokenizer.
//!
//! The table format is a plain-text, line-oriented grammar carried over from the processor
//! configuration files this engine bridges: comma- or whitespace-separated fields, `;`
//! terminates a record (allowing trailing commentary after it), `!` terminates the file early,
//! and `#` starts a whole-line comment. Numeric fields accept decimal, `0x`-prefixed hex, and
//! `0`-prefixed octal, matching the host table's own convention.
//!
//! This is deliberately not [`toml`]-based: the table is operator-maintained infrastructure data
//! shared with non-Rust processors on the same bus, so its format is not ours to change.

use crate::error::{Error, Result};

/// One parsed record from a peer/host table.
///
/// `row_index` counts records actually yielded by [`parse_table`], not physical source lines:
/// blank lines and whole-line comments never increment it, so a [`Error::ConfigInvalid`] row
/// number matches the Nth meaningful entry an operator would count by eye.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRow {
    pub row_index: usize,
    pub fields: Vec<String>,
}

/// Parse a peer/host table into its constituent records.
///
/// Parsing never fails outright: a record whose field count a caller later rejects is reported
/// back as-is and left for that caller (usually [`crate::peer_table`]) to turn into a
/// [`Error::ConfigInvalid`] and skip. This function only tokenizes.
pub fn parse_table(text: &str) -> Vec<ConfigRow> {
    let mut rows = Vec::new();
    let mut row_index = 0;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('!') {
            break;
        }

        let record = line.split(';').next().unwrap_or("").trim();
        if record.is_empty() {
            continue;
        }

        let fields: Vec<String> = record
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if fields.is_empty() {
            continue;
        }

        rows.push(ConfigRow { row_index, fields });
        row_index += 1;
    }

    rows
}

/// Parse one numeric field, accepting decimal, `0x`/`0X`-prefixed hex, and `0`-prefixed octal,
/// matching the host table's own integer literal convention.
pub fn parse_number(field: &str, row: usize) -> Result<u32> {
    let invalid = |reason: String| Error::ConfigInvalid { row, reason };

    if let Some(hex) = field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16)
            .map_err(|_| invalid(format!("'{field}' is not valid hex")));
    }
    if field.len() > 1 && field.starts_with('0') {
        return u32::from_str_radix(&field[1..], 8)
            .map_err(|_| invalid(format!("'{field}' is not valid octal")));
    }
    field
        .parse::<u32>()
        .map_err(|_| invalid(format!("'{field}' is not a valid number")))
}
