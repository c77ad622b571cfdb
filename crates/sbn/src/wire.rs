// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! On-wire frame codec (C1).
//!
//! Every SBN frame has a fixed 7-byte prefix followed by `MsgSize` payload bytes:
//!
//! ```text
//! +------------------+--------------+------------------+
//! | MsgSize (u16 BE) | MsgType (u8) | CpuId (u32 BE)    |
//! +------------------+--------------+------------------+
//! | Payload (MsgSize bytes)                             |
//! +------------------------------------------------------+
//! ```
//!
//! `pack`/`unpack` never mutate the caller's buffer in place for `AppMessage` frames: the
//! embedded CCSDS-like secondary header fields are byte-swapped in a private copy, because the
//! source buffer may be aliased by other local subscribers of the same message.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Size of the fixed frame prefix: `MsgSize(2) + MsgType(1) + CpuId(4)`.
pub const HEADER_LEN: usize = 7;

/// Largest payload this codec will pack or accept on unpack.
pub const MAX_PAYLOAD_LEN: usize = 4096;

/// Protocol message types carried in the `MsgType` header field.
///
/// Values are illustrative but stable across releases, per the wire format contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    Subscribe = 0x01,
    Unsubscribe = 0x02,
    AppMessage = 0x03,
    RetransmitRequest = 0x04,
    Announce = 0xA0,
    Heartbeat = 0xA1,
}

impl MsgType {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MsgType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(MsgType::Subscribe),
            0x02 => Ok(MsgType::Unsubscribe),
            0x03 => Ok(MsgType::AppMessage),
            0x04 => Ok(MsgType::RetransmitRequest),
            0xA0 => Ok(MsgType::Announce),
            0xA1 => Ok(MsgType::Heartbeat),
            other => Err(Error::ConfigInvalid {
                row: 0,
                reason: format!("unknown wire MsgType 0x{other:02X}"),
            }),
        }
    }
}

/// Width of the CCSDS-like secondary header time field embedded in `AppMessage` payloads.
///
/// `FourByte` carries seconds only; `SixByte` carries seconds (4 bytes) followed by subseconds
/// (2 bytes). Configured once per engine, matching how cFE builds fix this at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWidth {
    FourByte,
    SixByte,
}

impl TimeWidth {
    fn field_len(self) -> usize {
        match self {
            TimeWidth::FourByte => 4,
            TimeWidth::SixByte => 6,
        }
    }
}

/// CCSDS primary header length (version/type/apid/sequence/length), fixed at 6 bytes.
const CCSDS_PRIMARY_HEADER_LEN: usize = 6;

/// Secondary-header command-code/checksum field width for command packets.
const CCSDS_CMD_SECONDARY_HEADER_LEN: usize = 2;

/// Swap the CCSDS-like secondary header fields embedded in an `AppMessage` payload between host
/// and network byte order. Telemetry packets carry a seconds/subseconds timestamp right after
/// the primary header; command packets carry a 2-byte command/checksum field in the same spot.
/// Packets too short to contain a recognizable secondary header are left untouched — this codec
/// normalizes what it can identify, it does not validate that a payload is CCSDS-shaped at all.
fn swap_secondary_header(payload: &mut [u8], time_width: TimeWidth) {
    if payload.len() < CCSDS_PRIMARY_HEADER_LEN + 1 {
        return;
    }

    // CCSDS primary header byte 0: version(3) | type(1) | secondary-header-flag(1) | apid_hi(3)
    let byte0 = payload[0];
    let has_secondary_header = byte0 & 0x08 != 0;
    if !has_secondary_header {
        return;
    }
    let is_command = byte0 & 0x10 != 0;

    let field_start = CCSDS_PRIMARY_HEADER_LEN;
    if is_command {
        let field_len = CCSDS_CMD_SECONDARY_HEADER_LEN;
        if payload.len() < field_start + field_len {
            return;
        }
        payload[field_start..field_start + field_len].reverse();
    } else {
        let field_len = time_width.field_len();
        if payload.len() < field_start + field_len {
            return;
        }
        // seconds (4 bytes)
        payload[field_start..field_start + 4].reverse();
        // subseconds (remaining bytes, if any)
        if field_len > 4 {
            payload[field_start + 4..field_start + field_len].reverse();
        }
    }
}

/// Extract the CCSDS primary header sequence count (14 bits, bytes 2-3) from an `AppMessage`
/// payload, if the payload is long enough to carry one. Used by the receive pipeline's gap
/// tracker; packets with no CCSDS-shaped header at all simply never gap-track.
#[must_use]
pub fn ccsds_sequence_count(payload: &[u8]) -> Option<u16> {
    if payload.len() < CCSDS_PRIMARY_HEADER_LEN {
        return None;
    }
    let raw = u16::from_be_bytes([payload[2], payload[3]]);
    Some(raw & 0x3FFF)
}

/// Pack a frame for the wire. For [`MsgType::AppMessage`], the embedded secondary header fields
/// are byte-swapped in a private copy of `payload` — the caller's buffer is never mutated.
pub fn pack(msg_type: MsgType, cpu_id: u32, payload: &[u8], time_width: TimeWidth) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::PayloadOverflow {
            size: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut body = payload.to_vec();
    if msg_type == MsgType::AppMessage {
        swap_secondary_header(&mut body, time_width);
    }

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.write_u16::<BigEndian>(body.len() as u16)?;
    out.write_u8(msg_type.as_u8())?;
    out.write_u32::<BigEndian>(cpu_id)?;
    out.extend_from_slice(&body);
    Ok(out)
}

/// Unpack a frame from the wire, reversing the byte-order normalization `pack` applied.
pub fn unpack(buf: &[u8], time_width: TimeWidth) -> Result<(MsgType, u32, Vec<u8>)> {
    if buf.len() < HEADER_LEN {
        return Err(Error::TruncatedFrame {
            needed: HEADER_LEN,
            got: buf.len(),
        });
    }

    let mut cursor = Cursor::new(buf);
    let msg_size = cursor.read_u16::<BigEndian>()? as usize;
    let msg_type = MsgType::try_from(cursor.read_u8()?)?;
    let cpu_id = cursor.read_u32::<BigEndian>()?;

    if msg_size > MAX_PAYLOAD_LEN {
        return Err(Error::PayloadOverflow {
            size: msg_size,
            max: MAX_PAYLOAD_LEN,
        });
    }
    if buf.len() < HEADER_LEN + msg_size {
        return Err(Error::TruncatedFrame {
            needed: HEADER_LEN + msg_size,
            got: buf.len(),
        });
    }

    let mut body = buf[HEADER_LEN..HEADER_LEN + msg_size].to_vec();
    if msg_type == MsgType::AppMessage {
        swap_secondary_header(&mut body, time_width);
    }

    Ok((msg_type, cpu_id, body))
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        // byteorder's Read/Write over a Vec<u8>/Cursor cannot actually fail in practice; the
        // trait still returns io::Error, so this exists to satisfy `?` rather than to handle a
        // real failure mode.
        log::debug!("wire codec io error (unexpected): {err}");
        Error::TruncatedFrame { needed: 0, got: 0 }
    }
}
