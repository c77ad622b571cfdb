// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reference UDP [`Transport`] implementation.
//!
//! One non-blocking socket per local host entry; peers are plain `host:port` destinations
//! resolved once at `init_peer` time. This is the transport `sbn-router` uses by default — it is
//! intentionally the simplest medium the trait can describe, not a tuned one.

use super::{PrivateBlock, RecvOutcome, ResetResult, StatusResult, Transport, Validity};
use crate::config::ConfigRow;
use crate::error::{Error, Result};
use crate::wire::{HEADER_LEN, MAX_PAYLOAD_LEN};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

/// Bytes 0..2 of [`PrivateBlock`] mark which variant this block holds so `send`/`recv` know
/// whether to treat it as a host (bound, listening) or a peer (destination-only) block.
const KIND_HOST: u8 = 0;
const KIND_PEER: u8 = 1;

fn encode_addr(kind: u8, addr: SocketAddr) -> PrivateBlock {
    let mut block = vec![kind];
    block.extend_from_slice(addr.to_string().as_bytes());
    block
}

/// Offset of the address bytes within a block: peer blocks carry only `[kind, addr...]`; host
/// blocks additionally carry the bound socket's index in `UdpTransport::sockets` right after the
/// kind byte, so `decode_addr` must skip it.
fn addr_offset(kind: u8) -> usize {
    if kind == KIND_HOST {
        2
    } else {
        1
    }
}

fn decode_addr(block: &PrivateBlock) -> Result<(u8, SocketAddr)> {
    if block.is_empty() {
        return Err(Error::TransportFault {
            peer: "udp".to_string(),
            reason: "empty private block".to_string(),
        });
    }
    let kind = block[0];
    let offset = addr_offset(kind);
    let addr_str = std::str::from_utf8(block.get(offset..).unwrap_or(&[])).map_err(|e| Error::TransportFault {
        peer: "udp".to_string(),
        reason: format!("malformed address bytes: {e}"),
    })?;
    let addr = addr_str.parse().map_err(|e| Error::TransportFault {
        peer: "udp".to_string(),
        reason: format!("unparsable address '{addr_str}': {e}"),
    })?;
    Ok((kind, addr))
}

fn host_socket_index(block: &PrivateBlock) -> usize {
    block.get(1).copied().unwrap_or(0) as usize
}

/// One socket per host entry, indexed by the order `init_host` was called.
#[derive(Default)]
pub struct UdpTransport {
    sockets: Vec<UdpSocket>,
}

impl UdpTransport {
    #[must_use]
    pub fn new() -> Self {
        UdpTransport::default()
    }

    fn bind(addr: SocketAddr) -> io::Result<UdpSocket> {
        let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        Ok(socket.into())
    }
}

impl Transport for UdpTransport {
    /// Expects a config row of `name, processor_id, spacecraft_id, host, port`.
    fn load_entry(&mut self, row: &ConfigRow) -> Result<(PrivateBlock, Validity)> {
        let fields = &row.fields;
        if fields.len() < 5 {
            return Ok((PrivateBlock::new(), Validity::Invalid));
        }
        let host = &fields[3];
        let port = &fields[4];
        let resolved = (host.as_str(), port.parse::<u16>().unwrap_or(0))
            .to_socket_addrs()
            .ok()
            .and_then(|mut it| it.next());

        match resolved {
            Some(addr) => Ok((encode_addr(KIND_PEER, addr), Validity::Valid)),
            None => Ok((PrivateBlock::new(), Validity::Invalid)),
        }
    }

    fn init_host(&mut self, block: &mut PrivateBlock) -> Result<()> {
        let (_, addr) = decode_addr(block)?;
        let socket = Self::bind(addr).map_err(|e| Error::Fatal(format!("bind {addr}: {e}")))?;
        self.sockets.push(socket);
        let idx = (self.sockets.len() - 1) as u8;
        block.clear();
        block.push(KIND_HOST);
        block.push(idx);
        block.extend_from_slice(addr.to_string().as_bytes());
        Ok(())
    }

    fn init_peer(&mut self, block: &mut PrivateBlock) -> Result<()> {
        // peer blocks carry their destination address already; nothing more to resolve.
        let (kind, _addr) = decode_addr(block)?;
        if kind != KIND_PEER {
            return Err(Error::ConfigInvalid {
                row: 0,
                reason: "init_peer called on a non-peer block".to_string(),
            });
        }
        Ok(())
    }

    fn send(&mut self, block: &mut PrivateBlock, frame: &[u8]) -> Result<()> {
        if frame.len() > HEADER_LEN + MAX_PAYLOAD_LEN {
            return Err(Error::PayloadOverflow {
                size: frame.len(),
                max: HEADER_LEN + MAX_PAYLOAD_LEN,
            });
        }
        let (_, addr) = decode_addr(block)?;
        let socket = self.sockets.first().ok_or_else(|| Error::TransportFault {
            peer: addr.to_string(),
            reason: "no local socket bound".to_string(),
        })?;
        socket.send_to(frame, addr).map_err(|e| Error::TransportFault {
            peer: addr.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn recv(&mut self, block: &mut PrivateBlock) -> Result<RecvOutcome> {
        let (kind, _addr) = decode_addr(block)?;
        if kind != KIND_HOST {
            return Ok(RecvOutcome::WouldBlock);
        }
        let idx = host_socket_index(block);
        let socket = self.sockets.get(idx).ok_or_else(|| Error::TransportFault {
            peer: "udp-host".to_string(),
            reason: "host socket index out of range".to_string(),
        })?;

        let mut buf = [0u8; HEADER_LEN + MAX_PAYLOAD_LEN];
        match socket.recv_from(&mut buf) {
            Ok((n, _src)) => {
                let (_, cpu_id, data) = crate::wire::unpack(&buf[..n], crate::wire::TimeWidth::SixByte)?;
                Ok(RecvOutcome::Frame { cpu_id, data })
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(RecvOutcome::WouldBlock),
            Err(e) => Err(Error::TransportFault {
                peer: "udp-host".to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn verify_peer(&mut self, block: &mut PrivateBlock) -> Result<Validity> {
        decode_addr(block).map(|_| Validity::Valid)
    }

    fn verify_host(&mut self, block: &mut PrivateBlock) -> Result<Validity> {
        decode_addr(block).map(|_| Validity::Valid)
    }

    fn report_status(&mut self, block: &mut PrivateBlock) -> Result<StatusResult> {
        match decode_addr(block) {
            Ok(_) => Ok(StatusResult::Healthy),
            Err(_) => Ok(StatusResult::Unreachable),
        }
    }

    fn reset_peer(&mut self, _block: &mut PrivateBlock) -> Result<ResetResult> {
        // UDP is connectionless; there is no per-peer socket state to tear down.
        Ok(ResetResult::NoOp)
    }
}
