// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SAP packet header (RFC 2974 Sec.6).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | V=1 |A|R|T|E|C|   auth len    |         msg id hash           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! :                originating source (32 or 128 bits)            :
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    optional authentication data               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      optional payload type                    |
//! +                                         +-+- - - - - - - - - -+
//! |                                         |0|                   |
//! + - - - - - - - - - - - - - - - - - - - - +-+                   |
//! |                            payload                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The auth length is taken as a byte count. Every field read goes through
//! [`Cursor`], which checks bounds first and reports how much was missing.

use super::ParseError;
use crate::config::SDP_MIME_TYPE;
use std::net::Ipv4Addr;

/// Message type bit (T).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Announce,
    Delete,
}

/// Decoded SAP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    /// A bit: false = IPv4 origin, true = IPv6 origin.
    pub ipv6: bool,
    pub message_type: MessageType,
    pub encrypted: bool,
    pub compressed: bool,
    pub auth_len: u8,
    pub msg_id: u16,
    pub origin: Ipv4Addr,
    /// Payload MIME type (implicit `application/sdp` when the payload starts with `v=0`).
    pub payload_type: String,
}

impl Header {
    /// Convenience constructor for an uncompressed, unauthenticated SDP announce.
    pub fn announce(origin: Ipv4Addr, msg_id: u16) -> Self {
        Self {
            version: 1,
            ipv6: false,
            message_type: MessageType::Announce,
            encrypted: false,
            compressed: false,
            auth_len: 0,
            msg_id,
            origin,
            payload_type: SDP_MIME_TYPE.to_string(),
        }
    }

    /// Same header with the T bit set.
    pub fn delete(origin: Ipv4Addr, msg_id: u16) -> Self {
        Self {
            message_type: MessageType::Delete,
            ..Self::announce(origin, msg_id)
        }
    }

    pub fn is_delete(&self) -> bool {
        self.message_type == MessageType::Delete
    }

    /// First header byte, bit-packed V(3) A R T E C.
    pub fn flags(&self) -> u8 {
        ((self.version & 0x07) << 5)
            | (u8::from(self.ipv6) << 4)
            | (u8::from(self.message_type == MessageType::Delete) << 2)
            | (u8::from(self.encrypted) << 1)
            | u8::from(self.compressed)
    }

    /// Encode the header (without auth data contents, which are zero-filled).
    ///
    /// The payload type string is written explicitly with its NUL terminator.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.auth_len as usize + self.payload_type.len() + 1);
        out.push(self.flags());
        out.push(self.auth_len);
        out.extend_from_slice(&self.msg_id.to_be_bytes());
        out.extend_from_slice(&self.origin.octets());
        out.resize(out.len() + self.auth_len as usize, 0);
        out.extend_from_slice(self.payload_type.as_bytes());
        out.push(0);
        out
    }
}

/// Bounds-checked reader over a datagram.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        let available = self.buf.len() - self.pos;
        if available < n {
            return Err(ParseError::Truncated {
                needed: n,
                available,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    fn u16_be(&mut self) -> Result<u16, ParseError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }
}

/// Decode a SAP header.
///
/// Returns the header and the offset where the payload starts.
///
/// # Errors
/// - `ParseError::Truncated` if any fixed field or the auth data is cut short.
/// - `ParseError::Ipv6Unsupported` when the A bit announces an IPv6 origin.
/// - `ParseError::MissingPayloadType` when the type string has no NUL terminator.
pub fn decode_header(buf: &[u8]) -> Result<(Header, usize), ParseError> {
    let mut cur = Cursor::new(buf);

    let flags = cur.u8()?;
    let auth_len = cur.u8()?;
    let msg_id = cur.u16_be()?;

    let version = (flags >> 5) & 0x07;
    let ipv6 = (flags >> 4) & 0x01 == 1;
    let message_type = if (flags >> 2) & 0x01 == 1 {
        MessageType::Delete
    } else {
        MessageType::Announce
    };
    let encrypted = (flags >> 1) & 0x01 == 1;
    let compressed = flags & 0x01 == 1;

    if ipv6 {
        log::debug!("[sap] IPv6 origin in announcement msgid=0x{:04x}", msg_id);
        return Err(ParseError::Ipv6Unsupported);
    }

    let o = cur.take(4)?;
    let origin = Ipv4Addr::new(o[0], o[1], o[2], o[3]);

    cur.take(auth_len as usize)?;

    let payload_type = if compressed || encrypted {
        // Type string lives inside the transformed payload.
        String::new()
    } else {
        read_payload_type(&mut cur)?
    };

    Ok((
        Header {
            version,
            ipv6,
            message_type,
            encrypted,
            compressed,
            auth_len,
            msg_id,
            origin,
            payload_type,
        },
        cur.pos,
    ))
}

/// Read the optional payload type. `v=0` at the start means implicit SDP and
/// consumes nothing.
fn read_payload_type(cur: &mut Cursor<'_>) -> Result<String, ParseError> {
    let rest = cur.remaining();
    if rest.starts_with(b"v=0") {
        return Ok(SDP_MIME_TYPE.to_string());
    }
    let Some(nul) = rest.iter().position(|&b| b == 0) else {
        return Err(ParseError::MissingPayloadType);
    };
    let raw = cur.take(nul + 1)?;
    std::str::from_utf8(&raw[..nul])
        .map(str::to_string)
        .map_err(|_| ParseError::InvalidUtf8)
}

/// Split an inflated payload into (payload type, body) the same way the
/// uncompressed path does.
pub(crate) fn split_payload_type(payload: &[u8]) -> Result<(String, usize), ParseError> {
    let mut cur = Cursor::new(payload);
    let payload_type = read_payload_type(&mut cur)?;
    Ok((payload_type, cur.pos))
}
