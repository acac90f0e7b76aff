// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SAP (Session Announcement Protocol) support.
//!
//! # Architecture
//!
//! ```text
//! SapListener (thread "vfsnet-sap-rx")
//!     v mio poll (<= 5 s) -> recv_from()
//! decode_announcement()          header.rs + sdp.rs, pure
//!     v
//! AnnouncementCache::apply()     Mutex<Vec<AnnouncementRecord>>
//!     v
//! AnnouncementCache::snapshot()  read by the sap:// provider
//! ```

pub mod cache;
pub mod header;
pub mod listener;
pub mod multicast;
pub mod sdp;

pub use cache::{
    child_paths, AnnouncementCache, AnnouncementRecord, CacheStats, RecordKey, UpdateOutcome,
};
pub use header::{decode_header, Header, MessageType};
pub use listener::SapListener;
pub use sdp::{decode_payload, payload_origin, MediaDescription, SessionDescription};

use crate::config::{SAP_MAX_PAYLOAD, SDP_MIME_TYPE};
use std::fmt;
use std::io::Read;

/// Announcement decode errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A field needed more bytes than were left.
    Truncated { needed: usize, available: usize },
    /// A bit set: 128-bit origin, recognized but not handled.
    Ipv6Unsupported,
    /// E bit set.
    Encrypted,
    /// C bit set but the payload did not inflate.
    Decompress,
    /// Inflated payload exceeds the configured cap.
    TooLarge { limit: usize },
    /// Payload type string has no NUL terminator.
    MissingPayloadType,
    InvalidUtf8,
    /// 1-based line number of a line that is not `k=value`.
    MalformedLine(usize),
    MissingVersion,
    MissingOrigin,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Truncated { needed, available } => write!(
                f,
                "truncated data: needed {} bytes, {} available",
                needed, available
            ),
            ParseError::Ipv6Unsupported => write!(f, "IPv6 origin not supported"),
            ParseError::Encrypted => write!(f, "encrypted announcement"),
            ParseError::Decompress => write!(f, "compressed payload failed to inflate"),
            ParseError::TooLarge { limit } => {
                write!(f, "inflated payload exceeds {} bytes", limit)
            }
            ParseError::MissingPayloadType => write!(f, "payload type not NUL-terminated"),
            ParseError::InvalidUtf8 => write!(f, "invalid UTF-8"),
            ParseError::MalformedLine(n) => write!(f, "malformed description line {}", n),
            ParseError::MissingVersion => write!(f, "description does not start with v="),
            ParseError::MissingOrigin => write!(f, "second description line is not o="),
        }
    }
}

impl std::error::Error for ParseError {}

/// A fully decoded datagram.
#[derive(Debug, Clone)]
pub struct Announcement {
    pub header: Header,
    /// Payload bytes after the type string (inflated if compressed).
    pub payload: Vec<u8>,
    /// `o=` of the payload, the third identity component (empty if absent).
    pub payload_origin: String,
    /// Decoded description when the payload type is SDP and it parsed.
    pub description: Option<SessionDescription>,
}

impl Announcement {
    pub fn is_sdp(&self) -> bool {
        self.header.payload_type == SDP_MIME_TYPE
    }
}

/// Decode one SAP datagram: header, optional inflate, payload type, SDP.
///
/// Announce packets with an SDP payload must carry a valid description;
/// deletes only need an `o=` line. Other payload types are returned with no
/// description so the cache can still use their identity.
pub fn decode_announcement(buf: &[u8]) -> Result<Announcement, ParseError> {
    decode_announcement_with_limit(buf, SAP_MAX_PAYLOAD)
}

/// [`decode_announcement`] with an explicit cap on the inflated payload.
pub fn decode_announcement_with_limit(
    buf: &[u8],
    max_payload: usize,
) -> Result<Announcement, ParseError> {
    let (mut header, offset) = decode_header(buf)?;

    if header.encrypted {
        return Err(ParseError::Encrypted);
    }

    let payload = if header.compressed {
        let mut inflated = Vec::new();
        flate2::read::ZlibDecoder::new(&buf[offset..])
            .take(max_payload as u64 + 1)
            .read_to_end(&mut inflated)
            .map_err(|e| {
                log::debug!("[sap] inflate failed msgid=0x{:04x}: {}", header.msg_id, e);
                ParseError::Decompress
            })?;
        if inflated.len() > max_payload {
            log::debug!(
                "[sap] msgid=0x{:04x} inflates past {} bytes, dropped",
                header.msg_id,
                max_payload
            );
            return Err(ParseError::TooLarge { limit: max_payload });
        }
        let (payload_type, body) = header::split_payload_type(&inflated)?;
        header.payload_type = payload_type;
        inflated.split_off(body)
    } else {
        buf[offset..].to_vec()
    };

    let is_sdp = header.payload_type == SDP_MIME_TYPE;
    let description = if is_sdp && !header.is_delete() {
        Some(decode_payload(&payload)?)
    } else {
        None
    };
    let payload_origin = match &description {
        Some(desc) => desc.origin.clone(),
        None => payload_origin(&payload).unwrap_or_default(),
    };

    Ok(Announcement {
        header,
        payload,
        payload_origin,
        description,
    })
}

/// Build a datagram (header + payload), compressing when asked.
pub fn encode_announcement(header: &Header, payload: &[u8]) -> std::io::Result<Vec<u8>> {
    use std::io::Write;

    if !header.compressed {
        let mut out = header.encode();
        out.extend_from_slice(payload);
        return Ok(out);
    }

    // Fixed part only; the type string travels inside the compressed body.
    let mut out = header.encode();
    out.truncate(8 + header.auth_len as usize);

    let mut body = header.payload_type.as_bytes().to_vec();
    body.push(0);
    body.extend_from_slice(payload);

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&body)?;
    out.extend_from_slice(&encoder.finish()?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const SDP: &[u8] = b"v=0\r\no=- 1 1 IN IP4 10.0.0.1\r\ns=Test\r\n";

    #[test]
    fn test_minimal_announce_datagram() {
        // version 0, IPv4, announce, no auth, implicit payload type
        let mut buf = vec![0x00, 0x00, 0x00, 0x01, 10, 0, 0, 1];
        buf.extend_from_slice(SDP);

        let ann = decode_announcement(&buf).unwrap();
        assert_eq!(ann.header.origin, Ipv4Addr::new(10, 0, 0, 1));
        assert!(ann.is_sdp());
        let desc = ann.description.unwrap();
        assert_eq!(desc.origin, "- 1 1 IN IP4 10.0.0.1");
        assert_eq!(desc.name, "Test");
        assert_eq!(ann.payload_origin, "- 1 1 IN IP4 10.0.0.1");
    }

    #[test]
    fn test_compressed_roundtrip() {
        let mut header = Header::announce(Ipv4Addr::new(192, 168, 1, 9), 0xBEEF);
        header.compressed = true;
        let buf = encode_announcement(&header, SDP).unwrap();

        let ann = decode_announcement(&buf).unwrap();
        assert!(ann.header.compressed);
        assert_eq!(ann.header.payload_type, SDP_MIME_TYPE);
        assert_eq!(ann.payload, SDP);
        assert_eq!(ann.description.unwrap().name, "Test");
    }

    #[test]
    fn test_garbage_compressed_payload() {
        let buf = vec![0x21, 0, 0, 1, 10, 0, 0, 1, 0xde, 0xad, 0xbe, 0xef];
        assert_eq!(decode_announcement(&buf).unwrap_err(), ParseError::Decompress);
    }

    #[test]
    fn test_encrypted_rejected() {
        let buf = vec![0x22, 0, 0, 1, 10, 0, 0, 1, 1, 2, 3];
        assert_eq!(decode_announcement(&buf).unwrap_err(), ParseError::Encrypted);
    }

    #[test]
    fn test_delete_with_origin_only() {
        let header = Header::delete(Ipv4Addr::new(10, 0, 0, 1), 1);
        let buf = encode_announcement(&header, b"o=- 1 1 IN IP4 10.0.0.1\r\n").unwrap();
        let ann = decode_announcement(&buf).unwrap();
        assert!(ann.header.is_delete());
        assert!(ann.description.is_none());
        assert_eq!(ann.payload_origin, "- 1 1 IN IP4 10.0.0.1");
    }

    #[test]
    fn test_other_payload_type_kept_for_identity() {
        let mut header = Header::announce(Ipv4Addr::new(10, 0, 0, 2), 3);
        header.payload_type = "text/plain".to_string();
        let buf = encode_announcement(&header, b"hello").unwrap();
        let ann = decode_announcement(&buf).unwrap();
        assert!(!ann.is_sdp());
        assert!(ann.description.is_none());
        assert_eq!(ann.payload, b"hello");
    }

    #[test]
    fn test_inflate_is_capped() {
        let mut sdp = SDP.to_vec();
        while sdp.len() <= SAP_MAX_PAYLOAD {
            sdp.extend_from_slice(b"a=x-filler:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n");
        }
        let mut header = Header::announce(Ipv4Addr::new(10, 0, 0, 3), 4);
        header.compressed = true;
        let buf = encode_announcement(&header, &sdp).unwrap();
        assert!(buf.len() < 64 * 1024, "fits in one datagram");

        assert_eq!(
            decode_announcement(&buf).unwrap_err(),
            ParseError::TooLarge {
                limit: SAP_MAX_PAYLOAD
            }
        );
        let ann = decode_announcement_with_limit(&buf, 2 * SAP_MAX_PAYLOAD).unwrap();
        assert_eq!(ann.payload.len(), sdp.len());
    }
}
