// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SDP session description decoder (RFC 4566 subset).
//!
//! Line oriented: `<type>=<value>` with a single-character type, lines ending
//! in `\r\n` or `\n`. The first line must be `v=`, the second `o=`. Everything
//! after the first `m=` line belongs to a media block until the next `m=`.

use super::ParseError;

/// One `m=` block with its own sub-lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaDescription {
    /// `m=` value, e.g. `video 5004 RTP/AVP 33`.
    pub media: String,
    /// `i=` media title.
    pub title: Option<String>,
    /// `c=` connection data.
    pub connection: Option<String>,
    /// `b=` lines.
    pub bandwidths: Vec<String>,
    /// `a=` lines.
    pub attributes: Vec<String>,
}

/// `t=` line with the `r=` lines that follow it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeDescription {
    pub time: String,
    pub repeats: Vec<String>,
}

/// Decoded session description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDescription {
    pub version: String,
    /// `o=` value; part of the announcement identity.
    pub origin: String,
    /// `s=` session name, used as the entry label.
    pub name: String,
    pub info: Option<String>,
    pub uri: Option<String>,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub connection: Option<String>,
    pub bandwidths: Vec<String>,
    pub times: Vec<TimeDescription>,
    pub timezone: Option<String>,
    pub key: Option<String>,
    pub attributes: Vec<String>,
    pub media: Vec<MediaDescription>,
}

impl SessionDescription {
    /// Multicast/unicast address from the session or first media `c=` line
    /// (`IN IP4 239.1.2.3/127` -> `239.1.2.3`).
    pub fn connection_address(&self) -> Option<&str> {
        let conn = self
            .connection
            .as_deref()
            .or_else(|| self.media.iter().find_map(|m| m.connection.as_deref()))?;
        let addr = conn.split_whitespace().nth(2)?;
        Some(addr.split('/').next().unwrap_or(addr))
    }

    /// Stream URL for the first media block, e.g. `rtp://239.1.2.3:5004`.
    pub fn first_media_url(&self) -> Option<String> {
        let media = self.media.first()?;
        let mut fields = media.media.split_whitespace();
        let _kind = fields.next()?;
        let port = fields.next()?.split('/').next()?.parse::<u16>().ok()?;
        let proto = fields.next()?;
        let scheme = if proto.starts_with("RTP") { "rtp" } else { "udp" };
        Some(format!("{}://@{}:{}", scheme, self.connection_address()?, port))
    }
}

/// Iterate `(line number, key, value)` over non-empty lines.
fn lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .enumerate()
        .filter(|(_, l)| !l.is_empty())
}

fn split_line(idx: usize, line: &str) -> Result<(char, &str), ParseError> {
    let mut chars = line.chars();
    match (chars.next(), chars.next()) {
        (Some(key), Some('=')) => Ok((key, &line[key.len_utf8() + 1..])),
        _ => Err(ParseError::MalformedLine(idx + 1)),
    }
}

/// Decode an SDP payload.
///
/// # Errors
/// - `ParseError::InvalidUtf8` if the payload is not text.
/// - `ParseError::MissingVersion` / `ParseError::MissingOrigin` if the first
///   two lines are not `v=` and `o=`.
/// - `ParseError::MalformedLine(n)` for a line that is not `k=value`.
pub fn decode_payload(payload: &[u8]) -> Result<SessionDescription, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|_| ParseError::InvalidUtf8)?;
    let mut it = lines(text);

    let mut desc = SessionDescription::default();

    match it.next() {
        Some((idx, line)) => match split_line(idx, line)? {
            ('v', value) => desc.version = value.to_string(),
            _ => return Err(ParseError::MissingVersion),
        },
        None => return Err(ParseError::MissingVersion),
    }

    match it.next() {
        Some((idx, line)) => match split_line(idx, line)? {
            ('o', value) => desc.origin = value.to_string(),
            _ => return Err(ParseError::MissingOrigin),
        },
        None => return Err(ParseError::MissingOrigin),
    }

    for (idx, line) in it {
        let (key, value) = split_line(idx, line)?;
        let value = value.to_string();

        if let Some(media) = desc.media.last_mut() {
            match key {
                'm' => {}
                'i' => {
                    media.title = Some(value);
                    continue;
                }
                'c' => {
                    media.connection = Some(value);
                    continue;
                }
                'b' => {
                    media.bandwidths.push(value);
                    continue;
                }
                'a' => {
                    media.attributes.push(value);
                    continue;
                }
                // k= and unknown keys inside media blocks are not kept.
                _ => continue,
            }
        }

        match key {
            's' => desc.name = value,
            'i' => desc.info = Some(value),
            'u' => desc.uri = Some(value),
            'e' => desc.emails.push(value),
            'p' => desc.phones.push(value),
            'c' => desc.connection = Some(value),
            'b' => desc.bandwidths.push(value),
            't' => desc.times.push(TimeDescription {
                time: value,
                repeats: Vec::new(),
            }),
            'r' => match desc.times.last_mut() {
                Some(t) => t.repeats.push(value),
                None => log::debug!("[sdp] r= line {} without preceding t=", idx + 1),
            },
            'z' => desc.timezone = Some(value),
            'k' => desc.key = Some(value),
            'a' => desc.attributes.push(value),
            'm' => desc.media.push(MediaDescription {
                media: value,
                ..MediaDescription::default()
            }),
            other => log::debug!("[sdp] ignoring unknown key '{}' on line {}", other, idx + 1),
        }
    }

    Ok(desc)
}

/// Extract the `o=` value without requiring a full description.
///
/// Delete announcements may carry only the origin line.
pub fn payload_origin(payload: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(payload).ok()?;
    lines(text)
        .find_map(|(_, l)| l.strip_prefix("o="))
        .map(str::to_string)
}
