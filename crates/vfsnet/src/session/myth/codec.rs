// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefixed token framing.

use crate::config::{MYTH_LENGTH_PREFIX, MYTH_TOKEN_SEPARATOR};
use crate::error::{Error, Result};
use std::io::{Read, Write};

/// Frame `tokens` as one message.
pub fn encode_message<S: AsRef<str>>(tokens: &[S]) -> Vec<u8> {
    let body = tokens
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(MYTH_TOKEN_SEPARATOR);
    let mut out = format!("{:<width$}", body.len(), width = MYTH_LENGTH_PREFIX).into_bytes();
    out.extend_from_slice(body.as_bytes());
    out
}

pub fn write_message<W: Write, S: AsRef<str>>(w: &mut W, tokens: &[S]) -> Result<()> {
    w.write_all(&encode_message(tokens))?;
    w.flush()?;
    Ok(())
}

/// Parse the length prefix.
pub(crate) fn parse_length(prefix: &[u8], max: usize) -> Result<usize> {
    let text = std::str::from_utf8(prefix)
        .map_err(|_| Error::Protocol("length prefix is not ASCII".into()))?;
    let len = text
        .trim()
        .parse::<usize>()
        .map_err(|_| Error::Protocol(format!("bad length prefix {:?}", text)))?;
    if len > max {
        return Err(Error::Protocol(format!(
            "message of {} bytes exceeds limit of {}",
            len, max
        )));
    }
    Ok(len)
}

/// Read one message and split it into tokens.
///
/// # Errors
/// - `Error::Io` on read failure or EOF mid-message.
/// - `Error::Protocol` for a malformed prefix or a body over `max` bytes.
pub fn read_message<R: Read>(r: &mut R, max: usize) -> Result<Vec<String>> {
    let mut prefix = [0u8; MYTH_LENGTH_PREFIX];
    r.read_exact(&mut prefix)?;
    let len = parse_length(&prefix, max)?;

    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;
    let body = String::from_utf8_lossy(&body);
    Ok(body.split(MYTH_TOKEN_SEPARATOR).map(str::to_string).collect())
}
