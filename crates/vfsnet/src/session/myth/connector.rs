// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP connector for MythTV-style backends.
//!
//! A session opens two sockets to the same backend:
//!
//! ```text
//! control: MYTH_PROTO_VERSION n -> ACCEPT | REJECT
//!          ANN Playback <client> 0 -> OK
//!          QUERY_RECORDINGS Play -> count, count * proginfo_fields tokens
//! events:  MYTH_PROTO_VERSION n -> ACCEPT
//!          ANN Monitor <client> 1 -> OK
//!          <- BACKEND_MESSAGE[]:[]<WORD args>[]:[]...
//! ```
//!
//! The event socket is optional: if it cannot be opened the session still
//! serves queries, only without change notifications.

use super::codec::{parse_length, read_message, write_message};
use crate::config::{MythConfig, MYTH_LENGTH_PREFIX};
use crate::error::{Error, Result};
use crate::session::backend::{
    BackendEvent, Connection, Connector, ControlChannel, EventChannel, EventCode, GuideDatabase,
    Program,
};
use crate::session::Identity;
use std::io::{self, Read};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

/// Opens the guide database for an identity.
pub type DatabaseFactory = Arc<dyn Fn(&Identity) -> Result<Box<dyn GuideDatabase>> + Send + Sync>;

/// Connector speaking the length-prefixed backend protocol.
pub struct MythConnector {
    config: MythConfig,
    database: Option<DatabaseFactory>,
}

#[derive(Clone, Copy)]
enum Role {
    Playback,
    Monitor,
}

impl MythConnector {
    pub fn new(config: MythConfig) -> Self {
        Self {
            config,
            database: None,
        }
    }

    /// Attach a guide database factory (channels, program guide).
    pub fn with_database(mut self, factory: DatabaseFactory) -> Self {
        self.database = Some(factory);
        self
    }

    /// TCP connect with retries; waits `backoff(n)` after attempt `n` fails.
    fn dial(&self, identity: &Identity) -> Result<TcpStream> {
        let addrs: Vec<_> = identity
            .address()
            .to_socket_addrs()
            .map_err(|e| Error::connect(identity.address(), e))?
            .collect();
        if addrs.is_empty() {
            return Err(Error::connect(identity.address(), "no addresses resolved"));
        }

        let attempts = self.config.connect_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            for addr in &addrs {
                match TcpStream::connect_timeout(addr, self.config.connect_timeout()) {
                    Ok(stream) => {
                        stream.set_read_timeout(Some(self.config.read_timeout()))?;
                        stream.set_write_timeout(Some(self.config.read_timeout()))?;
                        stream.set_nodelay(true)?;
                        return Ok(stream);
                    }
                    Err(e) => {
                        log::debug!(
                            "[myth] connect {} attempt {}/{} failed: {}",
                            addr,
                            attempt,
                            attempts,
                            e
                        );
                        last_err = Some(e);
                    }
                }
            }
            if attempt < attempts {
                std::thread::sleep(self.config.backoff(attempt));
            }
        }
        Err(Error::connect(
            identity.address(),
            last_err.map_or_else(|| "unreachable".to_string(), |e| e.to_string()),
        ))
    }

    fn handshake(&self, stream: &mut TcpStream) -> Result<()> {
        let version = self.config.protocol_version;
        write_message(stream, &[format!("MYTH_PROTO_VERSION {}", version)])?;
        let reply = read_message(stream, self.config.max_message_size)?;
        match reply.first().map(String::as_str) {
            Some("ACCEPT") => Ok(()),
            Some("REJECT") => Err(Error::Rejected(format!(
                "protocol {} refused, backend speaks {}",
                version,
                reply.get(1).map_or("?", String::as_str)
            ))),
            _ => Err(Error::Protocol(format!("unexpected handshake reply {:?}", reply))),
        }
    }

    fn announce(&self, stream: &mut TcpStream, role: Role) -> Result<()> {
        let ann = match role {
            Role::Playback => format!("ANN Playback {} 0", self.config.client_name),
            Role::Monitor => format!("ANN Monitor {} 1", self.config.client_name),
        };
        write_message(stream, &[ann.as_str()])?;
        let reply = read_message(stream, self.config.max_message_size)?;
        if reply.first().map(String::as_str) == Some("OK") {
            Ok(())
        } else {
            Err(Error::Protocol(format!("'{}' answered {:?}", ann, reply)))
        }
    }

    fn open(&self, identity: &Identity, role: Role) -> Result<TcpStream> {
        let mut stream = self.dial(identity)?;
        self.handshake(&mut stream)?;
        self.announce(&mut stream, role)?;
        Ok(stream)
    }
}

impl Connector for MythConnector {
    fn connect(&self, identity: &Identity) -> Result<Connection> {
        let control = self.open(identity, Role::Playback)?;
        log::debug!("[myth] control channel up for {}", identity);

        let mut connection = Connection::new(Box::new(MythControl {
            stream: control,
            fields: self.config.proginfo_fields,
            max_message: self.config.max_message_size,
        }));

        match self.open(identity, Role::Monitor) {
            Ok(stream) => {
                connection = connection.with_events(Box::new(MythEvents {
                    stream,
                    read_timeout: self.config.read_timeout(),
                    max_message: self.config.max_message_size,
                }));
            }
            Err(e) => log::warn!("[myth] no event channel for {}: {}", identity, e),
        }

        if let Some(factory) = &self.database {
            match factory(identity) {
                Ok(db) => connection = connection.with_database(db),
                Err(e) => log::warn!("[myth] guide database unavailable for {}: {}", identity, e),
            }
        }
        Ok(connection)
    }
}

/// Control socket after the Playback announcement.
struct MythControl {
    stream: TcpStream,
    fields: usize,
    max_message: usize,
}

impl ControlChannel for MythControl {
    fn recordings(&mut self) -> Result<Vec<Program>> {
        write_message(&mut self.stream, &["QUERY_RECORDINGS Play"])?;
        let tokens = read_message(&mut self.stream, self.max_message)?;
        parse_program_list(&tokens, self.fields)
    }

    fn close(&mut self) {
        let _ = write_message(&mut self.stream, &["DONE"]);
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Decode `count, fields * count tokens` into programs.
pub(crate) fn parse_program_list(tokens: &[String], fields: usize) -> Result<Vec<Program>> {
    let count: usize = tokens
        .first()
        .and_then(|t| t.trim().parse().ok())
        .ok_or_else(|| Error::Protocol("program list without count".into()))?;
    if fields == 0 {
        return Err(Error::Protocol("program info width is zero".into()));
    }
    let body = &tokens[1..];
    if count.checked_mul(fields).map_or(true, |needed| body.len() < needed) {
        return Err(Error::Protocol(format!(
            "program list announces {} records but carries {} tokens",
            count,
            body.len()
        )));
    }
    Ok(body
        .chunks_exact(fields)
        .take(count)
        .map(parse_program)
        .collect())
}

fn parse_program(f: &[String]) -> Program {
    let text = |i: usize| f.get(i).cloned().unwrap_or_default();
    let size = match (f.get(9), f.get(10)) {
        (Some(hi), Some(lo)) => match (hi.parse::<i64>(), lo.parse::<i64>()) {
            // Low word is sent as a signed 32-bit value.
            (Ok(hi), Ok(lo)) => Some(((hi as u64) << 32) | u64::from(lo as u32)),
            _ => None,
        },
        _ => None,
    };
    Program {
        title: text(0),
        subtitle: text(1),
        description: text(2),
        category: text(3),
        channel_id: f.get(4).and_then(|s| s.parse().ok()).unwrap_or_default(),
        channel_number: text(5),
        callsign: text(6),
        channel_name: text(7),
        path: text(8),
        size,
        start: f.get(11).and_then(|s| s.parse().ok()),
    }
}

/// Event socket after the Monitor announcement.
struct MythEvents {
    stream: TcpStream,
    read_timeout: Duration,
    max_message: usize,
}

impl EventChannel for MythEvents {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<BackendEvent>> {
        // Only the first prefix byte waits for `timeout`; once a message has
        // started, the rest is read under the normal read timeout.
        self.stream.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        let mut first = [0u8; 1];
        match self.stream.read(&mut first) {
            Ok(0) => return Err(Error::Io(io::ErrorKind::UnexpectedEof.into())),
            Ok(_) => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
        self.stream.set_read_timeout(Some(self.read_timeout))?;

        let mut prefix = [0u8; MYTH_LENGTH_PREFIX];
        prefix[0] = first[0];
        self.stream.read_exact(&mut prefix[1..])?;
        let len = parse_length(&prefix, self.max_message)?;
        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body)?;
        let body = String::from_utf8_lossy(&body);
        let tokens: Vec<&str> = body.split(crate::config::MYTH_TOKEN_SEPARATOR).collect();
        Ok(parse_backend_message(&tokens))
    }
}

/// `BACKEND_MESSAGE[]:[]WORD args...` -> event. Other messages are ignored.
pub(crate) fn parse_backend_message(tokens: &[&str]) -> Option<BackendEvent> {
    if tokens.first() != Some(&"BACKEND_MESSAGE") {
        log::debug!("[myth] ignoring non-event message {:?}", tokens.first());
        return None;
    }
    let message = tokens.get(1)?.trim();
    let (word, payload) = message.split_once(' ').unwrap_or((message, ""));
    Some(BackendEvent {
        code: EventCode::from_word(word),
        payload: payload.trim().to_string(),
    })
}
