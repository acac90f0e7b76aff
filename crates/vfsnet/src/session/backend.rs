// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Backend collaborator traits and the records they return.
//!
//! A [`Connector`] opens everything a pooled session owns in one call. The
//! pool never speaks a wire protocol itself, which lets tests plug in fakes
//! that count physical connects.

use super::Identity;
use crate::error::{Error, Result};
use std::fmt;
use std::time::Duration;

/// One recorded or scheduled program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub category: String,
    pub channel_id: u32,
    pub channel_number: String,
    pub callsign: String,
    pub channel_name: String,
    /// Backend file name or URL of the recording.
    pub path: String,
    pub size: Option<u64>,
    /// Start time, seconds since the Unix epoch.
    pub start: Option<u64>,
}

impl Program {
    /// `title` or `title: subtitle`.
    pub fn display_title(&self) -> String {
        if self.subtitle.is_empty() {
            self.title.clone()
        } else {
            format!("{}: {}", self.title, self.subtitle)
        }
    }
}

/// One tunable channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    pub id: u32,
    pub number: String,
    pub callsign: String,
    pub name: String,
}

/// Asynchronous backend event class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventCode {
    RecordingListChange,
    ScheduleChange,
    DoneRecording,
    AskRecording,
    LiveTvChain,
    QuitLiveTv,
    Signal,
    /// Event channel closed by the backend.
    Closed,
    Unknown(String),
}

impl EventCode {
    /// Map the leading word of a backend message to a code.
    pub fn from_word(word: &str) -> Self {
        match word {
            "RECORDING_LIST_CHANGE" => Self::RecordingListChange,
            "SCHEDULE_CHANGE" => Self::ScheduleChange,
            "DONE_RECORDING" => Self::DoneRecording,
            "ASK_RECORDING" => Self::AskRecording,
            "LIVETV_CHAIN" => Self::LiveTvChain,
            "QUIT_LIVETV" => Self::QuitLiveTv,
            "SIGNAL" => Self::Signal,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecordingListChange => write!(f, "RECORDING_LIST_CHANGE"),
            Self::ScheduleChange => write!(f, "SCHEDULE_CHANGE"),
            Self::DoneRecording => write!(f, "DONE_RECORDING"),
            Self::AskRecording => write!(f, "ASK_RECORDING"),
            Self::LiveTvChain => write!(f, "LIVETV_CHAIN"),
            Self::QuitLiveTv => write!(f, "QUIT_LIVETV"),
            Self::Signal => write!(f, "SIGNAL"),
            Self::Closed => write!(f, "CLOSED"),
            Self::Unknown(word) => write!(f, "{}", word),
        }
    }
}

/// Event read from the event channel: a code and an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEvent {
    pub code: EventCode,
    pub payload: String,
}

/// Request/response channel. Calls on one session are serialized by the pool.
pub trait ControlChannel: Send {
    fn recordings(&mut self) -> Result<Vec<Program>>;

    /// Best-effort goodbye before the connection is dropped.
    fn close(&mut self) {}
}

/// Blocking source of asynchronous backend events.
pub trait EventChannel: Send {
    /// Wait up to `timeout`. `Ok(None)` means nothing arrived; `Err` means the
    /// channel is unusable and the pump should stop.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<BackendEvent>>;
}

/// Channel and program-guide store (the backend's SQL database in practice).
pub trait GuideDatabase: Send {
    fn channels(&mut self) -> Result<Vec<Channel>>;
    fn guide(&mut self, channel_id: u32) -> Result<Vec<Program>>;
}

/// Receives events pumped from a session's event channel.
///
/// Called from the session's event thread, never with a pool lock held.
pub trait SessionListener: Send + Sync {
    fn on_event(&self, code: &EventCode, payload: &str);
}

/// Everything a new session owns.
pub struct Connection {
    pub control: Box<dyn ControlChannel>,
    pub events: Option<Box<dyn EventChannel>>,
    pub database: Option<Box<dyn GuideDatabase>>,
}

impl Connection {
    pub fn new(control: Box<dyn ControlChannel>) -> Self {
        Self {
            control,
            events: None,
            database: None,
        }
    }

    pub fn with_events(mut self, events: Box<dyn EventChannel>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_database(mut self, database: Box<dyn GuideDatabase>) -> Self {
        self.database = Some(database);
        self
    }
}

/// Opens backend connections for the pool.
pub trait Connector: Send + Sync {
    /// Open the control channel (required) plus the optional event channel and
    /// database. Must fail without side effects if the control channel fails.
    fn connect(&self, identity: &Identity) -> Result<Connection>;
}

/// Connector for builds without a backend protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConnector;

impl Connector for NoConnector {
    fn connect(&self, identity: &Identity) -> Result<Connection> {
        Err(Error::Unsupported(format!(
            "no backend connector for {}",
            identity
        )))
    }
}
