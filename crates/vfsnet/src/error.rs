// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Errors returned by sessions, providers and the dispatcher.
//!
//! A directory listing that fails for any of these reasons is reported to the
//! caller as `Err`, which the UI renders as "directory unavailable" rather
//! than "directory empty".

use crate::sap::ParseError;
use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Control or event channel could not be opened.
    #[error("Connection to {target} failed: {reason}")]
    Connect { target: String, reason: String },

    /// Malformed backend reply.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Backend refused the handshake (e.g. protocol version mismatch).
    #[error("Backend rejected request: {0}")]
    Rejected(String),

    #[error("Announcement decode error: {0}")]
    Decode(#[from] ParseError),

    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),

    /// Sub-path the provider does not know how to serve.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation needs a collaborator that is not configured.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Every aggregated source failed.
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Convenient alias for results using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub(crate) fn connect(target: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Connect {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}
