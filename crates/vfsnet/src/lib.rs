// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # vfsnet - network backends behind a virtual directory tree
//!
//! The session and dispatch layer of a media-center virtual filesystem. One
//! hierarchical "directory" abstraction is backed by live state pulled from
//! stateful remote services instead of a local disk.
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                    ProtocolDispatcher::create(url)                  |
//! |   scheme table -> availability gate (feature, network) -> Provider  |
//! +---------------------------------------------------------------------+
//! |                          DirectoryProvider                          |
//! |   Local | Special | Myth | Sap | Union (multipath/virtualpath) | Ext |
//! +---------------------------------+-----------------------------------+
//! |          SessionPool            |        AnnouncementCache          |
//! |  identity -> refcounted Session |  SAP listener thread -> records   |
//! |  per-session event pump thread  |  (origin, msgid, sdp origin) key  |
//! +---------------------------------+-----------------------------------+
//! |   Connector (MythConnector)     |   sap::header + sap::sdp decoders |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vfsnet::{NetContext, ProtocolDispatcher, VfsConfig, VfsUrl, DirectoryProvider};
//!
//! fn main() -> vfsnet::Result<()> {
//!     let context = Arc::new(NetContext::new(VfsConfig::default()));
//!     let dispatcher = ProtocolDispatcher::new(Arc::clone(&context));
//!
//!     let url = VfsUrl::parse("sap://")?;
//!     if let Some(provider) = dispatcher.create(&url) {
//!         for entry in provider.get_directory(&url)? {
//!             println!("{} -> {}", entry.label, entry.path);
//!         }
//!     }
//!
//!     context.shutdown();
//!     Ok(())
//! }
//! ```

/// Runtime configuration (defaults, TOML loading, validation).
pub mod config;
/// Owned registries shared by all providers.
pub mod context;
/// Scheme -> provider dispatch table.
pub mod dispatch;
/// Crate-wide error type.
pub mod error;
/// Directory provider contract and the built-in providers.
pub mod provider;
/// SAP/SDP announcement decoding, cache and multicast listener.
pub mod sap;
/// Pooled, reference-counted backend sessions.
pub mod session;
/// Virtual URL parsing and percent-encoding.
pub mod url;

pub use config::{ConfigError, VfsConfig};
pub use context::NetContext;
pub use dispatch::{ExternalProviders, ProtocolDispatcher};
pub use error::{Error, Result};
pub use provider::{DirEntry, DirectoryProvider, Provider};
pub use sap::{AnnouncementCache, AnnouncementRecord, ParseError, SessionDescription};
pub use session::{Identity, SessionHandle, SessionListener, SessionPool};
pub use url::VfsUrl;
