// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! vfsnet configuration - single source of defaults.
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: protocol constants (SAP port and groups, TTLs, timeouts)
//! - **Level 2 (Dynamic)**: [`VfsConfig`], loaded from TOML or built in code
//!
//! # Example
//!
//! ```toml
//! [session]
//! idle_grace_secs = 120
//!
//! [sap]
//! ttl_secs = 1800
//!
//! [dispatch]
//! network_available = true
//!
//! [dispatch.virtual_paths]
//! tv = ["myth://mythtv@backend/recordings/", "sap://"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// =======================================================================
// SAP (RFC 2974)
// =======================================================================

/// Well-known SAP port.
pub const SAP_PORT: u16 = 9875;

/// Global scope announcement group.
pub const SAP_V4_GLOBAL: Ipv4Addr = Ipv4Addr::new(224, 2, 127, 254);

/// Organization-local scope announcement group.
pub const SAP_V4_ORG: Ipv4Addr = Ipv4Addr::new(239, 195, 255, 255);

/// Local scope announcement group.
pub const SAP_V4_LOCAL: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 255);

/// Link-local scope announcement group.
pub const SAP_V4_LINK: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 255);

/// Lifetime granted to an announcement on every (re)announce.
pub const SAP_RECORD_TTL_SECS: u64 = 60 * 60;

/// Upper bound on a blocking wait in the listener loop.
pub const SAP_POLL_TIMEOUT_SECS: u64 = 5;

/// Largest datagram the listener will read.
pub const SAP_MAX_DATAGRAM: usize = 65_535;

/// Largest announcement payload accepted after zlib inflate.
pub const SAP_MAX_PAYLOAD: usize = 256 * 1024;

/// Only payloads of this type are cached.
pub const SDP_MIME_TYPE: &str = "application/sdp";

// =======================================================================
// Sessions
// =======================================================================

/// Grace window before an unreferenced session is reaped.
pub const SESSION_IDLE_GRACE_SECS: u64 = 5 * 60;

/// Event channel read timeout; bounds how long a stop request may wait.
pub const SESSION_EVENT_POLL_MS: u64 = 1000;

// =======================================================================
// MythTV-style backend
// =======================================================================

/// Default backend control port.
pub const MYTH_DEFAULT_PORT: u16 = 6543;

/// Protocol version announced in the handshake.
pub const MYTH_PROTOCOL_VERSION: u32 = 40;

/// Token separator inside a framed message.
pub const MYTH_TOKEN_SEPARATOR: &str = "[]:[]";

/// Width of the ASCII length prefix.
pub const MYTH_LENGTH_PREFIX: usize = 8;

/// Number of tokens per program record in list replies.
pub const MYTH_PROGINFO_FIELDS: usize = 47;

// =======================================================================
// Dispatch
// =======================================================================

/// Maximum nesting of wrapper URLs (filereader, multipath, virtualpath).
pub const DISPATCH_MAX_NESTING: usize = 4;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VfsConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub sap: SapConfig,
    #[serde(default)]
    pub myth: MythConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub sort: SortConfig,
}

/// Session pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_idle_grace")]
    pub idle_grace_secs: u64,
    #[serde(default = "default_event_poll")]
    pub event_poll_ms: u64,
}

/// Announcement listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SapConfig {
    #[serde(default = "default_sap_port")]
    pub port: u16,
    #[serde(default = "default_sap_groups")]
    pub groups: Vec<Ipv4Addr>,
    #[serde(default = "default_sap_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_sap_poll")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_max_datagram")]
    pub max_datagram: usize,
    /// Cap on the inflated payload of a compressed announcement.
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,
    /// Evict records whose expiry elapsed without a delete announcement.
    #[serde(default = "default_true")]
    pub sweep_expired: bool,
}

/// DVR backend connector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MythConfig {
    #[serde(default = "default_myth_version")]
    pub protocol_version: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_proginfo_fields")]
    pub proginfo_fields: usize,
    #[serde(default = "default_max_message")]
    pub max_message_size: usize,
}

/// Dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_true")]
    pub network_available: bool,
    #[serde(default = "default_max_nesting")]
    pub max_nesting: usize,
    /// `special://<alias>/...` -> local directory.
    #[serde(default)]
    pub special: BTreeMap<String, String>,
    /// `virtualpath://<name>` -> list of URLs to union.
    #[serde(default)]
    pub virtual_paths: BTreeMap<String, Vec<String>>,
}

/// Listing sort settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortConfig {
    #[serde(default = "default_true")]
    pub ignore_articles: bool,
    #[serde(default = "default_articles")]
    pub articles: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_idle_grace() -> u64 {
    SESSION_IDLE_GRACE_SECS
}

fn default_event_poll() -> u64 {
    SESSION_EVENT_POLL_MS
}

fn default_sap_port() -> u16 {
    SAP_PORT
}

fn default_sap_groups() -> Vec<Ipv4Addr> {
    vec![SAP_V4_GLOBAL, SAP_V4_ORG, SAP_V4_LOCAL, SAP_V4_LINK]
}

fn default_sap_ttl() -> u64 {
    SAP_RECORD_TTL_SECS
}

fn default_sap_poll() -> u64 {
    SAP_POLL_TIMEOUT_SECS
}

fn default_max_datagram() -> usize {
    SAP_MAX_DATAGRAM
}

fn default_max_payload() -> usize {
    SAP_MAX_PAYLOAD
}

fn default_myth_version() -> u32 {
    MYTH_PROTOCOL_VERSION
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_read_timeout() -> u64 {
    10_000
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    250
}

fn default_client_name() -> String {
    "vfsnet".to_string()
}

fn default_proginfo_fields() -> usize {
    MYTH_PROGINFO_FIELDS
}

fn default_max_message() -> usize {
    4 * 1024 * 1024
}

fn default_max_nesting() -> usize {
    DISPATCH_MAX_NESTING
}

fn default_articles() -> Vec<String> {
    vec!["the".to_string(), "a".to_string(), "an".to_string()]
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_grace_secs: default_idle_grace(),
            event_poll_ms: default_event_poll(),
        }
    }
}

impl Default for SapConfig {
    fn default() -> Self {
        Self {
            port: default_sap_port(),
            groups: default_sap_groups(),
            ttl_secs: default_sap_ttl(),
            poll_timeout_secs: default_sap_poll(),
            max_datagram: default_max_datagram(),
            max_payload: default_max_payload(),
            sweep_expired: true,
        }
    }
}

impl Default for MythConfig {
    fn default() -> Self {
        Self {
            protocol_version: default_myth_version(),
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: default_read_timeout(),
            connect_attempts: default_connect_attempts(),
            backoff_base_ms: default_backoff_base(),
            client_name: default_client_name(),
            proginfo_fields: default_proginfo_fields(),
            max_message_size: default_max_message(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            network_available: true,
            max_nesting: default_max_nesting(),
            special: BTreeMap::new(),
            virtual_paths: BTreeMap::new(),
        }
    }
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            ignore_articles: true,
            articles: default_articles(),
        }
    }
}

impl SessionConfig {
    pub fn idle_grace(&self) -> Duration {
        Duration::from_secs(self.idle_grace_secs)
    }

    pub fn event_poll(&self) -> Duration {
        Duration::from_millis(self.event_poll_ms)
    }
}

impl SapConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

impl MythConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Wait before retry `attempt` (1-based): base, 2x base, 4x base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(10);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

impl VfsConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Builder: set idle grace window.
    pub fn with_idle_grace(mut self, grace: Duration) -> Self {
        self.session.idle_grace_secs = grace.as_secs();
        self
    }

    /// Builder: set announcement lifetime.
    pub fn with_sap_ttl(mut self, ttl: Duration) -> Self {
        self.sap.ttl_secs = ttl.as_secs();
        self
    }

    /// Builder: mark the network as (un)available for gated schemes.
    pub fn with_network(mut self, available: bool) -> Self {
        self.dispatch.network_available = available;
        self
    }

    /// Builder: register a `virtualpath://<name>` union.
    pub fn with_virtual_path(mut self, name: &str, urls: Vec<String>) -> Self {
        self.dispatch.virtual_paths.insert(name.to_string(), urls);
        self
    }

    /// Builder: register a `special://<alias>` mapping.
    pub fn with_special(mut self, alias: &str, dir: &str) -> Self {
        self.dispatch.special.insert(alias.to_string(), dir.to_string());
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.event_poll_ms == 0 {
            return Err(ConfigError::Invalid("session.event_poll_ms must be > 0".into()));
        }
        if self.sap.poll_timeout_secs == 0 {
            return Err(ConfigError::Invalid("sap.poll_timeout_secs must be > 0".into()));
        }
        if self.sap.groups.iter().any(|g| !g.is_multicast()) {
            return Err(ConfigError::Invalid(
                "sap.groups must only contain multicast addresses".into(),
            ));
        }
        if self.sap.max_datagram < 8 {
            return Err(ConfigError::Invalid("sap.max_datagram must be >= 8".into()));
        }
        if self.sap.max_payload == 0 {
            return Err(ConfigError::Invalid("sap.max_payload must be > 0".into()));
        }
        if self.myth.connect_attempts == 0 {
            return Err(ConfigError::Invalid("myth.connect_attempts must be > 0".into()));
        }
        if self.myth.proginfo_fields < 9 {
            return Err(ConfigError::Invalid("myth.proginfo_fields must be >= 9".into()));
        }
        if self.myth.max_message_size == 0 {
            return Err(ConfigError::Invalid("myth.max_message_size must be > 0".into()));
        }
        if self.dispatch.max_nesting == 0 {
            return Err(ConfigError::Invalid("dispatch.max_nesting must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VfsConfig::default();
        assert_eq!(config.sap.port, 9875);
        assert_eq!(config.sap.groups.len(), 4);
        assert_eq!(config.sap.ttl(), Duration::from_secs(3600));
        assert_eq!(config.sap.poll_timeout(), Duration::from_secs(5));
        assert!(config.dispatch.network_available);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = VfsConfig::from_toml(
            r#"
            [session]
            idle_grace_secs = 10

            [dispatch]
            network_available = false

            [dispatch.virtual_paths]
            tv = ["sap://", "myth://backend/recordings/"]
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.session.idle_grace(), Duration::from_secs(10));
        assert_eq!(config.session.event_poll_ms, SESSION_EVENT_POLL_MS);
        assert!(!config.dispatch.network_available);
        assert_eq!(config.dispatch.virtual_paths["tv"].len(), 2);
        assert_eq!(config.sap.port, SAP_PORT);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = VfsConfig::default();
        config.sap.groups.push(Ipv4Addr::new(10, 0, 0, 1));
        assert!(config.validate().is_err());

        let mut config = VfsConfig::default();
        config.myth.connect_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = VfsConfig::default();
        config.dispatch.max_nesting = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_grows() {
        let myth = MythConfig::default();
        assert_eq!(myth.backoff(1), Duration::from_millis(250));
        assert_eq!(myth.backoff(2), Duration::from_millis(500));
        assert_eq!(myth.backoff(3), Duration::from_millis(1000));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vfsnet.toml");
        std::fs::write(&path, "[sap]\nttl_secs = 60\n").expect("write");
        let config = VfsConfig::from_file(&path).expect("load");
        assert_eq!(config.sap.ttl_secs, 60);

        assert!(VfsConfig::from_file(dir.path().join("missing.toml")).is_err());
    }
}
