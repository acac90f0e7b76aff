// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection identity: the pool sharing key.

use crate::config::MYTH_DEFAULT_PORT;
use crate::error::{Error, Result};
use crate::url::VfsUrl;
use std::fmt;
use std::hash::{Hash, Hasher};

/// `(host, port, username, password)`.
///
/// Host compares case-insensitively; everything else is exact. Two URLs that
/// yield equal identities share one pooled session.
#[derive(Clone)]
pub struct Identity {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
}

impl Identity {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: Option<&str>, password: Option<&str>) -> Self {
        self.username = username.map(str::to_string);
        self.password = password.map(str::to_string);
        self
    }

    /// Identity from a URL authority. The port defaults to the backend port.
    pub fn from_url(url: &VfsUrl) -> Result<Self> {
        if url.host().is_empty() {
            return Err(Error::InvalidUrl(url.to_string()));
        }
        Ok(Self::new(url.host(), url.port().unwrap_or(MYTH_DEFAULT_PORT))
            .with_credentials(url.username(), url.password()))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// `host:port`, suitable for socket address resolution.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.host.eq_ignore_ascii_case(&other.host)
            && self.port == other.port
            && self.username == other.username
            && self.password == other.password
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.host.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
        self.port.hash(state);
        self.username.hash(state);
        self.password.hash(state);
    }
}

// Password never appears in logs.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.username {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_host_case_insensitive() {
        let a = Identity::new("Backend.LAN", 6543);
        let b = Identity::new("backend.lan", 6543);
        assert_eq!(a, b);
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_distinct_fields_differ() {
        let base = Identity::new("host", 6543).with_credentials(Some("u"), Some("p"));
        assert_ne!(base, Identity::new("host", 6544).with_credentials(Some("u"), Some("p")));
        assert_ne!(base, Identity::new("host", 6543).with_credentials(Some("v"), Some("p")));
        assert_ne!(base, Identity::new("host", 6543).with_credentials(Some("u"), Some("q")));
        assert_ne!(base, Identity::new("host", 6543));
    }

    #[test]
    fn test_from_url_default_port() {
        let url = VfsUrl::parse("myth://mythtv:pw@Backend/recordings/").unwrap();
        let id = Identity::from_url(&url).unwrap();
        assert_eq!(id.port(), MYTH_DEFAULT_PORT);
        assert_eq!(id.username(), Some("mythtv"));
        assert_eq!(id.to_string(), "mythtv@Backend:6543");
        assert!(!format!("{:?}", id).contains("pw"));

        assert!(Identity::from_url(&VfsUrl::parse("myth:///x").unwrap()).is_err());
    }
}
