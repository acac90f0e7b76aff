// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Directory providers.
//!
//! Every provider turns one virtual URL into a flat list of [`DirEntry`].
//! `Err` means "directory unavailable" and is never conflated with an empty
//! `Ok(vec![])` listing.

pub mod local;
pub mod myth;
pub mod sap;
pub mod sort;
pub mod union;

pub use local::{LocalProvider, SpecialProvider};
pub use myth::MythProvider;
pub use sap::SapProvider;
pub use union::{multipath_url, UnionProvider};

use crate::error::{Error, Result};
use crate::url::VfsUrl;
use serde::Serialize;

/// One listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub label: String,
    pub is_container: bool,
    /// Fully resolved virtual path; callers re-submit it as-is.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Playable URL when it differs from `path`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
}

impl DirEntry {
    pub fn folder(label: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            is_container: true,
            path: path.into(),
            size: None,
            stream_url: None,
        }
    }

    pub fn file(label: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            is_container: false,
            ..Self::folder(label, path)
        }
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }

    pub fn with_stream_url(mut self, url: Option<String>) -> Self {
        self.stream_url = url;
        self
    }
}

/// Contract shared by every provider.
pub trait DirectoryProvider: Send + Sync {
    /// List the directory at `url`.
    fn get_directory(&self, url: &VfsUrl) -> Result<Vec<DirEntry>>;

    /// Whether an entry at `url` should be shown by this provider.
    fn is_allowed(&self, _url: &VfsUrl) -> bool {
        true
    }

    /// Whether `url` names an existing directory.
    fn exists(&self, url: &VfsUrl) -> bool {
        self.get_directory(url).is_ok()
    }
}

/// Closed set of built-in providers, plus host-supplied ones.
pub enum Provider {
    Local(LocalProvider),
    Special(SpecialProvider),
    Myth(MythProvider),
    Sap(SapProvider),
    Union(UnionProvider),
    /// `filereader://<inner url>`: lists the inner URL with its own provider.
    FileReader(Box<Provider>),
    External(Box<dyn DirectoryProvider>),
}

impl Provider {
    fn as_dyn(&self) -> &dyn DirectoryProvider {
        match self {
            Provider::Local(p) => p,
            Provider::Special(p) => p,
            Provider::Myth(p) => p,
            Provider::Sap(p) => p,
            Provider::Union(p) => p,
            Provider::FileReader(p) => p.as_ref(),
            Provider::External(p) => p.as_ref(),
        }
    }

    /// Provider name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Local(_) => "local",
            Provider::Special(_) => "special",
            Provider::Myth(_) => "myth",
            Provider::Sap(_) => "sap",
            Provider::Union(_) => "union",
            Provider::FileReader(_) => "filereader",
            Provider::External(_) => "external",
        }
    }
}

/// Strip a `filereader://` wrapper; other URLs pass through.
fn unwrap_filereader(url: &VfsUrl) -> Result<VfsUrl> {
    if url.scheme() == "filereader" {
        VfsUrl::parse(url.path())
    } else {
        Ok(url.clone())
    }
}

impl DirectoryProvider for Provider {
    fn get_directory(&self, url: &VfsUrl) -> Result<Vec<DirEntry>> {
        if let Provider::FileReader(inner) = self {
            return inner.get_directory(&unwrap_filereader(url)?);
        }
        self.as_dyn().get_directory(url)
    }

    fn is_allowed(&self, url: &VfsUrl) -> bool {
        if let Provider::FileReader(inner) = self {
            return unwrap_filereader(url).is_ok_and(|u| inner.is_allowed(&u));
        }
        self.as_dyn().is_allowed(url)
    }

    fn exists(&self, url: &VfsUrl) -> bool {
        if let Provider::FileReader(inner) = self {
            return unwrap_filereader(url).is_ok_and(|u| inner.exists(&u));
        }
        self.as_dyn().exists(url)
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Provider({})", self.name())
    }
}

/// Sub-path not served by a provider.
pub(crate) fn not_found(url: &VfsUrl) -> Error {
    Error::NotFound(url.to_string())
}
