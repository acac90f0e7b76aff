// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Aggregating providers: `multipath://` and `virtualpath://`.
//!
//! ```text
//! multipath://<enc url 1>/<enc url 2>/...   sources inline, percent-encoded
//! virtualpath://<name>                      sources from dispatch.virtual_paths
//! ```
//!
//! Listings concatenate the sources in order. A failing source is logged and
//! skipped; the listing fails only when every source failed.

use super::{not_found, DirEntry, DirectoryProvider};
use crate::dispatch::ProtocolDispatcher;
use crate::error::{Error, Result};
use crate::url::{decode, encode, VfsUrl};

/// Build a `multipath://` URL over `sources`.
pub fn multipath_url<S: AsRef<str>>(sources: &[S]) -> String {
    let mut out = String::from("multipath://");
    for source in sources {
        out.push_str(&encode(source.as_ref()));
        out.push('/');
    }
    out
}

pub struct UnionProvider {
    dispatcher: ProtocolDispatcher,
    depth: usize,
}

impl UnionProvider {
    pub(crate) fn new(dispatcher: ProtocolDispatcher, depth: usize) -> Self {
        Self { dispatcher, depth }
    }

    /// Source URLs behind `url`.
    pub fn sources(&self, url: &VfsUrl) -> Result<Vec<VfsUrl>> {
        let raw: Vec<String> = match url.scheme() {
            "virtualpath" => self
                .dispatcher
                .context()
                .config()
                .dispatch
                .virtual_paths
                .get(url.host())
                .cloned()
                .ok_or_else(|| not_found(url))?,
            "multipath" => std::iter::once(url.host())
                .filter(|h| !h.is_empty())
                .map(decode)
                .chain(url.segments())
                .collect(),
            other => return Err(Error::Unsupported(format!("'{}' is not an aggregate", other))),
        };
        raw.iter().map(|s| VfsUrl::parse(s)).collect()
    }
}

impl DirectoryProvider for UnionProvider {
    fn get_directory(&self, url: &VfsUrl) -> Result<Vec<DirEntry>> {
        let sources = self.sources(url)?;
        if sources.is_empty() {
            return Err(Error::Unavailable(format!("{} has no sources", url)));
        }

        let mut entries = Vec::new();
        let mut failures = 0;
        for source in &sources {
            let listed = match self.dispatcher.create_at(source, self.depth + 1) {
                Some(provider) => provider.get_directory(source),
                None => Err(Error::Unsupported(format!("no provider for {}", source))),
            };
            match listed {
                Ok(mut list) => entries.append(&mut list),
                Err(e) => {
                    failures += 1;
                    log::debug!("[union] source {} of {} failed: {}", source, url, e);
                }
            }
        }

        if failures == sources.len() {
            log::warn!("[union] all {} source(s) of {} failed", failures, url);
            return Err(Error::Unavailable(url.to_string()));
        }
        Ok(entries)
    }

    fn exists(&self, url: &VfsUrl) -> bool {
        self.sources(url).is_ok_and(|sources| {
            sources.iter().any(|s| {
                self.dispatcher
                    .create_at(s, self.depth + 1)
                    .is_some_and(|p| p.exists(s))
            })
        })
    }
}
