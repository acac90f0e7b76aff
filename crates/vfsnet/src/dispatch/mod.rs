// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scheme -> provider dispatch.
//!
//! The registry is a static, ordered table. `create` walks it, takes the
//! first row listing the URL's scheme, checks that row's availability gate,
//! and builds the provider. An unknown scheme, a closed gate, or a missing
//! external factory all yield `None` without error.

pub mod external;

pub use external::{ExternalProviders, ProviderFactory};

use crate::context::NetContext;
use crate::provider::{
    LocalProvider, MythProvider, Provider, SapProvider, SpecialProvider, UnionProvider,
};
use crate::url::VfsUrl;
use std::sync::Arc;

/// Provider family a scheme maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Local,
    Special,
    Union,
    FileReader,
    Myth,
    Sap,
    /// Served by a host-registered factory.
    External,
}

/// When a registration may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Always,
    /// Requires the runtime network flag.
    Network,
    /// Requires the network flag and a compiled-in feature.
    NetworkFeature(bool),
}

struct Registration {
    schemes: &'static [&'static str],
    gate: Gate,
    kind: ProviderKind,
}

const REGISTRY: &[Registration] = &[
    Registration {
        schemes: &["", "file"],
        gate: Gate::Always,
        kind: ProviderKind::Local,
    },
    Registration {
        schemes: &["special"],
        gate: Gate::Always,
        kind: ProviderKind::Special,
    },
    Registration {
        schemes: &["virtualpath", "multipath"],
        gate: Gate::Always,
        kind: ProviderKind::Union,
    },
    Registration {
        schemes: &["filereader"],
        gate: Gate::Always,
        kind: ProviderKind::FileReader,
    },
    Registration {
        schemes: &[
            "zip",
            "rar",
            "stack",
            "playlistmusic",
            "playlistvideo",
            "musicdb",
            "musicsearch",
            "videodb",
        ],
        gate: Gate::Always,
        kind: ProviderKind::External,
    },
    Registration {
        schemes: &[
            "shout", "lastfm", "tuxbox", "ftp", "ftpx", "ftps", "http", "https", "smb", "daap",
            "xbms", "rtv", "upnp", "hdhomerun", "rss",
        ],
        gate: Gate::Network,
        kind: ProviderKind::External,
    },
    Registration {
        schemes: &["myth", "cmyth"],
        gate: Gate::NetworkFeature(cfg!(feature = "myth")),
        kind: ProviderKind::Myth,
    },
    Registration {
        schemes: &["sap"],
        gate: Gate::NetworkFeature(cfg!(feature = "sap")),
        kind: ProviderKind::Sap,
    },
];

/// Builds providers for virtual URLs. Cheap to clone.
#[derive(Clone)]
pub struct ProtocolDispatcher {
    context: Arc<NetContext>,
    external: Arc<ExternalProviders>,
}

impl ProtocolDispatcher {
    pub fn new(context: Arc<NetContext>) -> Self {
        Self {
            context,
            external: Arc::new(ExternalProviders::default()),
        }
    }

    /// Builder: attach host-registered providers.
    pub fn with_external(mut self, external: ExternalProviders) -> Self {
        self.external = Arc::new(external);
        self
    }

    pub fn context(&self) -> &Arc<NetContext> {
        &self.context
    }

    /// Registered kind for `scheme`, ignoring gates.
    pub fn kind_of(scheme: &str) -> Option<ProviderKind> {
        let scheme = scheme.to_ascii_lowercase();
        REGISTRY
            .iter()
            .find(|r| r.schemes.contains(&scheme.as_str()))
            .map(|r| r.kind)
    }

    /// Whether `scheme` is registered and its gate is currently open.
    pub fn is_available(&self, scheme: &str) -> bool {
        let scheme = scheme.to_ascii_lowercase();
        REGISTRY
            .iter()
            .find(|r| r.schemes.contains(&scheme.as_str()))
            .is_some_and(|r| self.gate_open(r.gate))
    }

    fn gate_open(&self, gate: Gate) -> bool {
        match gate {
            Gate::Always => true,
            Gate::Network => self.context.network_available(),
            Gate::NetworkFeature(built) => built && self.context.network_available(),
        }
    }

    /// Provider for `url`, or `None` if no available provider serves it.
    pub fn create(&self, url: &VfsUrl) -> Option<Provider> {
        self.create_at(url, 0)
    }

    /// `create` at wrapper nesting `depth` (filereader and aggregate sources).
    pub(crate) fn create_at(&self, url: &VfsUrl, depth: usize) -> Option<Provider> {
        let max = self.context.config().dispatch.max_nesting;
        if depth >= max {
            log::warn!("[dispatch] nesting limit {} reached at {}", max, url);
            return None;
        }

        let Some(registration) = REGISTRY
            .iter()
            .find(|r| r.schemes.contains(&url.scheme()))
        else {
            log::debug!("[dispatch] unknown scheme '{}'", url.scheme());
            return None;
        };

        if !self.gate_open(registration.gate) {
            log::debug!("[dispatch] scheme '{}' unavailable", url.scheme());
            return None;
        }

        let sort = self.context.config().sort.clone();
        let provider = match registration.kind {
            ProviderKind::Local => Provider::Local(LocalProvider::new(sort)),
            ProviderKind::Special => Provider::Special(SpecialProvider::new(
                &self.context.config().dispatch,
                sort,
            )),
            ProviderKind::Union => Provider::Union(UnionProvider::new(self.clone(), depth)),
            ProviderKind::FileReader => {
                let inner = match VfsUrl::parse(url.path()) {
                    Ok(inner) => inner,
                    Err(e) => {
                        log::debug!("[dispatch] bad filereader target in {}: {}", url, e);
                        return None;
                    }
                };
                if inner.scheme() == "filereader" {
                    log::warn!("[dispatch] nested filereader rejected: {}", url);
                    return None;
                }
                Provider::FileReader(Box::new(self.create_at(&inner, depth + 1)?))
            }
            ProviderKind::Myth => Provider::Myth(MythProvider::new(Arc::clone(&self.context))),
            ProviderKind::Sap => Provider::Sap(SapProvider::new(Arc::clone(&self.context))),
            ProviderKind::External => Provider::External(self.external.create(url)?),
        };
        log::trace!("[dispatch] {} -> {}", url, provider.name());
        Some(provider)
    }
}
