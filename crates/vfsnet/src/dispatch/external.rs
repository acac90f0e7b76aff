// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Host-registered providers for schemes this crate does not implement.

use crate::provider::DirectoryProvider;
use crate::url::VfsUrl;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a provider for one URL; `None` declines it.
pub type ProviderFactory =
    Arc<dyn Fn(&VfsUrl) -> Option<Box<dyn DirectoryProvider>> + Send + Sync>;

/// Scheme -> factory table, filled once at startup.
#[derive(Clone, Default)]
pub struct ExternalProviders {
    factories: HashMap<String, ProviderFactory>,
}

impl ExternalProviders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: register `factory` for `scheme` (case-insensitive).
    pub fn register<F>(mut self, scheme: &str, factory: F) -> Self
    where
        F: Fn(&VfsUrl) -> Option<Box<dyn DirectoryProvider>> + Send + Sync + 'static,
    {
        self.factories
            .insert(scheme.to_ascii_lowercase(), Arc::new(factory));
        self
    }

    pub fn create(&self, url: &VfsUrl) -> Option<Box<dyn DirectoryProvider>> {
        let factory = self.factories.get(url.scheme())?;
        factory(url)
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.factories.contains_key(&scheme.to_ascii_lowercase())
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ExternalProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<&str> = self.schemes().collect();
        schemes.sort_unstable();
        f.debug_struct("ExternalProviders")
            .field("schemes", &schemes)
            .finish()
    }
}
