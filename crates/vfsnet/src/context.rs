// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide registries, owned instead of global.
//!
//! The application builds one `NetContext` at startup and calls
//! [`NetContext::shutdown`] at teardown. Tests build as many isolated
//! contexts as they like.

use crate::config::VfsConfig;
use crate::sap::AnnouncementCache;
use crate::session::{Connector, SessionPool};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct NetContext {
    config: VfsConfig,
    network_available: AtomicBool,
    pool: SessionPool,
    announcements: AnnouncementCache,
}

impl NetContext {
    /// Context with the built-in backend connector.
    pub fn new(config: VfsConfig) -> Self {
        let connector = default_connector(&config);
        Self::with_connector(config, connector)
    }

    /// Context with a caller-provided connector (fakes in tests, custom backends).
    pub fn with_connector(config: VfsConfig, connector: Arc<dyn Connector>) -> Self {
        let pool = SessionPool::new(connector, config.session.clone());
        let announcements = AnnouncementCache::new(config.sap.clone());
        Self {
            network_available: AtomicBool::new(config.dispatch.network_available),
            config,
            pool,
            announcements,
        }
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    pub fn announcements(&self) -> &AnnouncementCache {
        &self.announcements
    }

    pub fn network_available(&self) -> bool {
        self.network_available.load(Ordering::Acquire)
    }

    /// Network-gated schemes are skipped by the dispatcher while this is false.
    pub fn set_network_available(&self, available: bool) {
        let prev = self.network_available.swap(available, Ordering::AcqRel);
        if prev != available {
            log::info!("[context] network available: {}", available);
        }
    }

    /// Drive the idle reaper; call from the application heartbeat.
    pub fn heartbeat(&self) -> usize {
        self.pool.check_idle()
    }

    /// Stop the announcement listener and close every pooled session.
    pub fn shutdown(&self) {
        self.announcements.stop();
        self.pool.shutdown();
        log::debug!("[context] shut down");
    }
}

#[cfg(feature = "myth")]
fn default_connector(config: &VfsConfig) -> Arc<dyn Connector> {
    Arc::new(crate::session::myth::MythConnector::new(config.myth.clone()))
}

#[cfg(not(feature = "myth"))]
fn default_connector(_config: &VfsConfig) -> Arc<dyn Connector> {
    Arc::new(crate::session::NoConnector)
}
