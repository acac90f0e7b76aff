// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast announcement provider (`sap://`).
//!
//! The first listing starts the announcement listener; later listings read
//! a snapshot of whatever has been heard so far. A fresh listener therefore
//! returns an empty, successful listing until announcements arrive.

use super::{not_found, DirEntry, DirectoryProvider};
use crate::context::NetContext;
use crate::error::Result;
use crate::sap::{child_paths, AnnouncementRecord};
use crate::url::VfsUrl;
use std::sync::Arc;

pub struct SapProvider {
    context: Arc<NetContext>,
}

impl SapProvider {
    pub fn new(context: Arc<NetContext>) -> Self {
        Self { context }
    }
}

fn entry(record: &AnnouncementRecord, path: String) -> DirEntry {
    let label = if record.description.name.trim().is_empty() {
        format!("{} 0x{:04x}", record.key.origin, record.key.msg_id)
    } else {
        record.description.name.clone()
    };
    DirEntry::file(label, path)
        .with_size(Some(record.payload.len() as u64))
        .with_stream_url(record.description.first_media_url())
}

impl DirectoryProvider for SapProvider {
    fn get_directory(&self, url: &VfsUrl) -> Result<Vec<DirEntry>> {
        // Only the root is a directory; record paths are files.
        if !url.path().is_empty() {
            return Err(not_found(url));
        }
        let cache = self.context.announcements();
        if let Err(e) = cache.ensure_started() {
            log::warn!("[sap] cannot start announcement listener: {}", e);
            return Err(e.into());
        }
        let records = cache.snapshot();
        let paths = child_paths(&records);
        Ok(records.iter().zip(paths).map(|(r, p)| entry(r, p)).collect())
    }

    fn is_allowed(&self, url: &VfsUrl) -> bool {
        url.path().is_empty() || url.path().ends_with(".sdp")
    }

    fn exists(&self, url: &VfsUrl) -> bool {
        if url.path().is_empty() {
            return true;
        }
        let target = url.to_string();
        child_paths(&self.context.announcements().snapshot()).contains(&target)
    }
}
