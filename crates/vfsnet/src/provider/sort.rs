// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Listing order: folders first, then case-folded label, optionally
//! ignoring a leading article ("The Wire" sorts under W).

use super::DirEntry;
use crate::config::SortConfig;

/// Case-folded sort key for `label`.
pub fn sort_key(label: &str, config: &SortConfig) -> String {
    let folded = label.trim().to_lowercase();
    if config.ignore_articles {
        for article in &config.articles {
            let prefix = format!("{} ", article.to_lowercase());
            if let Some(rest) = folded.strip_prefix(&prefix) {
                let rest = rest.trim_start();
                if !rest.is_empty() {
                    return rest.to_string();
                }
            }
        }
    }
    folded
}

/// Stable sort; entries with equal keys keep their backend order.
pub fn sort_entries(entries: &mut [DirEntry], config: &SortConfig) {
    entries.sort_by_cached_key(|e| (!e.is_container, sort_key(&e.label, config)));
}
