// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local filesystem providers: bare paths, `file://` and `special://`.

use super::sort::sort_entries;
use super::{not_found, DirEntry, DirectoryProvider};
use crate::config::{DispatchConfig, SortConfig};
use crate::error::Result;
use crate::url::VfsUrl;
use std::path::{Component, Path, PathBuf};

struct FsEntry {
    name: String,
    is_dir: bool,
    size: Option<u64>,
}

/// Read one directory. Entries whose metadata cannot be read are skipped.
fn read_fs_dir(dir: &Path) -> Result<Vec<FsEntry>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::debug!("[local] skipping entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        // Follow symlinks so linked folders list as folders.
        let meta = match std::fs::metadata(entry.path()) {
            Ok(m) => m,
            Err(e) => {
                log::debug!("[local] no metadata for {}: {}", entry.path().display(), e);
                continue;
            }
        };
        out.push(FsEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: meta.is_dir(),
            size: meta.is_file().then(|| meta.len()),
        });
    }
    Ok(out)
}

/// A decoded segment must name exactly one child of its parent.
fn is_plain_segment(segment: &str) -> bool {
    if segment.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn is_hidden(url: &VfsUrl) -> bool {
    url.path()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .is_some_and(|name| name.starts_with('.'))
}

/// Bare paths and `file://` URLs.
pub struct LocalProvider {
    sort: SortConfig,
}

impl LocalProvider {
    pub fn new(sort: SortConfig) -> Self {
        Self { sort }
    }
}

impl DirectoryProvider for LocalProvider {
    fn get_directory(&self, url: &VfsUrl) -> Result<Vec<DirEntry>> {
        let root = url.path();
        let mut entries: Vec<DirEntry> = read_fs_dir(Path::new(root))?
            .into_iter()
            .map(|fs| {
                let mut path = root.to_string();
                if !path.ends_with('/') {
                    path.push('/');
                }
                path.push_str(&fs.name);
                if fs.is_dir {
                    path.push('/');
                }
                let path = if url.scheme() == "file" {
                    format!("file://{}", path)
                } else {
                    path
                };
                DirEntry {
                    label: fs.name,
                    is_container: fs.is_dir,
                    path,
                    size: fs.size,
                    stream_url: None,
                }
            })
            .collect();
        sort_entries(&mut entries, &self.sort);
        Ok(entries)
    }

    fn is_allowed(&self, url: &VfsUrl) -> bool {
        !is_hidden(url)
    }

    fn exists(&self, url: &VfsUrl) -> bool {
        Path::new(url.path()).is_dir()
    }
}

/// `special://<alias>/<sub path>` mapped onto a configured local directory.
pub struct SpecialProvider {
    aliases: std::collections::BTreeMap<String, String>,
    sort: SortConfig,
}

impl SpecialProvider {
    pub fn new(dispatch: &DispatchConfig, sort: SortConfig) -> Self {
        Self {
            aliases: dispatch.special.clone(),
            sort,
        }
    }

    /// Local directory for `url`. `None` for an unknown alias or a path that
    /// would leave the alias root.
    pub fn resolve(&self, url: &VfsUrl) -> Option<PathBuf> {
        let mut path = PathBuf::from(self.aliases.get(url.host())?);
        for segment in url.segments() {
            if !is_plain_segment(&segment) {
                log::debug!("[local] rejected segment {:?} in {}", segment, url);
                return None;
            }
            path.push(segment);
        }
        Some(path)
    }
}

impl DirectoryProvider for SpecialProvider {
    fn get_directory(&self, url: &VfsUrl) -> Result<Vec<DirEntry>> {
        let dir = self.resolve(url).ok_or_else(|| not_found(url))?;
        let dir_url = if url.path().is_empty() || url.path().ends_with('/') {
            url.clone()
        } else {
            url.with_path(&format!("{}/", url.path()))
        };
        let mut entries: Vec<DirEntry> = read_fs_dir(&dir)?
            .into_iter()
            .map(|fs| DirEntry {
                path: dir_url.join(&fs.name, fs.is_dir).to_string(),
                label: fs.name,
                is_container: fs.is_dir,
                size: fs.size,
                stream_url: None,
            })
            .collect();
        sort_entries(&mut entries, &self.sort);
        Ok(entries)
    }

    fn is_allowed(&self, url: &VfsUrl) -> bool {
        !is_hidden(url)
    }

    fn exists(&self, url: &VfsUrl) -> bool {
        self.resolve(url).is_some_and(|p| p.is_dir())
    }
}
