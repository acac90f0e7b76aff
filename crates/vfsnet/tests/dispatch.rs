// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure
#![allow(clippy::items_after_statements)] // Test helpers

//! Dispatcher + providers end to end, with an in-process fake backend.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use vfsnet::provider::multipath_url;
use vfsnet::session::{Channel, Connection, Connector, ControlChannel, GuideDatabase, Program};
use vfsnet::{
    DirectoryProvider, Error, Identity, NetContext, ProtocolDispatcher, Provider, Result,
    VfsConfig, VfsUrl,
};

fn media_dir(files: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for f in files {
        fs::write(dir.path().join(f), b"x").unwrap();
    }
    dir
}

fn dispatcher(config: VfsConfig, connector: Arc<dyn Connector>) -> ProtocolDispatcher {
    ProtocolDispatcher::new(Arc::new(NetContext::with_connector(config, connector)))
}

fn list(d: &ProtocolDispatcher, url: &str) -> Option<Result<Vec<String>>> {
    let url = VfsUrl::parse(url).unwrap();
    let provider = d.create(&url)?;
    Some(
        provider
            .get_directory(&url)
            .map(|entries| entries.into_iter().map(|e| e.label).collect()),
    )
}

struct FakeControl;

impl ControlChannel for FakeControl {
    fn recordings(&mut self) -> Result<Vec<Program>> {
        Ok(vec![
            Program {
                title: "The Weather".into(),
                subtitle: "Tuesday".into(),
                path: "/1002_20260102.mpg".into(),
                size: Some(2048),
                ..Program::default()
            },
            Program {
                title: "Arts Hour".into(),
                path: "/1001_20260101.mpg".into(),
                size: Some(1024),
                ..Program::default()
            },
            Program {
                title: "The Weather".into(),
                subtitle: "Monday".into(),
                path: "/1002_20260101.mpg".into(),
                ..Program::default()
            },
        ])
    }
}

struct FakeGuide;

impl GuideDatabase for FakeGuide {
    fn channels(&mut self) -> Result<Vec<Channel>> {
        Ok(vec![
            Channel {
                id: 1010,
                number: "10".into(),
                callsign: "TEN".into(),
                name: "Ten".into(),
            },
            Channel {
                id: 1002,
                number: "2".into(),
                callsign: "TWO".into(),
                name: "Two".into(),
            },
        ])
    }

    fn guide(&mut self, channel_id: u32) -> Result<Vec<Program>> {
        Ok(vec![
            Program {
                title: "Late Show".into(),
                channel_id,
                start: Some(2_000),
                ..Program::default()
            },
            Program {
                title: "Morning Show".into(),
                channel_id,
                start: Some(1_000),
                ..Program::default()
            },
        ])
    }
}

#[derive(Default)]
struct FakeBackend {
    connects: AtomicUsize,
    with_guide: bool,
}

impl Connector for FakeBackend {
    fn connect(&self, identity: &Identity) -> Result<Connection> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if identity.host() == "offline.lan" {
            return Err(Error::Connect {
                target: identity.address(),
                reason: "no route to host".into(),
            });
        }
        let conn = Connection::new(Box::new(FakeControl));
        Ok(if self.with_guide {
            conn.with_database(Box::new(FakeGuide))
        } else {
            conn
        })
    }
}

#[test]
fn test_unknown_scheme_yields_no_provider() {
    let d = dispatcher(VfsConfig::default(), Arc::new(FakeBackend::default()));
    assert!(list(&d, "gopher://host/menu").is_none());
    assert!(list(&d, "zip://archive/").is_none(), "no zip factory registered");
}

#[test]
fn test_offline_gates_network_schemes_only() {
    let dir = media_dir(&["a.mkv"]);
    let d = dispatcher(
        VfsConfig::default().with_network(false),
        Arc::new(FakeBackend::default()),
    );

    assert!(list(&d, "myth://backend.lan/").is_none());
    assert!(list(&d, "sap://").is_none());
    assert!(list(&d, "http://example.com/").is_none());

    let local = list(&d, dir.path().to_str().unwrap()).unwrap().unwrap();
    assert_eq!(local, vec!["a.mkv"]);
}

#[cfg(feature = "myth")]
#[test]
fn test_myth_tree_listings_share_one_session() {
    let backend = Arc::new(FakeBackend {
        with_guide: true,
        ..FakeBackend::default()
    });
    let d = dispatcher(VfsConfig::default(), Arc::clone(&backend) as Arc<dyn Connector>);

    let root = list(&d, "myth://backend.lan/").unwrap().unwrap();
    assert_eq!(root.len(), 4);

    let recordings = list(&d, "myth://backend.lan/recordings/").unwrap().unwrap();
    assert_eq!(
        recordings,
        vec!["Arts Hour", "The Weather: Monday", "The Weather: Tuesday"]
    );

    let titles = list(&d, "myth://backend.lan/recordings-by-title/").unwrap().unwrap();
    assert_eq!(titles, vec!["Arts Hour", "The Weather"]);

    let channels = list(&d, "myth://backend.lan/channels/").unwrap().unwrap();
    assert_eq!(channels, vec!["2 Two", "10 Ten"]);

    let guide = list(&d, "myth://backend.lan/guide/10/").unwrap().unwrap();
    assert_eq!(guide, vec!["Morning Show", "Late Show"]);

    assert_eq!(backend.connects.load(Ordering::SeqCst), 1);
    let identity = Identity::new("backend.lan", vfsnet::config::MYTH_DEFAULT_PORT);
    assert_eq!(d.context().pool().refcount(&identity), Some(0));
}

#[cfg(feature = "myth")]
#[test]
fn test_myth_failures_are_errors_not_empty() {
    let d = dispatcher(VfsConfig::default(), Arc::new(FakeBackend::default()));

    // Unreachable backend.
    let err = list(&d, "myth://offline.lan/recordings/").unwrap().unwrap_err();
    assert!(matches!(err, Error::Connect { .. }));

    // Reachable, but no guide database attached.
    let err = list(&d, "myth://backend.lan/channels/").unwrap().unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));

    let err = list(&d, "myth://backend.lan/nonsense/").unwrap().unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn test_union_tolerates_partial_failure() {
    let a = media_dir(&["b.mkv", "a.mkv"]);
    let b = media_dir(&["c.mkv"]);
    let missing = a.path().join("does-not-exist");

    let config = VfsConfig::default()
        .with_virtual_path(
            "movies",
            vec![
                a.path().display().to_string(),
                missing.display().to_string(),
                b.path().display().to_string(),
            ],
        )
        .with_virtual_path("gone", vec![missing.display().to_string()]);
    let d = dispatcher(config, Arc::new(FakeBackend::default()));

    let labels = list(&d, "virtualpath://movies").unwrap().unwrap();
    assert_eq!(labels, vec!["a.mkv", "b.mkv", "c.mkv"]);

    let err = list(&d, "virtualpath://gone").unwrap().unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)));

    assert!(matches!(
        list(&d, "virtualpath://unknown").unwrap(),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_multipath_lists_every_source() {
    let a = media_dir(&["one.mkv"]);
    let b = media_dir(&["two.mkv"]);
    let url = multipath_url(&[a.path().to_str().unwrap(), b.path().to_str().unwrap()]);
    let d = dispatcher(VfsConfig::default(), Arc::new(FakeBackend::default()));

    let labels = list(&d, &url).unwrap().unwrap();
    assert_eq!(labels, vec!["one.mkv", "two.mkv"]);

    let provider = d.create(&VfsUrl::parse(&url).unwrap()).unwrap();
    assert!(matches!(provider, Provider::Union(_)));
    assert!(provider.exists(&VfsUrl::parse(&url).unwrap()));
}

#[test]
fn test_filereader_wraps_inner_provider() {
    let dir = media_dir(&["inner.mkv"]);
    let d = dispatcher(VfsConfig::default(), Arc::new(FakeBackend::default()));
    let url = format!("filereader://{}", dir.path().display());

    let labels = list(&d, &url).unwrap().unwrap();
    assert_eq!(labels, vec!["inner.mkv"]);
    assert!(list(&d, "filereader://filereader:///tmp").is_none());
}
