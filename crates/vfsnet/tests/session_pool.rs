// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure
#![allow(clippy::items_after_statements)] // Test helpers
#![allow(clippy::needless_pass_by_value)] // Test functions

//! Session pool sharing, single-flight connect and idle reaping.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use vfsnet::config::SessionConfig;
use vfsnet::session::{Connection, Connector, ControlChannel, Program};
use vfsnet::{Error, Identity, Result, SessionPool};

struct CountingControl {
    closed: Arc<AtomicUsize>,
}

impl ControlChannel for CountingControl {
    fn recordings(&mut self) -> Result<Vec<Program>> {
        Ok(vec![Program {
            title: "Evening News".into(),
            path: "/1001_20260101.mpg".into(),
            ..Program::default()
        }])
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector that takes `delay` per connect and counts calls.
struct SlowConnector {
    delay: Duration,
    connects: AtomicUsize,
    closed: Arc<AtomicUsize>,
    fail_host: Option<&'static str>,
}

impl SlowConnector {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            connects: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
            fail_host: None,
        })
    }

    fn failing(host: &'static str) -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::from_millis(20),
            connects: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
            fail_host: Some(host),
        })
    }
}

impl Connector for SlowConnector {
    fn connect(&self, identity: &Identity) -> Result<Connection> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        if self.fail_host == Some(identity.host()) {
            return Err(Error::Connect {
                target: identity.address(),
                reason: "connection refused".into(),
            });
        }
        Ok(Connection::new(Box::new(CountingControl {
            closed: Arc::clone(&self.closed),
        })))
    }
}

fn pool(connector: Arc<SlowConnector>, grace_secs: u64) -> SessionPool {
    let config = SessionConfig {
        idle_grace_secs: grace_secs,
        ..SessionConfig::default()
    };
    SessionPool::new(connector, config)
}

#[test]
fn test_concurrent_first_acquire_connects_once() {
    let connector = SlowConnector::new(Duration::from_millis(150));
    let pool = pool(Arc::clone(&connector), 300);
    let identity = Identity::new("backend.lan", 6543);
    let barrier = Arc::new(Barrier::new(2));

    let workers: Vec<_> = (0..2)
        .map(|_| {
            let pool = pool.clone();
            let identity = identity.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                pool.acquire(&identity).expect("acquire")
            })
        })
        .collect();
    let handles: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.refcount(&identity), Some(2));
    assert!(std::ptr::eq::<vfsnet::session::Session>(&*handles[0], &*handles[1]));

    drop(handles);
    assert_eq!(pool.refcount(&identity), Some(0));
    assert_eq!(pool.len(), 1, "release must not close");
}

#[test]
fn test_identities_differing_only_in_host_case_share() {
    let connector = SlowConnector::new(Duration::ZERO);
    let pool = pool(Arc::clone(&connector), 300);

    let a = pool.acquire(&Identity::new("Backend.LAN", 6543)).unwrap();
    let b = pool.acquire(&Identity::new("backend.lan", 6543)).unwrap();
    assert!(std::ptr::eq::<vfsnet::session::Session>(&*a, &*b));
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
}

#[test]
fn test_distinct_identities_never_share() {
    let connector = SlowConnector::new(Duration::ZERO);
    let pool = pool(Arc::clone(&connector), 300);

    let plain = pool.acquire(&Identity::new("backend.lan", 6543)).unwrap();
    let other_port = pool.acquire(&Identity::new("backend.lan", 6544)).unwrap();
    let with_user = pool
        .acquire(&Identity::new("backend.lan", 6543).with_credentials(Some("mythtv"), None))
        .unwrap();

    assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
    assert_eq!(pool.len(), 3);
    assert!(!std::ptr::eq::<vfsnet::session::Session>(&*plain, &*other_port));
    assert!(!std::ptr::eq::<vfsnet::session::Session>(&*plain, &*with_user));
}

#[test]
fn test_failed_connect_leaves_no_entry_and_waiters_retry() {
    let connector = SlowConnector::failing("down.lan");
    let pool = pool(Arc::clone(&connector), 300);
    let identity = Identity::new("down.lan", 6543);
    let barrier = Arc::new(Barrier::new(3));

    let workers: Vec<_> = (0..3)
        .map(|_| {
            let pool = pool.clone();
            let identity = identity.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                pool.acquire(&identity).map(|_| ())
            })
        })
        .collect();
    for worker in workers {
        let result = worker.join().unwrap();
        assert!(matches!(result, Err(Error::Connect { .. })));
    }

    assert!(pool.is_empty());
    assert_eq!(pool.refcount(&identity), None);
    assert!(connector.connects.load(Ordering::SeqCst) >= 1);
}

#[test]
fn test_idle_session_reaped_only_after_grace() {
    let connector = SlowConnector::new(Duration::ZERO);
    let pool = pool(Arc::clone(&connector), 300);
    let identity = Identity::new("backend.lan", 6543);

    let handle = pool.acquire(&identity).unwrap();
    assert_eq!(handle.recordings().unwrap().len(), 1);
    let released = Instant::now();
    drop(handle);

    // Inside the grace window.
    assert_eq!(pool.check_idle_at(released + Duration::from_secs(299)), 0);
    assert_eq!(pool.len(), 1);

    // Reacquire resets the clock and the connection is reused.
    let again = pool.acquire(&identity).unwrap();
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    assert_eq!(pool.check_idle_at(released + Duration::from_secs(10_000)), 0);
    drop(again);

    assert_eq!(pool.check_idle_at(Instant::now() + Duration::from_secs(301)), 1);
    assert!(pool.is_empty());
    assert_eq!(connector.closed.load(Ordering::SeqCst), 1);

    // A later acquire opens a fresh connection.
    let _fresh = pool.acquire(&identity).unwrap();
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
}

#[test]
fn test_shutdown_closes_sessions_with_live_handles() {
    let connector = SlowConnector::new(Duration::ZERO);
    let pool = pool(Arc::clone(&connector), 300);
    let handle = pool.acquire(&Identity::new("backend.lan", 6543)).unwrap();

    pool.shutdown();
    assert!(pool.is_empty());
    assert!(handle.is_closed());
    assert_eq!(connector.closed.load(Ordering::SeqCst), 1);

    // Dropping the orphaned handle must not touch the empty table.
    drop(handle);
    assert!(pool.is_empty());
}
