// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reference-counted session pool.
//!
//! # Architecture
//!
//! ```text
//! acquire(id) --lock--> table[id]
//!                        |- Ready(entry)  -> refs += 1, return handle (no I/O)
//!                        |- Connecting    -> wait on condvar, retry lookup
//!                        \- absent        -> mark Connecting, unlock,
//!                                            Connector::connect(), relock,
//!                                            insert Ready(refs = 1) or remove
//!
//! drop(handle) --lock--> refs -= 1, last_release = now
//! check_idle() --lock--> take refs == 0 && idle >= grace, unlock, close()
//! ```
//!
//! The table lock is never held across connector I/O or session teardown.

use super::backend::{
    Channel, Connection, Connector, ControlChannel, EventChannel, EventCode, GuideDatabase, Program,
    SessionListener,
};
use super::Identity;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

type ListenerSlot = Arc<Mutex<Option<Arc<dyn SessionListener>>>>;

/// `Slot::Connecting` placeholder owned by the acquiring thread.
struct PendingConnect<'a> {
    pool: &'a PoolInner,
    identity: &'a Identity,
    armed: bool,
}

impl PendingConnect<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut table = self.pool.table.lock();
        if matches!(table.get(self.identity), Some(Slot::Connecting)) {
            table.remove(self.identity);
        }
        log::warn!("[session] connect to {} aborted", self.identity);
        self.pool.connected.notify_all();
    }
}

/// One live backend connection shared by every handle with the same identity.
pub struct Session {
    identity: Identity,
    control: Mutex<Box<dyn ControlChannel>>,
    database: Option<Mutex<Box<dyn GuideDatabase>>>,
    listener: ListenerSlot,
    pump: Mutex<Option<EventPump>>,
    closed: AtomicBool,
}

impl Session {
    fn open(identity: &Identity, connection: Connection, poll: Duration) -> Result<Self> {
        let listener: ListenerSlot = Arc::new(Mutex::new(None));
        let pump = EventPump::spawn(identity, connection.events, Arc::clone(&listener), poll)?;
        Ok(Self {
            identity: identity.clone(),
            control: Mutex::new(connection.control),
            database: connection.database.map(Mutex::new),
            listener,
            pump: Mutex::new(Some(pump)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn has_database(&self) -> bool {
        self.database.is_some()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Unavailable(format!("session {} closed", self.identity)));
        }
        Ok(())
    }

    /// Recorded programs. One control query in flight per session.
    pub fn recordings(&self) -> Result<Vec<Program>> {
        self.ensure_open()?;
        self.control.lock().recordings()
    }

    pub fn channels(&self) -> Result<Vec<Channel>> {
        self.ensure_open()?;
        self.database()?.lock().channels()
    }

    pub fn guide(&self, channel_id: u32) -> Result<Vec<Program>> {
        self.ensure_open()?;
        self.database()?.lock().guide(channel_id)
    }

    fn database(&self) -> Result<&Mutex<Box<dyn GuideDatabase>>> {
        self.database.as_ref().ok_or_else(|| {
            Error::Unsupported(format!("no guide database for {}", self.identity))
        })
    }

    /// Register the event listener, replacing any previous one.
    pub fn set_listener(&self, listener: Arc<dyn SessionListener>) {
        *self.listener.lock() = Some(listener);
    }

    pub fn clear_listener(&self) {
        *self.listener.lock() = None;
    }

    pub fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Stop the event thread and close the control channel. Idempotent.
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(pump) = self.pump.lock().take() {
            pump.stop();
        }
        self.clear_listener();
        self.control.lock().close();
        log::debug!("[session] closed {}", self.identity);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Background thread forwarding events to the registered listener.
struct EventPump {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl EventPump {
    fn spawn(
        identity: &Identity,
        events: Option<Box<dyn EventChannel>>,
        listener: ListenerSlot,
        poll: Duration,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded(1);
        let name = identity.to_string();
        let handle = std::thread::Builder::new()
            .name(format!("vfsnet-evt-{}", identity.host()))
            .spawn(move || match events {
                Some(events) => pump_events(&name, events, &listener, &stop_rx, poll),
                None => {
                    // No event channel: idle until asked to stop.
                    let _ = stop_rx.recv();
                }
            })?;
        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    fn stop(mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[session] event thread panicked");
            }
        }
    }
}

fn pump_events(
    name: &str,
    mut events: Box<dyn EventChannel>,
    listener: &ListenerSlot,
    stop_rx: &Receiver<()>,
    poll: Duration,
) {
    log::debug!("[session] event thread started for {}", name);
    loop {
        match stop_rx.recv_timeout(Duration::ZERO) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        match events.next_event(poll) {
            Ok(Some(event)) => {
                // Clone out so the callback runs without the slot lock.
                let current = listener.lock().clone();
                match current {
                    Some(l) => l.on_event(&event.code, &event.payload),
                    None => log::trace!("[session] {} event {} (no listener)", name, event.code),
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("[session] event channel for {} failed: {}", name, e);
                if let Some(l) = listener.lock().clone() {
                    l.on_event(&EventCode::Closed, &e.to_string());
                }
                // Keep the thread alive so close() has a uniform join path.
                let _ = stop_rx.recv();
                break;
            }
        }
    }
    log::debug!("[session] event thread exiting for {}", name);
}

struct Entry {
    session: Arc<Session>,
    refs: usize,
    last_release: Instant,
}

enum Slot {
    Connecting,
    Ready(Entry),
}

struct PoolInner {
    connector: Arc<dyn Connector>,
    config: SessionConfig,
    table: Mutex<HashMap<Identity, Slot>>,
    connected: Condvar,
}

/// Registry of shared sessions keyed by [`Identity`]. Cheap to clone.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    pub fn new(connector: Arc<dyn Connector>, config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                connector,
                config,
                table: Mutex::new(HashMap::new()),
                connected: Condvar::new(),
            }),
        }
    }

    /// Get the session for `identity`, connecting on first use.
    ///
    /// Concurrent first acquires of one identity produce a single connect;
    /// the other callers wait for it.
    ///
    /// # Errors
    /// Connection failures from the connector. The table is left unchanged.
    pub fn acquire(&self, identity: &Identity) -> Result<SessionHandle> {
        let mut table = self.inner.table.lock();
        loop {
            match table.get_mut(identity) {
                Some(Slot::Ready(entry)) => {
                    entry.refs += 1;
                    return Ok(SessionHandle {
                        pool: Arc::clone(&self.inner),
                        session: Arc::clone(&entry.session),
                    });
                }
                Some(Slot::Connecting) => self.inner.connected.wait(&mut table),
                None => break,
            }
        }
        table.insert(identity.clone(), Slot::Connecting);
        drop(table);

        // Clears the placeholder if the connector unwinds.
        let pending = PendingConnect {
            pool: &self.inner,
            identity,
            armed: true,
        };

        log::debug!("[session] connecting {}", identity);
        let opened = self
            .inner
            .connector
            .connect(identity)
            .and_then(|conn| Session::open(identity, conn, self.inner.config.event_poll()));

        pending.disarm();
        let mut table = self.inner.table.lock();
        let result = match opened {
            Ok(session) => {
                let session = Arc::new(session);
                table.insert(
                    identity.clone(),
                    Slot::Ready(Entry {
                        session: Arc::clone(&session),
                        refs: 1,
                        last_release: Instant::now(),
                    }),
                );
                log::info!("[session] opened {}", identity);
                Ok(SessionHandle {
                    pool: Arc::clone(&self.inner),
                    session,
                })
            }
            Err(e) => {
                table.remove(identity);
                log::warn!("[session] connect to {} failed: {}", identity, e);
                Err(e)
            }
        };
        self.inner.connected.notify_all();
        result
    }

    /// Reap idle sessions using the current time.
    pub fn check_idle(&self) -> usize {
        self.check_idle_at(Instant::now())
    }

    /// Reap every session with no handles whose last release is at least
    /// the grace window before `now`. Returns the number closed.
    pub fn check_idle_at(&self, now: Instant) -> usize {
        let grace = self.inner.config.idle_grace();
        let reaped: Vec<Arc<Session>> = {
            let mut table = self.inner.table.lock();
            let idle: Vec<Identity> = table
                .iter()
                .filter_map(|(id, slot)| match slot {
                    Slot::Ready(e)
                        if e.refs == 0
                            && now.saturating_duration_since(e.last_release) >= grace =>
                    {
                        Some(id.clone())
                    }
                    _ => None,
                })
                .collect();
            idle.iter()
                .filter_map(|id| match table.remove(id) {
                    Some(Slot::Ready(e)) => Some(e.session),
                    _ => None,
                })
                .collect()
        };

        for session in &reaped {
            log::debug!("[session] reaping idle {}", session.identity());
            session.close();
        }
        reaped.len()
    }

    /// Close every session regardless of outstanding handles.
    pub fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = {
            let mut table = self.inner.table.lock();
            let ready: Vec<Identity> = table
                .iter()
                .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
                .map(|(id, _)| id.clone())
                .collect();
            ready
                .iter()
                .filter_map(|id| match table.remove(id) {
                    Some(Slot::Ready(e)) => Some(e.session),
                    _ => None,
                })
                .collect()
        };
        for session in &sessions {
            session.close();
        }
        if !sessions.is_empty() {
            log::info!("[session] pool shut down, closed {} session(s)", sessions.len());
        }
    }

    /// Live sessions (connecting slots excluded).
    pub fn len(&self) -> usize {
        self.inner
            .table
            .lock()
            .values()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handle count for `identity`, `None` if no live session.
    pub fn refcount(&self, identity: &Identity) -> Option<usize> {
        match self.inner.table.lock().get(identity) {
            Some(Slot::Ready(e)) => Some(e.refs),
            _ => None,
        }
    }
}

/// Counted reference to a pooled session.
///
/// Clone acquires, drop releases. Releasing never closes the session; it
/// only starts the idle clock.
pub struct SessionHandle {
    pool: Arc<PoolInner>,
    session: Arc<Session>,
}

impl SessionHandle {
    /// Run `f` on the table entry of this handle's session, if it is still pooled.
    fn with_entry(&self, f: impl FnOnce(&mut Entry)) {
        let mut table = self.pool.table.lock();
        if let Some(Slot::Ready(entry)) = table.get_mut(self.session.identity()) {
            // A reaped-then-reopened identity holds a different session.
            if Arc::ptr_eq(&entry.session, &self.session) {
                f(entry);
            }
        }
    }
}

impl std::ops::Deref for SessionHandle {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Clone for SessionHandle {
    fn clone(&self) -> Self {
        self.with_entry(|e| e.refs += 1);
        Self {
            pool: Arc::clone(&self.pool),
            session: Arc::clone(&self.session),
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.with_entry(|e| {
            e.refs = e.refs.saturating_sub(1);
            if e.refs == 0 {
                e.last_release = Instant::now();
            }
        });
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("identity", self.session.identity())
            .field("closed", &self.session.is_closed())
            .finish()
    }
}
