// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Announcement receive thread.
//!
//! ```text
//! mio::poll(<= poll_timeout) -> recv_from() -> AnnouncementTable::process_datagram()
//!            |                                   \-> sweep_expired() (optional)
//!            \-> stop channel checked on every wakeup
//! ```
//!
//! Stop is signalled through a crossbeam channel and a mio `Waker`, so a
//! stop request does not wait for the poll timeout to elapse.

use super::cache::AnnouncementTable;
use crate::config::SapConfig;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use mio::{Events, Interest, Poll, Token, Waker};
use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const SOCKET_TOKEN: Token = Token(0);
const WAKE_TOKEN: Token = Token(1);

/// Listener counters.
#[derive(Debug, Default)]
pub struct ListenerMetrics {
    pub datagrams: AtomicU64,
    pub bytes: AtomicU64,
    pub invalid: AtomicU64,
}

impl ListenerMetrics {
    /// `(datagrams, bytes, invalid)`
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.datagrams.load(Ordering::Relaxed),
            self.bytes.load(Ordering::Relaxed),
            self.invalid.load(Ordering::Relaxed),
        )
    }
}

/// Handle to the running receive thread. Dropping it stops the thread.
pub struct SapListener {
    handle: Option<JoinHandle<()>>,
    stop_tx: Sender<()>,
    waker: Arc<Waker>,
    running: Arc<AtomicBool>,
    pub metrics: Arc<ListenerMetrics>,
}

impl SapListener {
    /// Spawn the receive thread on an already bound socket.
    ///
    /// # Errors
    /// Returns an I/O error if the socket cannot be made non-blocking, the
    /// poller cannot be created, or the thread cannot be spawned.
    pub fn spawn(
        socket: UdpSocket,
        table: Arc<AnnouncementTable>,
        config: &SapConfig,
    ) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        let mut socket = mio::net::UdpSocket::from_std(socket);

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut socket, SOCKET_TOKEN, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);

        let (stop_tx, stop_rx) = channel::bounded(1);
        let running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(ListenerMetrics::default());

        let ctx = RxLoop {
            poll,
            socket,
            table,
            stop_rx,
            running: Arc::clone(&running),
            metrics: Arc::clone(&metrics),
            timeout: config.poll_timeout(),
            max_datagram: config.max_datagram,
            sweep: config.sweep_expired,
        };

        let handle = std::thread::Builder::new()
            .name("vfsnet-sap-rx".to_string())
            .spawn(move || ctx.run())?;

        Ok(Self {
            handle: Some(handle),
            stop_tx,
            waker,
            running,
            metrics,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Signal the thread and join it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.stop_tx.try_send(());
        if let Err(e) = self.waker.wake() {
            log::debug!("[sap] waker failed, stop bounded by poll timeout: {}", e);
        }
        if handle.join().is_err() {
            log::error!("[sap] listener thread panicked");
        }
    }
}

impl Drop for SapListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct RxLoop {
    poll: Poll,
    socket: mio::net::UdpSocket,
    table: Arc<AnnouncementTable>,
    stop_rx: Receiver<()>,
    running: Arc<AtomicBool>,
    metrics: Arc<ListenerMetrics>,
    timeout: Duration,
    max_datagram: usize,
    sweep: bool,
}

impl RxLoop {
    fn run(mut self) {
        log::debug!(
            "[sap] rx thread started, timeout={:?} sweep={}",
            self.timeout,
            self.sweep
        );
        let mut events = Events::with_capacity(16);
        let mut buf = vec![0u8; self.max_datagram];

        loop {
            match self.stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            if let Err(e) = self.poll.poll(&mut events, Some(self.timeout)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                log::error!("[sap] poll failed, stopping listener: {}", e);
                break;
            }

            for event in &events {
                if event.token() == SOCKET_TOKEN {
                    self.drain(&mut buf);
                }
            }

            if self.sweep {
                self.table.sweep_expired(Instant::now());
            }
        }

        self.running.store(false, Ordering::Release);
        log::debug!("[sap] rx thread exiting");
    }

    /// Read until the socket would block.
    fn drain(&mut self, buf: &mut [u8]) {
        loop {
            let (len, src) = match self.socket.recv_from(buf) {
                Ok(r) => r,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("[sap] recv_from failed: {}", e);
                    return;
                }
            };
            self.metrics.datagrams.fetch_add(1, Ordering::Relaxed);
            self.metrics.bytes.fetch_add(len as u64, Ordering::Relaxed);

            if let Err(e) = self.table.process_datagram(&buf[..len], Instant::now()) {
                self.metrics.invalid.fetch_add(1, Ordering::Relaxed);
                log::debug!("[sap] dropped datagram from {}: {}", src, e);
            }
        }
    }
}
