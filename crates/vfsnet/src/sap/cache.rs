// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Live announcement cache.
//!
//! Records are keyed by `(origin address, msg id hash, SDP o= line)`, not by
//! a hash of the payload, so a re-announce with an edited description
//! replaces the old record instead of adding a second one.
//!
//! # Update rule
//!
//! | known key | message | outcome                                  |
//! |-----------|---------|------------------------------------------|
//! | yes       | delete  | record removed                           |
//! | yes       | announce| expiry = now + TTL, SDP payload replaced |
//! | no        | delete  | no-op                                    |
//! | no        | announce| inserted if the payload is SDP           |
//!
//! Records whose expiry elapses without a delete are evicted by
//! [`AnnouncementCache::sweep_expired`] (run by the listener every loop).

use super::listener::SapListener;
use super::{
    decode_announcement_with_limit, multicast, Announcement, ParseError, SessionDescription,
};
use crate::config::{SapConfig, SAP_MAX_PAYLOAD};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Dedup key of a cached announcement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub origin: Ipv4Addr,
    pub msg_id: u16,
    pub payload_origin: String,
}

impl RecordKey {
    pub fn of(ann: &Announcement) -> Self {
        Self {
            origin: ann.header.origin,
            msg_id: ann.header.msg_id,
            payload_origin: ann.payload_origin.clone(),
        }
    }

    /// Deletes without an `o=` line match on address and msg id only.
    fn matches_delete(&self, other: &RecordKey) -> bool {
        if other.payload_origin.is_empty() {
            self.origin == other.origin && self.msg_id == other.msg_id
        } else {
            self == other
        }
    }
}

/// One live announcement.
#[derive(Debug, Clone)]
pub struct AnnouncementRecord {
    pub key: RecordKey,
    pub payload_type: String,
    pub payload: Vec<u8>,
    pub description: SessionDescription,
    pub first_seen: Instant,
    pub expires: Instant,
}

impl AnnouncementRecord {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires
    }

    /// Virtual path synthesized from (origin, msg id).
    pub fn virtual_path(&self) -> String {
        format!("sap://{}/0x{:04x}.sdp", self.key.origin, self.key.msg_id)
    }

    /// Path that also encodes the `o=` line, for records sharing (origin, msg id).
    pub fn disambiguated_path(&self) -> String {
        format!(
            "sap://{}/0x{:04x}-{:08x}.sdp",
            self.key.origin,
            self.key.msg_id,
            fnv1a(self.key.payload_origin.as_bytes())
        )
    }
}

fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811c_9dc5, |hash, &b| {
        (hash ^ u32::from(b)).wrapping_mul(0x0100_0193)
    })
}

/// Listing path of each record, in order.
///
/// Records are listed under [`AnnouncementRecord::virtual_path`] unless
/// another live record has the same (origin, msg id), in which case every
/// record of that pair gets its [`AnnouncementRecord::disambiguated_path`].
pub fn child_paths(records: &[AnnouncementRecord]) -> Vec<String> {
    let mut pairs: HashMap<(Ipv4Addr, u16), usize> = HashMap::new();
    for r in records {
        *pairs.entry((r.key.origin, r.key.msg_id)).or_default() += 1;
    }
    records
        .iter()
        .map(|r| {
            if pairs[&(r.key.origin, r.key.msg_id)] > 1 {
                r.disambiguated_path()
            } else {
                r.virtual_path()
            }
        })
        .collect()
}

/// Result of applying one announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Inserted,
    Refreshed,
    Deleted,
    /// Delete for a key that is not cached.
    UnknownDelete,
    /// Not SDP, so never cached.
    Ignored,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub received: u64,
    pub malformed: u64,
    pub inserted: u64,
    pub refreshed: u64,
    pub deleted: u64,
    pub expired: u64,
    pub ignored: u64,
}

#[derive(Default)]
struct TableState {
    records: Vec<AnnouncementRecord>,
    stats: CacheStats,
}

/// Mutex-guarded record table shared between the cache and its listener.
pub struct AnnouncementTable {
    state: Mutex<TableState>,
    ttl: Duration,
    max_payload: usize,
}

impl AnnouncementTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(TableState::default()),
            ttl,
            max_payload: SAP_MAX_PAYLOAD,
        }
    }

    /// Cap on the inflated size of compressed payloads.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Decode a datagram and apply it. Malformed datagrams are counted and dropped.
    pub fn process_datagram(&self, buf: &[u8], now: Instant) -> Result<UpdateOutcome, ParseError> {
        match decode_announcement_with_limit(buf, self.max_payload) {
            Ok(ann) => Ok(self.apply(ann, now)),
            Err(e) => {
                let mut state = self.state.lock();
                state.stats.received += 1;
                state.stats.malformed += 1;
                Err(e)
            }
        }
    }

    /// Apply a decoded announcement at time `now`.
    pub fn apply(&self, ann: Announcement, now: Instant) -> UpdateOutcome {
        let key = RecordKey::of(&ann);
        let is_sdp = ann.is_sdp();
        let mut state = self.state.lock();
        state.stats.received += 1;

        if ann.header.is_delete() {
            let before = state.records.len();
            state.records.retain(|r| !r.key.matches_delete(&key));
            return if state.records.len() < before {
                state.stats.deleted += 1;
                log::debug!("[sap] delete {}/0x{:04x}", key.origin, key.msg_id);
                UpdateOutcome::Deleted
            } else {
                UpdateOutcome::UnknownDelete
            };
        }

        let expires = now + self.ttl;
        if let Some(record) = state.records.iter_mut().find(|r| r.key == key) {
            record.expires = expires;
            if let (true, Some(desc)) = (is_sdp, ann.description) {
                record.payload = ann.payload;
                record.description = desc;
            }
            state.stats.refreshed += 1;
            return UpdateOutcome::Refreshed;
        }

        match (is_sdp, ann.description) {
            (true, Some(description)) => {
                log::debug!(
                    "[sap] new announcement '{}' from {}/0x{:04x}",
                    description.name,
                    key.origin,
                    key.msg_id
                );
                state.records.push(AnnouncementRecord {
                    key,
                    payload_type: ann.header.payload_type,
                    payload: ann.payload,
                    description,
                    first_seen: now,
                    expires,
                });
                state.stats.inserted += 1;
                UpdateOutcome::Inserted
            }
            _ => {
                log::debug!(
                    "[sap] ignoring payload type '{}' from {}",
                    ann.header.payload_type,
                    key.origin
                );
                state.stats.ignored += 1;
                UpdateOutcome::Ignored
            }
        }
    }

    /// Evict records whose expiry is at or before `now`. Returns the count removed.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        let before = state.records.len();
        state.records.retain(|r| !r.is_expired(now));
        let removed = before - state.records.len();
        if removed > 0 {
            state.stats.expired += removed as u64;
            log::debug!("[sap] expired {} announcement(s)", removed);
        }
        removed
    }

    pub fn snapshot(&self) -> Vec<AnnouncementRecord> {
        self.state.lock().records.clone()
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state.lock().records.clear();
    }
}

/// Announcement cache with a lazily started multicast listener.
pub struct AnnouncementCache {
    config: SapConfig,
    table: Arc<AnnouncementTable>,
    listener: Mutex<Option<SapListener>>,
}

impl AnnouncementCache {
    pub fn new(config: SapConfig) -> Self {
        let table =
            Arc::new(AnnouncementTable::new(config.ttl()).with_max_payload(config.max_payload));
        Self {
            config,
            table,
            listener: Mutex::new(None),
        }
    }

    /// Start the multicast listener if it is not running yet.
    ///
    /// Called on the first `sap://` listing, not at process start.
    pub fn ensure_started(&self) -> std::io::Result<()> {
        let mut slot = self.listener.lock();
        if slot.as_ref().is_some_and(SapListener::is_running) {
            return Ok(());
        }
        let socket = multicast::open_sap_socket(&self.config)?;
        *slot = Some(SapListener::spawn(socket, Arc::clone(&self.table), &self.config)?);
        log::info!("[sap] listener started on port {}", self.config.port);
        Ok(())
    }

    /// Start the listener on a caller-provided socket (loopback tests, custom binds).
    pub fn start_with_socket(&self, socket: UdpSocket) -> std::io::Result<()> {
        let mut slot = self.listener.lock();
        if let Some(old) = slot.take() {
            old.stop();
        }
        *slot = Some(SapListener::spawn(socket, Arc::clone(&self.table), &self.config)?);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.listener.lock().as_ref().is_some_and(SapListener::is_running)
    }

    /// Stop the listener thread and wait for it. Cached records are kept.
    pub fn stop(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.stop();
            log::debug!("[sap] listener stopped");
        }
    }

    pub fn process_datagram(&self, buf: &[u8], now: Instant) -> Result<UpdateOutcome, ParseError> {
        self.table.process_datagram(buf, now)
    }

    pub fn apply(&self, ann: Announcement, now: Instant) -> UpdateOutcome {
        self.table.apply(ann, now)
    }

    pub fn sweep_expired(&self, now: Instant) -> usize {
        self.table.sweep_expired(now)
    }

    /// Insertion-ordered copy of the live records.
    pub fn snapshot(&self) -> Vec<AnnouncementRecord> {
        self.table.snapshot()
    }

    pub fn stats(&self) -> CacheStats {
        self.table.stats()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn config(&self) -> &SapConfig {
        &self.config
    }
}

impl Drop for AnnouncementCache {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sap::{encode_announcement, Header};

    fn sdp(origin: &str, name: &str) -> Vec<u8> {
        format!("v=0\r\no={}\r\ns={}\r\n", origin, name).into_bytes()
    }

    fn announce(addr: [u8; 4], msg_id: u16, payload: &[u8]) -> Vec<u8> {
        encode_announcement(&Header::announce(Ipv4Addr::from(addr), msg_id), payload).unwrap()
    }

    fn delete(addr: [u8; 4], msg_id: u16, payload: &[u8]) -> Vec<u8> {
        encode_announcement(&Header::delete(Ipv4Addr::from(addr), msg_id), payload).unwrap()
    }

    fn table() -> AnnouncementTable {
        AnnouncementTable::new(Duration::from_secs(3600))
    }

    #[test]
    fn test_duplicate_announce_refreshes_single_record() {
        let table = table();
        let t0 = Instant::now();
        let dgram = announce([10, 0, 0, 1], 1, &sdp("- 1 1 IN IP4 10.0.0.1", "One"));

        assert_eq!(table.process_datagram(&dgram, t0), Ok(UpdateOutcome::Inserted));
        let first_expiry = table.snapshot()[0].expires;

        let t1 = t0 + Duration::from_secs(30);
        assert_eq!(table.process_datagram(&dgram, t1), Ok(UpdateOutcome::Refreshed));

        let records = table.snapshot();
        assert_eq!(records.len(), 1);
        assert!(records[0].expires > first_expiry);
        assert_eq!(records[0].first_seen, t0);
    }

    #[test]
    fn test_reannounce_overwrites_payload() {
        let table = table();
        let now = Instant::now();
        table
            .process_datagram(&announce([10, 0, 0, 1], 1, &sdp("o1", "Old")), now)
            .unwrap();
        table
            .process_datagram(&announce([10, 0, 0, 1], 1, &sdp("o1", "New")), now)
            .unwrap();
        let records = table.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].description.name, "New");
    }

    #[test]
    fn test_identity_includes_payload_origin() {
        let table = table();
        let now = Instant::now();
        table
            .process_datagram(&announce([10, 0, 0, 1], 1, &sdp("o1", "A")), now)
            .unwrap();
        table
            .process_datagram(&announce([10, 0, 0, 1], 1, &sdp("o2", "B")), now)
            .unwrap();
        table
            .process_datagram(&announce([10, 0, 0, 1], 2, &sdp("o1", "C")), now)
            .unwrap();
        table
            .process_datagram(&announce([10, 0, 0, 2], 1, &sdp("o1", "D")), now)
            .unwrap();
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_child_paths_split_only_colliding_pairs() {
        let table = table();
        let now = Instant::now();
        let feeds = [([10, 0, 0, 1], "o1"), ([10, 0, 0, 1], "o2"), ([10, 0, 0, 2], "o1")];
        for (addr, origin) in feeds {
            table
                .process_datagram(&announce(addr, 1, &sdp(origin, "S")), now)
                .unwrap();
        }
        let records = table.snapshot();
        let paths = child_paths(&records);

        assert_eq!(paths[2], "sap://10.0.0.2/0x0001.sdp");
        assert_ne!(paths[0], paths[1]);
        assert!(paths[0].starts_with("sap://10.0.0.1/0x0001-"));
        assert_eq!(paths[0], records[0].disambiguated_path());

        table
            .process_datagram(&delete([10, 0, 0, 1], 1, b"o=o2\r\n"), now)
            .unwrap();
        assert_eq!(child_paths(&table.snapshot())[0], "sap://10.0.0.1/0x0001.sdp");
    }

    #[test]
    fn test_delete_known_and_unknown() {
        let table = table();
        let now = Instant::now();
        table
            .process_datagram(&announce([10, 0, 0, 1], 1, &sdp("o1", "A")), now)
            .unwrap();

        assert_eq!(
            table.process_datagram(&delete([10, 0, 0, 9], 1, b"o=o1\r\n"), now),
            Ok(UpdateOutcome::UnknownDelete)
        );
        assert_eq!(table.len(), 1);

        assert_eq!(
            table.process_datagram(&delete([10, 0, 0, 1], 1, b"o=o1\r\n"), now),
            Ok(UpdateOutcome::Deleted)
        );
        assert!(table.is_empty());
        assert_eq!(table.stats().deleted, 1);
    }

    #[test]
    fn test_delete_without_origin_line_matches_address_and_id() {
        let table = table();
        let now = Instant::now();
        table
            .process_datagram(&announce([10, 0, 0, 1], 7, &sdp("o1", "A")), now)
            .unwrap();
        assert_eq!(
            table.process_datagram(&delete([10, 0, 0, 1], 7, b""), now),
            Ok(UpdateOutcome::Deleted)
        );
    }

    #[test]
    fn test_non_sdp_is_not_cached() {
        let table = table();
        let mut header = Header::announce(Ipv4Addr::new(10, 0, 0, 1), 1);
        header.payload_type = "application/x-other".to_string();
        let dgram = encode_announcement(&header, b"whatever").unwrap();
        assert_eq!(
            table.process_datagram(&dgram, Instant::now()),
            Ok(UpdateOutcome::Ignored)
        );
        assert!(table.is_empty());
        assert_eq!(table.stats().ignored, 1);
    }

    #[test]
    fn test_oversized_inflate_not_cached() {
        let table = AnnouncementTable::new(Duration::from_secs(3600)).with_max_payload(256);
        let mut body = sdp("o1", "Bomb");
        body.extend(std::iter::repeat(b'a').take(4096));
        let mut header = Header::announce(Ipv4Addr::new(10, 0, 0, 1), 1);
        header.compressed = true;
        let dgram = encode_announcement(&header, &body).unwrap();

        assert_eq!(
            table.process_datagram(&dgram, Instant::now()),
            Err(ParseError::TooLarge { limit: 256 })
        );
        assert!(table.is_empty());
        assert_eq!(table.stats().malformed, 1);
    }

    #[test]
    fn test_malformed_dropped_and_counted() {
        let table = table();
        assert!(table.process_datagram(&[0x20, 0], Instant::now()).is_err());
        let bad_sdp = announce([10, 0, 0, 1], 1, b"v=0\r\ns=no origin\r\n");
        assert_eq!(
            table.process_datagram(&bad_sdp, Instant::now()),
            Err(ParseError::MissingOrigin)
        );
        assert!(table.is_empty());
        assert_eq!(table.stats().malformed, 2);
    }

    #[test]
    fn test_sweep_expired() {
        let table = AnnouncementTable::new(Duration::from_secs(10));
        let t0 = Instant::now();
        table
            .process_datagram(&announce([10, 0, 0, 1], 1, &sdp("o1", "A")), t0)
            .unwrap();
        table
            .process_datagram(
                &announce([10, 0, 0, 1], 2, &sdp("o2", "B")),
                t0 + Duration::from_secs(8),
            )
            .unwrap();

        assert_eq!(table.sweep_expired(t0 + Duration::from_secs(5)), 0);
        assert_eq!(table.sweep_expired(t0 + Duration::from_secs(11)), 1);
        let records = table.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key.msg_id, 2);
        assert_eq!(table.stats().expired, 1);
    }

    #[test]
    fn test_snapshot_is_insertion_ordered() {
        let table = table();
        let now = Instant::now();
        for id in [5u16, 1, 3] {
            table
                .process_datagram(&announce([10, 0, 0, 1], id, &sdp(&format!("o{id}"), "x")), now)
                .unwrap();
        }
        let ids: Vec<u16> = table.snapshot().iter().map(|r| r.key.msg_id).collect();
        assert_eq!(ids, vec![5, 1, 3]);
        assert_eq!(table.snapshot()[0].virtual_path(), "sap://10.0.0.1/0x0005.sdp");
    }

    #[test]
    fn test_random_sequences_keep_one_record_per_key() {
        let table = table();
        let now = Instant::now();
        let mut model = std::collections::HashSet::new();
        for _ in 0..500 {
            let id = fastrand::u16(0..8);
            let origin = format!("o{}", fastrand::u8(0..3));
            if fastrand::u8(0..4) == 0 {
                let line = format!("o={}\r\n", origin);
                table
                    .process_datagram(&delete([10, 0, 0, 1], id, line.as_bytes()), now)
                    .unwrap();
                model.remove(&(id, origin));
            } else {
                table
                    .process_datagram(&announce([10, 0, 0, 1], id, &sdp(&origin, "x")), now)
                    .unwrap();
                model.insert((id, origin));
            }
            assert_eq!(table.len(), model.len());
        }
    }
}
