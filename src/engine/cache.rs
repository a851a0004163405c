//! Resolution cache (IP to MAC mapping)
//!
//! Bounded per-interface table. Static entries are administratively pinned:
//! protocol traffic never updates, evicts, or ages them. Dynamic entries
//! age out and are evicted oldest-first when the table is full.

use crate::protocol::MacAddr;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// How an entry got into the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Administratively pinned, never aged or replaced by traffic
    Static,
    /// Learned from traffic, subject to TTL
    Dynamic,
}

/// Cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub mac: MacAddr,
    pub inserted_at: u64,
    pub kind: EntryKind,
}

/// Outcome of a dynamic insert or refresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheInsert {
    /// Existing dynamic entry refreshed in place
    Updated,
    /// New dynamic entry added
    Inserted,
    /// Oldest dynamic entry evicted to make room, then added
    InsertedWithEviction(Ipv4Addr),
    /// A static entry pins this IP; nothing changed
    StaticViolation,
    /// Every slot holds a static entry; nothing changed
    Full,
}

/// Bounded IPv4 to MAC resolution cache
#[derive(Debug, Clone)]
pub struct ArpCache {
    entries: BTreeMap<Ipv4Addr, CacheEntry>,
    max_entries: usize,
    dynamic_ttl: u64,
}

impl ArpCache {
    pub fn new(max_entries: usize, dynamic_ttl_ms: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_entries,
            dynamic_ttl: dynamic_ttl_ms,
        }
    }

    /// Refresh the entry for `ip` in place, if one exists.
    ///
    /// Returns `None` when no entry exists, `Some(Updated)` on a refresh,
    /// `Some(StaticViolation)` when the IP is pinned.
    pub fn refresh(&mut self, ip: Ipv4Addr, mac: MacAddr, now: u64) -> Option<CacheInsert> {
        let entry = self.entries.get_mut(&ip)?;
        match entry.kind {
            EntryKind::Static => Some(CacheInsert::StaticViolation),
            EntryKind::Dynamic => {
                entry.mac = mac;
                entry.inserted_at = now;
                Some(CacheInsert::Updated)
            }
        }
    }

    /// Insert a dynamic binding, evicting the oldest dynamic entry if the
    /// table is full. An existing entry is refreshed (or, if static, left
    /// untouched).
    pub fn insert_dynamic(&mut self, ip: Ipv4Addr, mac: MacAddr, now: u64) -> CacheInsert {
        if let Some(outcome) = self.refresh(ip, mac, now) {
            return outcome;
        }

        let mut evicted = None;
        if self.entries.len() >= self.max_entries {
            match self.evict_oldest_dynamic() {
                Some(victim) => evicted = Some(victim),
                None => return CacheInsert::Full,
            }
        }

        self.entries.insert(
            ip,
            CacheEntry {
                mac,
                inserted_at: now,
                kind: EntryKind::Dynamic,
            },
        );

        match evicted {
            Some(victim) => CacheInsert::InsertedWithEviction(victim),
            None => CacheInsert::Inserted,
        }
    }

    /// Pin a static binding. Replaces any dynamic entry for the IP; evicts
    /// the oldest dynamic entry if the table is full. Fails only when the
    /// table is entirely static.
    pub fn insert_static(&mut self, ip: Ipv4Addr, mac: MacAddr) -> bool {
        let replaces_existing = self.entries.contains_key(&ip);
        if !replaces_existing
            && self.entries.len() >= self.max_entries
            && self.evict_oldest_dynamic().is_none()
        {
            return false;
        }

        self.entries.insert(
            ip,
            CacheEntry {
                mac,
                inserted_at: 0,
                kind: EntryKind::Static,
            },
        );
        true
    }

    /// Resolve an IP. Expired dynamic entries are treated as absent even
    /// before a sweep removes them.
    pub fn lookup(&self, ip: Ipv4Addr, now: u64) -> Option<(MacAddr, EntryKind)> {
        let entry = self.entries.get(&ip)?;
        if entry.kind == EntryKind::Dynamic && self.is_expired(entry, now) {
            return None;
        }
        Some((entry.mac, entry.kind))
    }

    /// Raw entry access, TTL not applied.
    pub fn get(&self, ip: Ipv4Addr) -> Option<&CacheEntry> {
        self.entries.get(&ip)
    }

    /// Remove all expired dynamic entries. Never grows the table.
    pub fn age(&mut self, now: u64) {
        let ttl = self.dynamic_ttl;
        self.entries
            .retain(|_, e| e.kind == EntryKind::Static || now < e.inserted_at + ttl);
    }

    fn is_expired(&self, entry: &CacheEntry, now: u64) -> bool {
        now >= entry.inserted_at + self.dynamic_ttl
    }

    /// Oldest dynamic entry by insertion time, ties resolved toward the
    /// numerically smallest IP. Returns the evicted key.
    fn evict_oldest_dynamic(&mut self) -> Option<Ipv4Addr> {
        let victim = self
            .entries
            .iter()
            .filter(|(_, e)| e.kind == EntryKind::Dynamic)
            .min_by_key(|(ip, e)| (e.inserted_at, **ip))
            .map(|(ip, _)| *ip)?;
        self.entries.remove(&victim);
        Some(victim)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
