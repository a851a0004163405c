//! Outstanding resolution requests
//!
//! One record per unresolved target. Retransmission and failure handling
//! are driven by the engine's tick; this table only keeps the counters.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Retry state for one unresolved target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub attempts: u8,
    pub last_sent_at: u64,
}

/// Bounded set of outstanding requests
#[derive(Debug, Clone)]
pub struct PendingQueue {
    entries: BTreeMap<Ipv4Addr, PendingRequest>,
    max_entries: usize,
}

impl PendingQueue {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_entries,
        }
    }

    /// Ensure a record exists for `ip`. Evicts the longest-quiet record
    /// when full. Returns true if a new record was created.
    pub fn register(&mut self, ip: Ipv4Addr, now: u64) -> bool {
        if self.entries.contains_key(&ip) {
            return false;
        }
        if self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        self.entries.insert(
            ip,
            PendingRequest {
                attempts: 0,
                last_sent_at: now,
            },
        );
        true
    }

    pub fn get(&self, ip: Ipv4Addr) -> Option<PendingRequest> {
        self.entries.get(&ip).copied()
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.entries.contains_key(&ip)
    }

    /// Note an initial (non-retry) transmission.
    pub fn record_send(&mut self, ip: Ipv4Addr, now: u64) {
        if let Some(entry) = self.entries.get_mut(&ip) {
            entry.last_sent_at = now;
        }
    }

    /// Note a retransmission, bumping the attempt counter.
    pub fn record_retry(&mut self, ip: Ipv4Addr, now: u64) {
        if let Some(entry) = self.entries.get_mut(&ip) {
            entry.attempts += 1;
            entry.last_sent_at = now;
        }
    }

    /// Targets whose retry timer has elapsed.
    pub fn due(&self, now: u64, retry_interval: u64) -> Vec<Ipv4Addr> {
        self.entries
            .iter()
            .filter(|(_, e)| e.last_sent_at + retry_interval <= now)
            .map(|(ip, _)| *ip)
            .collect()
    }

    /// Resolution arrived (or gave up); drop the record.
    pub fn remove(&mut self, ip: Ipv4Addr) -> bool {
        self.entries.remove(&ip).is_some()
    }

    fn evict_oldest(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(ip, e)| (e.last_sent_at, **ip))
            .map(|(ip, _)| *ip);
        if let Some(ip) = victim {
            self.entries.remove(&ip);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[test]
    fn test_register_once() {
        let mut pending = PendingQueue::new(8);
        assert!(pending.register(ip(1), 100));
        assert!(!pending.register(ip(1), 200));
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending.get(ip(1)),
            Some(PendingRequest {
                attempts: 0,
                last_sent_at: 100
            })
        );
    }

    #[test]
    fn test_due_and_retry() {
        let mut pending = PendingQueue::new(8);
        pending.register(ip(1), 0);
        pending.register(ip(2), 500);

        assert_eq!(pending.due(999, 1000), Vec::<Ipv4Addr>::new());
        assert_eq!(pending.due(1000, 1000), vec![ip(1)]);
        assert_eq!(pending.due(1500, 1000), vec![ip(1), ip(2)]);

        pending.record_retry(ip(1), 1500);
        let entry = pending.get(ip(1)).unwrap();
        assert_eq!(entry.attempts, 1);
        assert_eq!(entry.last_sent_at, 1500);
        assert_eq!(pending.due(1600, 1000), vec![ip(2)]);
    }

    #[test]
    fn test_record_send_keeps_attempts() {
        let mut pending = PendingQueue::new(8);
        pending.register(ip(1), 0);
        pending.record_send(ip(1), 700);
        let entry = pending.get(ip(1)).unwrap();
        assert_eq!(entry.attempts, 0);
        assert_eq!(entry.last_sent_at, 700);
    }

    #[test]
    fn test_remove() {
        let mut pending = PendingQueue::new(8);
        pending.register(ip(1), 0);
        assert!(pending.remove(ip(1)));
        assert!(!pending.remove(ip(1)));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_bound_evicts_longest_quiet() {
        let mut pending = PendingQueue::new(2);
        pending.register(ip(1), 100);
        pending.register(ip(2), 200);
        pending.register(ip(3), 300);

        assert_eq!(pending.len(), 2);
        assert!(!pending.contains(ip(1)));
        assert!(pending.contains(ip(2)));
        assert!(pending.contains(ip(3)));
    }
}
