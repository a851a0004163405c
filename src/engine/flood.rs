//! Flood control
//!
//! Per-target sliding-window limiter on outbound requests. Shared across
//! interfaces so a target cannot be hammered from several ports at once.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy)]
struct FloodRecord {
    window_start: u64,
    count: u32,
}

/// Sliding-window request limiter, bounded by oldest-window eviction
#[derive(Debug, Clone)]
pub struct FloodControl {
    records: BTreeMap<Ipv4Addr, FloodRecord>,
    max_targets: usize,
    window: u64,
    max_per_window: u32,
}

impl FloodControl {
    pub fn new(max_targets: usize, window_ms: u64, max_per_window: u32) -> Self {
        Self {
            records: BTreeMap::new(),
            max_targets,
            window: window_ms,
            max_per_window,
        }
    }

    /// Account for one outbound request toward `target`. Returns whether
    /// the request may be sent.
    pub fn allow(&mut self, target: Ipv4Addr, now: u64) -> bool {
        if let Some(record) = self.records.get_mut(&target) {
            if now.saturating_sub(record.window_start) >= self.window {
                record.window_start = now;
                record.count = 1;
                return true;
            }
            if record.count < self.max_per_window {
                record.count += 1;
                return true;
            }
            return false;
        }

        if self.records.len() >= self.max_targets {
            self.evict_oldest_window();
        }
        self.records.insert(
            target,
            FloodRecord {
                window_start: now,
                count: 1,
            },
        );
        true
    }

    /// Drop records whose window has fully elapsed. Never grows the table.
    pub fn prune(&mut self, now: u64) {
        let window = self.window;
        self.records
            .retain(|_, r| now.saturating_sub(r.window_start) < window);
    }

    fn evict_oldest_window(&mut self) {
        let victim = self
            .records
            .iter()
            .min_by_key(|(ip, r)| (r.window_start, **ip))
            .map(|(ip, _)| *ip);
        if let Some(ip) = victim {
            self.records.remove(&ip);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
