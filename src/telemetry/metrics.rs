//! Metrics collection for the engine.
//!
//! Thread-safe counters for packet processing at both the global and
//! per-interface level. The engine only increments; exposition happens
//! outside the hot path via `export`.

use crate::engine::DropReason;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-interface statistics.
#[derive(Debug, Default)]
pub struct InterfaceStats {
    pub rx_frames: Counter,
    pub rx_bytes: Counter,
    pub tx_frames: Counter,
    pub tx_bytes: Counter,
}

impl InterfaceStats {
    pub fn record_rx(&self, bytes: usize) {
        self.rx_frames.inc();
        self.rx_bytes.add(bytes as u64);
    }

    pub fn record_tx(&self, bytes: usize) {
        self.tx_frames.inc();
        self.tx_bytes.add(bytes as u64);
    }
}

/// Global metrics registry for the engine.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Per-interface statistics.
    interfaces: RwLock<HashMap<String, InterfaceStats>>,

    // Traffic counters
    pub requests_received: Counter,
    pub replies_received: Counter,
    pub rarp_received: Counter,
    pub requests_sent: Counter,
    pub replies_sent: Counter,
    pub rarp_replies_sent: Counter,

    // Drop counters
    pub frames_malformed: Counter,
    pub drops_bad_source: Counter,
    pub drops_cross_subnet: Counter,
    pub drops_rarp_disabled: Counter,
    pub static_violations: Counter,
    pub cache_full_drops: Counter,

    // Hardening counters
    pub flood_suppressed: Counter,
    pub negative_suppressed: Counter,
    pub resolutions_failed: Counter,
    pub conflicts_observed: Counter,

    // Conflict detection
    pub dad_probes_sent: Counter,
    pub dad_announcements_sent: Counter,
    pub dad_conflicts: Counter,
    pub dad_defenses: Counter,

    // Table size gauges
    pub cache_size: AtomicU64,
    pub negative_size: AtomicU64,
    pub pending_size: AtomicU64,
    pub flood_size: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an interface for statistics tracking.
    pub fn register_interface(&self, name: &str) {
        let mut interfaces = self.interfaces.write().unwrap();
        interfaces.entry(name.to_string()).or_default();
    }

    pub fn record_rx(&self, interface: &str, bytes: usize) {
        if let Some(stats) = self.interfaces.read().unwrap().get(interface) {
            stats.record_rx(bytes);
        }
    }

    pub fn record_tx(&self, interface: &str, bytes: usize) {
        if let Some(stats) = self.interfaces.read().unwrap().get(interface) {
            stats.record_tx(bytes);
        }
    }

    /// Count a validation drop under its reason.
    pub fn record_drop(&self, reason: DropReason) {
        match reason {
            DropReason::BroadcastSource | DropReason::MulticastSource | DropReason::ZeroSource => {
                self.drops_bad_source.inc()
            }
            DropReason::CrossSubnet => self.drops_cross_subnet.inc(),
            DropReason::RarpDisabled => self.drops_rarp_disabled.inc(),
        }
    }

    pub fn set_cache_size(&self, size: usize) {
        self.cache_size.store(size as u64, Ordering::Relaxed);
    }

    pub fn set_negative_size(&self, size: usize) {
        self.negative_size.store(size as u64, Ordering::Relaxed);
    }

    pub fn set_pending_size(&self, size: usize) {
        self.pending_size.store(size as u64, Ordering::Relaxed);
    }

    pub fn set_flood_size(&self, size: usize) {
        self.flood_size.store(size as u64, Ordering::Relaxed);
    }

    /// Exports all metrics as key-value pairs, easily convertible to
    /// Prometheus exposition format later.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("requests_received".into(), self.requests_received.get()),
            ("replies_received".into(), self.replies_received.get()),
            ("rarp_received".into(), self.rarp_received.get()),
            ("requests_sent".into(), self.requests_sent.get()),
            ("replies_sent".into(), self.replies_sent.get()),
            ("rarp_replies_sent".into(), self.rarp_replies_sent.get()),
            ("frames_malformed".into(), self.frames_malformed.get()),
            ("drops_bad_source".into(), self.drops_bad_source.get()),
            ("drops_cross_subnet".into(), self.drops_cross_subnet.get()),
            ("drops_rarp_disabled".into(), self.drops_rarp_disabled.get()),
            ("static_violations".into(), self.static_violations.get()),
            ("cache_full_drops".into(), self.cache_full_drops.get()),
            ("flood_suppressed".into(), self.flood_suppressed.get()),
            ("negative_suppressed".into(), self.negative_suppressed.get()),
            ("resolutions_failed".into(), self.resolutions_failed.get()),
            ("conflicts_observed".into(), self.conflicts_observed.get()),
            ("dad_probes_sent".into(), self.dad_probes_sent.get()),
            (
                "dad_announcements_sent".into(),
                self.dad_announcements_sent.get(),
            ),
            ("dad_conflicts".into(), self.dad_conflicts.get()),
            ("dad_defenses".into(), self.dad_defenses.get()),
            ("cache_size".into(), self.cache_size.load(Ordering::Relaxed)),
            (
                "negative_size".into(),
                self.negative_size.load(Ordering::Relaxed),
            ),
            (
                "pending_size".into(),
                self.pending_size.load(Ordering::Relaxed),
            ),
            ("flood_size".into(), self.flood_size.load(Ordering::Relaxed)),
        ];

        let interfaces = self.interfaces.read().unwrap();
        for (name, stats) in interfaces.iter() {
            result.extend([
                (format!("{}_rx_frames", name), stats.rx_frames.get()),
                (format!("{}_rx_bytes", name), stats.rx_bytes.get()),
                (format!("{}_tx_frames", name), stats.tx_frames.get()),
                (format!("{}_tx_bytes", name), stats.tx_bytes.get()),
            ]);
        }

        result
    }
}
