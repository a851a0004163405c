//! Packet-processing engine
//!
//! Integrates the codec, validation, merge, conflict detection, RARP and
//! the shared flood table into the step/request/lookup/tick entry points.
//! Nothing here performs I/O or reads a clock: callers inject `now_ms`
//! (monotonic milliseconds) and own the returned frames, so equal inputs
//! always produce byte-identical outputs.

use super::acd::{AcdEvent, AcdPhase};
use super::flood::FloodControl;
use super::interface::InterfaceState;
use super::merge::{merge_packet, MergeStatus};
use super::rarp::process_rarp;
use super::validate::validate_inbound;
use crate::protocol::ethernet::{Frame, FrameBuilder};
use crate::protocol::{ArpOp, ArpPacket, EtherType, Ipv4Cidr, MacAddr, VlanTag};
use crate::telemetry::MetricsRegistry;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Engine tunables. Defaults match the hardening profile the engine was
/// designed around: 5-minute dynamic TTL, 1-minute negative TTL, 5 requests
/// per target per second.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub dynamic_ttl_ms: u64,
    pub negative_ttl_ms: u64,
    pub flood_window_ms: u64,
    pub flood_max: u32,
    pub max_cache: usize,
    pub max_negative: usize,
    pub max_flood: usize,
    pub max_pending: usize,
    pub probe_num: u8,
    pub announce_num: u8,
    pub defend_interval_ms: u64,
    pub retry_interval_ms: u64,
    pub max_attempts: u8,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dynamic_ttl_ms: 300_000,
            negative_ttl_ms: 60_000,
            flood_window_ms: 1_000,
            flood_max: 5,
            max_cache: 1024,
            max_negative: 256,
            max_flood: 512,
            max_pending: 128,
            probe_num: 3,
            announce_num: 2,
            defend_interval_ms: 10_000,
            retry_interval_ms: 1_000,
            max_attempts: 3,
        }
    }
}

/// Answer to a resolution query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A live (unexpired) binding exists
    Resolved(MacAddr),
    /// A recent resolution attempt failed; don't re-query yet
    Negative,
    /// Nothing is known about this address
    Unknown,
}

/// The engine: per-interface tables plus the shared flood limiter and
/// RARP reverse map. Single-owner; all mutation goes through `step`,
/// `request`, `tick` and `start_dad`.
pub struct Engine {
    interfaces: BTreeMap<String, InterfaceState>,
    flood: FloodControl,
    reverse_map: BTreeMap<MacAddr, Ipv4Addr>,
    settings: EngineSettings,
    metrics: Arc<MetricsRegistry>,
}

impl Engine {
    pub fn new(settings: EngineSettings, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            interfaces: BTreeMap::new(),
            flood: FloodControl::new(
                settings.max_flood,
                settings.flood_window_ms,
                settings.flood_max,
            ),
            reverse_map: BTreeMap::new(),
            settings,
            metrics,
        }
    }

    /// Build an engine from a loaded configuration.
    pub fn from_config(
        config: &crate::config::Config,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Self> {
        let mut engine = Engine::new(config.engine.settings(), metrics);

        for (name, iface_cfg) in &config.interfaces {
            let mac: MacAddr = iface_cfg
                .mac
                .as_deref()
                .ok_or_else(|| Error::Config(format!("interfaces.{name}: mac is required")))?
                .parse()
                .map_err(|_| Error::Config(format!("interfaces.{name}: invalid mac")))?;
            let (ip, subnet) = parse_address(&iface_cfg.address)
                .ok_or_else(|| Error::Config(format!("interfaces.{name}: invalid address")))?;
            let vlan = iface_cfg.vlan.map(VlanTag::new);

            engine.add_interface(name, mac, ip, Some(subnet), vlan, iface_cfg.rarp);

            let mut statics = Vec::new();
            for (ip_str, mac_str) in &iface_cfg.static_entries {
                let entry_ip: Ipv4Addr = ip_str.parse().map_err(|_| {
                    Error::Config(format!("interfaces.{name}: invalid static entry ip {ip_str}"))
                })?;
                let entry_mac: MacAddr = mac_str.parse().map_err(|_| {
                    Error::Config(format!(
                        "interfaces.{name}: invalid static entry mac {mac_str}"
                    ))
                })?;
                statics.push((entry_ip, entry_mac));
            }
            statics.sort_by_key(|(ip, _)| *ip);
            for (entry_ip, entry_mac) in statics {
                engine.add_static_entry(name, entry_ip, entry_mac)?;
            }
        }

        for (mac_str, ip) in &config.reverse_map {
            let mac: MacAddr = mac_str
                .parse()
                .map_err(|_| Error::Config(format!("reverse_map: invalid mac {mac_str}")))?;
            engine.add_reverse_mapping(mac, *ip);
        }

        Ok(engine)
    }

    pub fn add_interface(
        &mut self,
        name: &str,
        mac: MacAddr,
        ip: Ipv4Addr,
        subnet: Option<Ipv4Cidr>,
        vlan: Option<VlanTag>,
        rarp_enabled: bool,
    ) {
        self.metrics.register_interface(name);
        self.interfaces.insert(
            name.to_string(),
            InterfaceState::new(name, mac, ip, subnet, vlan, rarp_enabled, &self.settings),
        );
        debug!(iface = name, %mac, %ip, "interface added");
    }

    /// Pin an administrative binding on an interface.
    pub fn add_static_entry(&mut self, iface_id: &str, ip: Ipv4Addr, mac: MacAddr) -> Result<()> {
        let iface = self.iface_mut(iface_id)?;
        if !iface.cache.insert_static(ip, mac) {
            return Err(Error::Config(format!(
                "interfaces.{iface_id}: static entry table full"
            )));
        }
        Ok(())
    }

    pub fn add_reverse_mapping(&mut self, mac: MacAddr, ip: Ipv4Addr) {
        self.reverse_map.insert(mac, ip);
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceState> {
        self.interfaces.get(name)
    }

    pub fn interface_names(&self) -> Vec<String> {
        self.interfaces.keys().cloned().collect()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn acd_phase(&self, iface_id: &str) -> Option<AcdPhase> {
        self.interfaces.get(iface_id).map(|i| i.acd.phase())
    }

    fn iface_mut(&mut self, iface_id: &str) -> Result<&mut InterfaceState> {
        self.interfaces
            .get_mut(iface_id)
            .ok_or_else(|| Error::InterfaceNotFound {
                name: iface_id.to_string(),
            })
    }

    /// Process one received frame. Returns the reply frame to send, if
    /// any. Malformed or hostile input degrades to a silent drop; this
    /// never fails.
    pub fn step(&mut self, iface_id: &str, frame_bytes: &[u8], now: u64) -> Option<Vec<u8>> {
        self.metrics.record_rx(iface_id, frame_bytes.len());

        let frame = match Frame::parse(frame_bytes) {
            Ok(f) => f,
            Err(e) => {
                trace!(iface = iface_id, error = %e, "dropping malformed frame");
                self.metrics.frames_malformed.inc();
                return None;
            }
        };

        let ethertype = frame.ethertype();
        if ethertype != EtherType::Arp as u16 && ethertype != EtherType::Rarp as u16 {
            trace!(iface = iface_id, ethertype, "ignoring ethertype");
            return None;
        }

        let Some(iface) = self.interfaces.get_mut(iface_id) else {
            warn!(iface = iface_id, "frame for unknown interface");
            return None;
        };

        let pkt = match ArpPacket::parse(frame.payload()) {
            Ok(p) => p,
            Err(e) => {
                trace!(iface = iface_id, error = %e, "dropping malformed payload");
                self.metrics.frames_malformed.inc();
                return None;
            }
        };

        if let Err(reason) = validate_inbound(&pkt, iface) {
            trace!(iface = iface_id, %reason, sender = %pkt.sender_mac, "dropping packet");
            self.metrics.record_drop(reason);
            return None;
        }

        match pkt.op {
            ArpOp::Request => self.metrics.requests_received.inc(),
            ArpOp::Reply => self.metrics.replies_received.inc(),
            ArpOp::RarpRequest | ArpOp::RarpReply => self.metrics.rarp_received.inc(),
        }

        // Conflict signals are consumed by the detection machine before
        // any cache mutation
        match iface.acd.observe(&pkt, iface.mac, iface.ip, now) {
            Some(AcdEvent::ConflictDetected) => {
                warn!(iface = iface_id, claimant = %pkt.sender_mac, "address conflict detected");
                self.metrics.dad_conflicts.inc();
                return None;
            }
            Some(AcdEvent::DefenseScheduled) => {
                warn!(iface = iface_id, claimant = %pkt.sender_mac, "defending bound address");
                self.metrics.dad_defenses.inc();
                return None;
            }
            None => {}
        }

        // Conflict notice when no detection cycle is running
        if pkt.sender_ip == iface.ip && pkt.sender_mac != iface.mac {
            warn!(
                iface = iface_id,
                claimant = %pkt.sender_mac,
                ip = %iface.ip,
                "foreign claim on own address"
            );
            self.metrics.conflicts_observed.inc();
            return None;
        }

        let (reply, out_ethertype) = match pkt.op {
            ArpOp::Request | ArpOp::Reply => {
                let outcome = merge_packet(&pkt, iface, now);
                match outcome.status {
                    MergeStatus::StaticViolation => {
                        debug!(iface = iface_id, ip = %pkt.sender_ip, "update against static entry refused");
                        self.metrics.static_violations.inc();
                    }
                    MergeStatus::CacheFull => {
                        debug!(iface = iface_id, ip = %pkt.sender_ip, "cache has no evictable slot");
                        self.metrics.cache_full_drops.inc();
                    }
                    _ => {}
                }
                (outcome.reply, EtherType::Arp)
            }
            ArpOp::RarpRequest | ArpOp::RarpReply => {
                (process_rarp(&pkt, &self.reverse_map, iface), EtherType::Rarp)
            }
        };

        let reply = reply?;
        match reply.op {
            ArpOp::RarpReply => self.metrics.rarp_replies_sent.inc(),
            _ => self.metrics.replies_sent.inc(),
        }

        // Unicast back to the requester, inbound VLAN tag copied through
        let out = encapsulate(iface, frame.vlan_tag(), pkt.sender_mac, out_ethertype, &reply);
        self.metrics.record_tx(iface_id, out.len());
        debug!(iface = iface_id, to = %pkt.sender_mac, "sending reply");
        Some(out)
    }

    /// Ask for a resolution of `target`. Emits a broadcast request iff
    /// flood control allows; an unresolved target keeps a pending entry
    /// either way, so `tick` retries later.
    pub fn request(&mut self, iface_id: &str, target: Ipv4Addr, now: u64) -> Option<Vec<u8>> {
        let Some(iface) = self.interfaces.get_mut(iface_id) else {
            warn!(iface = iface_id, "request on unknown interface");
            return None;
        };

        if iface.cache.lookup(target, now).is_some() {
            trace!(iface = iface_id, %target, "already resolved");
            return None;
        }
        if iface.negative.is_negative(target, now) {
            trace!(iface = iface_id, %target, "suppressed by negative cache");
            self.metrics.negative_suppressed.inc();
            return None;
        }

        iface.pending.register(target, now);

        if !self.flood.allow(target, now) {
            debug!(iface = iface_id, %target, "suppressed by flood control");
            self.metrics.flood_suppressed.inc();
            return None;
        }

        iface.pending.record_send(target, now);
        let pkt = ArpPacket::request(iface.mac, iface.ip, target);
        self.metrics.requests_sent.inc();
        let out = encapsulate(iface, iface.vlan, MacAddr::BROADCAST, EtherType::Arp, &pkt);
        self.metrics.record_tx(iface_id, out.len());
        Some(out)
    }

    /// Query the caches without touching them.
    pub fn lookup(&self, iface_id: &str, ip: Ipv4Addr, now: u64) -> Resolution {
        let Some(iface) = self.interfaces.get(iface_id) else {
            return Resolution::Unknown;
        };
        if let Some((mac, _)) = iface.cache.lookup(ip, now) {
            return Resolution::Resolved(mac);
        }
        if iface.negative.is_negative(ip, now) {
            return Resolution::Negative;
        }
        Resolution::Unknown
    }

    /// Housekeeping: age the caches, retransmit due pending requests,
    /// advance conflict detection. Returns outbound frames tagged with
    /// their interface. Never grows any bounded table.
    pub fn tick(&mut self, now: u64) -> Vec<(String, Vec<u8>)> {
        let mut out = Vec::new();
        let retry_interval = self.settings.retry_interval_ms;
        let max_attempts = self.settings.max_attempts;

        for (name, iface) in self.interfaces.iter_mut() {
            iface.cache.age(now);
            iface.negative.age(now);

            let acd_out = iface.acd.tick(iface.mac, iface.ip, now);
            if let Some(addr) = acd_out.bound {
                debug!(iface = %name, %addr, "conflict detection complete, address bound");
                iface.ip = addr;
            }
            for pkt in acd_out.packets {
                if pkt.sender_ip.is_unspecified() {
                    self.metrics.dad_probes_sent.inc();
                } else {
                    self.metrics.dad_announcements_sent.inc();
                }
                let frame = encapsulate(iface, iface.vlan, MacAddr::BROADCAST, EtherType::Arp, &pkt);
                self.metrics.record_tx(name, frame.len());
                out.push((name.clone(), frame));
            }

            for target in iface.pending.due(now, retry_interval) {
                let Some(entry) = iface.pending.get(target) else {
                    continue;
                };
                if entry.attempts >= max_attempts {
                    debug!(iface = %name, %target, "resolution failed, recording negative entry");
                    iface.pending.remove(target);
                    iface.negative.record(target, now);
                    self.metrics.resolutions_failed.inc();
                    continue;
                }
                if !self.flood.allow(target, now) {
                    self.metrics.flood_suppressed.inc();
                    continue;
                }
                iface.pending.record_retry(target, now);
                let pkt = ArpPacket::request(iface.mac, iface.ip, target);
                self.metrics.requests_sent.inc();
                let frame = encapsulate(iface, iface.vlan, MacAddr::BROADCAST, EtherType::Arp, &pkt);
                self.metrics.record_tx(name, frame.len());
                out.push((name.clone(), frame));
            }
        }

        self.flood.prune(now);
        self.update_gauges();
        out
    }

    /// Begin conflict detection for a candidate address. On success the
    /// candidate becomes the interface's bound address; on conflict the
    /// caller must pick a new candidate (observe via `acd_phase`).
    pub fn start_dad(
        &mut self,
        iface_id: &str,
        candidate: Ipv4Addr,
        now: u64,
        seed: u64,
    ) -> Result<()> {
        let iface = self.iface_mut(iface_id)?;
        debug!(iface = iface_id, %candidate, "starting address conflict detection");
        iface.acd.start(candidate, now, seed);
        Ok(())
    }

    fn update_gauges(&self) {
        let cache: usize = self.interfaces.values().map(|i| i.cache.len()).sum();
        let negative: usize = self.interfaces.values().map(|i| i.negative.len()).sum();
        let pending: usize = self.interfaces.values().map(|i| i.pending.len()).sum();
        self.metrics.set_cache_size(cache);
        self.metrics.set_negative_size(negative);
        self.metrics.set_pending_size(pending);
        self.metrics.set_flood_size(self.flood.len());
    }
}

fn parse_address(address: &str) -> Option<(Ipv4Addr, Ipv4Cidr)> {
    let (ip_str, prefix_str) = address.split_once('/')?;
    let ip: Ipv4Addr = ip_str.parse().ok()?;
    let prefix: u8 = prefix_str.parse().ok()?;
    let subnet = Ipv4Cidr::new(ip, prefix)?;
    Some((ip, subnet))
}

fn encapsulate(
    iface: &InterfaceState,
    vlan: Option<VlanTag>,
    dst: MacAddr,
    ethertype: EtherType,
    pkt: &ArpPacket,
) -> Vec<u8> {
    let mut builder = FrameBuilder::new().dst_mac(dst).src_mac(iface.mac);
    if let Some(tag) = vlan {
        builder = builder.vlan_tag(tag);
    }
    builder
        .ethertype(ethertype as u16)
        .payload(&pkt.to_bytes())
        .build()
}
