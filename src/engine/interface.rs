//! Per-interface resolution state

use super::acd::Acd;
use super::cache::ArpCache;
use super::negative::NegativeCache;
use super::pending::PendingQueue;
use super::processor::EngineSettings;
use crate::protocol::{Ipv4Cidr, MacAddr, VlanTag};
use std::net::Ipv4Addr;

/// One interface: identity plus its private tables. Interfaces share
/// nothing with each other except the engine-global flood table.
#[derive(Debug, Clone)]
pub struct InterfaceState {
    pub name: String,
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    /// When configured, senders claiming addresses outside are rejected
    pub subnet: Option<Ipv4Cidr>,
    /// Tag applied to engine-originated frames on this interface
    pub vlan: Option<VlanTag>,
    pub rarp_enabled: bool,
    pub cache: ArpCache,
    pub negative: NegativeCache,
    pub pending: PendingQueue,
    pub acd: Acd,
}

impl InterfaceState {
    pub fn new(
        name: &str,
        mac: MacAddr,
        ip: Ipv4Addr,
        subnet: Option<Ipv4Cidr>,
        vlan: Option<VlanTag>,
        rarp_enabled: bool,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            name: name.to_string(),
            mac,
            ip,
            subnet,
            vlan,
            rarp_enabled,
            cache: ArpCache::new(settings.max_cache, settings.dynamic_ttl_ms),
            negative: NegativeCache::new(settings.max_negative, settings.negative_ttl_ms),
            pending: PendingQueue::new(settings.max_pending),
            acd: Acd::new(
                settings.probe_num,
                settings.announce_num,
                settings.defend_interval_ms,
            ),
        }
    }
}
