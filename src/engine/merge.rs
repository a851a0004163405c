//! RFC 826 merge processing
//!
//! The two-sided cache update: refresh the sender's binding if it is
//! already known; learn it only when the packet is addressed to us. A
//! request for our address additionally produces a unicast reply.

use super::cache::CacheInsert;
use super::interface::InterfaceState;
use crate::protocol::{ArpOp, ArpPacket};
use std::net::Ipv4Addr;

/// What happened to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    /// Existing binding refreshed
    Merged,
    /// New binding learned (the packet was for us)
    Inserted,
    /// A static entry pins the sender's IP; update refused
    StaticViolation,
    /// Table entirely static; insert refused
    CacheFull,
    /// Sender unknown and the packet was not for us; nothing learned
    NotForUs,
}

/// Merge result: the cache outcome plus the reply to send, if any.
/// The reply is independent of the cache outcome - a refused update
/// still answers a request for our address.
#[derive(Debug)]
pub struct MergeOutcome {
    pub status: MergeStatus,
    pub reply: Option<ArpPacket>,
    /// Sender address whose resolution just completed
    pub learned: Option<Ipv4Addr>,
}

pub fn merge_packet(pkt: &ArpPacket, iface: &mut InterfaceState, now: u64) -> MergeOutcome {
    let for_us = pkt.target_ip == iface.ip;

    let status = match iface.cache.refresh(pkt.sender_ip, pkt.sender_mac, now) {
        Some(CacheInsert::StaticViolation) => MergeStatus::StaticViolation,
        Some(_) => MergeStatus::Merged,
        None if for_us && !pkt.sender_ip.is_unspecified() => {
            match iface.cache.insert_dynamic(pkt.sender_ip, pkt.sender_mac, now) {
                CacheInsert::Full => MergeStatus::CacheFull,
                CacheInsert::StaticViolation => MergeStatus::StaticViolation,
                _ => MergeStatus::Inserted,
            }
        }
        None => MergeStatus::NotForUs,
    };

    let learned = match status {
        MergeStatus::Merged | MergeStatus::Inserted => Some(pkt.sender_ip),
        _ => None,
    };
    if let Some(ip) = learned {
        iface.negative.clear(ip);
        iface.pending.remove(ip);
    }

    let reply = if pkt.op == ArpOp::Request && for_us {
        Some(ArpPacket::reply(
            iface.mac,
            iface.ip,
            pkt.sender_mac,
            pkt.sender_ip,
        ))
    } else {
        None
    };

    MergeOutcome {
        status,
        reply,
        learned,
    }
}
