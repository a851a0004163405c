//! RARP responder (RFC 903)
//!
//! Answers reverse lookups from an administratively configured MAC-to-IP
//! map, typically for diskless hosts learning their address at boot.

use super::interface::InterfaceState;
use crate::protocol::{ArpOp, ArpPacket, MacAddr};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Answer a RARP request against the reverse map. Returns the reply to
/// unicast back, or `None` when the queried MAC is unknown or the op is
/// not a request.
pub fn process_rarp(
    pkt: &ArpPacket,
    reverse_map: &BTreeMap<MacAddr, Ipv4Addr>,
    iface: &InterfaceState,
) -> Option<ArpPacket> {
    if pkt.op != ArpOp::RarpRequest {
        return None;
    }

    let mapped = reverse_map.get(&pkt.target_mac)?;
    Some(ArpPacket::rarp_reply(
        iface.mac,
        iface.ip,
        pkt.target_mac,
        *mapped,
    ))
}
