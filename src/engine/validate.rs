//! Inbound packet validation
//!
//! Every check runs before any state mutation; a failed check is a silent
//! drop. Structural parsing happens in the codec; this module covers the
//! semantic rules.

use super::interface::InterfaceState;
use crate::protocol::ArpPacket;
use std::fmt;

/// Why an inbound packet was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Broadcast sender MAC: replying would amplify
    BroadcastSource,
    /// Multicast sender MAC: no host legitimately sends from one
    MulticastSource,
    /// All-zero sender MAC
    ZeroSource,
    /// Sender claims an address outside the interface's subnet
    CrossSubnet,
    /// RARP traffic on an interface without RARP service
    RarpDisabled,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DropReason::BroadcastSource => "broadcast source MAC",
            DropReason::MulticastSource => "multicast source MAC",
            DropReason::ZeroSource => "zero source MAC",
            DropReason::CrossSubnet => "sender outside subnet",
            DropReason::RarpDisabled => "RARP not enabled",
        };
        f.write_str(s)
    }
}

/// Apply the semantic acceptance rules for `iface`.
///
/// An unspecified sender IP is exempt from the subnet check: conflict-
/// detection probes and RARP clients have no address yet.
pub fn validate_inbound(pkt: &ArpPacket, iface: &InterfaceState) -> Result<(), DropReason> {
    if pkt.sender_mac.is_broadcast() {
        return Err(DropReason::BroadcastSource);
    }
    if pkt.sender_mac.is_multicast() {
        return Err(DropReason::MulticastSource);
    }
    if pkt.sender_mac.is_zero() {
        return Err(DropReason::ZeroSource);
    }

    if pkt.op.is_rarp() && !iface.rarp_enabled {
        return Err(DropReason::RarpDisabled);
    }

    if let Some(subnet) = iface.subnet {
        if !pkt.sender_ip.is_unspecified() && !subnet.contains(pkt.sender_ip) {
            return Err(DropReason::CrossSubnet);
        }
    }

    Ok(())
}
