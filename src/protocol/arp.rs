//! ARP (Address Resolution Protocol) - RFC 826, with RARP opcodes (RFC 903)

use super::{EtherType, MacAddr, WireError};
use std::net::Ipv4Addr;

/// ARP payload size (for Ethernet/IPv4)
pub const ARP_PACKET_SIZE: usize = 28;

/// Hardware type for Ethernet, shared by ARP and RARP
pub const HW_TYPE_ETHERNET: u16 = 1;

/// ARP/RARP operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
    RarpRequest = 3,
    RarpReply = 4,
}

impl ArpOp {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(ArpOp::Request),
            2 => Some(ArpOp::Reply),
            3 => Some(ArpOp::RarpRequest),
            4 => Some(ArpOp::RarpReply),
            _ => None,
        }
    }

    pub fn is_rarp(&self) -> bool {
        matches!(self, ArpOp::RarpRequest | ArpOp::RarpReply)
    }
}

/// ARP packet (Ethernet/IPv4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket {
    pub op: ArpOp,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Parse an ARP packet from a buffer. Trailing bytes (frame padding)
    /// are ignored.
    pub fn parse(buffer: &[u8]) -> Result<Self, WireError> {
        if buffer.len() < ARP_PACKET_SIZE {
            return Err(WireError::TooShort);
        }

        let htype = u16::from_be_bytes([buffer[0], buffer[1]]);
        if htype != HW_TYPE_ETHERNET {
            return Err(WireError::BadHwType);
        }

        let ptype = u16::from_be_bytes([buffer[2], buffer[3]]);
        if ptype != EtherType::Ipv4 as u16 {
            return Err(WireError::BadProtoType);
        }

        if buffer[4] != 6 || buffer[5] != 4 {
            return Err(WireError::BadLens);
        }

        let op = u16::from_be_bytes([buffer[6], buffer[7]]);
        let op = ArpOp::from_u16(op).ok_or(WireError::BadOp)?;

        let sender_mac = MacAddr(buffer[8..14].try_into().unwrap());
        let sender_ip = Ipv4Addr::new(buffer[14], buffer[15], buffer[16], buffer[17]);
        let target_mac = MacAddr(buffer[18..24].try_into().unwrap());
        let target_ip = Ipv4Addr::new(buffer[24], buffer[25], buffer[26], buffer[27]);

        Ok(Self {
            op,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        })
    }

    /// Serialize to the 28-byte wire form
    pub fn to_bytes(&self) -> [u8; ARP_PACKET_SIZE] {
        let mut buf = [0u8; ARP_PACKET_SIZE];

        buf[0..2].copy_from_slice(&HW_TYPE_ETHERNET.to_be_bytes());
        buf[2..4].copy_from_slice(&(EtherType::Ipv4 as u16).to_be_bytes());
        buf[4] = 6;
        buf[5] = 4;
        buf[6..8].copy_from_slice(&(self.op as u16).to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.0);
        buf[14..18].copy_from_slice(&self.sender_ip.octets());
        buf[18..24].copy_from_slice(&self.target_mac.0);
        buf[24..28].copy_from_slice(&self.target_ip.octets());

        buf
    }

    /// Create an ARP request
    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            op: ArpOp::Request,
            sender_mac,
            sender_ip,
            target_mac: MacAddr::ZERO,
            target_ip,
        }
    }

    /// Create an ARP reply
    pub fn reply(
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            op: ArpOp::Reply,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    /// Conflict-detection probe: a request with an unspecified sender
    /// address, so the probe itself cannot pollute caches (RFC 5227 §1.1).
    pub fn probe(sender_mac: MacAddr, candidate: Ipv4Addr) -> Self {
        Self {
            op: ArpOp::Request,
            sender_mac,
            sender_ip: Ipv4Addr::UNSPECIFIED,
            target_mac: MacAddr::ZERO,
            target_ip: candidate,
        }
    }

    /// Gratuitous announcement: sender and target protocol addresses equal.
    /// Used for both the Announce and Defend phases.
    pub fn announcement(sender_mac: MacAddr, ip: Ipv4Addr) -> Self {
        Self {
            op: ArpOp::Request,
            sender_mac,
            sender_ip: ip,
            target_mac: MacAddr::ZERO,
            target_ip: ip,
        }
    }

    /// Create a RARP reply carrying the resolved protocol address
    pub fn rarp_reply(
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            op: ArpOp::RarpReply,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    pub fn is_gratuitous(&self) -> bool {
        self.sender_ip == self.target_ip && !self.sender_ip.is_unspecified()
    }
}
