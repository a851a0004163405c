//! Packet I/O backends
//!
//! The engine itself never performs I/O; the daemon loop feeds it through
//! this abstraction. AF_PACKET is the only backend: ARP traffic is far too
//! light to justify anything faster.

mod af_packet;

pub use af_packet::AfPacketSocket;

use crate::Result;
use std::future::Future;

/// Information about a received packet
#[derive(Debug, Clone)]
pub struct RxInfo {
    /// Number of bytes received
    pub len: usize,
    /// VLAN ID if the kernel stripped it
    pub vlan_id: Option<u16>,
}

/// Packet I/O backend trait
pub trait Capture: Send + Sync {
    /// Receive a packet into the provided buffer
    fn recv(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<RxInfo>> + Send;

    /// Send a packet
    fn send(&mut self, buf: &[u8]) -> impl Future<Output = Result<usize>> + Send;
}
