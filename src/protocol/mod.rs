//! Wire formats
//!
//! ARP/RARP payloads and their Ethernet encapsulation, implemented from
//! scratch. All multi-byte fields are big-endian; the frame check sequence
//! is transmitted least-significant byte first.

pub mod arp;
pub mod crc;
pub mod ethernet;
pub mod types;

pub use arp::{ArpOp, ArpPacket};
pub use types::*;

/// Reasons a frame or payload fails to decode.
///
/// These are never fatal: an ill-formed input degrades to a silent drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("truncated frame or payload")]
    TooShort,
    #[error("frame check sequence mismatch")]
    BadCrc,
    #[error("unsupported hardware type")]
    BadHwType,
    #[error("unsupported protocol type")]
    BadProtoType,
    #[error("invalid address lengths")]
    BadLens,
    #[error("invalid operation code")]
    BadOp,
}
