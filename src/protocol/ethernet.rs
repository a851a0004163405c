//! Ethernet framing with 802.1Q tagging and frame check sequence
//!
//! Frames carry their FCS: `parse` verifies it, `FrameBuilder::build`
//! zero-pads the frame to the 60-byte minimum and appends it. Non-zero
//! padding is tolerated on decode.

use super::crc::crc32;
use super::{EtherType, MacAddr, VlanTag, WireError};

/// Header size without a VLAN tag
pub const HEADER_SIZE: usize = 14;
/// Header size with an 802.1Q tag
pub const TAGGED_HEADER_SIZE: usize = 18;
/// Minimum frame size before the FCS is appended
pub const MIN_FRAME_NO_FCS: usize = 60;
/// Frame check sequence size
pub const FCS_SIZE: usize = 4;
/// Maximum frame size without FCS, with VLAN tag
pub const MAX_FRAME_SIZE: usize = 1522;

/// Parsed Ethernet frame (zero-copy reference)
///
/// `buffer` holds the full frame including the FCS, already verified.
#[derive(Debug)]
pub struct Frame<'a> {
    buffer: &'a [u8],
    vlan_tag: Option<VlanTag>,
    payload_offset: usize,
}

impl<'a> Frame<'a> {
    /// Parse a frame and verify its check sequence.
    pub fn parse(buffer: &'a [u8]) -> Result<Self, WireError> {
        if buffer.len() < HEADER_SIZE + FCS_SIZE {
            return Err(WireError::TooShort);
        }

        let (body, fcs) = buffer.split_at(buffer.len() - FCS_SIZE);
        // The FCS is transmitted least-significant byte first
        let stored = u32::from_le_bytes(fcs.try_into().unwrap());
        if crc32(body) != stored {
            return Err(WireError::BadCrc);
        }

        let ethertype = u16::from_be_bytes([body[12], body[13]]);
        let (vlan_tag, payload_offset) = if ethertype == EtherType::Vlan as u16 {
            if body.len() < TAGGED_HEADER_SIZE {
                return Err(WireError::TooShort);
            }
            let tag = VlanTag::from_bytes([body[14], body[15]]);
            (Some(tag), TAGGED_HEADER_SIZE)
        } else {
            (None, HEADER_SIZE)
        };

        Ok(Self {
            buffer,
            vlan_tag,
            payload_offset,
        })
    }

    pub fn dst_mac(&self) -> MacAddr {
        MacAddr(self.buffer[0..6].try_into().unwrap())
    }

    pub fn src_mac(&self) -> MacAddr {
        MacAddr(self.buffer[6..12].try_into().unwrap())
    }

    /// The payload EtherType, behind the VLAN tag if one is present.
    pub fn ethertype(&self) -> u16 {
        let offset = self.payload_offset - 2;
        u16::from_be_bytes([self.buffer[offset], self.buffer[offset + 1]])
    }

    pub fn vlan_tag(&self) -> Option<VlanTag> {
        self.vlan_tag
    }

    /// Payload bytes, padding included, FCS excluded.
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.payload_offset..self.buffer.len() - FCS_SIZE]
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buffer
    }
}

/// Builder for constructing Ethernet frames
pub struct FrameBuilder {
    buffer: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_SIZE),
        }
    }

    pub fn dst_mac(mut self, mac: MacAddr) -> Self {
        self.buffer.extend_from_slice(&mac.0);
        self
    }

    pub fn src_mac(mut self, mac: MacAddr) -> Self {
        self.buffer.extend_from_slice(&mac.0);
        self
    }

    pub fn vlan_tag(mut self, tag: VlanTag) -> Self {
        self.buffer
            .extend_from_slice(&(EtherType::Vlan as u16).to_be_bytes());
        self.buffer.extend_from_slice(&tag.to_bytes());
        self
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.buffer.extend_from_slice(&ethertype.to_be_bytes());
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.buffer.extend_from_slice(payload);
        self
    }

    /// Pad to the minimum frame size and append the check sequence.
    pub fn build(mut self) -> Vec<u8> {
        if self.buffer.len() < MIN_FRAME_NO_FCS {
            self.buffer.resize(MIN_FRAME_NO_FCS, 0);
        }
        let fcs = crc32(&self.buffer);
        self.buffer.extend_from_slice(&fcs.to_le_bytes());
        self.buffer
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DST: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x01]);
    const SRC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x02]);

    fn build_untagged(payload: &[u8]) -> Vec<u8> {
        FrameBuilder::new()
            .dst_mac(DST)
            .src_mac(SRC)
            .ethertype(EtherType::Arp as u16)
            .payload(payload)
            .build()
    }

    #[test]
    fn test_roundtrip_untagged() {
        let bytes = build_untagged(&[0xAB; 28]);
        // 60 bytes padded + 4 FCS
        assert_eq!(bytes.len(), 64);

        let frame = Frame::parse(&bytes).unwrap();
        assert_eq!(frame.dst_mac(), DST);
        assert_eq!(frame.src_mac(), SRC);
        assert_eq!(frame.ethertype(), EtherType::Arp as u16);
        assert!(frame.vlan_tag().is_none());
        assert_eq!(&frame.payload()[..28], &[0xAB; 28]);
        // Padding is zero-filled and part of the payload view
        assert!(frame.payload()[28..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_roundtrip_tagged() {
        let tag = VlanTag {
            pcp: 3,
            dei: false,
            vid: 42,
        };
        let bytes = FrameBuilder::new()
            .dst_mac(DST)
            .src_mac(SRC)
            .vlan_tag(tag)
            .ethertype(EtherType::Rarp as u16)
            .payload(&[0xCD; 28])
            .build();

        let frame = Frame::parse(&bytes).unwrap();
        assert_eq!(frame.vlan_tag(), Some(tag));
        assert_eq!(frame.ethertype(), EtherType::Rarp as u16);
        assert_eq!(&frame.payload()[..28], &[0xCD; 28]);
    }

    #[test]
    fn test_bad_crc_rejected() {
        let mut bytes = build_untagged(&[0u8; 28]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(Frame::parse(&bytes), Err(WireError::BadCrc)));
    }

    #[test]
    fn test_corrupted_body_rejected() {
        let mut bytes = build_untagged(&[0u8; 28]);
        bytes[20] ^= 0x01;
        assert!(matches!(Frame::parse(&bytes), Err(WireError::BadCrc)));
    }

    #[test]
    fn test_too_short_rejected() {
        assert!(matches!(
            Frame::parse(&[0u8; 17]),
            Err(WireError::TooShort)
        ));
    }

    #[test]
    fn test_nonzero_padding_tolerated() {
        // Build a frame manually with non-zero padding bytes
        let mut body = Vec::new();
        body.extend_from_slice(&DST.0);
        body.extend_from_slice(&SRC.0);
        body.extend_from_slice(&(EtherType::Arp as u16).to_be_bytes());
        body.extend_from_slice(&[0x11; 28]);
        while body.len() < MIN_FRAME_NO_FCS {
            body.push(0x5A);
        }
        let fcs = crc32(&body);
        body.extend_from_slice(&fcs.to_le_bytes());

        let frame = Frame::parse(&body).unwrap();
        assert_eq!(&frame.payload()[..28], &[0x11; 28]);
    }

    #[test]
    fn test_short_payload_padded_to_minimum() {
        let bytes = build_untagged(&[1, 2, 3]);
        assert_eq!(bytes.len(), MIN_FRAME_NO_FCS + FCS_SIZE);
        let frame = Frame::parse(&bytes).unwrap();
        assert_eq!(&frame.payload()[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_determinism() {
        let a = build_untagged(&[7u8; 28]);
        let b = build_untagged(&[7u8; 28]);
        assert_eq!(a, b);
    }
}
