// SPDX-License-Identifier: Apache-2.0

//! Ethernet frame handling: the [`Mac`] address type and the owned
//! [`Frame`] the engine moves through the pipeline.

/// Length of an untagged Ethernet header.
pub const ETH_HLEN: usize = 14;

/// Length of an 802.1Q tag.
pub const VLAN_HLEN: usize = 4;

/// Ethertype of an 802.1Q-tagged frame.
pub const ETHERTYPE_VLAN: u16 = 0x8100;

/// A MAC address: a transparent wrapper around `[u8; 6]`.
#[must_use]
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mac(pub [u8; 6]);

impl Mac {
    /// The broadcast `Mac`.
    pub const BROADCAST: Mac = Mac([u8::MAX; 6]);
    /// The zero `Mac`.
    pub const ZERO: Mac = Mac([0; 6]);

    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self == &Mac::BROADCAST
    }

    /// True iff the least significant bit of the first octet is one.
    #[must_use]
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self == &Mac::ZERO
    }

    /// The address widened to the 48 low bits of a datapath id.
    #[must_use]
    pub fn datapath_id(&self) -> u64 {
        self.0.iter().fold(0u64, |id, &b| (id << 8) | u64::from(b))
    }
}

impl From<[u8; 6]> for Mac {
    fn from(value: [u8; 6]) -> Self {
        Mac(value)
    }
}

impl From<Mac> for [u8; 6] {
    fn from(value: Mac) -> Self {
        value.0
    }
}

impl std::fmt::Display for Mac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

/// An owned Ethernet frame plus the metadata the engine carries with it.
///
/// Ownership is the resource contract of the fast path: a `Frame` moves
/// into the forwarding engine and every terminal path either transmits it
/// (ownership passes to the interface) or drops it.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Vec<u8>,
    /// Port the frame arrived on; `None` for controller-originated frames
    /// with no declared ingress.
    pub in_port: Option<u16>,
    /// Set when the frame is a segmentation-offload aggregate, which is
    /// exempt from the MTU check.
    pub gso: bool,
}

impl Frame {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            in_port: None,
            gso: false,
        }
    }

    #[must_use]
    pub fn with_in_port(data: Vec<u8>, in_port: u16) -> Self {
        Self {
            data,
            in_port: Some(in_port),
            gso: false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn dst(&self) -> Mac {
        let mut m = [0u8; 6];
        if self.data.len() >= 6 {
            m.copy_from_slice(&self.data[..6]);
        }
        Mac(m)
    }

    #[must_use]
    pub fn src(&self) -> Mac {
        let mut m = [0u8; 6];
        if self.data.len() >= 12 {
            m.copy_from_slice(&self.data[6..12]);
        }
        Mac(m)
    }

    /// The outermost ethertype, if the frame is long enough to carry one.
    #[must_use]
    pub fn ethertype(&self) -> Option<u16> {
        self.data
            .get(12..14)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    #[must_use]
    pub fn is_vlan_tagged(&self) -> bool {
        self.ethertype() == Some(ETHERTYPE_VLAN)
    }

    /// Frame length excluding the L2 header, and excluding the 802.1Q tag
    /// when present. This is the length the MTU check compares.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        let mut hdr = ETH_HLEN;
        if self.is_vlan_tagged() {
            hdr += VLAN_HLEN;
        }
        self.data.len().saturating_sub(hdr)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn frame_bytes(ethertype: u16, payload: usize) -> Vec<u8> {
        let mut data = vec![0xff; 6];
        data.extend_from_slice(&[2, 0, 0, 0, 0, 1]);
        data.extend_from_slice(&ethertype.to_be_bytes());
        data.resize(ETH_HLEN + payload, 0xab);
        data
    }

    #[test]
    fn mac_datapath_id() {
        let mac = Mac([0x02, 0, 0, 0, 0, 0x01]);
        assert_eq!(mac.datapath_id(), 0x0000_0200_0000_0001);
        assert_eq!(format!("{mac}"), "02:00:00:00:00:01");
    }

    #[test]
    fn mac_classification() {
        assert!(Mac::BROADCAST.is_broadcast());
        assert!(Mac::BROADCAST.is_multicast());
        assert!(!Mac([2, 0, 0, 0, 0, 1]).is_multicast());
        assert!(Mac::ZERO.is_zero());
    }

    #[test]
    fn payload_len_excludes_vlan_tag() {
        let plain = Frame::new(frame_bytes(0x0800, 100));
        assert_eq!(plain.payload_len(), 100);
        assert!(!plain.is_vlan_tagged());

        let tagged = Frame::new(frame_bytes(ETHERTYPE_VLAN, 100));
        assert!(tagged.is_vlan_tagged());
        assert_eq!(tagged.payload_len(), 96);
    }

    #[test]
    fn header_accessors() {
        let f = Frame::with_in_port(frame_bytes(0x0806, 32), 3);
        assert_eq!(f.dst(), Mac::BROADCAST);
        assert_eq!(f.src(), Mac([2, 0, 0, 0, 0, 1]));
        assert_eq!(f.ethertype(), Some(0x0806));
        assert_eq!(f.in_port, Some(3));

        let runt = Frame::new(vec![1, 2, 3]);
        assert_eq!(runt.ethertype(), None);
        assert_eq!(runt.payload_len(), 0);
    }
}
