// SPDX-License-Identifier: Apache-2.0

//! The common message header.

use crate::HEADER_LEN;
use crate::wire::{Reader, WireError};

/// The 8-byte header every OpenFlow message starts with. The type is kept
/// raw so that messages this datapath does not interpret can still be
/// carried through to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub msg_type: u8,
    /// Total message length, header included.
    pub length: u16,
    pub xid: u32,
}

impl Header {
    /// Decodes the header of `msg` and checks the length field against the
    /// bytes actually present.
    pub fn decode(msg: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(msg);
        let hdr = Self {
            version: r.u8()?,
            msg_type: r.u8()?,
            length: r.u16()?,
            xid: r.u32()?,
        };
        if (hdr.length as usize) < HEADER_LEN || hdr.length as usize > msg.len() {
            return Err(WireError::BadLength(hdr.length));
        }
        Ok(hdr)
    }

    /// The message body: everything after the header, bounded by the length
    /// field.
    #[must_use]
    pub fn body<'a>(&self, msg: &'a [u8]) -> &'a [u8] {
        &msg[HEADER_LEN..self.length as usize]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_checks_length() {
        let msg = [0x01, 0x00, 0x00, 0x08, 0xde, 0xad, 0xbe, 0xef];
        let hdr = Header::decode(&msg).unwrap();
        assert_eq!(hdr.version, 0x01);
        assert_eq!(hdr.msg_type, 0);
        assert_eq!(hdr.length, 8);
        assert_eq!(hdr.xid, 0xdead_beef);
        assert!(hdr.body(&msg).is_empty());

        // length field larger than the buffer
        let short = [0x01, 0x00, 0x00, 0x10, 0, 0, 0, 0];
        assert_eq!(Header::decode(&short), Err(WireError::BadLength(0x10)));

        // length field smaller than a header
        let tiny = [0x01, 0x00, 0x00, 0x04, 0, 0, 0, 0];
        assert_eq!(Header::decode(&tiny), Err(WireError::BadLength(0x04)));
    }
}
