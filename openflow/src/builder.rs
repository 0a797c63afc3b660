// SPDX-License-Identifier: Apache-2.0

//! Outbound message construction.
//!
//! Replies whose final size depends on iteration (features replies,
//! statistics fragments) are built in one pass: the header goes in first
//! with a zero length, the body is appended incrementally, and
//! [`MsgBuf::finish`] patches the length field to the exact final size,
//! refusing anything the 16-bit field cannot carry.

use crate::types::MsgType;
use crate::wire::WireError;
use crate::{HEADER_LEN, OFP_VERSION};

/// An OpenFlow message under construction.
#[must_use]
pub struct MsgBuf {
    buf: Vec<u8>,
}

impl MsgBuf {
    /// Starts a message of the given type. The length field is patched at
    /// [`finish`](Self::finish) time.
    pub fn new(msg_type: MsgType, xid: u32) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.push(OFP_VERSION);
        buf.push(msg_type as u8);
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&xid.to_be_bytes());
        Self { buf }
    }

    /// The message body accumulated so far; encoders append here.
    pub fn body_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    /// Bytes of body appended so far.
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.buf.len() - HEADER_LEN
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn put_pad(&mut self, n: usize) {
        self.buf.resize(self.buf.len() + n, 0);
    }

    /// Seals the message: patches the length field and returns the wire
    /// bytes. Fails with [`WireError::TooLarge`] past the 16-bit ceiling.
    pub fn finish(mut self) -> Result<Vec<u8>, WireError> {
        let len = self.buf.len();
        let Ok(len16) = u16::try_from(len) else {
            return Err(WireError::TooLarge(len));
        };
        self.buf[2..4].copy_from_slice(&len16.to_be_bytes());
        Ok(self.buf)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Header;

    #[test]
    fn length_patched_to_exact_size() {
        let mut m = MsgBuf::new(MsgType::EchoReply, 7);
        m.put_bytes(b"ping");
        let bytes = m.finish().unwrap();
        let hdr = Header::decode(&bytes).unwrap();
        assert_eq!(hdr.length as usize, bytes.len());
        assert_eq!(hdr.length, 12);
        assert_eq!(hdr.xid, 7);
        assert_eq!(hdr.body(&bytes), b"ping");
    }

    #[test]
    fn oversized_message_refused() {
        let mut m = MsgBuf::new(MsgType::StatsReply, 0);
        m.put_pad(u16::MAX as usize);
        assert!(matches!(m.finish(), Err(WireError::TooLarge(_))));
    }

    #[test]
    fn empty_body_is_bare_header() {
        let bytes = MsgBuf::new(MsgType::BarrierReply, 3).finish().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(bytes[1], MsgType::BarrierReply as u8);
    }
}
