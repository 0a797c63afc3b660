// SPDX-License-Identifier: Apache-2.0

//! Byte-level reader shared by the message decoders.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

/// An error raised while encoding or decoding a wire message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// The buffer ended before the fixed layout did.
    #[error("message truncated")]
    Truncated,
    /// The length field disagrees with the bytes on the wire.
    #[error("bad length field: {0}")]
    BadLength(u16),
    /// A message larger than the 16-bit length field can carry.
    #[error("message exceeds the 65535-byte ceiling: {0} bytes")]
    TooLarge(usize),
    /// An action type this implementation does not know.
    #[error("unknown action type {0:#06x}")]
    UnknownAction(u16),
    /// An action whose length field is not credible for its type.
    #[error("bad action length {0}")]
    BadActionLength(u16),
}

/// Cursor over a received byte slice. Every accessor fails with
/// [`WireError::Truncated`] instead of panicking on short input.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn u8(&mut self) -> Result<u8, WireError> {
        self.buf.read_u8().map_err(|_| WireError::Truncated)
    }

    pub(crate) fn u16(&mut self) -> Result<u16, WireError> {
        self.buf
            .read_u16::<BigEndian>()
            .map_err(|_| WireError::Truncated)
    }

    pub(crate) fn u32(&mut self) -> Result<u32, WireError> {
        self.buf
            .read_u32::<BigEndian>()
            .map_err(|_| WireError::Truncated)
    }

    pub(crate) fn u64(&mut self) -> Result<u64, WireError> {
        self.buf
            .read_u64::<BigEndian>()
            .map_err(|_| WireError::Truncated)
    }

    pub(crate) fn mac(&mut self) -> Result<[u8; 6], WireError> {
        let mut out = [0u8; 6];
        self.buf
            .read_exact(&mut out)
            .map_err(|_| WireError::Truncated)?;
        Ok(out)
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.buf.len() < n {
            return Err(WireError::Truncated);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), WireError> {
        self.bytes(n).map(|_| ())
    }

    /// Remaining bytes, consumed.
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let out = self.buf;
        self.buf = &[];
        out
    }

    /// Reads a fixed-size NUL-padded string field.
    pub(crate) fn fixed_str(&mut self, n: usize) -> Result<String, WireError> {
        let raw = self.bytes(n)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(n);
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}

/// Appends a fixed-size NUL-padded string field; over-long input is
/// truncated, always leaving a terminating NUL.
pub(crate) fn put_fixed_str(buf: &mut Vec<u8>, s: &str, n: usize) {
    let bytes = s.as_bytes();
    let take = bytes.len().min(n - 1);
    buf.extend_from_slice(&bytes[..take]);
    buf.resize(buf.len() + (n - take), 0);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reader_truncation() {
        let mut r = Reader::new(&[0x01, 0x02]);
        assert_eq!(r.u16(), Ok(0x0102));
        assert_eq!(r.u16(), Err(WireError::Truncated));
    }

    #[test]
    fn fixed_str_round_trip() {
        let mut buf = Vec::new();
        put_fixed_str(&mut buf, "veth0", 16);
        assert_eq!(buf.len(), 16);
        let mut r = Reader::new(&buf);
        assert_eq!(r.fixed_str(16).as_deref(), Ok("veth0"));
    }

    #[test]
    fn fixed_str_always_terminated() {
        let mut buf = Vec::new();
        put_fixed_str(&mut buf, "0123456789abcdef-overflow", 16);
        assert_eq!(buf.len(), 16);
        assert_eq!(buf[15], 0);
    }
}
