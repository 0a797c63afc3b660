// SPDX-License-Identifier: Apache-2.0

//! The control-channel envelope: an operation code followed by typed,
//! 4-byte-aligned attributes. Strings travel NUL-terminated; the OpenFlow
//! payload is an opaque byte string.

use byteorder::{BigEndian, ReadBytesExt};

/// Administrative operation codes of the management channel.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    AddDp = 0,
    DelDp = 1,
    QueryDp = 2,
    AddPort = 3,
    DelPort = 4,
    Openflow = 5,
}

impl OpCode {
    #[must_use]
    pub fn from_raw(raw: u16) -> Option<Self> {
        use OpCode::*;
        Some(match raw {
            0 => AddDp,
            1 => DelDp,
            2 => QueryDp,
            3 => AddPort,
            4 => DelPort,
            5 => Openflow,
            _ => return None,
        })
    }
}

const ATTR_DP_IDX: u16 = 1;
const ATTR_DP_NAME: u16 = 2;
const ATTR_PORT_NAME: u16 = 3;
const ATTR_MC_GROUP: u16 = 4;
const ATTR_OPENFLOW: u16 = 5;

/// An error raised while decoding an envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope truncated")]
    Truncated,
    #[error("unknown operation code {0}")]
    UnknownOp(u16),
    #[error("unknown attribute type {0}")]
    UnknownAttr(u16),
    #[error("bad attribute length for type {0}")]
    BadAttrLen(u16),
    #[error("string attribute not NUL-terminated")]
    BadString,
}

/// One decoded (or to-be-encoded) control-channel message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    pub op: Option<OpCode>,
    pub dp_idx: Option<u32>,
    pub dp_name: Option<String>,
    pub port_name: Option<String>,
    pub mc_group: Option<u32>,
    pub openflow: Option<Vec<u8>>,
}

impl Envelope {
    /// A bare envelope for one operation.
    #[must_use]
    pub fn request(op: OpCode) -> Self {
        Self {
            op: Some(op),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_dp_idx(mut self, dp_idx: u32) -> Self {
        self.dp_idx = Some(dp_idx);
        self
    }

    #[must_use]
    pub fn with_dp_name(mut self, name: &str) -> Self {
        self.dp_name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn with_port_name(mut self, name: &str) -> Self {
        self.port_name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn with_openflow(mut self, payload: Vec<u8>) -> Self {
        self.openflow = Some(payload);
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        let op = self.op.map_or(u16::MAX, |op| op as u16);
        buf.extend_from_slice(&op.to_be_bytes());
        buf.extend_from_slice(&[0, 0]); // reserved
        if let Some(idx) = self.dp_idx {
            put_attr(&mut buf, ATTR_DP_IDX, &idx.to_be_bytes());
        }
        if let Some(name) = &self.dp_name {
            put_str_attr(&mut buf, ATTR_DP_NAME, name);
        }
        if let Some(name) = &self.port_name {
            put_str_attr(&mut buf, ATTR_PORT_NAME, name);
        }
        if let Some(group) = self.mc_group {
            put_attr(&mut buf, ATTR_MC_GROUP, &group.to_be_bytes());
        }
        if let Some(payload) = &self.openflow {
            put_attr(&mut buf, ATTR_OPENFLOW, payload);
        }
        buf
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, EnvelopeError> {
        let op_raw = buf
            .read_u16::<BigEndian>()
            .map_err(|_| EnvelopeError::Truncated)?;
        let op = Some(OpCode::from_raw(op_raw).ok_or(EnvelopeError::UnknownOp(op_raw))?);
        buf.read_u16::<BigEndian>()
            .map_err(|_| EnvelopeError::Truncated)?;

        let mut env = Envelope {
            op,
            ..Self::default()
        };
        while !buf.is_empty() {
            let ty = buf
                .read_u16::<BigEndian>()
                .map_err(|_| EnvelopeError::Truncated)?;
            let len = buf
                .read_u16::<BigEndian>()
                .map_err(|_| EnvelopeError::Truncated)? as usize;
            if buf.len() < len {
                return Err(EnvelopeError::Truncated);
            }
            let (payload, rest) = buf.split_at(len);
            // attributes are padded to 4-byte alignment
            let pad = (4 - len % 4) % 4;
            buf = rest.get(pad..).ok_or(EnvelopeError::Truncated)?;

            match ty {
                ATTR_DP_IDX => env.dp_idx = Some(read_u32(ty, payload)?),
                ATTR_MC_GROUP => env.mc_group = Some(read_u32(ty, payload)?),
                ATTR_DP_NAME => env.dp_name = Some(read_string(payload)?),
                ATTR_PORT_NAME => env.port_name = Some(read_string(payload)?),
                ATTR_OPENFLOW => env.openflow = Some(payload.to_vec()),
                other => return Err(EnvelopeError::UnknownAttr(other)),
            }
        }
        Ok(env)
    }
}

fn put_attr(buf: &mut Vec<u8>, ty: u16, payload: &[u8]) {
    buf.extend_from_slice(&ty.to_be_bytes());
    buf.extend_from_slice(&(payload.len().min(u16::MAX as usize) as u16).to_be_bytes());
    buf.extend_from_slice(payload);
    let pad = (4 - payload.len() % 4) % 4;
    buf.resize(buf.len() + pad, 0);
}

fn put_str_attr(buf: &mut Vec<u8>, ty: u16, s: &str) {
    let mut payload = s.as_bytes().to_vec();
    payload.push(0);
    put_attr(buf, ty, &payload);
}

fn read_u32(ty: u16, payload: &[u8]) -> Result<u32, EnvelopeError> {
    let arr: [u8; 4] = payload
        .try_into()
        .map_err(|_| EnvelopeError::BadAttrLen(ty))?;
    Ok(u32::from_be_bytes(arr))
}

fn read_string(payload: &[u8]) -> Result<String, EnvelopeError> {
    let (last, body) = payload.split_last().ok_or(EnvelopeError::BadString)?;
    if *last != 0 || body.contains(&0) {
        return Err(EnvelopeError::BadString);
    }
    String::from_utf8(body.to_vec()).map_err(|_| EnvelopeError::BadString)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_all_attributes() {
        let env = Envelope {
            op: Some(OpCode::Openflow),
            dp_idx: Some(7),
            dp_name: Some("of7".to_string()),
            port_name: Some("veth0".to_string()),
            mc_group: Some(7 & 15),
            openflow: Some(vec![1, 2, 3, 4, 5]),
        };
        let bytes = env.encode();
        assert_eq!(Envelope::decode(&bytes), Ok(env));
    }

    #[test]
    fn attributes_are_aligned() {
        let env = Envelope::request(OpCode::AddPort).with_port_name("eth0");
        // 4 header + (4 attr hdr + 5 payload + 3 pad)
        assert_eq!(env.encode().len(), 16);
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(Envelope::decode(&[0]), Err(EnvelopeError::Truncated));
        assert_eq!(
            Envelope::decode(&[0x00, 0x63, 0, 0]),
            Err(EnvelopeError::UnknownOp(0x63))
        );
        // DP_IDX with a 2-byte payload
        let bad = [0, 0, 0, 0, 0, 1, 0, 2, 9, 9, 0, 0];
        assert_eq!(Envelope::decode(&bad), Err(EnvelopeError::BadAttrLen(1)));
        // string without terminator
        let mut buf = vec![0, 0, 0, 0];
        buf.extend_from_slice(&[0, 2, 0, 4]);
        buf.extend_from_slice(b"eth0");
        assert_eq!(Envelope::decode(&buf), Err(EnvelopeError::BadString));
    }
}
