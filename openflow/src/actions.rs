// SPDX-License-Identifier: Apache-2.0

//! Flow action lists: the encoded form carried in flow statistics and the
//! decoded form executed for packet-out requests.

use crate::types::PortNo;
use crate::wire::{Reader, WireError};

const AT_OUTPUT: u16 = 0;
const AT_SET_VLAN_VID: u16 = 1;
const AT_SET_VLAN_PCP: u16 = 2;
const AT_STRIP_VLAN: u16 = 3;
const AT_SET_DL_SRC: u16 = 4;
const AT_SET_DL_DST: u16 = 5;
const AT_SET_NW_SRC: u16 = 6;
const AT_SET_NW_DST: u16 = 7;
const AT_SET_NW_TOS: u16 = 8;
const AT_SET_TP_SRC: u16 = 9;
const AT_SET_TP_DST: u16 = 10;
const AT_VENDOR: u16 = 0xffff;

/// One flow action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send out a port; `max_len` bounds the bytes escalated when the port
    /// is [`PortNo::CONTROLLER`].
    Output { port: PortNo, max_len: u16 },
    SetVlanVid(u16),
    SetVlanPcp(u8),
    StripVlan,
    SetDlSrc([u8; 6]),
    SetDlDst([u8; 6]),
    SetNwSrc(u32),
    SetNwDst(u32),
    SetNwTos(u8),
    SetTpSrc(u16),
    SetTpDst(u16),
    /// Opaque vendor extension, kept verbatim.
    Vendor { vendor: u32, body: Vec<u8> },
}

impl Action {
    /// Encoded size including the (type, len) preamble.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        match self {
            Action::SetDlSrc(_) | Action::SetDlDst(_) => 16,
            Action::Vendor { body, .. } => 8 + body.len(),
            _ => 8,
        }
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let (ty, len) = (self.type_code(), self.wire_len() as u16);
        buf.extend_from_slice(&ty.to_be_bytes());
        buf.extend_from_slice(&len.to_be_bytes());
        match self {
            Action::Output { port, max_len } => {
                buf.extend_from_slice(&port.0.to_be_bytes());
                buf.extend_from_slice(&max_len.to_be_bytes());
            }
            Action::SetVlanVid(vid) => {
                buf.extend_from_slice(&vid.to_be_bytes());
                buf.extend_from_slice(&[0, 0]);
            }
            Action::SetVlanPcp(pcp) => {
                buf.push(*pcp);
                buf.extend_from_slice(&[0, 0, 0]);
            }
            Action::StripVlan => buf.extend_from_slice(&[0, 0, 0, 0]),
            Action::SetDlSrc(mac) | Action::SetDlDst(mac) => {
                buf.extend_from_slice(mac);
                buf.extend_from_slice(&[0; 6]);
            }
            Action::SetNwSrc(addr) | Action::SetNwDst(addr) => {
                buf.extend_from_slice(&addr.to_be_bytes());
            }
            Action::SetNwTos(tos) => {
                buf.push(*tos);
                buf.extend_from_slice(&[0, 0, 0]);
            }
            Action::SetTpSrc(p) | Action::SetTpDst(p) => {
                buf.extend_from_slice(&p.to_be_bytes());
                buf.extend_from_slice(&[0, 0]);
            }
            Action::Vendor { vendor, body } => {
                buf.extend_from_slice(&vendor.to_be_bytes());
                buf.extend_from_slice(body);
            }
        }
    }

    fn type_code(&self) -> u16 {
        match self {
            Action::Output { .. } => AT_OUTPUT,
            Action::SetVlanVid(_) => AT_SET_VLAN_VID,
            Action::SetVlanPcp(_) => AT_SET_VLAN_PCP,
            Action::StripVlan => AT_STRIP_VLAN,
            Action::SetDlSrc(_) => AT_SET_DL_SRC,
            Action::SetDlDst(_) => AT_SET_DL_DST,
            Action::SetNwSrc(_) => AT_SET_NW_SRC,
            Action::SetNwDst(_) => AT_SET_NW_DST,
            Action::SetNwTos(_) => AT_SET_NW_TOS,
            Action::SetTpSrc(_) => AT_SET_TP_SRC,
            Action::SetTpDst(_) => AT_SET_TP_DST,
            Action::Vendor { .. } => AT_VENDOR,
        }
    }
}

/// Encodes a whole action list.
pub fn encode_list(actions: &[Action], buf: &mut Vec<u8>) {
    for a in actions {
        a.encode_into(buf);
    }
}

/// Encoded size of a whole action list.
#[must_use]
pub fn list_len(actions: &[Action]) -> usize {
    actions.iter().map(Action::wire_len).sum()
}

/// Decodes a back-to-back action list, verifying the per-action length
/// fields.
pub fn decode_list(buf: &[u8]) -> Result<Vec<Action>, WireError> {
    let mut r = Reader::new(buf);
    let mut out = Vec::new();
    while r.remaining() > 0 {
        let ty = r.u16()?;
        let len = r.u16()?;
        if len < 8 || len % 8 != 0 {
            return Err(WireError::BadActionLength(len));
        }
        let body_len = len as usize - 4;
        let mut body = Reader::new(r.bytes(body_len)?);
        let action = match ty {
            AT_OUTPUT => Action::Output {
                port: PortNo(body.u16()?),
                max_len: body.u16()?,
            },
            AT_SET_VLAN_VID => Action::SetVlanVid(body.u16()?),
            AT_SET_VLAN_PCP => Action::SetVlanPcp(body.u8()?),
            AT_STRIP_VLAN => Action::StripVlan,
            AT_SET_DL_SRC => Action::SetDlSrc(body.mac()?),
            AT_SET_DL_DST => Action::SetDlDst(body.mac()?),
            AT_SET_NW_SRC => Action::SetNwSrc(body.u32()?),
            AT_SET_NW_DST => Action::SetNwDst(body.u32()?),
            AT_SET_NW_TOS => Action::SetNwTos(body.u8()?),
            AT_SET_TP_SRC => Action::SetTpSrc(body.u16()?),
            AT_SET_TP_DST => Action::SetTpDst(body.u16()?),
            AT_VENDOR => Action::Vendor {
                vendor: body.u32()?,
                body: body.rest().to_vec(),
            },
            other => return Err(WireError::UnknownAction(other)),
        };
        out.push(action);
    }
    Ok(out)
}
