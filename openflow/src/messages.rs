// SPDX-License-Identifier: Apache-2.0

//! Fixed-layout message bodies. Encoders append to a buffer (usually a
//! [`crate::MsgBuf`] body); decoders take the body slice that follows the
//! common header.

use crate::actions::{self, Action};
use crate::flow_match::FlowMatch;
use crate::types::{
    FlowRemovedReason, MAX_PORT_NAME_LEN, PacketInReason, PortConfig, PortFeatures, PortReason,
    PortState,
};
use crate::wire::{Reader, WireError, put_fixed_str};

/// Description of one physical port, 48 bytes on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhyPort {
    pub port_no: u16,
    pub hw_addr: [u8; 6],
    pub name: String,
    pub config: PortConfig,
    pub state: PortState,
    pub curr: PortFeatures,
    pub advertised: PortFeatures,
    pub supported: PortFeatures,
    pub peer: PortFeatures,
}

/// Encoded size of a [`PhyPort`].
pub const PHY_PORT_LEN: usize = 48;

impl PhyPort {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.port_no.to_be_bytes());
        buf.extend_from_slice(&self.hw_addr);
        put_fixed_str(buf, &self.name, MAX_PORT_NAME_LEN);
        buf.extend_from_slice(&self.config.bits().to_be_bytes());
        buf.extend_from_slice(&self.state.bits().to_be_bytes());
        buf.extend_from_slice(&self.curr.bits().to_be_bytes());
        buf.extend_from_slice(&self.advertised.bits().to_be_bytes());
        buf.extend_from_slice(&self.supported.bits().to_be_bytes());
        buf.extend_from_slice(&self.peer.bits().to_be_bytes());
    }

    fn decode_from(r: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            port_no: r.u16()?,
            hw_addr: r.mac()?,
            name: r.fixed_str(MAX_PORT_NAME_LEN)?,
            config: PortConfig::from_bits_retain(r.u32()?),
            state: PortState::from_bits_retain(r.u32()?),
            curr: PortFeatures::from_bits_retain(r.u32()?),
            advertised: PortFeatures::from_bits_retain(r.u32()?),
            supported: PortFeatures::from_bits_retain(r.u32()?),
            peer: PortFeatures::from_bits_retain(r.u32()?),
        })
    }

    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        Self::decode_from(&mut Reader::new(body))
    }
}

/// Switch configuration, body of GET_CONFIG_REPLY and SET_CONFIG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwitchConfig {
    pub flags: u16,
    pub miss_send_len: u16,
}

impl SwitchConfig {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&self.miss_send_len.to_be_bytes());
    }

    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(body);
        Ok(Self {
            flags: r.u16()?,
            miss_send_len: r.u16()?,
        })
    }
}

/// Features reply. The core builds these incrementally through
/// [`crate::MsgBuf`]; the decoded form exists for controllers and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturesReply {
    pub datapath_id: u64,
    pub n_buffers: u32,
    pub n_tables: u8,
    pub capabilities: u32,
    pub actions: u32,
    pub ports: Vec<PhyPort>,
}

impl FeaturesReply {
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(body);
        let datapath_id = r.u64()?;
        let n_buffers = r.u32()?;
        let n_tables = r.u8()?;
        r.skip(3)?;
        let capabilities = r.u32()?;
        let actions = r.u32()?;
        let mut ports = Vec::new();
        while r.remaining() >= PHY_PORT_LEN {
            ports.push(PhyPort::decode_from(&mut r)?);
        }
        if r.remaining() != 0 {
            return Err(WireError::Truncated);
        }
        Ok(Self {
            datapath_id,
            n_buffers,
            n_tables,
            capabilities,
            actions,
            ports,
        })
    }
}

/// A packet escalated to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    pub buffer_id: u32,
    /// Length of the original frame, which may exceed `data.len()`.
    pub total_len: u16,
    pub in_port: u16,
    pub reason: PacketInReason,
    pub data: Vec<u8>,
}

impl PacketIn {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.buffer_id.to_be_bytes());
        buf.extend_from_slice(&self.total_len.to_be_bytes());
        buf.extend_from_slice(&self.in_port.to_be_bytes());
        buf.push(self.reason as u8);
        buf.push(0); // pad
        buf.extend_from_slice(&self.data);
    }

    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(body);
        let buffer_id = r.u32()?;
        let total_len = r.u16()?;
        let in_port = r.u16()?;
        let reason = match r.u8()? {
            0 => PacketInReason::NoMatch,
            _ => PacketInReason::Action,
        };
        r.skip(1)?;
        Ok(Self {
            buffer_id,
            total_len,
            in_port,
            reason,
            data: r.rest().to_vec(),
        })
    }
}

/// A controller-originated packet transmission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOut {
    /// [`crate::types::NO_BUFFER`] when the frame travels in `data`.
    pub buffer_id: u32,
    pub in_port: u16,
    pub actions: Vec<Action>,
    pub data: Vec<u8>,
}

impl PacketOut {
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(body);
        let buffer_id = r.u32()?;
        let in_port = r.u16()?;
        let actions_len = r.u16()? as usize;
        let actions = actions::decode_list(r.bytes(actions_len)?)?;
        Ok(Self {
            buffer_id,
            in_port,
            actions,
            data: r.rest().to_vec(),
        })
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.buffer_id.to_be_bytes());
        buf.extend_from_slice(&self.in_port.to_be_bytes());
        let actions_len = actions::list_len(&self.actions) as u16;
        buf.extend_from_slice(&actions_len.to_be_bytes());
        actions::encode_list(&self.actions, buf);
        buf.extend_from_slice(&self.data);
    }
}

/// A port configuration change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMod {
    pub port_no: u16,
    /// Must match the port's current hardware address.
    pub hw_addr: [u8; 6],
    pub config: PortConfig,
    pub mask: PortConfig,
    pub advertise: u32,
}

impl PortMod {
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(body);
        let port_no = r.u16()?;
        let hw_addr = r.mac()?;
        let config = PortConfig::from_bits_retain(r.u32()?);
        let mask = PortConfig::from_bits_retain(r.u32()?);
        let advertise = r.u32()?;
        r.skip(4)?;
        Ok(Self {
            port_no,
            hw_addr,
            config,
            mask,
            advertise,
        })
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.port_no.to_be_bytes());
        buf.extend_from_slice(&self.hw_addr);
        buf.extend_from_slice(&self.config.bits().to_be_bytes());
        buf.extend_from_slice(&self.mask.bits().to_be_bytes());
        buf.extend_from_slice(&self.advertise.to_be_bytes());
        buf.extend_from_slice(&[0; 4]);
    }
}

/// Asynchronous port change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStatus {
    pub reason: PortReason,
    pub desc: PhyPort,
}

impl PortStatus {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.reason as u8);
        buf.extend_from_slice(&[0; 7]);
        self.desc.encode_into(buf);
    }

    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(body);
        let reason = match r.u8()? {
            0 => PortReason::Add,
            1 => PortReason::Delete,
            _ => PortReason::Modify,
        };
        r.skip(7)?;
        Ok(Self {
            reason,
            desc: PhyPort::decode_from(&mut r)?,
        })
    }
}

/// Asynchronous flow expiry/deletion notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRemoved {
    pub flow_match: FlowMatch,
    pub priority: u16,
    pub reason: FlowRemovedReason,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub idle_timeout: u16,
    pub packet_count: u64,
    pub byte_count: u64,
}

impl FlowRemoved {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        self.flow_match.encode_into(buf);
        buf.extend_from_slice(&0u64.to_be_bytes()); // cookie, unused here
        buf.extend_from_slice(&self.priority.to_be_bytes());
        buf.push(self.reason as u8);
        buf.push(0); // pad
        buf.extend_from_slice(&self.duration_sec.to_be_bytes());
        buf.extend_from_slice(&self.duration_nsec.to_be_bytes());
        buf.extend_from_slice(&self.idle_timeout.to_be_bytes());
        buf.extend_from_slice(&[0, 0]); // pad
        buf.extend_from_slice(&self.packet_count.to_be_bytes());
        buf.extend_from_slice(&self.byte_count.to_be_bytes());
    }

    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(body);
        let flow_match = FlowMatch::decode_from(&mut r)?;
        r.skip(8)?; // cookie
        let priority = r.u16()?;
        let reason = match r.u8()? {
            0 => FlowRemovedReason::IdleTimeout,
            1 => FlowRemovedReason::HardTimeout,
            _ => FlowRemovedReason::Delete,
        };
        r.skip(1)?;
        let duration_sec = r.u32()?;
        let duration_nsec = r.u32()?;
        let idle_timeout = r.u16()?;
        r.skip(2)?;
        Ok(Self {
            flow_match,
            priority,
            reason,
            duration_sec,
            duration_nsec,
            idle_timeout,
            packet_count: r.u64()?,
            byte_count: r.u64()?,
        })
    }
}

/// Error report: 16-bit type, 16-bit code, then data (usually the
/// offending request).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub err_type: u16,
    pub code: u16,
    pub data: Vec<u8>,
}

impl ErrorMsg {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.err_type.to_be_bytes());
        buf.extend_from_slice(&self.code.to_be_bytes());
        buf.extend_from_slice(&self.data);
    }

    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(body);
        Ok(Self {
            err_type: r.u16()?,
            code: r.u16()?,
            data: r.rest().to_vec(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::PortNo;

    fn sample_port() -> PhyPort {
        PhyPort {
            port_no: 3,
            hw_addr: [2, 0, 0, 0, 0, 3],
            name: "veth3".to_string(),
            config: PortConfig::NO_FLOOD,
            state: PortState::LINK_DOWN,
            curr: PortFeatures::SPEED_1GB_FD | PortFeatures::COPPER,
            advertised: PortFeatures::empty(),
            supported: PortFeatures::empty(),
            peer: PortFeatures::empty(),
        }
    }

    #[test]
    fn phy_port_round_trip() {
        let p = sample_port();
        let mut buf = Vec::new();
        p.encode_into(&mut buf);
        assert_eq!(buf.len(), PHY_PORT_LEN);
        assert_eq!(PhyPort::decode(&buf), Ok(p));
    }

    #[test]
    fn packet_in_round_trip() {
        let pi = PacketIn {
            buffer_id: 42,
            total_len: 128,
            in_port: 1,
            reason: PacketInReason::Action,
            data: vec![0xaa; 64],
        };
        let mut buf = Vec::new();
        pi.encode_into(&mut buf);
        assert_eq!(buf.len(), 10 + 64);
        assert_eq!(PacketIn::decode(&buf), Ok(pi));
    }

    #[test]
    fn packet_out_round_trip() {
        let po = PacketOut {
            buffer_id: crate::types::NO_BUFFER,
            in_port: PortNo::NONE.0,
            actions: vec![Action::Output {
                port: PortNo(2),
                max_len: 0,
            }],
            data: vec![1, 2, 3],
        };
        let mut buf = Vec::new();
        po.encode_into(&mut buf);
        assert_eq!(PacketOut::decode(&buf), Ok(po));
    }

    #[test]
    fn flow_removed_round_trip() {
        let fr = FlowRemoved {
            flow_match: FlowMatch::default(),
            priority: 0x8000,
            reason: FlowRemovedReason::IdleTimeout,
            duration_sec: 2,
            duration_nsec: 500_000,
            idle_timeout: 1,
            packet_count: 1,
            byte_count: 128,
        };
        let mut buf = Vec::new();
        fr.encode_into(&mut buf);
        assert_eq!(buf.len(), 80);
        assert_eq!(FlowRemoved::decode(&buf), Ok(fr));
    }

    #[test]
    fn features_reply_decode() {
        let mut body = Vec::new();
        body.extend_from_slice(&0x0000_0200_0000_0001u64.to_be_bytes());
        body.extend_from_slice(&256u32.to_be_bytes());
        body.push(1);
        body.extend_from_slice(&[0; 3]);
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&0x7ffu32.to_be_bytes());
        sample_port().encode_into(&mut body);
        let fr = FeaturesReply::decode(&body).unwrap();
        assert_eq!(fr.datapath_id, 0x0000_0200_0000_0001);
        assert_eq!(fr.n_tables, 1);
        assert_eq!(fr.ports.len(), 1);
        assert_eq!(fr.ports[0].name, "veth3");
    }

    #[test]
    fn port_mod_round_trip() {
        let pm = PortMod {
            port_no: 2,
            hw_addr: [2, 0, 0, 0, 0, 2],
            config: PortConfig::empty(),
            mask: PortConfig::NO_FWD,
            advertise: 0,
        };
        let mut buf = Vec::new();
        pm.encode_into(&mut buf);
        assert_eq!(buf.len(), 24);
        assert_eq!(PortMod::decode(&buf), Ok(pm));
    }
}
