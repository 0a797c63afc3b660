// SPDX-License-Identifier: Apache-2.0

//! Statistics request and reply bodies. The request/reply preamble is two
//! 16-bit fields (statistics type, flags) followed by a type-specific body;
//! fragments of a multi-part reply set [`crate::types::STATS_REPLY_MORE`]
//! on all but the last.

use crate::actions::{self, Action};
use crate::flow_match::FlowMatch;
use crate::types::{DESC_STR_LEN, SERIAL_NUM_LEN};
use crate::wire::{Reader, WireError, put_fixed_str};

/// Decoded preamble of a STATS_REQUEST body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsRequest {
    /// Raw statistics type; unknown values are reported BAD_STAT upstream.
    pub stats_type: u16,
    pub flags: u16,
    pub body: Vec<u8>,
}

impl StatsRequest {
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(body);
        Ok(Self {
            stats_type: r.u16()?,
            flags: r.u16()?,
            body: r.rest().to_vec(),
        })
    }
}

/// Size of the (type, flags) preamble shared by requests and replies.
pub const STATS_PREAMBLE_LEN: usize = 4;

/// Description statistics: five fixed-size strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescStats {
    pub mfr_desc: String,
    pub hw_desc: String,
    pub sw_desc: String,
    pub serial_num: String,
    pub dp_desc: String,
}

/// Encoded size of a [`DescStats`].
pub const DESC_STATS_LEN: usize = 4 * DESC_STR_LEN + SERIAL_NUM_LEN;

impl DescStats {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        put_fixed_str(buf, &self.mfr_desc, DESC_STR_LEN);
        put_fixed_str(buf, &self.hw_desc, DESC_STR_LEN);
        put_fixed_str(buf, &self.sw_desc, DESC_STR_LEN);
        put_fixed_str(buf, &self.serial_num, SERIAL_NUM_LEN);
        put_fixed_str(buf, &self.dp_desc, DESC_STR_LEN);
    }

    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(body);
        Ok(Self {
            mfr_desc: r.fixed_str(DESC_STR_LEN)?,
            hw_desc: r.fixed_str(DESC_STR_LEN)?,
            sw_desc: r.fixed_str(DESC_STR_LEN)?,
            serial_num: r.fixed_str(SERIAL_NUM_LEN)?,
            dp_desc: r.fixed_str(DESC_STR_LEN)?,
        })
    }
}

/// Selector shared by per-flow and aggregate statistics requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowStatsRequest {
    pub flow_match: FlowMatch,
    /// Concrete table id, [`crate::types::TABLE_ALL`] or
    /// [`crate::types::TABLE_EMERG`].
    pub table_id: u8,
    /// Restrict to flows outputting to this port;
    /// [`crate::types::PortNo::NONE`] disables the filter.
    pub out_port: u16,
}

/// Encoded size of a [`FlowStatsRequest`].
pub const FLOW_STATS_REQUEST_LEN: usize = 44;

impl FlowStatsRequest {
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(body);
        let flow_match = FlowMatch::decode_from(&mut r)?;
        let table_id = r.u8()?;
        r.skip(1)?;
        let out_port = r.u16()?;
        Ok(Self {
            flow_match,
            table_id,
            out_port,
        })
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        self.flow_match.encode_into(buf);
        buf.push(self.table_id);
        buf.push(0);
        buf.extend_from_slice(&self.out_port.to_be_bytes());
    }
}

/// One per-flow record of a flow-statistics reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowStats {
    pub table_id: u8,
    pub flow_match: FlowMatch,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub packet_count: u64,
    pub byte_count: u64,
    pub actions: Vec<Action>,
}

/// Fixed part of a [`FlowStats`] record, before the action list.
pub const FLOW_STATS_FIXED_LEN: usize = 88;

impl FlowStats {
    /// Encoded size of this record, length prefix included.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        FLOW_STATS_FIXED_LEN + actions::list_len(&self.actions)
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.wire_len() as u16).to_be_bytes());
        buf.push(self.table_id);
        buf.push(0); // pad
        self.flow_match.encode_into(buf);
        buf.extend_from_slice(&self.duration_sec.to_be_bytes());
        buf.extend_from_slice(&self.duration_nsec.to_be_bytes());
        buf.extend_from_slice(&self.priority.to_be_bytes());
        buf.extend_from_slice(&self.idle_timeout.to_be_bytes());
        buf.extend_from_slice(&self.hard_timeout.to_be_bytes());
        buf.extend_from_slice(&[0; 6]); // pad
        buf.extend_from_slice(&0u64.to_be_bytes()); // cookie, unused here
        buf.extend_from_slice(&self.packet_count.to_be_bytes());
        buf.extend_from_slice(&self.byte_count.to_be_bytes());
        actions::encode_list(&self.actions, buf);
    }

    /// Decodes one record, returning it and the bytes consumed.
    pub fn decode(body: &[u8]) -> Result<(Self, usize), WireError> {
        let mut r = Reader::new(body);
        let length = r.u16()? as usize;
        if length < FLOW_STATS_FIXED_LEN || length > body.len() {
            return Err(WireError::BadLength(length as u16));
        }
        let table_id = r.u8()?;
        r.skip(1)?;
        let flow_match = FlowMatch::decode_from(&mut r)?;
        let duration_sec = r.u32()?;
        let duration_nsec = r.u32()?;
        let priority = r.u16()?;
        let idle_timeout = r.u16()?;
        let hard_timeout = r.u16()?;
        r.skip(6)?;
        r.skip(8)?; // cookie
        let packet_count = r.u64()?;
        let byte_count = r.u64()?;
        let actions = actions::decode_list(&body[FLOW_STATS_FIXED_LEN..length])?;
        Ok((
            Self {
                table_id,
                flow_match,
                duration_sec,
                duration_nsec,
                priority,
                idle_timeout,
                hard_timeout,
                packet_count,
                byte_count,
                actions,
            },
            length,
        ))
    }

    /// Decodes the concatenated records of one or more reply fragments.
    pub fn decode_list(mut body: &[u8]) -> Result<Vec<Self>, WireError> {
        let mut out = Vec::new();
        while !body.is_empty() {
            let (entry, used) = Self::decode(body)?;
            out.push(entry);
            body = &body[used..];
        }
        Ok(out)
    }
}

/// Aggregate statistics reply body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AggregateStats {
    pub packet_count: u64,
    pub byte_count: u64,
    pub flow_count: u32,
}

/// Encoded size of an [`AggregateStats`].
pub const AGGREGATE_STATS_LEN: usize = 24;

impl AggregateStats {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.packet_count.to_be_bytes());
        buf.extend_from_slice(&self.byte_count.to_be_bytes());
        buf.extend_from_slice(&self.flow_count.to_be_bytes());
        buf.extend_from_slice(&[0; 4]);
    }

    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(body);
        Ok(Self {
            packet_count: r.u64()?,
            byte_count: r.u64()?,
            flow_count: r.u32()?,
        })
    }
}

/// One per-table record of a table-statistics reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    pub table_id: u8,
    pub name: String,
    pub wildcards: u32,
    pub max_entries: u32,
    pub active_count: u32,
    pub lookup_count: u64,
    pub matched_count: u64,
}

/// Encoded size of a [`TableStats`].
pub const TABLE_STATS_LEN: usize = 64;

const TABLE_NAME_LEN: usize = 32;

impl TableStats {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.table_id);
        buf.extend_from_slice(&[0; 3]);
        put_fixed_str(buf, &self.name, TABLE_NAME_LEN);
        buf.extend_from_slice(&self.wildcards.to_be_bytes());
        buf.extend_from_slice(&self.max_entries.to_be_bytes());
        buf.extend_from_slice(&self.active_count.to_be_bytes());
        buf.extend_from_slice(&self.lookup_count.to_be_bytes());
        buf.extend_from_slice(&self.matched_count.to_be_bytes());
    }

    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(body);
        let table_id = r.u8()?;
        r.skip(3)?;
        Ok(Self {
            table_id,
            name: r.fixed_str(TABLE_NAME_LEN)?,
            wildcards: r.u32()?,
            max_entries: r.u32()?,
            active_count: r.u32()?,
            lookup_count: r.u64()?,
            matched_count: r.u64()?,
        })
    }
}

/// Per-port statistics request body: one port or
/// [`crate::types::PortNo::NONE`] for all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortStatsRequest {
    pub port_no: u16,
}

/// Encoded size of a [`PortStatsRequest`].
pub const PORT_STATS_REQUEST_LEN: usize = 8;

impl PortStatsRequest {
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(body);
        let port_no = r.u16()?;
        r.skip(6)?;
        Ok(Self { port_no })
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.port_no.to_be_bytes());
        buf.extend_from_slice(&[0; 6]);
    }
}

/// One per-port record of a port-statistics reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortStats {
    pub port_no: u16,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_frame_err: u64,
    pub rx_over_err: u64,
    pub rx_crc_err: u64,
    pub collisions: u64,
}

/// Encoded size of a [`PortStats`].
pub const PORT_STATS_LEN: usize = 104;

impl PortStats {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.port_no.to_be_bytes());
        buf.extend_from_slice(&[0; 6]);
        for counter in [
            self.rx_packets,
            self.tx_packets,
            self.rx_bytes,
            self.tx_bytes,
            self.rx_dropped,
            self.tx_dropped,
            self.rx_errors,
            self.tx_errors,
            self.rx_frame_err,
            self.rx_over_err,
            self.rx_crc_err,
            self.collisions,
        ] {
            buf.extend_from_slice(&counter.to_be_bytes());
        }
    }

    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(body);
        let port_no = r.u16()?;
        r.skip(6)?;
        Ok(Self {
            port_no,
            rx_packets: r.u64()?,
            tx_packets: r.u64()?,
            rx_bytes: r.u64()?,
            tx_bytes: r.u64()?,
            rx_dropped: r.u64()?,
            tx_dropped: r.u64()?,
            rx_errors: r.u64()?,
            tx_errors: r.u64()?,
            rx_frame_err: r.u64()?,
            rx_over_err: r.u64()?,
            rx_crc_err: r.u64()?,
            collisions: r.u64()?,
        })
    }

    /// Decodes the concatenated records of a reply fragment.
    pub fn decode_list(body: &[u8]) -> Result<Vec<Self>, WireError> {
        if body.len() % PORT_STATS_LEN != 0 {
            return Err(WireError::Truncated);
        }
        body.chunks(PORT_STATS_LEN).map(Self::decode).collect()
    }
}
