// SPDX-License-Identifier: Apache-2.0

//! The statistics engine: one dumper per statistics kind, driven through
//! a resumable session that renders STATS_REPLY fragments until the
//! dumper runs dry. Fragment rendering re-resolves the datapath by index
//! each time, so a datapath destroyed mid-dump terminates the session
//! with `NotFound` instead of touching freed state.

use crate::desc::SwitchDesc;
use datapath::pipeline::{FlowStatsEntry, IterStatus, TableSel};
use datapath::{Datapath, DpError, DpRegistry, Sender};
use openflow::stats::{
    AGGREGATE_STATS_LEN, AggregateStats, DESC_STATS_LEN, DescStats, FLOW_STATS_REQUEST_LEN,
    FlowStats, FlowStatsRequest, PORT_STATS_LEN, PORT_STATS_REQUEST_LEN, PortStats,
    PortStatsRequest, TABLE_STATS_LEN, TableStats,
};
use openflow::types::{
    MsgType, PortNo, STATS_REPLY_MORE, StatsType, TABLE_ALL, TABLE_EMERG,
};
use openflow::{HEADER_LEN, MsgBuf};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Ceiling of one reply fragment, header and preamble included.
const FRAGMENT_LEN: usize = 4096;

/// Body bytes available to a dumper in one fragment.
pub const FRAGMENT_BODY_CAP: usize = FRAGMENT_LEN - HEADER_LEN - openflow::stats::STATS_PREAMBLE_LEN;

/// Did a dump call finish, or does it have more to emit?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpStatus {
    Done,
    More,
}

/// One kind of statistics dump. `dump` appends at most `cap` bytes of
/// reply body and reports whether more fragments follow; dropping the
/// dumper releases any iteration state.
pub trait StatsDumper: Send {
    fn dump(
        &mut self,
        dp: &Arc<Datapath>,
        buf: &mut Vec<u8>,
        cap: usize,
    ) -> Result<DumpStatus, DpError>;
}

// ---- description -------------------------------------------------------

struct DescDumper {
    desc: SwitchDesc,
}

impl StatsDumper for DescDumper {
    fn dump(
        &mut self,
        dp: &Arc<Datapath>,
        buf: &mut Vec<u8>,
        cap: usize,
    ) -> Result<DumpStatus, DpError> {
        if DESC_STATS_LEN > cap {
            return Err(DpError::OutOfMemory);
        }
        DescStats {
            mfr_desc: self.desc.mfr_desc.clone(),
            hw_desc: self.desc.hw_desc.clone(),
            sw_desc: self.desc.sw_desc.clone(),
            serial_num: self.desc.serial_num.clone(),
            dp_desc: dp.description().to_string(),
        }
        .encode_into(buf);
        Ok(DumpStatus::Done)
    }
}

// ---- per-flow ----------------------------------------------------------

struct FlowDumper {
    req: FlowStatsRequest,
    table_idx: usize,
    pos: u64,
}

impl FlowDumper {
    fn new(req: FlowStatsRequest) -> Self {
        Self {
            table_idx: if req.table_id == TABLE_ALL { 0 } else { usize::from(req.table_id) },
            pos: 0,
            req,
        }
    }

    fn render(entry: &FlowStatsEntry) -> FlowStats {
        FlowStats {
            table_id: entry.table_id,
            flow_match: entry.flow_match,
            duration_sec: entry.age.as_secs().min(u64::from(u32::MAX)) as u32,
            duration_nsec: entry.age.subsec_nanos(),
            priority: entry.priority,
            idle_timeout: entry.idle_timeout,
            hard_timeout: entry.hard_timeout,
            packet_count: entry.packet_count,
            byte_count: entry.byte_count,
            actions: entry.actions.clone(),
        }
    }
}

impl StatsDumper for FlowDumper {
    fn dump(
        &mut self,
        dp: &Arc<Datapath>,
        buf: &mut Vec<u8>,
        cap: usize,
    ) -> Result<DumpStatus, DpError> {
        let start = buf.len();
        let mut emit = |entry: &FlowStatsEntry, buf: &mut Vec<u8>| -> bool {
            let rec = Self::render(entry);
            if buf.len() - start + rec.wire_len() > cap {
                return false;
            }
            rec.encode_into(buf);
            true
        };

        if self.req.table_id == TABLE_EMERG {
            let status = dp.chain().iterate_flows(
                TableSel::Emergency,
                &self.req.flow_match,
                PortNo(self.req.out_port),
                &mut self.pos,
                &mut |e| emit(e, buf),
            );
            return match status {
                IterStatus::Done => Ok(DumpStatus::Done),
                // an oversized flow that fits in no fragment would loop
                // forever; give up instead
                IterStatus::Stopped if buf.len() == start => Err(DpError::OutOfMemory),
                IterStatus::Stopped => Ok(DumpStatus::More),
            };
        }

        let n_tables = dp.chain().n_tables();
        while self.table_idx < n_tables
            && (self.req.table_id == TABLE_ALL || usize::from(self.req.table_id) == self.table_idx)
        {
            let status = dp.chain().iterate_flows(
                TableSel::Table(self.table_idx),
                &self.req.flow_match,
                PortNo(self.req.out_port),
                &mut self.pos,
                &mut |e| emit(e, buf),
            );
            match status {
                IterStatus::Stopped if buf.len() == start => return Err(DpError::OutOfMemory),
                IterStatus::Stopped => return Ok(DumpStatus::More),
                IterStatus::Done => {
                    self.table_idx += 1;
                    self.pos = 0;
                }
            }
        }
        Ok(DumpStatus::Done)
    }
}

// ---- aggregate ---------------------------------------------------------

struct AggregateDumper {
    req: FlowStatsRequest,
}

impl StatsDumper for AggregateDumper {
    fn dump(
        &mut self,
        dp: &Arc<Datapath>,
        buf: &mut Vec<u8>,
        cap: usize,
    ) -> Result<DumpStatus, DpError> {
        if AGGREGATE_STATS_LEN > cap {
            return Err(DpError::OutOfMemory);
        }
        let mut agg = AggregateStats::default();
        let mut fold = |e: &FlowStatsEntry| {
            agg.packet_count += e.packet_count;
            agg.byte_count += e.byte_count;
            agg.flow_count += 1;
            true
        };

        if self.req.table_id == TABLE_EMERG {
            let mut pos = 0;
            dp.chain().iterate_flows(
                TableSel::Emergency,
                &self.req.flow_match,
                PortNo(self.req.out_port),
                &mut pos,
                &mut fold,
            );
        } else {
            let n_tables = dp.chain().n_tables();
            let mut table_idx = if self.req.table_id == TABLE_ALL {
                0
            } else {
                usize::from(self.req.table_id)
            };
            while table_idx < n_tables
                && (self.req.table_id == TABLE_ALL || usize::from(self.req.table_id) == table_idx)
            {
                let mut pos = 0;
                dp.chain().iterate_flows(
                    TableSel::Table(table_idx),
                    &self.req.flow_match,
                    PortNo(self.req.out_port),
                    &mut pos,
                    &mut fold,
                );
                table_idx += 1;
            }
        }
        agg.encode_into(buf);
        Ok(DumpStatus::Done)
    }
}

// ---- per-table ---------------------------------------------------------

struct TableDumper;

impl StatsDumper for TableDumper {
    fn dump(
        &mut self,
        dp: &Arc<Datapath>,
        buf: &mut Vec<u8>,
        cap: usize,
    ) -> Result<DumpStatus, DpError> {
        let n_tables = dp.chain().n_tables();
        if n_tables * TABLE_STATS_LEN > cap {
            return Err(DpError::OutOfMemory);
        }
        for idx in 0..n_tables {
            let Some(stats) = dp.chain().table_stats(idx) else {
                continue;
            };
            TableStats {
                table_id: idx.min(255) as u8,
                name: stats.name,
                wildcards: stats.wildcards,
                max_entries: stats.max_entries,
                active_count: stats.active_count,
                lookup_count: stats.lookup_count,
                matched_count: stats.matched_count,
            }
            .encode_into(buf);
        }
        Ok(DumpStatus::Done)
    }
}

// ---- per-port ----------------------------------------------------------

struct PortDumper {
    /// Requested port, or [`PortNo::NONE`] for a walk over all ports.
    port_no: u16,
    /// Next numeric port number to consider when walking.
    start_port: u16,
    local_done: bool,
}

impl PortDumper {
    fn new(req: &PortStatsRequest) -> Self {
        Self {
            port_no: req.port_no,
            start_port: 1,
            local_done: false,
        }
    }

    fn render(port: &datapath::Port, buf: &mut Vec<u8>) {
        let stats = port.iface().stats();
        PortStats {
            port_no: port.port_no(),
            rx_packets: stats.rx_packets,
            tx_packets: stats.tx_packets,
            rx_bytes: stats.rx_bytes,
            tx_bytes: stats.tx_bytes,
            rx_dropped: stats.rx_dropped,
            tx_dropped: stats.tx_dropped,
            rx_errors: stats.rx_errors,
            tx_errors: stats.tx_errors,
            rx_frame_err: stats.rx_frame_err,
            rx_over_err: stats.rx_over_err,
            rx_crc_err: stats.rx_crc_err,
            collisions: stats.collisions,
        }
        .encode_into(buf);
    }
}

impl StatsDumper for PortDumper {
    fn dump(
        &mut self,
        dp: &Arc<Datapath>,
        buf: &mut Vec<u8>,
        cap: usize,
    ) -> Result<DumpStatus, DpError> {
        let max_ports = cap / PORT_STATS_LEN;
        if max_ports == 0 {
            return Err(DpError::OutOfMemory);
        }

        if self.port_no != PortNo::NONE.0 {
            if let Some(port) = dp.lookup_port(PortNo(self.port_no)) {
                Self::render(&port, buf);
            }
            return Ok(DumpStatus::Done);
        }

        // numeric ports first, then the local port
        let mut emitted = 0usize;
        for port in dp.ports().numeric() {
            if port.port_no() < self.start_port {
                continue;
            }
            if emitted == max_ports {
                return Ok(DumpStatus::More);
            }
            Self::render(&port, buf);
            self.start_port = port.port_no() + 1;
            emitted += 1;
        }
        if !self.local_done {
            if emitted == max_ports {
                return Ok(DumpStatus::More);
            }
            if let Some(local) = dp.lookup_port(PortNo::LOCAL) {
                Self::render(&local, buf);
            }
            self.local_done = true;
        }
        Ok(DumpStatus::Done)
    }
}

// ---- vendor ------------------------------------------------------------

/// Builds vendor-statistics dumpers for one 32-bit vendor id.
pub trait VendorStatsFactory: Send + Sync {
    /// `body` is the request body after the vendor id.
    fn init(&self, dp: &Arc<Datapath>, body: &[u8]) -> Result<Box<dyn StatsDumper>, DpError>;
}

/// Registration point for vendor statistics extensions.
#[derive(Default)]
pub struct VendorStatsRegistry {
    factories: RwLock<HashMap<u32, Arc<dyn VendorStatsFactory>>>,
}

impl VendorStatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, vendor: u32, factory: Arc<dyn VendorStatsFactory>) {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(vendor, factory);
    }

    fn init(&self, dp: &Arc<Datapath>, body: &[u8]) -> Result<Box<dyn StatsDumper>, DpError> {
        let Some(vendor_bytes) = body.get(..4) else {
            return Err(DpError::Invalid);
        };
        let vendor = u32::from_be_bytes([
            vendor_bytes[0],
            vendor_bytes[1],
            vendor_bytes[2],
            vendor_bytes[3],
        ]);
        let factory = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&vendor)
            .cloned();
        match factory {
            Some(f) => f.init(dp, &body[4..]),
            None => {
                debug!(vendor, "vendor statistics request for unknown vendor");
                Err(DpError::Invalid)
            }
        }
    }
}

// ---- engine & session --------------------------------------------------

/// Builds dumpers from raw STATS_REQUEST bodies.
pub struct StatsEngine {
    desc: SwitchDesc,
    vendors: VendorStatsRegistry,
}

impl StatsEngine {
    #[must_use]
    pub fn new(desc: SwitchDesc) -> Self {
        Self {
            desc,
            vendors: VendorStatsRegistry::new(),
        }
    }

    #[must_use]
    pub fn vendors(&self) -> &VendorStatsRegistry {
        &self.vendors
    }

    /// Validates a request body and constructs its dumper.
    /// `BadStat` for unknown or unsupported statistics kinds.
    pub fn init_dump(
        &self,
        dp: &Arc<Datapath>,
        stats_type: u16,
        body: &[u8],
    ) -> Result<Box<dyn StatsDumper>, DpError> {
        let ty = StatsType::from_raw(stats_type).ok_or(DpError::BadStat)?;
        let expect_len = |min: usize, max: usize| -> Result<(), DpError> {
            if body.len() < min || body.len() > max {
                return Err(DpError::Invalid);
            }
            Ok(())
        };
        match ty {
            StatsType::Desc => {
                expect_len(0, 0)?;
                Ok(Box::new(DescDumper {
                    desc: self.desc.clone(),
                }))
            }
            StatsType::Flow => {
                expect_len(FLOW_STATS_REQUEST_LEN, FLOW_STATS_REQUEST_LEN)?;
                Ok(Box::new(FlowDumper::new(FlowStatsRequest::decode(body)?)))
            }
            StatsType::Aggregate => {
                expect_len(FLOW_STATS_REQUEST_LEN, FLOW_STATS_REQUEST_LEN)?;
                Ok(Box::new(AggregateDumper {
                    req: FlowStatsRequest::decode(body)?,
                }))
            }
            StatsType::Table => {
                expect_len(0, 0)?;
                Ok(Box::new(TableDumper))
            }
            StatsType::Port => {
                expect_len(PORT_STATS_REQUEST_LEN, PORT_STATS_REQUEST_LEN)?;
                Ok(Box::new(PortDumper::new(&PortStatsRequest::decode(body)?)))
            }
            StatsType::Vendor => {
                // vendor id + subtype at minimum
                expect_len(8, 32)?;
                self.vendors.init(dp, body)
            }
            StatsType::Queue => Err(DpError::BadStat),
        }
    }
}

/// A multi-part dump in progress. The dispatcher keeps the identifying
/// tuple (statistics type, datapath index, transaction id) and the dumper
/// state between fragments.
pub struct StatsSession {
    dp_idx: u32,
    stats_type: u16,
    sender: Sender,
    dumper: Option<Box<dyn StatsDumper>>,
}

impl StatsSession {
    pub(crate) fn new(
        dp_idx: u32,
        stats_type: u16,
        sender: Sender,
        dumper: Box<dyn StatsDumper>,
    ) -> Self {
        Self {
            dp_idx,
            stats_type,
            sender,
            dumper: Some(dumper),
        }
    }

    #[must_use]
    pub fn dp_idx(&self) -> u32 {
        self.dp_idx
    }

    #[must_use]
    pub fn sender(&self) -> Sender {
        self.sender
    }

    /// Renders the next STATS_REPLY fragment, or `None` when the dump has
    /// completed. The datapath is re-resolved per fragment; a datapath
    /// destroyed between fragments ends the dump with `NotFound`.
    pub fn next_fragment(&mut self, registry: &DpRegistry) -> Option<Result<Vec<u8>, DpError>> {
        let dumper = self.dumper.as_mut()?;
        let Some(dp) = registry.get(self.dp_idx) else {
            self.dumper = None;
            return Some(Err(DpError::NotFound));
        };

        let mut body = Vec::new();
        let status = match dumper.dump(&dp, &mut body, FRAGMENT_BODY_CAP) {
            Ok(status) => status,
            Err(e) => {
                self.dumper = None;
                return Some(Err(e));
            }
        };

        let mut m = MsgBuf::new(MsgType::StatsReply, self.sender.xid);
        m.put_u16(self.stats_type);
        m.put_u16(match status {
            DumpStatus::More => STATS_REPLY_MORE,
            DumpStatus::Done => 0,
        });
        m.put_bytes(&body);
        if status == DumpStatus::Done {
            self.dumper = None;
        }
        match m.finish() {
            Ok(msg) => Some(Ok(msg)),
            Err(e) => {
                self.dumper = None;
                Some(Err(e.into()))
            }
        }
    }
}
