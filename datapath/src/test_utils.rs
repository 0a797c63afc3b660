// SPDX-License-Identifier: Apache-2.0

//! In-memory implementations of every collaborator seam, for tests and
//! examples: fake interfaces and an interface provider, a buffer pool, a
//! recording control sink, and a single-table flow pipeline good enough
//! to exercise the forwarding and statistics paths.

use crate::ctrl::{ControlSink, Sender};
use crate::dp::Datapath;
use crate::error::DpError;
use crate::eth::{ETH_HLEN, ETHERTYPE_VLAN, Frame, Mac, VLAN_HLEN};
use crate::iface::{IfaceProvider, IfaceStats, LinkFeatures, NetIface};
use crate::pipeline::{
    FlowPipeline, FlowStatsEntry, IterStatus, RemovedFlow, TableSel, TableStatsEntry, Verdict,
};
use crate::pool::PacketPool;
use crate::registry::PipelineFactory;
use crate::sync::lock;
use openflow::flow_match::{FlowMatch, Wildcards};
use openflow::messages::PacketOut;
use openflow::types::{self, ErrorType, FlowRemovedReason, MsgType, PacketInReason, PortNo};
use openflow::{Action, Header};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

// ---- interfaces --------------------------------------------------------

static NEXT_MAC: AtomicU32 = AtomicU32::new(0x10);

/// A fake host interface that records transmitted frames.
pub struct FakeIface {
    name: String,
    mac: Mac,
    mtu: AtomicUsize,
    up: AtomicBool,
    carrier: AtomicBool,
    loopback: bool,
    ethernet: bool,
    dp_local: bool,
    promisc: AtomicU32,
    transmitted: Mutex<Vec<Frame>>,
    stats: Mutex<IfaceStats>,
}

impl FakeIface {
    /// A plain Ethernet device with a generated locally-administered MAC.
    pub fn named(name: &str) -> Arc<Self> {
        let tail = NEXT_MAC.fetch_add(1, Ordering::Relaxed);
        Self::with_mac(name, Mac([0x02, 0xff, 0, 0, (tail >> 8) as u8, tail as u8]))
    }

    pub fn with_mac(name: &str, mac: Mac) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            mac,
            mtu: AtomicUsize::new(1500),
            up: AtomicBool::new(true),
            carrier: AtomicBool::new(true),
            loopback: false,
            ethernet: true,
            dp_local: false,
            promisc: AtomicU32::new(0),
            transmitted: Mutex::new(Vec::new()),
            stats: Mutex::new(IfaceStats::default()),
        })
    }

    pub fn loopback(name: &str) -> Arc<Self> {
        let mut iface = Self::with_mac(name, Mac::ZERO);
        if let Some(i) = Arc::get_mut(&mut iface) {
            i.loopback = true;
        }
        iface
    }

    pub fn non_ethernet(name: &str) -> Arc<Self> {
        let mut iface = Self::with_mac(name, Mac::ZERO);
        if let Some(i) = Arc::get_mut(&mut iface) {
            i.ethernet = false;
        }
        iface
    }

    pub fn set_link(&self, up: bool, carrier: bool) {
        self.up.store(up, Ordering::Relaxed);
        self.carrier.store(carrier, Ordering::Relaxed);
    }

    pub fn set_mtu(&self, mtu: usize) {
        self.mtu.store(mtu, Ordering::Relaxed);
    }

    pub fn set_stats(&self, stats: IfaceStats) {
        *lock(&self.stats) = stats;
    }

    /// Frames transmitted so far.
    #[must_use]
    pub fn tx_frames(&self) -> Vec<Frame> {
        lock(&self.transmitted).clone()
    }

    #[must_use]
    pub fn tx_count(&self) -> usize {
        lock(&self.transmitted).len()
    }

    /// Current promiscuous reference count.
    #[must_use]
    pub fn promisc_count(&self) -> u32 {
        self.promisc.load(Ordering::Relaxed)
    }
}

impl NetIface for FakeIface {
    fn name(&self) -> &str {
        &self.name
    }

    fn mac(&self) -> Mac {
        self.mac
    }

    fn mtu(&self) -> usize {
        self.mtu.load(Ordering::Relaxed)
    }

    fn is_up(&self) -> bool {
        self.up.load(Ordering::Relaxed)
    }

    fn has_carrier(&self) -> bool {
        self.carrier.load(Ordering::Relaxed)
    }

    fn is_loopback(&self) -> bool {
        self.loopback
    }

    fn is_ethernet(&self) -> bool {
        self.ethernet
    }

    fn is_datapath_local(&self) -> bool {
        self.dp_local
    }

    fn set_promiscuous(&self, on: bool) {
        if on {
            self.promisc.fetch_add(1, Ordering::Relaxed);
        } else {
            self.promisc.fetch_sub(1, Ordering::Relaxed);
        }
    }

    fn features(&self) -> LinkFeatures {
        LinkFeatures::default()
    }

    fn transmit(&self, frame: Frame) -> Result<(), DpError> {
        let mut stats = lock(&self.stats);
        stats.tx_packets += 1;
        stats.tx_bytes += frame.len() as u64;
        drop(stats);
        lock(&self.transmitted).push(frame);
        Ok(())
    }

    fn stats(&self) -> IfaceStats {
        *lock(&self.stats)
    }
}

/// An interface subsystem over a name-keyed map of [`FakeIface`]s.
#[derive(Default)]
pub struct FakeProvider {
    ifaces: Mutex<HashMap<String, Arc<FakeIface>>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a host interface for later [`IfaceProvider::lookup`].
    pub fn add(&self, iface: Arc<FakeIface>) {
        lock(&self.ifaces).insert(iface.name().to_string(), iface);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<FakeIface>> {
        lock(&self.ifaces).get(name).cloned()
    }
}

impl IfaceProvider for FakeProvider {
    fn lookup(&self, name: &str) -> Option<Arc<dyn NetIface>> {
        self.get(name).map(|i| i as Arc<dyn NetIface>)
    }

    fn create_local(&self, dp_idx: u32, name: Option<&str>) -> Result<Arc<dyn NetIface>, DpError> {
        let name = match name {
            Some(n) => n.to_string(),
            None => format!("of{dp_idx}"),
        };
        let mut ifaces = lock(&self.ifaces);
        if ifaces.contains_key(&name) {
            return Err(DpError::AlreadyExists);
        }
        // deterministic local MAC: dp0 -> 02:00:00:00:00:01
        let mac = Mac([0x02, 0, 0, 0, 0, (dp_idx + 1) as u8]);
        let mut iface = FakeIface::with_mac(&name, mac);
        if let Some(i) = Arc::get_mut(&mut iface) {
            i.dp_local = true;
        }
        ifaces.insert(name, Arc::clone(&iface));
        Ok(iface)
    }

    fn destroy_local(&self, iface: &Arc<dyn NetIface>) {
        lock(&self.ifaces).remove(iface.name());
    }
}

// ---- packet pool -------------------------------------------------------

/// A buffer pool over a hash map; can be told to decline buffering.
pub struct FakePool {
    buffers: Mutex<HashMap<u32, Frame>>,
    next_id: AtomicU32,
    capacity: u32,
    enabled: AtomicBool,
}

impl FakePool {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: u32) -> Arc<Self> {
        Arc::new(Self {
            buffers: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            capacity,
            enabled: AtomicBool::new(true),
        })
    }

    /// When disabled, `save` declines and packet-ins carry full payloads.
    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Relaxed);
    }

    #[must_use]
    pub fn stashed(&self) -> usize {
        lock(&self.buffers).len()
    }
}

impl PacketPool for FakePool {
    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn save(&self, frame: &Frame) -> Option<u32> {
        if !self.enabled.load(Ordering::Relaxed) {
            return None;
        }
        let mut buffers = lock(&self.buffers);
        if buffers.len() as u32 >= self.capacity {
            return None;
        }
        let mut id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if id == types::NO_BUFFER {
            id = self.next_id.fetch_add(1, Ordering::Relaxed);
        }
        buffers.insert(id, frame.clone());
        Some(id)
    }

    fn take(&self, buffer_id: u32) -> Option<Frame> {
        lock(&self.buffers).remove(&buffer_id)
    }

    fn discard_all(&self) {
        lock(&self.buffers).clear();
    }
}

// ---- control sink ------------------------------------------------------

/// One message captured by the [`RecordingSink`].
#[derive(Debug, Clone)]
pub struct SentMsg {
    pub dp_idx: u32,
    /// `Some` for unicast replies, `None` for group notifications.
    pub sender: Option<Sender>,
    pub msg: Vec<u8>,
}

/// A control sink that records everything the datapath emits.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<SentMsg>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every send fail, for notification-drop tests.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    #[must_use]
    pub fn take_all(&self) -> Vec<SentMsg> {
        std::mem::take(&mut lock(&self.sent))
    }

    #[must_use]
    pub fn all(&self) -> Vec<SentMsg> {
        lock(&self.sent).clone()
    }

    /// Messages of one OpenFlow type, in emission order.
    #[must_use]
    pub fn of_type(&self, ty: MsgType) -> Vec<SentMsg> {
        lock(&self.sent)
            .iter()
            .filter(|m| m.msg.get(1) == Some(&(ty as u8)))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn count_of_type(&self, ty: MsgType) -> usize {
        self.of_type(ty).len()
    }
}

impl ControlSink for RecordingSink {
    fn unicast(&self, dp_idx: u32, sender: &Sender, msg: Vec<u8>) -> Result<(), DpError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(DpError::OutOfMemory);
        }
        lock(&self.sent).push(SentMsg {
            dp_idx,
            sender: Some(*sender),
            msg,
        });
        Ok(())
    }

    fn multicast(&self, dp_idx: u32, msg: Vec<u8>) -> Result<(), DpError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(DpError::OutOfMemory);
        }
        lock(&self.sent).push(SentMsg {
            dp_idx,
            sender: None,
            msg,
        });
        Ok(())
    }
}

// ---- flow pipeline -----------------------------------------------------

/// Everything needed to install a flow in the [`TestPipeline`].
#[derive(Debug, Clone)]
pub struct FlowSpec {
    pub flow_match: FlowMatch,
    pub priority: u16,
    /// Seconds without traffic before expiry; 0 = never.
    pub idle_timeout: u16,
    /// Seconds after installation before expiry; 0 = never.
    pub hard_timeout: u16,
    pub actions: Vec<Action>,
    pub send_flow_rem: bool,
    pub emergency: bool,
}

impl Default for FlowSpec {
    fn default() -> Self {
        Self {
            flow_match: FlowMatch::default(),
            priority: 0x8000,
            idle_timeout: 0,
            hard_timeout: 0,
            actions: Vec::new(),
            send_flow_rem: false,
            emergency: false,
        }
    }
}

struct TestFlow {
    spec: FlowSpec,
    created: Instant,
    last_used: Instant,
    packet_count: u64,
    byte_count: u64,
}

/// A one-table, linear-scan pipeline: priority-ordered matching, idle and
/// hard expiry, resumable iteration and a packet-out handler. Enough
/// pipeline to drive the core; nothing more.
pub struct TestPipeline {
    flows: Mutex<Vec<TestFlow>>,
    lookup_count: AtomicU64,
    matched_count: AtomicU64,
}

impl Default for TestPipeline {
    fn default() -> Self {
        Self {
            flows: Mutex::new(Vec::new()),
            lookup_count: AtomicU64::new(0),
            matched_count: AtomicU64::new(0),
        }
    }
}

impl TestPipeline {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn install(&self, spec: FlowSpec) {
        let now = Instant::now();
        lock(&self.flows).push(TestFlow {
            spec,
            created: now,
            last_used: now,
            packet_count: 0,
            byte_count: 0,
        });
    }

    #[must_use]
    pub fn flow_count(&self) -> usize {
        lock(&self.flows).len()
    }

    /// The exact-match key of a frame, as far as this pipeline parses.
    fn extract_key(frame: &Frame) -> FlowMatch {
        let data = frame.data();
        let mut key = FlowMatch {
            wildcards: Wildcards::EXACT,
            in_port: frame.in_port.unwrap_or(0),
            // no VLAN present
            dl_vlan: 0xffff,
            ..FlowMatch::default()
        };
        if data.len() >= ETH_HLEN {
            key.dl_dst.copy_from_slice(&data[0..6]);
            key.dl_src.copy_from_slice(&data[6..12]);
        }
        let mut l3 = ETH_HLEN;
        let mut ethertype = frame.ethertype().unwrap_or(0);
        if ethertype == ETHERTYPE_VLAN && data.len() >= ETH_HLEN + VLAN_HLEN {
            let tci = u16::from_be_bytes([data[14], data[15]]);
            key.dl_vlan = tci & 0x0fff;
            key.dl_vlan_pcp = (tci >> 13) as u8;
            ethertype = u16::from_be_bytes([data[16], data[17]]);
            l3 += VLAN_HLEN;
        }
        key.dl_type = ethertype;

        if ethertype == 0x0800 && data.len() >= l3 + 20 {
            let ip = &data[l3..];
            let ihl = usize::from(ip[0] & 0x0f) * 4;
            key.nw_tos = ip[1] & 0xfc;
            key.nw_proto = ip[9];
            key.nw_src = u32::from_be_bytes([ip[12], ip[13], ip[14], ip[15]]);
            key.nw_dst = u32::from_be_bytes([ip[16], ip[17], ip[18], ip[19]]);
            let l4 = l3 + ihl;
            match key.nw_proto {
                // tcp / udp
                6 | 17 if data.len() >= l4 + 4 => {
                    key.tp_src = u16::from_be_bytes([data[l4], data[l4 + 1]]);
                    key.tp_dst = u16::from_be_bytes([data[l4 + 2], data[l4 + 3]]);
                }
                // icmp type/code travel in the port fields
                1 if data.len() >= l4 + 2 => {
                    key.tp_src = u16::from(data[l4]);
                    key.tp_dst = u16::from(data[l4 + 1]);
                }
                _ => {}
            }
        } else if ethertype == 0x0806 && data.len() >= l3 + 28 {
            let arp = &data[l3..];
            key.nw_proto = arp[7]; // opcode, low byte
            key.nw_src = u32::from_be_bytes([arp[14], arp[15], arp[16], arp[17]]);
            key.nw_dst = u32::from_be_bytes([arp[24], arp[25], arp[26], arp[27]]);
        }
        key
    }

    /// Does a flow's (wildcarded) match cover an exact key?
    fn matches(flow: &FlowMatch, key: &FlowMatch) -> bool {
        let w = flow.wildcards;
        let field = |bit: u32| w.contains(bit);
        let nw_ok = |wild_bits: u32, a: u32, b: u32| {
            let mask = if wild_bits >= 32 { 0 } else { u32::MAX << wild_bits };
            (a ^ b) & mask == 0
        };
        (field(Wildcards::IN_PORT) || flow.in_port == key.in_port)
            && (field(Wildcards::DL_SRC) || flow.dl_src == key.dl_src)
            && (field(Wildcards::DL_DST) || flow.dl_dst == key.dl_dst)
            && (field(Wildcards::DL_VLAN) || flow.dl_vlan == key.dl_vlan)
            && (field(Wildcards::DL_VLAN_PCP) || flow.dl_vlan_pcp == key.dl_vlan_pcp)
            && (field(Wildcards::DL_TYPE) || flow.dl_type == key.dl_type)
            && (field(Wildcards::NW_TOS) || flow.nw_tos == key.nw_tos)
            && (field(Wildcards::NW_PROTO) || flow.nw_proto == key.nw_proto)
            && nw_ok(w.nw_src_wild_bits(), flow.nw_src, key.nw_src)
            && nw_ok(w.nw_dst_wild_bits(), flow.nw_dst, key.nw_dst)
            && (field(Wildcards::TP_SRC) || flow.tp_src == key.tp_src)
            && (field(Wildcards::TP_DST) || flow.tp_dst == key.tp_dst)
    }

    /// Does a statistics selector (a description that may be more general)
    /// cover a flow's match?
    fn covered_by(sel: &FlowMatch, flow: &FlowMatch) -> bool {
        let s = sel.wildcards;
        let f = flow.wildcards;
        let field = |bit: u32, eq: bool| s.contains(bit) || (!f.contains(bit) && eq);
        let nw_ok = |sel_bits: u32, flow_bits: u32, a: u32, b: u32| {
            let mask = if sel_bits >= 32 { 0 } else { u32::MAX << sel_bits };
            flow_bits <= sel_bits && (a ^ b) & mask == 0
        };
        field(Wildcards::IN_PORT, flow.in_port == sel.in_port)
            && field(Wildcards::DL_SRC, flow.dl_src == sel.dl_src)
            && field(Wildcards::DL_DST, flow.dl_dst == sel.dl_dst)
            && field(Wildcards::DL_VLAN, flow.dl_vlan == sel.dl_vlan)
            && field(Wildcards::DL_VLAN_PCP, flow.dl_vlan_pcp == sel.dl_vlan_pcp)
            && field(Wildcards::DL_TYPE, flow.dl_type == sel.dl_type)
            && field(Wildcards::NW_TOS, flow.nw_tos == sel.nw_tos)
            && field(Wildcards::NW_PROTO, flow.nw_proto == sel.nw_proto)
            && nw_ok(
                s.nw_src_wild_bits(),
                f.nw_src_wild_bits(),
                flow.nw_src,
                sel.nw_src,
            )
            && nw_ok(
                s.nw_dst_wild_bits(),
                f.nw_dst_wild_bits(),
                flow.nw_dst,
                sel.nw_dst,
            )
            && field(Wildcards::TP_SRC, flow.tp_src == sel.tp_src)
            && field(Wildcards::TP_DST, flow.tp_dst == sel.tp_dst)
    }

    fn outputs_to(actions: &[Action], out_port: PortNo) -> bool {
        actions
            .iter()
            .any(|a| matches!(a, Action::Output { port, .. } if *port == out_port))
    }

    /// Executes an action list's output actions: clones for all but the
    /// last output, the original frame for the last.
    fn run_actions(dp: &Datapath, frame: Frame, actions: &[Action], ignore_no_fwd: bool) {
        let outputs: Vec<(PortNo, u16)> = actions
            .iter()
            .filter_map(|a| match a {
                Action::Output { port, max_len } => Some((*port, *max_len)),
                _ => None,
            })
            .collect();
        let Some(((last_port, last_max), rest)) = outputs.split_last() else {
            return; // no outputs: frame dropped
        };
        for &(port, max_len) in rest {
            Self::run_one_output(dp, frame.clone(), port, max_len, ignore_no_fwd);
        }
        Self::run_one_output(dp, frame, *last_port, *last_max, ignore_no_fwd);
    }

    fn run_one_output(
        dp: &Datapath,
        frame: Frame,
        port: PortNo,
        max_len: u16,
        ignore_no_fwd: bool,
    ) {
        let _ = match port {
            PortNo::CONTROLLER => {
                dp.output_control(frame, usize::from(max_len), PacketInReason::Action)
            }
            _ => dp.output(frame, port, ignore_no_fwd),
        };
    }

    fn snapshot(flow: &TestFlow, table_id: u8) -> FlowStatsEntry {
        FlowStatsEntry {
            table_id,
            flow_match: flow.spec.flow_match,
            priority: flow.spec.priority,
            idle_timeout: flow.spec.idle_timeout,
            hard_timeout: flow.spec.hard_timeout,
            age: flow.created.elapsed(),
            packet_count: flow.packet_count,
            byte_count: flow.byte_count,
            actions: flow.spec.actions.clone(),
        }
    }
}

impl FlowPipeline for TestPipeline {
    fn n_tables(&self) -> usize {
        1
    }

    fn process(&self, dp: &Datapath, frame: Frame) -> Verdict {
        self.lookup_count.fetch_add(1, Ordering::Relaxed);
        let key = Self::extract_key(&frame);
        let mut flows = lock(&self.flows);
        let best = flows
            .iter_mut()
            .filter(|f| !f.spec.emergency && Self::matches(&f.spec.flow_match, &key))
            .max_by_key(|f| f.spec.priority);
        let Some(flow) = best else {
            return Verdict::Miss(frame);
        };
        self.matched_count.fetch_add(1, Ordering::Relaxed);
        flow.packet_count += 1;
        flow.byte_count += frame.len() as u64;
        flow.last_used = Instant::now();
        let actions = flow.spec.actions.clone();
        drop(flows);
        Self::run_actions(dp, frame, &actions, false);
        Verdict::Consumed
    }

    fn handle_message(&self, dp: &Datapath, sender: &Sender, msg: &[u8]) -> Result<(), DpError> {
        let header = Header::decode(msg)?;
        match MsgType::from_raw(header.msg_type) {
            Some(MsgType::PacketOut) => {
                let po = PacketOut::decode(header.body(msg))?;
                let mut frame = if po.buffer_id != types::NO_BUFFER {
                    dp.pool().take(po.buffer_id).ok_or(DpError::NotFound)?
                } else if po.data.is_empty() {
                    return Err(DpError::Invalid);
                } else {
                    Frame::new(po.data.clone())
                };
                if po.in_port != PortNo::NONE.0 {
                    frame.in_port = Some(po.in_port);
                }
                Self::run_actions(dp, frame, &po.actions, true);
                Ok(())
            }
            _ => {
                dp.send_error_msg(
                    sender,
                    ErrorType::BadRequest,
                    types::bad_request::BAD_TYPE,
                    msg,
                )?;
                Ok(())
            }
        }
    }

    fn expire_flows(&self) -> Vec<RemovedFlow> {
        let now = Instant::now();
        let mut flows = lock(&self.flows);
        let mut removed = Vec::new();
        flows.retain(|f| {
            let idle = f.spec.idle_timeout != 0
                && now.duration_since(f.last_used).as_secs() >= u64::from(f.spec.idle_timeout);
            let hard = f.spec.hard_timeout != 0
                && now.duration_since(f.created).as_secs() >= u64::from(f.spec.hard_timeout);
            if !(idle || hard) {
                return true;
            }
            removed.push(RemovedFlow {
                flow_match: f.spec.flow_match,
                priority: f.spec.priority,
                reason: if idle {
                    FlowRemovedReason::IdleTimeout
                } else {
                    FlowRemovedReason::HardTimeout
                },
                age: now.duration_since(f.created),
                idle_timeout: f.spec.idle_timeout,
                packet_count: f.packet_count,
                byte_count: f.byte_count,
                send_flow_rem: f.spec.send_flow_rem,
                emergency: f.spec.emergency,
            });
            false
        });
        removed
    }

    fn table_stats(&self, table_idx: usize) -> Option<TableStatsEntry> {
        if table_idx != 0 {
            return None;
        }
        Some(TableStatsEntry {
            name: "linear".to_string(),
            wildcards: Wildcards::ALL.0,
            max_entries: 1024,
            active_count: self.flow_count() as u32,
            lookup_count: self.lookup_count.load(Ordering::Relaxed),
            matched_count: self.matched_count.load(Ordering::Relaxed),
        })
    }

    fn iterate_flows(
        &self,
        table: TableSel,
        sel: &FlowMatch,
        out_port: PortNo,
        pos: &mut u64,
        cb: &mut dyn FnMut(&FlowStatsEntry) -> bool,
    ) -> IterStatus {
        let emergency = table == TableSel::Emergency;
        let flows = lock(&self.flows);
        let table_flows: Vec<&TestFlow> = flows
            .iter()
            .filter(|f| f.spec.emergency == emergency)
            .collect();
        while (*pos as usize) < table_flows.len() {
            let flow = table_flows[*pos as usize];
            let selected = Self::covered_by(sel, &flow.spec.flow_match)
                && (out_port == PortNo::NONE || Self::outputs_to(&flow.spec.actions, out_port));
            if selected && !cb(&Self::snapshot(flow, 0)) {
                // reply buffer full; resume re-visits this flow
                return IterStatus::Stopped;
            }
            *pos += 1;
        }
        IterStatus::Done
    }
}

/// Builds a fresh [`TestPipeline`] per datapath and remembers it so tests
/// can reach in.
#[derive(Default)]
pub struct TestPipelineFactory {
    built: Mutex<HashMap<u32, Arc<TestPipeline>>>,
}

impl TestPipelineFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The pipeline built for a datapath, if any.
    #[must_use]
    pub fn pipeline(&self, dp_idx: u32) -> Option<Arc<TestPipeline>> {
        lock(&self.built).get(&dp_idx).cloned()
    }
}

impl PipelineFactory for TestPipelineFactory {
    fn build(&self, dp_idx: u32) -> Result<Arc<dyn FlowPipeline>, DpError> {
        let pipeline = TestPipeline::new();
        lock(&self.built).insert(dp_idx, Arc::clone(&pipeline));
        Ok(pipeline)
    }
}

/// Frame builders shared by the test suites.
pub mod frames {
    use super::*;

    /// A minimal IPv4/UDP frame of exactly `total_len` bytes.
    #[must_use]
    pub fn ipv4_udp(dst: Mac, src: Mac, total_len: usize) -> Frame {
        assert!(total_len >= ETH_HLEN + 28);
        let mut data = Vec::with_capacity(total_len);
        data.extend_from_slice(&dst.0);
        data.extend_from_slice(&src.0);
        data.extend_from_slice(&0x0800u16.to_be_bytes());
        let ip_len = (total_len - ETH_HLEN) as u16;
        data.extend_from_slice(&[0x45, 0x00]); // ihl=5, tos=0
        data.extend_from_slice(&ip_len.to_be_bytes());
        data.extend_from_slice(&[0, 0, 0, 0, 64, 17]); // id, frag, ttl, udp
        data.extend_from_slice(&[0, 0]); // checksum
        data.extend_from_slice(&[10, 0, 0, 1]);
        data.extend_from_slice(&[10, 0, 0, 2]);
        data.extend_from_slice(&4242u16.to_be_bytes());
        data.extend_from_slice(&53u16.to_be_bytes());
        data.extend_from_slice(&((ip_len - 20) as u16).to_be_bytes());
        data.extend_from_slice(&[0, 0]); // udp checksum
        data.resize(total_len, 0xa5);
        Frame::new(data)
    }

    /// An Ethernet broadcast with an unparsed ethertype.
    #[must_use]
    pub fn broadcast(src: Mac, total_len: usize) -> Frame {
        let mut data = Vec::with_capacity(total_len);
        data.extend_from_slice(&Mac::BROADCAST.0);
        data.extend_from_slice(&src.0);
        data.extend_from_slice(&0x88b5u16.to_be_bytes());
        data.resize(total_len.max(ETH_HLEN), 0x5a);
        Frame::new(data)
    }
}
