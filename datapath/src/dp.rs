// SPDX-License-Identifier: Apache-2.0

//! A datapath instance: ingress, the forwarding engine, controller
//! escalation, and the message emitters of the control channel.

use crate::ctrl::{ControlSink, Sender};
use crate::error::DpError;
use crate::eth::Frame;
use crate::iface::NetIface;
use crate::maint::MaintWorker;
use crate::pipeline::{FlowPipeline, RemovedFlow, Verdict};
use crate::port::{DP_MAX_PORTS, Port};
use crate::port_table::{PortTableHandle, PortTableReader};
use crate::sync::lock;
use openflow::messages::{
    ErrorMsg, FlowRemoved, PacketIn, PortMod, PortStatus, SwitchConfig,
};
use openflow::types::{
    self, ErrorType, MsgType, PacketInReason, PortConfig, PortNo, PortReason,
    SUPPORTED_ACTIONS, SUPPORTED_CAPABILITIES,
};
use openflow::{Header, MsgBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

/// Fragment-handling bits a SET_CONFIG may store.
const CONFIG_FRAG_MASK: u16 = 0x0003;

/// One live datapath.
pub struct Datapath {
    dp_idx: u32,
    dp_desc: String,
    local_iface: Arc<dyn NetIface>,
    local_port: Arc<Port>,
    chain: Arc<dyn FlowPipeline>,
    pool: Arc<dyn crate::pool::PacketPool>,
    sink: Arc<dyn ControlSink>,
    ports: PortTableHandle,
    flags: AtomicU16,
    miss_send_len: AtomicU16,
    worker: Mutex<Option<MaintWorker>>,
}

impl Datapath {
    pub(crate) fn new(
        dp_idx: u32,
        dp_desc: String,
        local_iface: Arc<dyn NetIface>,
        chain: Arc<dyn FlowPipeline>,
        pool: Arc<dyn crate::pool::PacketPool>,
        sink: Arc<dyn ControlSink>,
    ) -> Self {
        local_iface.set_promiscuous(true);
        let local_port = Arc::new(Port::new(PortNo::LOCAL.0, Arc::clone(&local_iface)));
        let ports = PortTableHandle::new();
        ports.add(Arc::clone(&local_port));
        Self {
            dp_idx,
            dp_desc,
            local_iface,
            local_port,
            chain,
            pool,
            sink,
            ports,
            flags: AtomicU16::new(0),
            miss_send_len: AtomicU16::new(types::DEFAULT_MISS_SEND_LEN),
            worker: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn dp_idx(&self) -> u32 {
        self.dp_idx
    }

    /// Human-readable description reported in description statistics.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.dp_desc
    }

    /// 48-bit datapath id, derived from the local interface's MAC.
    #[must_use]
    pub fn datapath_id(&self) -> u64 {
        self.local_iface.mac().datapath_id()
    }

    /// Name of the datapath = name of its virtual local interface.
    #[must_use]
    pub fn name(&self) -> &str {
        self.local_iface.name()
    }

    #[must_use]
    pub fn local_iface(&self) -> &Arc<dyn NetIface> {
        &self.local_iface
    }

    #[must_use]
    pub fn local_port(&self) -> &Arc<Port> {
        &self.local_port
    }

    #[must_use]
    pub fn chain(&self) -> &Arc<dyn FlowPipeline> {
        &self.chain
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<dyn crate::pool::PacketPool> {
        &self.pool
    }

    /// A fresh read handle over the port table.
    #[must_use]
    pub fn ports(&self) -> PortTableReader {
        self.ports.reader()
    }

    /// Resolves a numeric port number or [`PortNo::LOCAL`].
    #[must_use]
    pub fn lookup_port(&self, port_no: PortNo) -> Option<Arc<Port>> {
        self.ports.reader().get(port_no)
    }

    #[must_use]
    pub fn config(&self) -> SwitchConfig {
        SwitchConfig {
            flags: self.flags.load(Ordering::Relaxed),
            miss_send_len: self.miss_send_len.load(Ordering::Relaxed),
        }
    }

    pub fn set_config(&self, config: SwitchConfig) {
        self.flags
            .store(config.flags & CONFIG_FRAG_MASK, Ordering::Relaxed);
        self.miss_send_len
            .store(config.miss_send_len, Ordering::Relaxed);
    }

    #[must_use]
    pub fn miss_send_len(&self) -> u16 {
        self.miss_send_len.load(Ordering::Relaxed)
    }

    // ---- lifecycle -----------------------------------------------------

    pub(crate) fn start_worker(
        self: &Arc<Self>,
        ctl: Arc<Mutex<()>>,
        interval: Duration,
    ) -> Result<(), DpError> {
        let weak: Weak<Datapath> = Arc::downgrade(self);
        *lock(&self.worker) = Some(MaintWorker::spawn(weak, ctl, interval, self.dp_idx)?);
        Ok(())
    }

    /// Stops and joins the maintenance worker. Runs before any port or
    /// pipeline teardown.
    pub(crate) fn stop_worker(&self) {
        if let Some(worker) = lock(&self.worker).take() {
            worker.stop();
        }
    }

    /// Allocates the lowest free port number and publishes a port over
    /// `iface`. The caller has already applied the attach policy.
    pub(crate) fn install_port(&self, iface: Arc<dyn NetIface>) -> Result<Arc<Port>, DpError> {
        let Some(port_no) = self.ports.reader().find_free() else {
            return Err(DpError::Exhausted);
        };
        iface.set_promiscuous(true);
        let port = Arc::new(Port::new(port_no, iface));
        self.ports.add(Arc::clone(&port));
        if let Err(e) = self.send_port_status(&port, PortReason::Add) {
            debug!(dp = self.dp_idx, error = %e, "port-status add notification dropped");
        }
        Ok(port)
    }

    /// Unpublishes a port; `publish` inside the table is the grace period
    /// that keeps concurrent readers safe.
    pub(crate) fn uninstall_port(&self, port: &Arc<Port>) {
        self.ports.del(port.port_no());
        port.iface().set_promiscuous(false);
        if let Err(e) = self.send_port_status(port, PortReason::Delete) {
            debug!(dp = self.dp_idx, error = %e, "port-status delete notification dropped");
        }
    }

    // ---- ingress -------------------------------------------------------

    /// Ingress hook: a frame received on `port_no` enters the pipeline.
    /// The caller hands over the complete frame, L2 header included.
    pub fn port_input(&self, mut frame: Frame, port_no: u16) {
        frame.in_port = Some(port_no);
        match self.chain.process(self, frame) {
            Verdict::Consumed => {}
            Verdict::Miss(frame) => {
                let no_packet_in = self
                    .lookup_port(PortNo(port_no))
                    .is_some_and(|p| p.config().contains(PortConfig::NO_PACKET_IN));
                if no_packet_in {
                    debug!(dp = self.dp_idx, port = port_no, "table miss on no-packet-in port");
                    return;
                }
                let max_len = usize::from(self.miss_send_len());
                if let Err(e) = self.output_control(frame, max_len, PacketInReason::NoMatch) {
                    debug!(dp = self.dp_idx, error = %e, "packet-in dropped");
                }
            }
        }
    }

    // ---- forwarding engine ---------------------------------------------

    /// Transmits `frame` according to `out_port`. Takes ownership in every
    /// case; each error path has already dropped the frame.
    pub fn output(&self, frame: Frame, out_port: PortNo, ignore_no_fwd: bool) -> Result<(), DpError> {
        match out_port {
            PortNo::IN_PORT => {
                let Some(in_port) = frame.in_port else {
                    debug!(dp = self.dp_idx, "in_port output without a known ingress");
                    return Err(DpError::NotFound);
                };
                let Some(port) = self.lookup_port(PortNo(in_port)) else {
                    debug!(dp = self.dp_idx, port = in_port, "ingress port vanished");
                    return Err(DpError::NotFound);
                };
                self.xmit(frame, &port)
            }
            PortNo::TABLE => {
                match self.chain.process(self, frame) {
                    Verdict::Consumed => Ok(()),
                    Verdict::Miss(_) => {
                        // re-injected packets that miss are simply dropped
                        debug!(dp = self.dp_idx, "table miss on re-injected packet");
                        Ok(())
                    }
                }
            }
            PortNo::FLOOD => self.output_all(frame, true),
            PortNo::ALL => self.output_all(frame, false),
            PortNo::CONTROLLER => {
                self.output_control(frame, usize::from(u16::MAX), PacketInReason::Action)
            }
            PortNo::LOCAL => self.local_iface.transmit(frame),
            PortNo(n) if (n as usize) < DP_MAX_PORTS => {
                let Some(port) = self.lookup_port(PortNo(n)) else {
                    warn!(dp = self.dp_idx, port = n, "output to unknown port");
                    return Err(DpError::NotFound);
                };
                if frame.in_port == Some(n) {
                    // sending back out the ingress requires IN_PORT
                    warn!(dp = self.dp_idx, port = n, "numeric output to the ingress port");
                    return Err(DpError::Invalid);
                }
                if port.config().contains(PortConfig::NO_FWD) && !ignore_no_fwd {
                    return Ok(());
                }
                self.xmit(frame, &port)
            }
            PortNo(n) => {
                warn!(dp = self.dp_idx, port = n, "output to bad port");
                Err(DpError::NotFound)
            }
        }
    }

    /// MTU-checked transmit on one port.
    fn xmit(&self, frame: Frame, port: &Arc<Port>) -> Result<(), DpError> {
        let mtu = port.iface().mtu();
        if frame.payload_len() > mtu && !frame.gso {
            warn!(
                dp = self.dp_idx,
                port = port.port_no(),
                len = frame.payload_len(),
                mtu,
                "dropped over-mtu packet"
            );
            return Err(DpError::TooBig);
        }
        port.iface().transmit(frame)
    }

    /// FLOOD / ALL: transmit on every port in attach order except the
    /// ingress, skipping NO_FLOOD ports when flooding. The original frame
    /// goes out on the last selected port, clones on the earlier ones.
    fn output_all(&self, frame: Frame, flood: bool) -> Result<(), DpError> {
        let skip = if flood {
            PortConfig::NO_FLOOD
        } else {
            PortConfig::empty()
        };
        let targets: Vec<u16> = self
            .ports
            .reader()
            .ordered()
            .iter()
            .filter(|p| frame.in_port != Some(p.port_no()) && !p.config().intersects(skip))
            .map(|p| p.port_no())
            .collect();

        let Some((&last, rest)) = targets.split_last() else {
            return Ok(());
        };
        for &port_no in rest {
            let _ = self.output(frame.clone(), PortNo(port_no), false);
        }
        self.output(frame, PortNo(last), false)
    }

    // ---- controller escalation -----------------------------------------

    /// Escalates a frame to the controller as a PACKET_IN carrying at most
    /// `max_len` bytes when the packet-buffer pool stashed it, the whole
    /// frame otherwise.
    pub fn output_control(
        &self,
        frame: Frame,
        max_len: usize,
        reason: PacketInReason,
    ) -> Result<(), DpError> {
        let buffer_id = self.pool.save(&frame);
        let fwd_len = match buffer_id {
            Some(_) => frame.len().min(max_len),
            None => frame.len(),
        };
        let pi = PacketIn {
            buffer_id: buffer_id.unwrap_or(types::NO_BUFFER),
            total_len: frame.len().min(usize::from(u16::MAX)) as u16,
            in_port: frame.in_port.unwrap_or(PortNo::LOCAL.0),
            reason,
            data: frame.data()[..fwd_len].to_vec(),
        };
        let mut m = MsgBuf::new(MsgType::PacketIn, 0);
        pi.encode_into(m.body_mut());
        self.sink.multicast(self.dp_idx, m.finish()?)
        // frame dropped here: the pool holds its own copy if any
    }

    // ---- emitters ------------------------------------------------------

    fn send(&self, sender: Option<&Sender>, msg: Vec<u8>) -> Result<(), DpError> {
        match sender {
            Some(s) => self.sink.unicast(self.dp_idx, s, msg),
            None => self.sink.multicast(self.dp_idx, msg),
        }
    }

    /// Features reply: datapath id, buffer-pool capacity, table count,
    /// capability/action bitmaps, then one descriptor per port in attach
    /// order. Built incrementally; the length field is patched at the end.
    pub fn send_features_reply(&self, sender: &Sender) -> Result<(), DpError> {
        let mut m = MsgBuf::new(MsgType::FeaturesReply, sender.xid);
        m.put_u64(self.datapath_id());
        m.put_u32(self.pool.capacity());
        m.put_u8(self.chain.n_tables().min(255) as u8);
        m.put_pad(3);
        m.put_u32(SUPPORTED_CAPABILITIES.bits());
        m.put_u32(SUPPORTED_ACTIONS);
        for port in self.ports.reader().ordered() {
            port.phy_desc().encode_into(m.body_mut());
        }
        self.send(Some(sender), m.finish()?)
    }

    pub fn send_config_reply(&self, sender: &Sender) -> Result<(), DpError> {
        let mut m = MsgBuf::new(MsgType::GetConfigReply, sender.xid);
        self.config().encode_into(m.body_mut());
        self.send(Some(sender), m.finish()?)
    }

    /// Answers a HELLO. A peer speaking an older protocol gets a
    /// HELLO_FAILED/INCOMPATIBLE error and `BadVersion`.
    pub fn send_hello(&self, sender: &Sender, request: &Header, raw: &[u8]) -> Result<(), DpError> {
        if request.version < openflow::OFP_VERSION {
            let note = format!("only version {:#04x} supported", openflow::OFP_VERSION);
            let mut data = raw[..raw.len().min(64)].to_vec();
            data.extend_from_slice(note.as_bytes());
            self.send_error_msg(
                sender,
                ErrorType::HelloFailed,
                types::hello_failed::INCOMPATIBLE,
                &data,
            )?;
            return Err(DpError::BadVersion);
        }
        let m = MsgBuf::new(MsgType::Hello, sender.xid);
        self.send(Some(sender), m.finish()?)
    }

    pub fn send_barrier_reply(&self, sender: &Sender) -> Result<(), DpError> {
        let m = MsgBuf::new(MsgType::BarrierReply, sender.xid);
        self.send(Some(sender), m.finish()?)
    }

    /// Echoes a request body back with the request's transaction id.
    pub fn send_echo_reply(&self, sender: &Sender, body: &[u8]) -> Result<(), DpError> {
        let mut m = MsgBuf::new(MsgType::EchoReply, sender.xid);
        m.put_bytes(body);
        self.send(Some(sender), m.finish()?)
    }

    /// Error report to one sender; `data` conventionally echoes the
    /// offending request.
    pub fn send_error_msg(
        &self,
        sender: &Sender,
        err_type: ErrorType,
        code: u16,
        data: &[u8],
    ) -> Result<(), DpError> {
        let mut m = MsgBuf::new(MsgType::Error, sender.xid);
        ErrorMsg {
            err_type: err_type as u16,
            code,
            data: data.to_vec(),
        }
        .encode_into(m.body_mut());
        self.send(Some(sender), m.finish()?)
    }

    /// Asynchronous port-status notification.
    pub fn send_port_status(&self, port: &Port, reason: PortReason) -> Result<(), DpError> {
        let mut m = MsgBuf::new(MsgType::PortStatus, 0);
        PortStatus {
            reason,
            desc: port.phy_desc(),
        }
        .encode_into(m.body_mut());
        self.send(None, m.finish()?)
    }

    /// Asynchronous flow-removed notification. Emergency flows and flows
    /// without the notify bit are not reported.
    pub fn send_flow_removed(&self, flow: &RemovedFlow) -> Result<(), DpError> {
        if !flow.send_flow_rem || flow.emergency {
            return Ok(());
        }
        let mut m = MsgBuf::new(MsgType::FlowRemoved, 0);
        FlowRemoved {
            flow_match: flow.flow_match,
            priority: flow.priority,
            reason: flow.reason,
            duration_sec: flow.age.as_secs().min(u64::from(u32::MAX)) as u32,
            duration_nsec: flow.age.subsec_nanos(),
            idle_timeout: flow.idle_timeout,
            packet_count: flow.packet_count,
            byte_count: flow.byte_count,
        }
        .encode_into(m.body_mut());
        self.send(None, m.finish()?)
    }

    /// Applies a port-mod. The request's hardware address must still match
    /// the device, guarding against races with interface replacement;
    /// `Invalid` reports a stale address, `NotFound` an unknown port.
    pub fn update_port_flags(&self, pm: &PortMod) -> Result<(), DpError> {
        let port_no = PortNo(pm.port_no);
        let port = if port_no.is_numeric() || port_no == PortNo::LOCAL {
            self.lookup_port(port_no).ok_or(DpError::NotFound)?
        } else {
            return Err(DpError::NotFound);
        };
        if !port.hw_addr_matches(pm) {
            return Err(DpError::Invalid);
        }
        port.apply_config(pm.config, pm.mask);
        Ok(())
    }
}

impl std::fmt::Debug for Datapath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datapath")
            .field("dp_idx", &self.dp_idx)
            .field("name", &self.name())
            .field("ports", &self.ports.reader().len())
            .finish()
    }
}
