// SPDX-License-Identifier: Apache-2.0

//! Wire-level exercises of the management plane: envelope dispatch,
//! request/reply framing, multi-part statistics, and the notification
//! group binding.

use datapath::test_utils::{FakeIface, FakePool, FakeProvider, FlowSpec, TestPipelineFactory, frames};
use datapath::{ControlSink, DpConfig, DpError, DpRegistry, Mac};
use mgmt::envelope::{Envelope, OpCode};
use mgmt::stats::StatsEngine;
use mgmt::transport::{ControlTransport, EnvelopeSink, PeerMeta};
use mgmt::{Dispatcher, Reply, SwitchDesc};
use openflow::flow_match::FlowMatch;
use openflow::messages::{FeaturesReply, PacketOut, PortMod, SwitchConfig};
use openflow::stats::{
    AggregateStats, DescStats, FlowStats, FlowStatsRequest, PortStats, PortStatsRequest,
    TableStats,
};
use openflow::types::{
    self, MsgType, PortConfig, PortNo, STATS_REPLY_MORE, StatsType, TABLE_ALL,
};
use openflow::{Action, Header, MsgBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing_test::traced_test;

// ---- transport fake ----------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Dest {
    Peer(u32),
    Group(u32),
}

#[derive(Debug, Clone)]
struct Delivery {
    dest: Dest,
    env: Envelope,
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Delivery>>,
}

impl RecordingTransport {
    fn all(&self) -> Vec<Delivery> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn clear(&self) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// OpenFlow payloads of one message type, with their destinations.
    fn of_type(&self, ty: MsgType) -> Vec<(Dest, Vec<u8>)> {
        self.all()
            .iter()
            .filter_map(|d| {
                let payload = d.env.openflow.clone()?;
                (payload.get(1) == Some(&(ty as u8))).then(|| (d.dest.clone(), payload))
            })
            .collect()
    }
}

impl ControlTransport for RecordingTransport {
    fn unicast(&self, peer: u32, _seq: u32, env: &Envelope) -> Result<(), DpError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Delivery {
                dest: Dest::Peer(peer),
                env: env.clone(),
            });
        Ok(())
    }

    fn multicast(&self, group: u32, env: &Envelope) -> Result<(), DpError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Delivery {
                dest: Dest::Group(group),
                env: env.clone(),
            });
        Ok(())
    }
}

// ---- harness -----------------------------------------------------------

struct Harness {
    registry: Arc<DpRegistry>,
    provider: Arc<FakeProvider>,
    pipelines: Arc<TestPipelineFactory>,
    transport: Arc<RecordingTransport>,
    dispatcher: Dispatcher,
}

fn harness() -> Harness {
    let provider = FakeProvider::new();
    let pool = FakePool::new();
    let pipelines = TestPipelineFactory::new();
    let transport = Arc::new(RecordingTransport::default());
    let sink: Arc<dyn ControlSink> = EnvelopeSink::new(transport.clone());
    let registry = DpRegistry::new(
        provider.clone(),
        pipelines.clone(),
        pool,
        sink.clone(),
        DpConfig::default(),
    );
    let dispatcher = Dispatcher::new(
        registry.clone(),
        sink,
        StatsEngine::new(SwitchDesc::default()),
    );
    Harness {
        registry,
        provider,
        pipelines,
        transport,
        dispatcher,
    }
}

fn admin() -> PeerMeta {
    PeerMeta {
        peer: 42,
        seq: 7,
        privileged: true,
    }
}

fn of_request(dp_idx: u32, payload: Vec<u8>) -> Envelope {
    Envelope::request(OpCode::Openflow)
        .with_dp_idx(dp_idx)
        .with_openflow(payload)
}

fn bare_msg(ty: MsgType, xid: u32) -> Vec<u8> {
    MsgBuf::new(ty, xid).finish().unwrap()
}

fn stats_request(ty: StatsType, xid: u32, body: &[u8]) -> Vec<u8> {
    let mut m = MsgBuf::new(MsgType::StatsRequest, xid);
    m.put_u16(ty as u16);
    m.put_u16(0);
    m.put_bytes(body);
    m.finish().unwrap()
}

fn all_flows_body() -> Vec<u8> {
    let mut body = Vec::new();
    FlowStatsRequest {
        flow_match: FlowMatch::default(),
        table_id: TABLE_ALL,
        out_port: PortNo::NONE.0,
    }
    .encode_into(&mut body);
    body
}

/// Creates dp 0 with `n` attached veth ports through the dispatcher.
fn build_dp(h: &Harness, n: u16) {
    let req = Envelope::request(OpCode::AddDp).with_dp_idx(0);
    assert!(matches!(h.dispatcher.handle(&req, &admin()), Ok(Reply::None)));
    for i in 1..=n {
        let name = format!("veth{i}");
        h.provider
            .add(FakeIface::with_mac(&name, Mac([2, 0, 0, 0, 2, i as u8])));
        let req = Envelope::request(OpCode::AddPort)
            .with_dp_idx(0)
            .with_port_name(&name);
        assert!(matches!(h.dispatcher.handle(&req, &admin()), Ok(Reply::None)));
    }
    h.transport.clear();
}

/// Runs a statistics request to completion, returning the reply payloads.
fn run_stats(h: &Harness, ty: StatsType, body: &[u8]) -> Vec<Vec<u8>> {
    let reply = h
        .dispatcher
        .handle(&of_request(0, stats_request(ty, 0x11, body)), &admin())
        .unwrap();
    let Reply::Stats(mut session) = reply else {
        panic!("expected a stats session");
    };
    h.transport.clear();
    h.dispatcher.drive_stats(&mut session).unwrap();
    h.transport
        .of_type(MsgType::StatsReply)
        .into_iter()
        .map(|(_, payload)| payload)
        .collect()
}

/// (flags, body) of one stats reply payload.
fn stats_reply_parts(payload: &[u8]) -> (u16, Vec<u8>) {
    let header = Header::decode(payload).unwrap();
    let body = header.body(payload);
    let flags = u16::from_be_bytes([body[2], body[3]]);
    (flags, body[4..].to_vec())
}

// ---- admin operations --------------------------------------------------

#[test]
fn admin_ops_require_privilege() {
    let h = harness();
    let req = Envelope::request(OpCode::AddDp).with_dp_idx(0);
    let unprivileged = PeerMeta {
        peer: 1,
        seq: 1,
        privileged: false,
    };
    assert!(matches!(
        h.dispatcher.handle(&req, &unprivileged),
        Err(DpError::Denied)
    ));
    assert!(h.registry.get(0).is_none());
}

#[test]
fn add_query_del_datapath() {
    let h = harness();
    build_dp(&h, 0);

    let reply = h
        .dispatcher
        .handle(&Envelope::request(OpCode::QueryDp).with_dp_idx(0), &admin())
        .unwrap();
    let Reply::Envelope(env) = reply else {
        panic!("expected an envelope reply");
    };
    assert_eq!(env.op, Some(OpCode::QueryDp));
    assert_eq!(env.dp_idx, Some(0));
    assert_eq!(env.dp_name.as_deref(), Some("of0"));
    assert_eq!(env.mc_group, Some(0));

    h.dispatcher
        .handle(&Envelope::request(OpCode::DelDp).with_dp_name("of0"), &admin())
        .unwrap();
    assert!(h.registry.get(0).is_none());
}

#[test]
fn port_ops_validate_attributes() {
    let h = harness();
    build_dp(&h, 1);

    // missing port name
    assert!(matches!(
        h.dispatcher
            .handle(&Envelope::request(OpCode::AddPort).with_dp_idx(0), &admin()),
        Err(DpError::Invalid)
    ));

    let req = Envelope::request(OpCode::DelPort)
        .with_dp_idx(0)
        .with_port_name("veth1");
    assert!(matches!(h.dispatcher.handle(&req, &admin()), Ok(Reply::None)));
    assert!(h.registry.get(0).unwrap().lookup_port(PortNo(1)).is_none());
}

// ---- request/reply framing ---------------------------------------------

#[test]
#[traced_test]
fn features_round_trip_over_the_wire() {
    let h = harness();
    build_dp(&h, 1);

    h.dispatcher
        .handle(
            &of_request(0, bare_msg(MsgType::FeaturesRequest, 0xfeed)),
            &admin(),
        )
        .unwrap();

    let sent = h.transport.of_type(MsgType::FeaturesReply);
    assert_eq!(sent.len(), 1);
    let (dest, payload) = &sent[0];
    assert_eq!(*dest, Dest::Peer(42), "reply is unicast to the requester");

    let header = Header::decode(payload).unwrap();
    assert_eq!(header.xid, 0xfeed, "reply echoes the request xid");
    let reply = FeaturesReply::decode(header.body(payload)).unwrap();
    assert_eq!(reply.datapath_id, 0x0000_0200_0000_0001);
    assert_eq!(reply.ports.len(), 2);
}

#[test]
fn config_set_then_get_round_trips() {
    let h = harness();
    build_dp(&h, 0);

    let mut m = MsgBuf::new(MsgType::SetConfig, 1);
    SwitchConfig {
        flags: 0x0001,
        miss_send_len: 96,
    }
    .encode_into(m.body_mut());
    h.dispatcher
        .handle(&of_request(0, m.finish().unwrap()), &admin())
        .unwrap();

    h.dispatcher
        .handle(&of_request(0, bare_msg(MsgType::GetConfigRequest, 2)), &admin())
        .unwrap();
    let sent = h.transport.of_type(MsgType::GetConfigReply);
    let header = Header::decode(&sent[0].1).unwrap();
    let config = SwitchConfig::decode(header.body(&sent[0].1)).unwrap();
    assert_eq!(config.flags, 0x0001);
    assert_eq!(config.miss_send_len, 96);
}

#[test]
fn echo_and_barrier_order() {
    let h = harness();
    build_dp(&h, 0);

    let mut m = MsgBuf::new(MsgType::EchoRequest, 5);
    m.put_bytes(b"probe");
    h.dispatcher
        .handle(&of_request(0, m.finish().unwrap()), &admin())
        .unwrap();
    h.dispatcher
        .handle(&of_request(0, bare_msg(MsgType::BarrierRequest, 6)), &admin())
        .unwrap();

    // the barrier reply comes after the echo reply it fences
    let deliveries = h.transport.all();
    let types: Vec<u8> = deliveries
        .iter()
        .filter_map(|d| d.env.openflow.as_ref().map(|p| p[1]))
        .collect();
    assert_eq!(
        types,
        vec![MsgType::EchoReply as u8, MsgType::BarrierReply as u8]
    );

    let echoes = h.transport.of_type(MsgType::EchoReply);
    let header = Header::decode(&echoes[0].1).unwrap();
    assert_eq!(header.xid, 5);
    assert_eq!(header.body(&echoes[0].1), b"probe");
}

#[test]
fn old_version_is_rejected() {
    let h = harness();
    build_dp(&h, 0);

    // HELLO with version 0
    let mut hello = bare_msg(MsgType::Hello, 9);
    hello[0] = 0x00;
    assert!(matches!(
        h.dispatcher.handle(&of_request(0, hello), &admin()),
        Err(DpError::BadVersion)
    ));
    let errors = h.transport.of_type(MsgType::Error);
    assert_eq!(errors.len(), 1);

    // any other message with a mismatched version
    h.transport.clear();
    let mut req = bare_msg(MsgType::FeaturesRequest, 10);
    req[0] = 0x97;
    assert!(matches!(
        h.dispatcher.handle(&of_request(0, req), &admin()),
        Err(DpError::BadVersion)
    ));
    assert_eq!(h.transport.of_type(MsgType::Error).len(), 1);
}

#[test]
fn port_mod_stale_mac_reports_bad_hw_addr() {
    let h = harness();
    build_dp(&h, 1);
    let dp = h.registry.get(0).unwrap();
    let before = dp.lookup_port(PortNo(1)).unwrap().config();

    let mut m = MsgBuf::new(MsgType::PortMod, 3);
    PortMod {
        port_no: 1,
        hw_addr: [0xde, 0xad, 0, 0, 0, 1],
        config: PortConfig::empty(),
        mask: PortConfig::NO_FWD,
        advertise: 0,
    }
    .encode_into(m.body_mut());
    h.dispatcher
        .handle(&of_request(0, m.finish().unwrap()), &admin())
        .unwrap();

    assert_eq!(dp.lookup_port(PortNo(1)).unwrap().config(), before);
    let errors = h.transport.of_type(MsgType::Error);
    assert_eq!(errors.len(), 1);
    let em =
        openflow::messages::ErrorMsg::decode(Header::decode(&errors[0].1).unwrap().body(&errors[0].1))
            .unwrap();
    assert_eq!(em.err_type, 4); // PORT_MOD_FAILED
    assert_eq!(em.code, 1); // BAD_HW_ADDR
}

#[test]
fn packet_out_executes_through_the_pipeline() {
    let h = harness();
    build_dp(&h, 2);

    let frame = frames::broadcast(Mac([2, 0, 0, 0, 2, 9]), 60);
    let mut m = MsgBuf::new(MsgType::PacketOut, 4);
    PacketOut {
        buffer_id: types::NO_BUFFER,
        in_port: PortNo::NONE.0,
        actions: vec![Action::Output {
            port: PortNo(1),
            max_len: 0,
        }],
        data: frame.data().to_vec(),
    }
    .encode_into(m.body_mut());
    h.dispatcher
        .handle(&of_request(0, m.finish().unwrap()), &admin())
        .unwrap();
    assert_eq!(h.provider.get("veth1").unwrap().tx_count(), 1);

    // a numeric output naming the declared ingress is refused downstream
    let mut m = MsgBuf::new(MsgType::PacketOut, 5);
    PacketOut {
        buffer_id: types::NO_BUFFER,
        in_port: 2,
        actions: vec![Action::Output {
            port: PortNo(2),
            max_len: 0,
        }],
        data: frame.data().to_vec(),
    }
    .encode_into(m.body_mut());
    h.dispatcher
        .handle(&of_request(0, m.finish().unwrap()), &admin())
        .unwrap();
    assert_eq!(h.provider.get("veth2").unwrap().tx_count(), 0);
}

#[test]
fn notifications_ride_the_group_of_the_datapath() {
    let h = harness();
    // dp 5 hashes to group 5
    let req = Envelope::request(OpCode::AddDp).with_dp_idx(5);
    h.dispatcher.handle(&req, &admin()).unwrap();
    h.provider.add(FakeIface::named("vethg"));
    h.transport.clear();
    let req = Envelope::request(OpCode::AddPort)
        .with_dp_idx(5)
        .with_port_name("vethg");
    h.dispatcher.handle(&req, &admin()).unwrap();

    let sent = h.transport.of_type(MsgType::PortStatus);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, Dest::Group(5));
    assert_eq!(h.transport.all()[0].env.dp_idx, Some(5));
}

// ---- statistics --------------------------------------------------------

#[test]
fn desc_stats_single_fragment() {
    let h = harness();
    build_dp(&h, 0);

    let fragments = run_stats(&h, StatsType::Desc, &[]);
    assert_eq!(fragments.len(), 1);
    let (flags, body) = stats_reply_parts(&fragments[0]);
    assert_eq!(flags, 0);
    let desc = DescStats::decode(&body).unwrap();
    assert_eq!(desc.mfr_desc, "ofdp");
    assert_eq!(desc.hw_desc, "Reference Userspace Switch");
    assert_eq!(desc.serial_num, "None");
    assert!(desc.dp_desc.contains("idx=0"));
}

#[test]
#[traced_test]
fn flow_stats_fragment_and_agree_with_aggregate() {
    let h = harness();
    build_dp(&h, 1);
    let pipeline = h.pipelines.pipeline(0).unwrap();
    const N: usize = 60;
    for i in 0..N {
        pipeline.install(FlowSpec {
            priority: i as u16,
            actions: vec![Action::Output {
                port: PortNo(1),
                max_len: 0,
            }],
            ..FlowSpec::default()
        });
    }

    let fragments = run_stats(&h, StatsType::Flow, &all_flows_body());
    assert!(fragments.len() > 1, "dump spans multiple fragments");
    let mut records = Vec::new();
    for (i, frag) in fragments.iter().enumerate() {
        let (flags, body) = stats_reply_parts(frag);
        let last = i == fragments.len() - 1;
        assert_eq!(flags != 0, !last, "MORE on all but the final fragment");
        assert_eq!(flags & STATS_REPLY_MORE != 0, !last);
        records.extend(FlowStats::decode_list(&body).unwrap());
    }
    assert_eq!(records.len(), N);

    // law: aggregate flow_count equals the per-flow record count
    let fragments = run_stats(&h, StatsType::Aggregate, &all_flows_body());
    assert_eq!(fragments.len(), 1);
    let (_, body) = stats_reply_parts(&fragments[0]);
    let agg = AggregateStats::decode(&body).unwrap();
    assert_eq!(agg.flow_count as usize, N);
    assert_eq!(agg.packet_count, 0);
}

#[test]
fn flow_stats_counts_traffic() {
    let h = harness();
    build_dp(&h, 2);
    let pipeline = h.pipelines.pipeline(0).unwrap();
    pipeline.install(FlowSpec {
        actions: vec![Action::Output {
            port: PortNo(2),
            max_len: 0,
        }],
        ..FlowSpec::default()
    });
    let dp = h.registry.get(0).unwrap();
    dp.port_input(frames::broadcast(Mac([2, 0, 0, 0, 2, 1]), 80), 1);
    dp.port_input(frames::broadcast(Mac([2, 0, 0, 0, 2, 1]), 80), 1);

    let fragments = run_stats(&h, StatsType::Flow, &all_flows_body());
    let (_, body) = stats_reply_parts(&fragments[0]);
    let records = FlowStats::decode_list(&body).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].packet_count, 2);
    assert_eq!(records[0].byte_count, 160);
    assert_eq!(
        records[0].actions,
        vec![Action::Output {
            port: PortNo(2),
            max_len: 0
        }]
    );
}

#[test]
#[traced_test]
fn dump_aborts_when_datapath_disappears() {
    let h = harness();
    build_dp(&h, 0);
    let pipeline = h.pipelines.pipeline(0).unwrap();
    for i in 0..60 {
        pipeline.install(FlowSpec {
            priority: i,
            ..FlowSpec::default()
        });
    }

    let reply = h
        .dispatcher
        .handle(
            &of_request(0, stats_request(StatsType::Flow, 1, &all_flows_body())),
            &admin(),
        )
        .unwrap();
    let Reply::Stats(mut session) = reply else {
        panic!("expected a stats session");
    };
    let first = session.next_fragment(&h.registry).unwrap().unwrap();
    let (flags, _) = stats_reply_parts(&first);
    assert_ne!(flags & STATS_REPLY_MORE, 0);

    h.registry.destroy(Some(0), None).unwrap();
    assert_eq!(
        session.next_fragment(&h.registry),
        Some(Err(DpError::NotFound))
    );
    assert!(session.next_fragment(&h.registry).is_none());
}

#[test]
fn table_stats_reflect_lookups() {
    let h = harness();
    build_dp(&h, 1);
    let dp = h.registry.get(0).unwrap();
    // one miss
    dp.port_input(frames::broadcast(Mac([2, 0, 0, 0, 2, 1]), 60), 1);
    h.transport.clear();

    let fragments = run_stats(&h, StatsType::Table, &[]);
    let (_, body) = stats_reply_parts(&fragments[0]);
    let ts = TableStats::decode(&body).unwrap();
    assert_eq!(ts.table_id, 0);
    assert_eq!(ts.name, "linear");
    assert_eq!(ts.active_count, 0);
    assert_eq!(ts.lookup_count, 1);
    assert_eq!(ts.matched_count, 0);
}

#[test]
fn port_stats_walk_and_single() {
    let h = harness();
    build_dp(&h, 2);
    h.provider.get("veth1").unwrap().set_stats(datapath::iface::IfaceStats {
        rx_packets: 11,
        rx_bytes: 1100,
        ..Default::default()
    });

    // NONE walks every port: numeric first, local last
    let mut body = Vec::new();
    PortStatsRequest {
        port_no: PortNo::NONE.0,
    }
    .encode_into(&mut body);
    let fragments = run_stats(&h, StatsType::Port, &body);
    let (_, reply) = stats_reply_parts(&fragments[0]);
    let records = PortStats::decode_list(&reply).unwrap();
    let ports: Vec<u16> = records.iter().map(|r| r.port_no).collect();
    assert_eq!(ports, vec![1, 2, PortNo::LOCAL.0]);
    assert_eq!(records[0].rx_packets, 11);

    // a single-port query
    let mut body = Vec::new();
    PortStatsRequest { port_no: 2 }.encode_into(&mut body);
    let fragments = run_stats(&h, StatsType::Port, &body);
    let (_, reply) = stats_reply_parts(&fragments[0]);
    let records = PortStats::decode_list(&reply).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].port_no, 2);
}

#[test]
fn flow_stats_honor_out_port_and_emergency_selectors() {
    let h = harness();
    build_dp(&h, 2);
    let pipeline = h.pipelines.pipeline(0).unwrap();
    pipeline.install(FlowSpec {
        priority: 1,
        actions: vec![Action::Output {
            port: PortNo(1),
            max_len: 0,
        }],
        ..FlowSpec::default()
    });
    pipeline.install(FlowSpec {
        priority: 2,
        actions: vec![Action::Output {
            port: PortNo(2),
            max_len: 0,
        }],
        ..FlowSpec::default()
    });
    pipeline.install(FlowSpec {
        priority: 3,
        emergency: true,
        ..FlowSpec::default()
    });

    // out-port filter selects the one flow steering to port 2
    let mut body = Vec::new();
    FlowStatsRequest {
        flow_match: FlowMatch::default(),
        table_id: TABLE_ALL,
        out_port: 2,
    }
    .encode_into(&mut body);
    let fragments = run_stats(&h, StatsType::Flow, &body);
    let (_, reply) = stats_reply_parts(&fragments[0]);
    let records = FlowStats::decode_list(&reply).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].priority, 2);

    // the regular walk skips emergency flows...
    let fragments = run_stats(&h, StatsType::Flow, &all_flows_body());
    let (_, reply) = stats_reply_parts(&fragments[0]);
    assert_eq!(FlowStats::decode_list(&reply).unwrap().len(), 2);

    // ...which only the emergency sentinel reaches
    let mut body = Vec::new();
    FlowStatsRequest {
        flow_match: FlowMatch::default(),
        table_id: types::TABLE_EMERG,
        out_port: PortNo::NONE.0,
    }
    .encode_into(&mut body);
    let fragments = run_stats(&h, StatsType::Flow, &body);
    let (_, reply) = stats_reply_parts(&fragments[0]);
    let records = FlowStats::decode_list(&reply).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].priority, 3);
}

#[test]
fn oversized_flow_record_aborts_instead_of_livelocking() {
    let h = harness();
    build_dp(&h, 0);
    let pipeline = h.pipelines.pipeline(0).unwrap();
    // a single record bigger than any reply fragment
    pipeline.install(FlowSpec {
        actions: vec![
            Action::Output {
                port: PortNo(1),
                max_len: 0
            };
            600
        ],
        ..FlowSpec::default()
    });

    let reply = h
        .dispatcher
        .handle(
            &of_request(0, stats_request(StatsType::Flow, 2, &all_flows_body())),
            &admin(),
        )
        .unwrap();
    let Reply::Stats(mut session) = reply else {
        panic!("expected a stats session");
    };
    assert_eq!(
        session.next_fragment(&h.registry),
        Some(Err(DpError::OutOfMemory))
    );
    assert!(session.next_fragment(&h.registry).is_none());
}

#[test]
fn unknown_stats_type_is_bad_stat() {
    let h = harness();
    build_dp(&h, 0);

    let mut m = MsgBuf::new(MsgType::StatsRequest, 8);
    m.put_u16(99);
    m.put_u16(0);
    assert!(matches!(
        h.dispatcher
            .handle(&of_request(0, m.finish().unwrap()), &admin()),
        Err(DpError::BadStat)
    ));
    let errors = h.transport.of_type(MsgType::Error);
    assert_eq!(errors.len(), 1);
    let em = openflow::messages::ErrorMsg::decode(
        Header::decode(&errors[0].1).unwrap().body(&errors[0].1),
    )
    .unwrap();
    assert_eq!(em.err_type, 1); // BAD_REQUEST
    assert_eq!(em.code, 2); // BAD_STAT
}

#[test]
fn vendor_stats_demultiplex_on_registration() {
    use mgmt::stats::{DumpStatus, StatsDumper, VendorStatsFactory};

    struct Echo;
    impl StatsDumper for Echo {
        fn dump(
            &mut self,
            _dp: &Arc<datapath::Datapath>,
            buf: &mut Vec<u8>,
            _cap: usize,
        ) -> Result<DumpStatus, DpError> {
            buf.extend_from_slice(b"vendor-ok");
            Ok(DumpStatus::Done)
        }
    }
    struct EchoFactory;
    impl VendorStatsFactory for EchoFactory {
        fn init(
            &self,
            _dp: &Arc<datapath::Datapath>,
            _body: &[u8],
        ) -> Result<Box<dyn StatsDumper>, DpError> {
            Ok(Box::new(Echo))
        }
    }

    let h = harness();
    build_dp(&h, 0);
    h.dispatcher
        .stats_engine()
        .vendors()
        .register(0x002320, Arc::new(EchoFactory));

    // vendor id + 4 bytes of subtype
    let mut body = 0x002320u32.to_be_bytes().to_vec();
    body.extend_from_slice(&[0, 0, 0, 1]);
    let fragments = run_stats(&h, StatsType::Vendor, &body);
    let (_, reply) = stats_reply_parts(&fragments[0]);
    assert_eq!(reply, b"vendor-ok");

    // unregistered vendor
    let mut body = 0x00aabbu32.to_be_bytes().to_vec();
    body.extend_from_slice(&[0, 0, 0, 1]);
    assert!(matches!(
        h.dispatcher.handle(
            &of_request(0, stats_request(StatsType::Vendor, 9, &body)),
            &admin()
        ),
        Err(DpError::Invalid)
    ));
}
