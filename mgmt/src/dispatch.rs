// SPDX-License-Identifier: Apache-2.0

//! The request dispatcher: routes control-channel envelopes to the
//! registry, answers the OpenFlow messages the core owns, opens
//! statistics sessions, and forwards the rest to the flow pipeline.

use crate::envelope::{Envelope, OpCode};
use crate::stats::{StatsEngine, StatsSession};
use crate::transport::{PeerMeta, mc_group};
use datapath::{ControlSink, Datapath, DpError, DpRegistry, Sender};
use openflow::messages::{PortMod, SwitchConfig};
use openflow::types::{ErrorType, MsgType, bad_request, port_mod_failed};
use openflow::{HEADER_LEN, Header, OFP_VERSION};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a handled request produced, beyond its side effects.
pub enum Reply {
    /// Nothing to send back; the transport acknowledges per its own rules.
    None,
    /// A single envelope reply (QUERY_DP).
    Envelope(Envelope),
    /// A statistics dump to be driven fragment by fragment.
    Stats(StatsSession),
}

/// Routes inbound requests. One dispatcher per control channel; requests
/// are handled in submission order, which is what makes barriers a
/// no-op fence.
pub struct Dispatcher {
    registry: Arc<DpRegistry>,
    sink: Arc<dyn ControlSink>,
    stats: StatsEngine,
}

impl Dispatcher {
    pub fn new(registry: Arc<DpRegistry>, sink: Arc<dyn ControlSink>, stats: StatsEngine) -> Self {
        Self {
            registry,
            sink,
            stats,
        }
    }

    #[must_use]
    pub fn stats_engine(&self) -> &StatsEngine {
        &self.stats
    }

    /// Handles one request. Every operation requires the administrative
    /// credential; errors bubble to the transport's acknowledgement, and
    /// OpenFlow-level errors have already been reported to the sender as
    /// error messages where the protocol calls for them.
    pub fn handle(&self, env: &Envelope, peer: &PeerMeta) -> Result<Reply, DpError> {
        if !peer.privileged {
            return Err(DpError::Denied);
        }
        match env.op {
            Some(OpCode::AddDp) => {
                self.registry.create(env.dp_idx, env.dp_name.as_deref())?;
                Ok(Reply::None)
            }
            Some(OpCode::DelDp) => {
                self.registry.destroy(env.dp_idx, env.dp_name.as_deref())?;
                Ok(Reply::None)
            }
            Some(OpCode::QueryDp) => {
                let dp = self.registry.lookup(env.dp_idx, env.dp_name.as_deref())?;
                let mut reply = Envelope::request(OpCode::QueryDp)
                    .with_dp_idx(dp.dp_idx())
                    .with_dp_name(dp.name());
                reply.mc_group = Some(mc_group(dp.dp_idx()));
                Ok(Reply::Envelope(reply))
            }
            Some(OpCode::AddPort) => {
                let port_name = env.port_name.as_deref().ok_or(DpError::Invalid)?;
                self.registry
                    .add_port(env.dp_idx, env.dp_name.as_deref(), port_name)?;
                Ok(Reply::None)
            }
            Some(OpCode::DelPort) => {
                let port_name = env.port_name.as_deref().ok_or(DpError::Invalid)?;
                self.registry
                    .del_port(env.dp_idx, env.dp_name.as_deref(), port_name)?;
                Ok(Reply::None)
            }
            Some(OpCode::Openflow) => {
                let dp_idx = env.dp_idx.ok_or(DpError::Invalid)?;
                let payload = env.openflow.as_deref().ok_or(DpError::Invalid)?;
                self.handle_openflow(dp_idx, payload, peer)
            }
            None => Err(DpError::Invalid),
        }
    }

    /// The OPENFLOW path: header validation, sender construction, then
    /// per-type routing under the control mutex.
    fn handle_openflow(
        &self,
        dp_idx: u32,
        payload: &[u8],
        peer: &PeerMeta,
    ) -> Result<Reply, DpError> {
        if payload.len() < HEADER_LEN {
            return Err(DpError::Invalid);
        }
        let dp = self.registry.get(dp_idx).ok_or(DpError::NotFound)?;
        let header = Header::decode(payload).map_err(|e| {
            debug!(dp = dp_idx, error = %e, "malformed openflow header");
            DpError::Invalid
        })?;
        let sender = peer.sender(header.xid);

        let _guard = self.registry.lock_control();

        // version negotiation happens through HELLO; everything else on a
        // mismatched version is a bad request
        if header.msg_type == MsgType::Hello as u8 {
            dp.send_hello(&sender, &header, payload)?;
            return Ok(Reply::None);
        }
        if header.version != OFP_VERSION {
            self.drop_reply(
                &dp,
                &sender,
                ErrorType::BadRequest,
                bad_request::BAD_VERSION,
                payload,
            );
            return Err(DpError::BadVersion);
        }

        match MsgType::from_raw(header.msg_type) {
            Some(MsgType::EchoRequest) => {
                dp.send_echo_reply(&sender, header.body(payload))?;
            }
            Some(MsgType::FeaturesRequest) => {
                dp.send_features_reply(&sender)?;
            }
            Some(MsgType::GetConfigRequest) => {
                dp.send_config_reply(&sender)?;
            }
            Some(MsgType::SetConfig) => {
                let config = SwitchConfig::decode(header.body(payload))?;
                dp.set_config(config);
            }
            Some(MsgType::BarrierRequest) => {
                // all earlier requests on this channel have completed by
                // construction: processing is serial
                dp.send_barrier_reply(&sender)?;
            }
            Some(MsgType::PortMod) => {
                let pm = PortMod::decode(header.body(payload))?;
                match dp.update_port_flags(&pm) {
                    Ok(()) => {}
                    Err(DpError::Invalid) => {
                        // stale hardware address: nothing applied
                        self.drop_reply(
                            &dp,
                            &sender,
                            ErrorType::PortModFailed,
                            port_mod_failed::BAD_HW_ADDR,
                            payload,
                        );
                    }
                    Err(DpError::NotFound) => {
                        self.drop_reply(
                            &dp,
                            &sender,
                            ErrorType::PortModFailed,
                            port_mod_failed::BAD_PORT,
                            payload,
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
            Some(MsgType::StatsRequest) => {
                let req = openflow::stats::StatsRequest::decode(header.body(payload))?;
                match self.stats.init_dump(&dp, req.stats_type, &req.body) {
                    Ok(dumper) => {
                        return Ok(Reply::Stats(StatsSession::new(
                            dp_idx,
                            req.stats_type,
                            sender,
                            dumper,
                        )));
                    }
                    Err(DpError::BadStat) => {
                        self.drop_reply(
                            &dp,
                            &sender,
                            ErrorType::BadRequest,
                            bad_request::BAD_STAT,
                            payload,
                        );
                        return Err(DpError::BadStat);
                    }
                    Err(e) => return Err(e),
                }
            }
            // flow-mod, packet-out, vendor and anything unknown belong to
            // the pipeline
            _ => {
                dp.chain().handle_message(&dp, &sender, payload)?;
            }
        }
        Ok(Reply::None)
    }

    /// Reports an OpenFlow error to the sender, tolerating sink failure
    /// (the transport-level error code still reaches the peer).
    fn drop_reply(
        &self,
        dp: &Arc<Datapath>,
        sender: &Sender,
        err_type: ErrorType,
        code: u16,
        request: &[u8],
    ) {
        if let Err(e) = dp.send_error_msg(sender, err_type, code, request) {
            warn!(dp = dp.dp_idx(), error = %e, "error message dropped");
        }
    }

    /// Drives a statistics session to completion, unicasting each
    /// fragment through the control sink.
    pub fn drive_stats(&self, session: &mut StatsSession) -> Result<(), DpError> {
        let sender = session.sender();
        while let Some(fragment) = session.next_fragment(&self.registry) {
            let msg = fragment?;
            self.sink.unicast(session.dp_idx(), &sender, msg)?;
        }
        Ok(())
    }
}
