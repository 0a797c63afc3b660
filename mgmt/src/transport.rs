// SPDX-License-Identifier: Apache-2.0

//! The transport seam of the control channel and the envelope-wrapping
//! sink the datapath core emits through.
//!
//! Notification groups are pre-allocated: sixteen groups named
//! `openflow0`..`openflow15`, each datapath bound to one by hashing its
//! index. Listeners filter on the DP_IDX attribute of the envelope.

use crate::envelope::{Envelope, OpCode};
use datapath::{ControlSink, DpError, Sender};
use std::sync::Arc;

/// Number of pre-allocated notification groups; a power of two.
pub const N_MC_GROUPS: u32 = 16;

/// The notification group a datapath is bound to.
#[must_use]
pub fn mc_group(dp_idx: u32) -> u32 {
    dp_idx & (N_MC_GROUPS - 1)
}

/// Conventional name of a notification group.
#[must_use]
pub fn mc_group_name(group: u32) -> String {
    format!("openflow{group}")
}

/// Transport metadata of one inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerMeta {
    pub peer: u32,
    pub seq: u32,
    /// The transport vouches that the peer holds the administrative
    /// credential.
    pub privileged: bool,
}

impl PeerMeta {
    #[must_use]
    pub fn sender(&self, xid: u32) -> Sender {
        Sender {
            peer: self.peer,
            seq: self.seq,
            xid,
        }
    }
}

/// The datagram transport under the control channel. Deliveries must not
/// block; on resource exhaustion they fail immediately and the caller
/// drops the message.
pub trait ControlTransport: Send + Sync {
    fn unicast(&self, peer: u32, seq: u32, env: &Envelope) -> Result<(), DpError>;
    fn multicast(&self, group: u32, env: &Envelope) -> Result<(), DpError>;
}

/// Wraps finished OpenFlow messages in OPENFLOW envelopes and hands them
/// to the transport: unicast when a sender is known, group multicast for
/// notifications.
pub struct EnvelopeSink {
    transport: Arc<dyn ControlTransport>,
}

impl EnvelopeSink {
    pub fn new(transport: Arc<dyn ControlTransport>) -> Arc<Self> {
        Arc::new(Self { transport })
    }

    fn envelope(dp_idx: u32, msg: Vec<u8>) -> Envelope {
        Envelope::request(OpCode::Openflow)
            .with_dp_idx(dp_idx)
            .with_openflow(msg)
    }
}

impl ControlSink for EnvelopeSink {
    fn unicast(&self, dp_idx: u32, sender: &Sender, msg: Vec<u8>) -> Result<(), DpError> {
        self.transport
            .unicast(sender.peer, sender.seq, &Self::envelope(dp_idx, msg))
    }

    fn multicast(&self, dp_idx: u32, msg: Vec<u8>) -> Result<(), DpError> {
        self.transport
            .multicast(mc_group(dp_idx), &Self::envelope(dp_idx, msg))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn group_binding_hashes_the_index() {
        assert_eq!(mc_group(0), 0);
        assert_eq!(mc_group(5), 5);
        assert_eq!(mc_group(16), 0);
        assert_eq!(mc_group(255), 15);
        assert_eq!(mc_group_name(3), "openflow3");
    }
}
