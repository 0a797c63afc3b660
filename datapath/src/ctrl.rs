// SPDX-License-Identifier: Apache-2.0

//! The outbound edge of the control channel, as seen from the core.

use crate::error::DpError;

/// Identity of one controller request, kept for reply correlation.
/// Asynchronous notifications carry no sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sender {
    /// Transport peer the request came from.
    pub peer: u32,
    /// Transport-level sequence number of the request.
    pub seq: u32,
    /// OpenFlow transaction id of the request.
    pub xid: u32,
}

/// Where finished OpenFlow messages go. The management plane wraps them
/// in the control-channel envelope and delivers them; implementations
/// must not block, and a failed notification is simply dropped by the
/// caller.
pub trait ControlSink: Send + Sync {
    /// Replies to a specific request.
    fn unicast(&self, dp_idx: u32, sender: &Sender, msg: Vec<u8>) -> Result<(), DpError>;

    /// Publishes a notification on the datapath's notification group.
    fn multicast(&self, dp_idx: u32, msg: Vec<u8>) -> Result<(), DpError>;
}
