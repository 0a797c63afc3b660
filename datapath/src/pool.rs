// SPDX-License-Identifier: Apache-2.0

//! The seam to the packet-buffer pool used for controller escalation.

use crate::eth::Frame;

/// Stash for packets escalated to the controller, keyed by a 32-bit
/// buffer id the controller can hand back in packet-out and flow-mod
/// requests.
pub trait PacketPool: Send + Sync {
    /// Number of buffers, reported as `n_buffers` in features replies.
    fn capacity(&self) -> u32;

    /// Saves a copy of the frame. `None` means "not buffered": the whole
    /// payload must travel in the packet-in message instead.
    fn save(&self, frame: &Frame) -> Option<u32>;

    /// Removes and returns a stashed frame.
    fn take(&self, buffer_id: u32) -> Option<Frame>;

    /// Drops every stashed frame; called while a datapath is torn down so
    /// no buffered packet outlives its ingress datapath.
    fn discard_all(&self);
}
