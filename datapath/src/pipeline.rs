// SPDX-License-Identifier: Apache-2.0

//! The seam to the flow-table pipeline ("chain"). The core submits frames
//! for classification, forwards controller payloads it does not itself
//! answer, asks for timeout sweeps, and iterates flows for the statistics
//! engine; everything else about tables is the pipeline's business.

use crate::ctrl::Sender;
use crate::dp::Datapath;
use crate::error::DpError;
use crate::eth::Frame;
use openflow::flow_match::FlowMatch;
use openflow::types::{FlowRemovedReason, PortNo};
use openflow::Action;
use std::time::Duration;

/// Outcome of submitting a frame to the pipeline.
pub enum Verdict {
    /// A flow matched; the pipeline executed its actions and now owns the
    /// frame.
    Consumed,
    /// No flow matched; the frame comes back for the caller's miss policy.
    Miss(Frame),
}

/// Which table a flow iteration walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSel {
    Table(usize),
    Emergency,
}

/// Whether an iteration ran out of flows or was stopped by its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterStatus {
    Done,
    Stopped,
}

/// Point-in-time snapshot of one flow, as rendered into flow statistics.
#[derive(Debug, Clone)]
pub struct FlowStatsEntry {
    pub table_id: u8,
    pub flow_match: FlowMatch,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    /// Time since the flow was installed.
    pub age: Duration,
    pub packet_count: u64,
    pub byte_count: u64,
    pub actions: Vec<Action>,
}

/// Record of a flow that left its table, for FLOW_REMOVED emission.
#[derive(Debug, Clone)]
pub struct RemovedFlow {
    pub flow_match: FlowMatch,
    pub priority: u16,
    pub reason: FlowRemovedReason,
    pub age: Duration,
    pub idle_timeout: u16,
    pub packet_count: u64,
    pub byte_count: u64,
    /// The flow asked for a removal notification.
    pub send_flow_rem: bool,
    /// Emergency flows are never reported.
    pub emergency: bool,
}

/// Per-table counters for table statistics.
#[derive(Debug, Clone)]
pub struct TableStatsEntry {
    pub name: String,
    /// Wildcard bits the table supports.
    pub wildcards: u32,
    pub max_entries: u32,
    pub active_count: u32,
    pub lookup_count: u64,
    pub matched_count: u64,
}

/// The flow-table pipeline a datapath classifies against.
pub trait FlowPipeline: Send + Sync {
    /// Number of regular tables (the emergency table not included).
    fn n_tables(&self) -> usize;

    /// Classifies `frame` (its ingress port already stamped) and executes
    /// the matched flow's actions through `dp`.
    fn process(&self, dp: &Datapath, frame: Frame) -> Verdict;

    /// Handles an OpenFlow payload the core does not answer itself
    /// (flow-mod, packet-out, vendor, ...). Called under the registry's
    /// control mutex.
    fn handle_message(&self, dp: &Datapath, sender: &Sender, msg: &[u8]) -> Result<(), DpError>;

    /// Removes timed-out flows and reports them for FLOW_REMOVED emission.
    fn expire_flows(&self) -> Vec<RemovedFlow>;

    /// Counters of one table; `None` past the end.
    fn table_stats(&self, table_idx: usize) -> Option<TableStatsEntry>;

    /// Walks the flows of one table that match `sel` (a description match:
    /// wildcarded selector fields match anything) and, unless `out_port`
    /// is [`PortNo::NONE`], output to `out_port`. Iteration starts at
    /// `*pos` flows into the table and advances it as flows are visited,
    /// so a stopped dump can resume. The callback returns `false` to stop
    /// early (reply buffer full).
    fn iterate_flows(
        &self,
        table: TableSel,
        sel: &FlowMatch,
        out_port: PortNo,
        pos: &mut u64,
        cb: &mut dyn FnMut(&FlowStatsEntry) -> bool,
    ) -> IterStatus;
}
