// SPDX-License-Identifier: Apache-2.0

//! The forwarding core of a software OpenFlow 1.0 switch.
//!
//! A [`registry::DpRegistry`] owns up to [`registry::DP_MAX`] datapaths.
//! Each [`dp::Datapath`] owns a set of ports over host network interfaces,
//! a virtual local interface, a handle to its flow pipeline, and a
//! maintenance worker that ages flows out. Frames enter through
//! [`dp::Datapath::port_input`], are classified by the pipeline, and leave
//! through the forwarding engine ([`dp::Datapath::output`]) or escalate to
//! the controller ([`dp::Datapath::output_control`]).
//!
//! Everything this crate does not own — the flow pipeline, the host
//! interface subsystem, the packet-buffer pool, the control-channel
//! transport — is consumed through the trait seams in [`pipeline`],
//! [`iface`], [`pool`] and [`ctrl`]; [`test_utils`] provides in-memory
//! implementations of all of them.

#![deny(unsafe_code, clippy::all, clippy::unwrap_used, clippy::expect_used)]

pub mod ctrl;
pub mod dp;
pub mod error;
pub mod eth;
pub mod hooks;
pub mod iface;
mod maint;
pub mod pipeline;
pub mod pool;
pub mod port;
mod port_table;
pub mod registry;
mod sync;
pub mod test_utils;

pub use ctrl::{ControlSink, Sender};
pub use dp::Datapath;
pub use error::DpError;
pub use eth::{Frame, Mac};
pub use port::{DP_MAX_PORTS, Port};
pub use port_table::PortTableReader;
pub use registry::{DP_MAX, DpConfig, DpRegistry};
