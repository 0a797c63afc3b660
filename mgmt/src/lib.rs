// SPDX-License-Identifier: Apache-2.0

//! The management plane of the switch: the control-channel envelope and
//! transport abstraction, the request dispatcher, and the multi-part
//! statistics engine.
//!
//! Inbound requests arrive as [`envelope::Envelope`]s with transport
//! metadata ([`transport::PeerMeta`]); the [`dispatch::Dispatcher`] routes
//! them to the registry, the datapath emitters, the statistics engine, or
//! the flow pipeline. Outbound messages leave through a
//! [`transport::ControlTransport`]: unicast replies to the requesting
//! peer, notifications multicast on one of the sixteen pre-allocated
//! groups.

#![deny(unsafe_code, clippy::all, clippy::unwrap_used, clippy::expect_used)]

pub mod desc;
pub mod dispatch;
pub mod envelope;
pub mod stats;
pub mod transport;

pub use desc::SwitchDesc;
pub use dispatch::{Dispatcher, Reply};
pub use envelope::{Envelope, OpCode};
pub use stats::{StatsSession, VendorStatsRegistry};
pub use transport::{ControlTransport, EnvelopeSink, PeerMeta};
