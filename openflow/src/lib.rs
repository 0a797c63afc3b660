// SPDX-License-Identifier: Apache-2.0

//! OpenFlow 1.0 wire model.
//!
//! Everything that crosses the control channel is described here: protocol
//! constants and bitmaps, the fixed-layout message codecs, and the outbound
//! message builder that patches the 16-bit length field once a message body
//! is complete. All multi-byte integers are big-endian on the wire,
//! including 64-bit counters.

#![deny(unsafe_code, clippy::all, clippy::unwrap_used, clippy::expect_used)]

pub mod actions;
pub mod builder;
pub mod flow_match;
pub mod header;
pub mod messages;
pub mod stats;
pub mod types;
mod wire;

pub use actions::Action;
pub use builder::MsgBuf;
pub use flow_match::{FlowMatch, Wildcards};
pub use header::Header;
pub use types::{MsgType, PortNo};
pub use wire::WireError;

/// The protocol version this implementation speaks.
pub const OFP_VERSION: u8 = 0x01;

/// Size of the common message header.
pub const HEADER_LEN: usize = 8;
