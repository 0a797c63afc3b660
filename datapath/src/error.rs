// SPDX-License-Identifier: Apache-2.0

//! The error taxonomy shared by the forwarding core and the management
//! plane.

use openflow::WireError;

/// An error raised by a datapath or registry operation. Control-path
/// errors travel back to the issuing sender; fast-path errors mean the
/// frame was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DpError {
    /// Malformed request, or a port/identity mismatch.
    #[error("invalid request")]
    Invalid,
    /// Unknown datapath index, name or port.
    #[error("no such datapath or port")]
    NotFound,
    /// The requested datapath slot is taken.
    #[error("datapath already exists")]
    AlreadyExists,
    /// An explicit datapath index past the end of the registry.
    #[error("datapath index out of range")]
    OutOfRange,
    /// Registry or port table full.
    #[error("no free slot")]
    Exhausted,
    /// A collaborator reported allocation failure.
    #[error("out of memory")]
    OutOfMemory,
    /// An outbound message would not fit the 16-bit length field.
    #[error("message too large for the control channel")]
    TooLarge,
    /// A frame larger than the outgoing interface's MTU.
    #[error("frame exceeds interface MTU")]
    TooBig,
    /// The interface is already attached to a datapath.
    #[error("interface busy")]
    Busy,
    /// The peer speaks an OpenFlow version this switch does not.
    #[error("unsupported protocol version")]
    BadVersion,
    /// A statistics request of a kind this switch does not know.
    #[error("unknown statistics type")]
    BadStat,
    /// The sender lacks the elevated-privilege credential.
    #[error("permission denied")]
    Denied,
}

impl From<WireError> for DpError {
    fn from(e: WireError) -> Self {
        match e {
            WireError::TooLarge(_) => DpError::TooLarge,
            _ => DpError::Invalid,
        }
    }
}
