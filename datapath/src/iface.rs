// SPDX-License-Identifier: Apache-2.0

//! The seam to the host's network-interface subsystem. The core never
//! talks to an OS device directly; it holds `Arc<dyn NetIface>` handles
//! obtained from an [`IfaceProvider`].

use crate::error::DpError;
use crate::eth::{Frame, Mac};
use openflow::types::PortFeatures;
use std::sync::Arc;

/// Per-device counters, as maintained by the interface owner. Reported
/// verbatim in port statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IfaceStats {
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_frame_err: u64,
    pub rx_over_err: u64,
    pub rx_crc_err: u64,
    pub collisions: u64,
}

/// Link speed/media descriptors for the port descriptor bitmaps.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkFeatures {
    pub curr: PortFeatures,
    pub advertised: PortFeatures,
    pub supported: PortFeatures,
    pub peer: PortFeatures,
}

/// A host network interface.
///
/// `transmit` takes ownership of the frame; once it returns, the frame
/// belongs to the device whatever the outcome.
pub trait NetIface: Send + Sync {
    fn name(&self) -> &str;
    fn mac(&self) -> Mac;
    fn mtu(&self) -> usize;

    /// Administratively up?
    fn is_up(&self) -> bool;
    /// Link beat present?
    fn has_carrier(&self) -> bool;

    fn is_loopback(&self) -> bool {
        false
    }
    fn is_ethernet(&self) -> bool {
        true
    }
    /// True for the virtual local interface of any datapath; such devices
    /// can never be attached as a numeric port.
    fn is_datapath_local(&self) -> bool {
        false
    }

    /// Reference-counted promiscuous toggle, held for the lifetime of an
    /// attachment.
    fn set_promiscuous(&self, on: bool);

    fn features(&self) -> LinkFeatures {
        LinkFeatures::default()
    }

    fn transmit(&self, frame: Frame) -> Result<(), DpError>;

    fn stats(&self) -> IfaceStats;
}

/// The interface subsystem: lookup by name plus lifecycle of the virtual
/// local interface every datapath owns.
pub trait IfaceProvider: Send + Sync {
    /// Resolves a named host interface.
    fn lookup(&self, name: &str) -> Option<Arc<dyn NetIface>>;

    /// Creates the virtual local interface for datapath `dp_idx`, named
    /// `name` when given, with a provider-chosen default otherwise.
    fn create_local(
        &self,
        dp_idx: u32,
        name: Option<&str>,
    ) -> Result<Arc<dyn NetIface>, DpError>;

    /// Destroys a virtual local interface previously created here.
    fn destroy_local(&self, iface: &Arc<dyn NetIface>);
}
