// SPDX-License-Identifier: Apache-2.0

//! A switch port: a numbered binding of a host interface to a datapath,
//! carrying the administrative and observed state bitmaps.

use crate::iface::NetIface;
use crate::sync::lock;
use openflow::messages::{PhyPort, PortMod};
use openflow::types::{PortConfig, PortNo, PortState};
use std::sync::{Arc, Mutex};

/// Size of the numeric port table; usable port numbers are
/// `1..DP_MAX_PORTS`, the local port lives at [`PortNo::LOCAL`].
pub const DP_MAX_PORTS: usize = 255;

#[derive(Debug, Clone, Copy, Default)]
struct PortFlags {
    config: PortConfig,
    state: PortState,
}

/// One attached port. The flag bitmaps are the only mutable state and sit
/// behind their own short-hold lock; everything else is immutable for the
/// port's lifetime.
pub struct Port {
    port_no: u16,
    iface: Arc<dyn NetIface>,
    flags: Mutex<PortFlags>,
}

impl Port {
    /// Binds `iface` as port `port_no`, seeding the bitmaps from the
    /// device's current admin and link state.
    pub(crate) fn new(port_no: u16, iface: Arc<dyn NetIface>) -> Self {
        let mut flags = PortFlags::default();
        flags.config.set(PortConfig::PORT_DOWN, !iface.is_up());
        flags.state.set(PortState::LINK_DOWN, !iface.has_carrier());
        Self {
            port_no,
            iface,
            flags: Mutex::new(flags),
        }
    }

    #[must_use]
    pub fn port_no(&self) -> u16 {
        self.port_no
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        self.port_no == PortNo::LOCAL.0
    }

    #[must_use]
    pub fn iface(&self) -> &Arc<dyn NetIface> {
        &self.iface
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.iface.name()
    }

    #[must_use]
    pub fn config(&self) -> PortConfig {
        lock(&self.flags).config
    }

    #[must_use]
    pub fn state(&self) -> PortState {
        lock(&self.flags).state
    }

    /// Applies a port-mod's (mask, value) pair. The caller has already
    /// verified the hardware address.
    pub(crate) fn apply_config(&self, config: PortConfig, mask: PortConfig) {
        if mask.is_empty() {
            return;
        }
        let mut flags = lock(&self.flags);
        flags.config = (flags.config - mask) | (config & mask);
    }

    /// True when the port-mod's hardware address still names this port's
    /// device. A stale address means the request raced an interface
    /// replacement and must not be applied.
    pub(crate) fn hw_addr_matches(&self, pm: &PortMod) -> bool {
        self.iface.mac().0 == pm.hw_addr
    }

    /// The port descriptor sent in features replies and port-status
    /// notifications.
    #[must_use]
    pub fn phy_desc(&self) -> PhyPort {
        let link = self.iface.features();
        let flags = *lock(&self.flags);
        PhyPort {
            port_no: self.port_no,
            hw_addr: self.iface.mac().0,
            name: self.iface.name().to_string(),
            config: flags.config,
            state: flags.state,
            curr: link.curr,
            advertised: link.advertised,
            supported: link.supported,
            peer: link.peer,
        }
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("port_no", &self.port_no)
            .field("iface", &self.iface.name())
            .field("config", &self.config())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::FakeIface;

    #[test]
    fn flags_seeded_from_device_state() {
        let iface = FakeIface::named("veth0");
        iface.set_link(false, false);
        let port = Port::new(1, iface.clone());
        assert!(port.config().contains(PortConfig::PORT_DOWN));
        assert!(port.state().contains(PortState::LINK_DOWN));

        iface.set_link(true, true);
        let port = Port::new(1, iface);
        assert!(port.config().is_empty());
        assert!(port.state().is_empty());
    }

    #[test]
    fn apply_config_touches_masked_bits_only() {
        let port = Port::new(2, FakeIface::named("veth2"));
        port.apply_config(
            PortConfig::NO_FLOOD | PortConfig::NO_FWD,
            PortConfig::NO_FLOOD,
        );
        assert_eq!(port.config(), PortConfig::NO_FLOOD);

        // empty mask applies nothing
        port.apply_config(PortConfig::empty(), PortConfig::empty());
        assert_eq!(port.config(), PortConfig::NO_FLOOD);

        // clear via mask
        port.apply_config(PortConfig::empty(), PortConfig::NO_FLOOD);
        assert_eq!(port.config(), PortConfig::empty());
    }

    #[test]
    fn phy_desc_reflects_port() {
        let iface = FakeIface::named("veth7");
        let port = Port::new(7, iface.clone());
        let desc = port.phy_desc();
        assert_eq!(desc.port_no, 7);
        assert_eq!(desc.name, "veth7");
        assert_eq!(desc.hw_addr, iface.mac().0);
    }
}
