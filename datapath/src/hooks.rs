// SPDX-License-Identifier: Apache-2.0

//! Observer seam for satellite modules (e.g. a companion management
//! daemon). One subscriber at a time; every callback runs after the event
//! it reports has completed.

use crate::dp::Datapath;
use crate::port::Port;

/// Registry lifecycle observer.
pub trait DpObserver: Send + Sync {
    fn dp_added(&self, _dp: &Datapath) {}
    fn dp_removed(&self, _dp: &Datapath) {}
    fn port_added(&self, _dp: &Datapath, _port: &Port) {}
    fn port_removed(&self, _dp: &Datapath, _port: &Port) {}
}
