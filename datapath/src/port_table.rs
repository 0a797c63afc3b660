// SPDX-License-Identifier: Apache-2.0

//! The per-datapath port table, wrapped in left-right so the receive path
//! reads it without taking a lock. Writers (attach/detach, serialized by
//! the registry's control mutex) append a change and publish; `publish`
//! waits out every current reader, which is the grace period that makes
//! port release safe.

use crate::port::{DP_MAX_PORTS, Port};
use crate::sync::lock;
use left_right::{Absorb, ReadHandle, ReadHandleFactory, WriteHandle};
use openflow::types::PortNo;
use std::sync::{Arc, Mutex};

/// The table proper: numeric slots indexed by port number, the
/// distinguished local slot, and the attach-order list floods and
/// features replies iterate.
#[derive(Clone, Default)]
struct PortTable {
    slots: Vec<Option<Arc<Port>>>,
    local: Option<Arc<Port>>,
    order: Vec<Arc<Port>>,
}

impl PortTable {
    fn new() -> Self {
        Self {
            slots: vec![None; DP_MAX_PORTS],
            local: None,
            order: Vec::new(),
        }
    }

    fn add(&mut self, port: &Arc<Port>) {
        let port_no = port.port_no();
        if port.is_local() {
            self.local = Some(Arc::clone(port));
        } else if (port_no as usize) < DP_MAX_PORTS {
            self.slots[port_no as usize] = Some(Arc::clone(port));
        }
        self.order.push(Arc::clone(port));
    }

    fn del(&mut self, port_no: u16) {
        if port_no == PortNo::LOCAL.0 {
            self.local = None;
        } else if (port_no as usize) < DP_MAX_PORTS {
            self.slots[port_no as usize] = None;
        }
        self.order.retain(|p| p.port_no() != port_no);
    }

    fn get(&self, port_no: PortNo) -> Option<&Arc<Port>> {
        if port_no == PortNo::LOCAL {
            self.local.as_ref()
        } else if (port_no.0 as usize) < DP_MAX_PORTS {
            self.slots[port_no.0 as usize].as_ref()
        } else {
            None
        }
    }
}

enum PortTableChange {
    Add(Arc<Port>),
    Del(u16),
}

impl Absorb<PortTableChange> for PortTable {
    fn absorb_first(&mut self, change: &mut PortTableChange, _: &Self) {
        match change {
            PortTableChange::Add(port) => self.add(port),
            PortTableChange::Del(port_no) => self.del(*port_no),
        }
    }

    fn sync_with(&mut self, first: &Self) {
        *self = first.clone();
    }
}

/// Writer half plus a factory handing out readers. Lives inside a
/// `Datapath`; writes go through the mutex, the factory is freely shared.
pub(crate) struct PortTableHandle {
    writer: Mutex<WriteHandle<PortTable, PortTableChange>>,
    factory: ReadHandleFactory<PortTable>,
}

impl PortTableHandle {
    pub(crate) fn new() -> Self {
        let (writer, reader) =
            left_right::new_from_empty::<PortTable, PortTableChange>(PortTable::new());
        let factory = reader.factory();
        Self {
            writer: Mutex::new(writer),
            factory,
        }
    }

    /// Publishes a new port. Returns after the grace period, i.e. all
    /// readers see the port.
    pub(crate) fn add(&self, port: Arc<Port>) {
        let mut w = lock(&self.writer);
        w.append(PortTableChange::Add(port));
        w.publish();
    }

    /// Unpublishes a port and waits out current readers.
    pub(crate) fn del(&self, port_no: u16) {
        let mut w = lock(&self.writer);
        w.append(PortTableChange::Del(port_no));
        w.publish();
    }

    pub(crate) fn reader(&self) -> PortTableReader {
        PortTableReader(self.factory.handle())
    }
}

/// A read handle over the port table. Cheap to create from the datapath;
/// not shareable across threads — each reader makes its own.
pub struct PortTableReader(ReadHandle<PortTable>);

impl PortTableReader {
    /// Resolves a numeric port number or [`PortNo::LOCAL`]. The returned
    /// `Arc` keeps the port alive past any concurrent detach.
    #[must_use]
    pub fn get(&self, port_no: PortNo) -> Option<Arc<Port>> {
        self.0.enter()?.get(port_no).map(Arc::clone)
    }

    /// The ports in attach order (local port included), as floods and
    /// features replies walk them.
    #[must_use]
    pub fn ordered(&self) -> Vec<Arc<Port>> {
        self.0
            .enter()
            .map(|t| t.order.iter().map(Arc::clone).collect())
            .unwrap_or_default()
    }

    /// Numeric ports in ascending port-number order, as per-port
    /// statistics walk them.
    #[must_use]
    pub fn numeric(&self) -> Vec<Arc<Port>> {
        self.0
            .enter()
            .map(|t| t.slots.iter().flatten().map(Arc::clone).collect())
            .unwrap_or_default()
    }

    /// Lowest free numeric port number, scanning from 1.
    #[must_use]
    pub fn find_free(&self) -> Option<u16> {
        let guard = self.0.enter()?;
        (1..DP_MAX_PORTS as u16).find(|&n| guard.slots[n as usize].is_none())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.enter().map(|t| t.order.len()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::FakeIface;

    fn port(n: u16, name: &str) -> Arc<Port> {
        Arc::new(Port::new(n, FakeIface::named(name)))
    }

    #[test]
    fn add_del_visible_to_readers() {
        let table = PortTableHandle::new();
        let reader = table.reader();

        table.add(port(1, "veth1"));
        table.add(port(2, "veth2"));
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.get(PortNo(1)).map(|p| p.port_no()), Some(1));
        assert!(reader.get(PortNo(3)).is_none());

        table.del(1);
        assert!(reader.get(PortNo(1)).is_none());
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn local_port_never_occupies_a_numeric_slot() {
        let table = PortTableHandle::new();
        let reader = table.reader();
        table.add(port(PortNo::LOCAL.0, "of0"));

        assert!(reader.get(PortNo::LOCAL).is_some());
        assert!(reader.numeric().is_empty());
        assert_eq!(reader.ordered().len(), 1);
        assert_eq!(reader.find_free(), Some(1));
    }

    #[test]
    fn ordered_keeps_attach_order() {
        let table = PortTableHandle::new();
        table.add(port(PortNo::LOCAL.0, "of0"));
        table.add(port(3, "a"));
        table.add(port(1, "b"));
        let names: Vec<u16> = table.reader().ordered().iter().map(|p| p.port_no()).collect();
        assert_eq!(names, vec![PortNo::LOCAL.0, 3, 1]);
        // numeric view is sorted by slot
        let nums: Vec<u16> = table.reader().numeric().iter().map(|p| p.port_no()).collect();
        assert_eq!(nums, vec![1, 3]);
    }

    #[test]
    fn find_free_skips_taken_slots() {
        let table = PortTableHandle::new();
        table.add(port(1, "a"));
        table.add(port(2, "b"));
        assert_eq!(table.reader().find_free(), Some(3));
    }

    #[test]
    fn readers_survive_concurrent_detach() {
        let table = PortTableHandle::new();
        table.add(port(1, "veth1"));
        let held = table.reader().get(PortNo(1)).unwrap();
        table.del(1);
        // the Arc held by the reader outlives the unpublish
        assert_eq!(held.name(), "veth1");
        assert!(table.reader().get(PortNo(1)).is_none());
    }
}
