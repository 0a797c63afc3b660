// SPDX-License-Identifier: Apache-2.0

//! The process-wide datapath registry: a fixed-size slot table, the
//! control mutex serializing every control-plane operation, and the
//! interface claim table that keeps one interface on at most one
//! datapath.

use crate::ctrl::ControlSink;
use crate::dp::Datapath;
use crate::error::DpError;
use crate::hooks::DpObserver;
use crate::iface::IfaceProvider;
use crate::pipeline::FlowPipeline;
use crate::pool::PacketPool;
use crate::port::Port;
use crate::sync::{lock, read, write};
use openflow::types::PortNo;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tracing::{debug, info};

/// Number of datapath slots.
pub const DP_MAX: usize = 256;

/// Tunables of the registry. Deserializable so an embedder can lift it
/// from its own configuration file.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct DpConfig {
    /// Milliseconds between maintenance (flow-expiry) sweeps.
    pub maint_interval_ms: u64,
}

impl Default for DpConfig {
    fn default() -> Self {
        Self {
            maint_interval_ms: 1000,
        }
    }
}

impl DpConfig {
    #[must_use]
    pub fn maint_interval(&self) -> Duration {
        Duration::from_millis(self.maint_interval_ms)
    }
}

/// Builds one pipeline per datapath.
pub trait PipelineFactory: Send + Sync {
    fn build(&self, dp_idx: u32) -> Result<Arc<dyn FlowPipeline>, DpError>;
}

/// The registry. Slot reads take short read-side sections; every mutating
/// operation (and the maintenance sweep) serializes on the control mutex.
pub struct DpRegistry {
    ctl: Arc<Mutex<()>>,
    slots: RwLock<Vec<Option<Arc<Datapath>>>>,
    /// interface name -> (dp_idx, port_no); realizes the "one datapath per
    /// interface" invariant.
    claims: Mutex<HashMap<String, (u32, u16)>>,
    observer: RwLock<Option<Arc<dyn DpObserver>>>,
    provider: Arc<dyn IfaceProvider>,
    pipelines: Arc<dyn PipelineFactory>,
    pool: Arc<dyn PacketPool>,
    sink: Arc<dyn ControlSink>,
    config: DpConfig,
}

impl DpRegistry {
    pub fn new(
        provider: Arc<dyn IfaceProvider>,
        pipelines: Arc<dyn PipelineFactory>,
        pool: Arc<dyn PacketPool>,
        sink: Arc<dyn ControlSink>,
        config: DpConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            ctl: Arc::new(Mutex::new(())),
            slots: RwLock::new(vec![None; DP_MAX]),
            claims: Mutex::new(HashMap::new()),
            observer: RwLock::new(None),
            provider,
            pipelines,
            pool,
            sink,
            config,
        })
    }

    /// Registers the (single) lifecycle observer.
    pub fn set_observer(&self, observer: Arc<dyn DpObserver>) {
        *write(&self.observer) = Some(observer);
    }

    fn observer(&self) -> Option<Arc<dyn DpObserver>> {
        read(&self.observer).clone()
    }

    /// Serializes a caller against every registry writer; the OPENFLOW
    /// request path holds this guard while the pipeline handles a message.
    pub fn lock_control(&self) -> MutexGuard<'_, ()> {
        lock(&self.ctl)
    }

    // ---- lookups -------------------------------------------------------

    /// Resolves a datapath by index.
    #[must_use]
    pub fn get(&self, dp_idx: u32) -> Option<Arc<Datapath>> {
        let slots = read(&self.slots);
        slots.get(dp_idx as usize)?.clone()
    }

    /// Resolves a datapath by the name of its local interface.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<Arc<Datapath>> {
        let slots = read(&self.slots);
        slots
            .iter()
            .flatten()
            .find(|dp| dp.name() == name)
            .cloned()
    }

    /// Resolves by index, name, or both; when both are given they must
    /// name the same datapath.
    pub fn lookup(&self, dp_idx: Option<u32>, name: Option<&str>) -> Result<Arc<Datapath>, DpError> {
        match (dp_idx, name) {
            (Some(idx), maybe_name) => {
                let dp = self.get(idx).ok_or(DpError::NotFound)?;
                match maybe_name {
                    Some(name) if dp.name() != name => Err(DpError::Invalid),
                    _ => Ok(dp),
                }
            }
            (None, Some(name)) => self.get_by_name(name).ok_or(DpError::NotFound),
            (None, None) => Err(DpError::Invalid),
        }
    }

    // ---- datapath lifecycle --------------------------------------------

    /// Creates a datapath on `dp_idx`, or on the lowest free index when
    /// unspecified. At least one of index and name must be given.
    pub fn create(&self, dp_idx: Option<u32>, name: Option<&str>) -> Result<u32, DpError> {
        if dp_idx.is_none() && name.is_none() {
            return Err(DpError::Invalid);
        }
        let guard = lock(&self.ctl);

        let idx = {
            let slots = read(&self.slots);
            match dp_idx {
                Some(idx) if idx as usize >= DP_MAX => return Err(DpError::OutOfRange),
                Some(idx) if slots[idx as usize].is_some() => return Err(DpError::AlreadyExists),
                Some(idx) => idx,
                None => slots
                    .iter()
                    .position(Option::is_none)
                    .ok_or(DpError::Exhausted)? as u32,
            }
        };

        let local_iface = self.provider.create_local(idx, name)?;
        let chain = match self.pipelines.build(idx) {
            Ok(chain) => chain,
            Err(e) => {
                self.provider.destroy_local(&local_iface);
                return Err(e);
            }
        };

        let dp = Arc::new(Datapath::new(
            idx,
            format!("{} idx={idx}", hostname()),
            Arc::clone(&local_iface),
            chain,
            Arc::clone(&self.pool),
            Arc::clone(&self.sink),
        ));
        if let Err(e) = dp.start_worker(Arc::clone(&self.ctl), self.config.maint_interval()) {
            local_iface.set_promiscuous(false);
            self.provider.destroy_local(&local_iface);
            return Err(e);
        }

        lock(&self.claims).insert(local_iface.name().to_string(), (idx, PortNo::LOCAL.0));
        write(&self.slots)[idx as usize] = Some(Arc::clone(&dp));
        drop(guard);

        info!(dp = idx, name = dp.name(), "datapath created");
        if let Some(obs) = self.observer() {
            obs.dp_added(&dp);
        }
        Ok(idx)
    }

    /// Destroys a datapath: worker first, then every port, then the slot,
    /// buffered packets, and finally pipeline and local interface.
    pub fn destroy(&self, dp_idx: Option<u32>, name: Option<&str>) -> Result<(), DpError> {
        let guard = lock(&self.ctl);
        let dp = self.lookup(dp_idx, name)?;

        dp.stop_worker();

        let observer = self.observer();
        for port in dp.ports().ordered() {
            dp.uninstall_port(&port);
            lock(&self.claims).remove(port.name());
            if !port.is_local()
                && let Some(obs) = &observer
            {
                obs.port_removed(&dp, &port);
            }
        }

        if let Some(obs) = &observer {
            obs.dp_removed(&dp);
        }
        write(&self.slots)[dp.dp_idx() as usize] = None;

        self.pool.discard_all();
        self.provider.destroy_local(dp.local_iface());
        drop(guard);

        info!(dp = dp.dp_idx(), name = dp.name(), "datapath destroyed");
        Ok(())
    }

    // ---- port lifecycle ------------------------------------------------

    /// Attaches the named host interface to a datapath. Loopback devices,
    /// non-Ethernet devices and datapath-local virtual devices are
    /// rejected; an interface already claimed anywhere is `Busy`.
    pub fn add_port(
        &self,
        dp_idx: Option<u32>,
        name: Option<&str>,
        iface_name: &str,
    ) -> Result<u16, DpError> {
        let _guard = lock(&self.ctl);
        let dp = self.lookup(dp_idx, name)?;
        let iface = self.provider.lookup(iface_name).ok_or(DpError::NotFound)?;

        if iface.is_loopback() || !iface.is_ethernet() || iface.is_datapath_local() {
            return Err(DpError::Invalid);
        }
        if lock(&self.claims).contains_key(iface_name) {
            return Err(DpError::Busy);
        }

        let port = dp.install_port(iface)?;
        lock(&self.claims).insert(iface_name.to_string(), (dp.dp_idx(), port.port_no()));

        debug!(dp = dp.dp_idx(), port = port.port_no(), iface = iface_name, "port attached");
        if let Some(obs) = self.observer() {
            obs.port_added(&dp, &port);
        }
        Ok(port.port_no())
    }

    /// Detaches the named interface, which must currently belong to the
    /// identified datapath.
    pub fn del_port(
        &self,
        dp_idx: Option<u32>,
        name: Option<&str>,
        iface_name: &str,
    ) -> Result<(), DpError> {
        let _guard = lock(&self.ctl);
        let dp = self.lookup(dp_idx, name)?;

        let port_no = match lock(&self.claims).get(iface_name) {
            Some(&(idx, port_no)) if idx == dp.dp_idx() && port_no != PortNo::LOCAL.0 => port_no,
            _ => return Err(DpError::NotFound),
        };
        let port = dp.lookup_port(PortNo(port_no)).ok_or(DpError::NotFound)?;

        self.release_port(&dp, &port);
        Ok(())
    }

    /// The host reported an interface going away: detach the port bound to
    /// it, if any.
    pub fn iface_gone(&self, iface_name: &str) -> Result<(), DpError> {
        let _guard = lock(&self.ctl);
        let (dp_idx, port_no) = lock(&self.claims)
            .get(iface_name)
            .copied()
            .ok_or(DpError::NotFound)?;
        if port_no == PortNo::LOCAL.0 {
            // our own virtual device; nothing to detach
            return Err(DpError::Invalid);
        }
        let dp = self.get(dp_idx).ok_or(DpError::NotFound)?;
        let port = dp.lookup_port(PortNo(port_no)).ok_or(DpError::NotFound)?;

        debug!(dp = dp_idx, iface = iface_name, "interface disappeared, detaching port");
        self.release_port(&dp, &port);
        Ok(())
    }

    /// Unpublish, unclaim, notify. Caller holds the control mutex.
    fn release_port(&self, dp: &Arc<Datapath>, port: &Arc<Port>) {
        dp.uninstall_port(port);
        lock(&self.claims).remove(port.name());
        if let Some(obs) = self.observer() {
            obs.port_removed(dp, port);
        }
    }

    /// The shared packet-buffer pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<dyn PacketPool> {
        &self.pool
    }
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}
