// SPDX-License-Identifier: Apache-2.0

//! The per-datapath maintenance worker: a background thread that
//! periodically asks the pipeline to expire timed-out flows and reports
//! the casualties to the controller.

use crate::dp::Datapath;
use crate::error::DpError;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace};

pub(crate) struct MaintWorker {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl MaintWorker {
    /// Spawns the worker. The sweep serializes against control-plane
    /// writers through `ctl`, but only by try-lock: a contended tick is
    /// skipped, so a destroyer holding the mutex can never deadlock
    /// against its own worker.
    pub(crate) fn spawn(
        dp: Weak<Datapath>,
        ctl: Arc<Mutex<()>>,
        interval: Duration,
        dp_idx: u32,
    ) -> Result<Self, DpError> {
        let (shutdown, wakeup) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name(format!("dp{dp_idx}-maint"))
            .spawn(move || {
                loop {
                    match wakeup.recv_timeout(interval) {
                        // shutdown signal, or the datapath dropped the
                        // sender side
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                    let Some(dp) = dp.upgrade() else { break };
                    let Ok(_guard) = ctl.try_lock() else {
                        trace!(dp = dp_idx, "maintenance tick skipped, control plane busy");
                        continue;
                    };
                    for flow in dp.chain().expire_flows() {
                        if let Err(e) = dp.send_flow_removed(&flow) {
                            debug!(dp = dp_idx, error = %e, "flow-removed notification dropped");
                        }
                    }
                }
                trace!(dp = dp_idx, "maintenance worker parked");
            })
            .map_err(|e| {
                debug!(dp = dp_idx, error = %e, "failed to spawn maintenance worker");
                DpError::OutOfMemory
            })?;
        Ok(Self { shutdown, handle })
    }

    /// Signals the worker (interrupting any in-flight sleep) and waits for
    /// it to park.
    pub(crate) fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.join();
    }
}
