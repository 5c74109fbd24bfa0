//! Hand-off of link-scan events from the driver context to the owning thread.
//!
//! The driver callback only records `hw port -> link up` in a pre-sized map,
//! marks it dirty and signals a condition variable. The owning thread waits
//! for the signal, swaps the map out under the lock and translates it outside
//! the lock, so the driver can keep accumulating the next batch meanwhile.

use crate::observer::{Notification, Payload, Subject, UpdateReason};
use log::{debug, info, warn};
use opennos_hal::LinkScanCallback;
use opennos_types::{HwPortId, PortId};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct PendingLinks {
    changes: HashMap<HwPortId, bool>,
    dirty: bool,
    shutdown: bool,
}

#[derive(Debug)]
struct Shared {
    pending: Mutex<PendingLinks>,
    wake: Condvar,
}

/// Producer side of the bridge, safe to call from the driver context.
#[derive(Debug, Clone)]
pub struct LinkEventSink {
    shared: Arc<Shared>,
}

impl LinkEventSink {
    /// Records a transition; the last value per port wins until the next
    /// batch is taken.
    pub fn on_link_change(&self, hw_port: HwPortId, up: bool) {
        {
            let mut pending = self.shared.pending.lock();
            pending.changes.insert(hw_port, up);
            pending.dirty = true;
        }
        self.shared.wake.notify_one();
    }

    /// Wakes the waiting notifier for teardown. Pending events are still
    /// delivered once; later waits return `None`.
    pub fn shutdown(&self) {
        self.shared.pending.lock().shutdown = true;
        self.shared.wake.notify_all();
    }

    /// Adapts the sink to the driver's link-scan callback signature.
    pub fn into_callback(self) -> LinkScanCallback {
        Arc::new(move |hw_port, up| self.on_link_change(hw_port, up))
    }
}

/// One coalesced set of link transitions in panel numbering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStatusBatch {
    pub ports: BTreeMap<PortId, bool>,
    /// Hardware ports that had no panel mapping and were dropped.
    pub unmapped: Vec<HwPortId>,
}

impl LinkStatusBatch {
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// The `LinkStatusUpdate` notification carrying this batch.
    pub fn into_notification(self) -> Notification {
        Notification::new(
            Subject::LinkScan,
            UpdateReason::LinkStatusUpdate,
            Payload::LinkStatus(self.ports),
        )
    }
}

type PortTranslator = Box<dyn Fn(HwPortId) -> Option<PortId> + Send>;

/// Consumer side of the bridge, owned by the notifier thread.
pub struct LinkEventBridge {
    shared: Arc<Shared>,
    spare: HashMap<HwPortId, bool>,
    translate: PortTranslator,
}

impl LinkEventBridge {
    /// Creates a bridge sized for `capacity` ports. `translate` maps hardware
    /// ports to panel ports.
    pub fn new<F>(capacity: usize, translate: F) -> Self
    where
        F: Fn(HwPortId) -> Option<PortId> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            pending: Mutex::new(PendingLinks {
                changes: HashMap::with_capacity(capacity),
                dirty: false,
                shutdown: false,
            }),
            wake: Condvar::new(),
        });
        Self {
            shared,
            spare: HashMap::with_capacity(capacity),
            translate: Box::new(translate),
        }
    }

    pub fn sink(&self) -> LinkEventSink {
        LinkEventSink {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.pending.lock().shutdown
    }

    /// Blocks until events are pending or the bridge is shut down.
    pub fn wait_batch(&mut self) -> Option<LinkStatusBatch> {
        {
            let mut pending = self.shared.pending.lock();
            while !pending.dirty && !pending.shutdown {
                self.shared.wake.wait(&mut pending);
            }
            if !pending.dirty {
                return None;
            }
            std::mem::swap(&mut pending.changes, &mut self.spare);
            pending.dirty = false;
        }
        Some(self.drain_spare())
    }

    /// Like [`wait_batch`](Self::wait_batch) but gives up after `timeout`.
    pub fn wait_batch_timeout(&mut self, timeout: Duration) -> Option<LinkStatusBatch> {
        let deadline = Instant::now() + timeout;
        {
            let mut pending = self.shared.pending.lock();
            while !pending.dirty && !pending.shutdown {
                if self.shared.wake.wait_until(&mut pending, deadline).timed_out() {
                    break;
                }
            }
            if !pending.dirty {
                return None;
            }
            std::mem::swap(&mut pending.changes, &mut self.spare);
            pending.dirty = false;
        }
        Some(self.drain_spare())
    }

    /// Takes pending events without waiting.
    pub fn try_take_batch(&mut self) -> Option<LinkStatusBatch> {
        {
            let mut pending = self.shared.pending.lock();
            if !pending.dirty {
                return None;
            }
            std::mem::swap(&mut pending.changes, &mut self.spare);
            pending.dirty = false;
        }
        Some(self.drain_spare())
    }

    /// Moves the bridge onto a dedicated notifier thread that hands every
    /// batch to `handler` until shutdown.
    pub fn spawn<H>(mut self, mut handler: H) -> io::Result<JoinHandle<()>>
    where
        H: FnMut(LinkStatusBatch) + Send + 'static,
    {
        thread::Builder::new()
            .name("link-notifier".to_string())
            .spawn(move || {
                while let Some(batch) = self.wait_batch() {
                    if batch.is_empty() {
                        continue;
                    }
                    handler(batch);
                }
                info!("link notifier stopped");
            })
    }

    fn drain_spare(&mut self) -> LinkStatusBatch {
        let mut batch = LinkStatusBatch::default();
        for (hw_port, up) in self.spare.drain() {
            match (self.translate)(hw_port) {
                Some(port) => {
                    batch.ports.insert(port, up);
                }
                None => {
                    warn!("dropping link event for unmapped {}", hw_port);
                    batch.unmapped.push(hw_port);
                }
            }
        }
        debug!("link batch: {:?}", batch.ports);
        batch
    }
}

impl std::fmt::Debug for LinkEventBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkEventBridge")
            .field("pending", &self.shared.pending)
            .finish_non_exhaustive()
    }
}
