//! Port controller.

use super::commands::FdbFlushTask;
use super::port::Port;
use super::settings::PortSettingExecutor;
use crate::context::{publish_port_state, SwitchContext, PORT_OBSERVER};
use log::{debug, info};
use opennos_core::{
    CommandDispatcher, CommitOrder, CoreError, CoreResult, EntityFactory, Notification, Observer,
    ObserverBus, ObserverKind, Payload, ResourceClass, StagedManager, UpdateReason,
};
use opennos_hal::{HwAbstraction, HwAbstractionExt, PortKind};
use opennos_types::PortId;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Creates and destroys port handles.
///
/// Also remembers the last link status reported for every port, created or
/// not, so a port created after its link came up starts with the right flag.
pub struct PortFactory {
    hw: Arc<dyn HwAbstraction>,
    link_status: BTreeMap<PortId, bool>,
}

impl PortFactory {
    pub fn new(hw: Arc<dyn HwAbstraction>) -> Self {
        Self {
            hw,
            link_status: BTreeMap::new(),
        }
    }

    pub fn link_status(&self, port: PortId) -> Option<bool> {
        self.link_status.get(&port).copied()
    }
}

impl EntityFactory for PortFactory {
    type Id = PortId;
    type Entity = Port;

    const KIND: &'static str = "port";
    const CREATE_ORDER: CommitOrder = CommitOrder::PortCreate;
    const DELETE_ORDER: CommitOrder = CommitOrder::PortDelete;

    fn create(&mut self, id: PortId) -> CoreResult<Port> {
        let hw_port = self
            .hw
            .panel_port_to_hw_port(id)
            .ok_or(CoreError::PortNotExists(id))?;
        let handle = self.hw.create::<PortKind>(u32::from(id.as_u16()))?;
        let mut port = Port::new(id, hw_port, handle);
        if let Some(up) = self.link_status(id) {
            port.set_link_status(up);
        }
        Ok(port)
    }

    fn destroy(&mut self, _id: PortId, port: &Port) -> CoreResult<()> {
        self.hw.destroy(port.handle())?;
        Ok(())
    }
}

/// Port controller statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortStats {
    pub link_updates: u64,
    /// Link updates for ports that did not exist yet.
    pub link_updates_retained: u64,
    pub fdb_flushes_queued: u64,
    pub oper_changes: u64,
}

const PORT_INTERESTS: &[UpdateReason] = &[UpdateReason::LinkStatusUpdate];

/// Staged port set plus staged attribute changes.
///
/// Observes `LinkStatusUpdate` from the link scan subject and publishes
/// `PortUp`/`PortDown` on the ports subject.
pub struct PortManager {
    staged: StagedManager<PortFactory>,
    settings: Vec<PortSettingExecutor>,
    flushes: BTreeSet<PortId>,
    bus: ObserverBus,
    dispatcher: Arc<CommandDispatcher<SwitchContext>>,
    stats: PortStats,
}

impl PortManager {
    pub fn new(
        hw: Arc<dyn HwAbstraction>,
        bus: ObserverBus,
        dispatcher: Arc<CommandDispatcher<SwitchContext>>,
    ) -> Self {
        Self {
            staged: StagedManager::new(PortFactory::new(hw)),
            settings: Vec::new(),
            flushes: BTreeSet::new(),
            bus,
            dispatcher,
            stats: PortStats::default(),
        }
    }

    pub fn add_port(&mut self, id: PortId) -> CoreResult<()> {
        self.staged.add(id)?;
        debug!("staged creation of port {}", id);
        Ok(())
    }

    pub fn remove_port(&mut self, id: PortId) -> CoreResult<()> {
        self.staged.remove(id).map_err(|err| match err {
            CoreError::NotExists { .. } => CoreError::PortNotExists(id),
            other => other,
        })?;
        debug!("staged removal of port {}", id);
        Ok(())
    }

    /// Stages an attribute change for a created or to-be-created port.
    pub fn stage_setting(&mut self, executor: PortSettingExecutor) -> CoreResult<()> {
        let port = executor.port();
        if !self.staged.is_known(port) {
            return Err(CoreError::PortNotExists(port));
        }
        self.settings.push(executor);
        Ok(())
    }

    /// Stages an FDB flush for a committed port.
    pub fn stage_fdb_flush(&mut self, port: PortId) -> CoreResult<()> {
        if !self.staged.exists(port) {
            return Err(CoreError::PortNotExists(port));
        }
        self.flushes.insert(port);
        Ok(())
    }

    pub fn exists(&self, id: PortId) -> bool {
        self.staged.exists(id)
    }

    pub fn port(&self, id: PortId) -> CoreResult<&Port> {
        self.staged.get(id).map_err(|_| CoreError::PortNotExists(id))
    }

    pub fn port_mut(&mut self, id: PortId) -> CoreResult<&mut Port> {
        self.staged.get_mut(id).map_err(|_| CoreError::PortNotExists(id))
    }

    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.staged.committed().values()
    }

    pub fn operable_ports(&self) -> Vec<PortId> {
        self.ports()
            .filter(|port| port.is_operable())
            .map(|port| port.id())
            .collect()
    }

    /// Last reported link status, also for ports not created yet.
    pub fn link_status(&self, id: PortId) -> Option<bool> {
        self.staged.factory().link_status(id)
    }

    pub fn staged(&self) -> &StagedManager<PortFactory> {
        &self.staged
    }

    pub fn staged_mut(&mut self) -> &mut StagedManager<PortFactory> {
        &mut self.staged
    }

    pub fn pending_settings(&self) -> usize {
        self.settings.len()
    }

    pub fn has_pending(&self) -> bool {
        self.staged.has_pending() || !self.settings.is_empty() || !self.flushes.is_empty()
    }

    pub(crate) fn take_settings(&mut self) -> Vec<PortSettingExecutor> {
        std::mem::take(&mut self.settings)
    }

    pub(crate) fn take_flushes(&mut self) -> BTreeSet<PortId> {
        std::mem::take(&mut self.flushes)
    }

    pub fn discard_pending(&mut self) {
        self.staged.discard_pending();
        self.settings.clear();
        self.flushes.clear();
    }

    pub fn stats(&self) -> &PortStats {
        &self.stats
    }

    fn apply_link_status(&mut self, id: PortId, up: bool) {
        self.stats.link_updates += 1;
        self.staged.factory_mut().link_status.insert(id, up);

        let Ok(port) = self.staged.get_mut(id) else {
            debug!("retaining link {} for port {} until it is created", up, id);
            self.stats.link_updates_retained += 1;
            return;
        };
        let was = port.is_operable();
        port.set_link_status(up);
        let now = port.is_operable();
        info!("port {} link {}", id, if up { "up" } else { "down" });

        if !up {
            self.dispatcher
                .enqueue(ResourceClass::FdbFlush, FdbFlushTask::new(id));
            self.stats.fdb_flushes_queued += 1;
        }
        if was != now {
            self.stats.oper_changes += 1;
            publish_port_state(&self.bus, id, now);
        }
    }
}

impl Observer for PortManager {
    fn kind(&self) -> ObserverKind {
        PORT_OBSERVER
    }

    fn interests(&self) -> &[UpdateReason] {
        PORT_INTERESTS
    }

    fn update(&mut self, notification: &Notification) -> CoreResult<()> {
        match (notification.reason, &notification.payload) {
            (UpdateReason::LinkStatusUpdate, Payload::LinkStatus(ports)) => {
                for (&port, &up) in ports {
                    self.apply_link_status(port, up);
                }
                Ok(())
            }
            (UpdateReason::LinkStatusUpdate, payload) => Err(CoreError::fail(format!(
                "link status update without link payload: {:?}",
                payload
            ))),
            (reason, _) => Err(CoreError::update_reason_not_supported("port manager", reason)),
        }
    }
}

impl std::fmt::Debug for PortManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortManager")
            .field("staged", &self.staged)
            .field("settings", &self.settings.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
