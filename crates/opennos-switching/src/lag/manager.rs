//! LAG controller.

use super::types::Lag;
use crate::context::{publish_lag_state, SwitchContext, LAG_OBSERVER};
use log::debug;
use opennos_core::{
    Command, CommitOrder, CoreError, CoreResult, DispatchTask, EntityFactory, Notification,
    Observer, ObserverBus, ObserverKind, Payload, StagedManager, UpdateReason,
};
use opennos_hal::{HwAbstraction, HwAbstractionExt, LagKind};
use opennos_types::{HwPortId, LagId, PortId};
use std::sync::Arc;

pub struct LagFactory {
    hw: Arc<dyn HwAbstraction>,
}

impl EntityFactory for LagFactory {
    type Id = LagId;
    type Entity = Lag;

    const KIND: &'static str = "lag";
    const CREATE_ORDER: CommitOrder = CommitOrder::LagCreate;
    const DELETE_ORDER: CommitOrder = CommitOrder::LagDelete;

    fn create(&mut self, id: LagId) -> CoreResult<Lag> {
        let handle = self.hw.create::<LagKind>(u32::from(id.as_u16()))?;
        Ok(Lag::new(id, handle))
    }

    fn destroy(&mut self, _id: LagId, lag: &Lag) -> CoreResult<()> {
        self.hw.destroy(lag.handle())?;
        Ok(())
    }
}

/// LAG controller statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LagStats {
    pub members_added: u64,
    pub members_removed: u64,
    pub state_changes: u64,
}

const LAG_INTERESTS: &[UpdateReason] = &[UpdateReason::PortUp, UpdateReason::PortDown];

/// Staged LAG set. Observes member port operability and publishes
/// `LagUp`/`LagDown` on the lags subject.
pub struct LagManager {
    staged: StagedManager<LagFactory>,
    hw: Arc<dyn HwAbstraction>,
    bus: ObserverBus,
    stats: LagStats,
}

impl LagManager {
    pub fn new(hw: Arc<dyn HwAbstraction>, bus: ObserverBus) -> Self {
        Self {
            staged: StagedManager::new(LagFactory { hw: Arc::clone(&hw) }),
            hw,
            bus,
            stats: LagStats::default(),
        }
    }

    pub fn add_lag(&mut self, id: LagId) -> CoreResult<()> {
        self.staged.add(id)?;
        debug!("staged creation of lag {}", id);
        Ok(())
    }

    pub fn remove_lag(&mut self, id: LagId) -> CoreResult<()> {
        self.staged.remove(id)?;
        debug!("staged removal of lag {}", id);
        Ok(())
    }

    pub fn exists(&self, id: LagId) -> bool {
        self.staged.exists(id)
    }

    pub fn lag(&self, id: LagId) -> CoreResult<&Lag> {
        self.staged.get(id)
    }

    pub fn lags(&self) -> impl Iterator<Item = &Lag> {
        self.staged.committed().values()
    }

    /// LAG that `port` is a member of, if any.
    pub fn lag_of(&self, port: PortId) -> Option<LagId> {
        self.lags().find(|lag| lag.is_member(port)).map(|lag| lag.id())
    }

    pub fn staged(&self) -> &StagedManager<LagFactory> {
        &self.staged
    }

    pub fn staged_mut(&mut self) -> &mut StagedManager<LagFactory> {
        &mut self.staged
    }

    pub fn has_pending(&self) -> bool {
        self.staged.has_pending()
    }

    pub fn discard_pending(&mut self) {
        self.staged.discard_pending();
    }

    pub fn stats(&self) -> &LagStats {
        &self.stats
    }

    /// Checks that `port` can join `lag`: the LAG exists and the port is not
    /// a member of any LAG.
    pub fn validate_member(&self, lag: LagId, port: PortId) -> CoreResult<()> {
        if !self.exists(lag) {
            return Err(CoreError::not_exists("lag", lag));
        }
        if let Some(owner) = self.lag_of(port) {
            return Err(CoreError::already_exists(
                "lag member",
                format!("port {} in lag {}", port, owner),
            ));
        }
        Ok(())
    }

    /// Returns the new aggregate state if it changed.
    pub fn add_member(
        &mut self,
        lag: LagId,
        port: PortId,
        hw_port: HwPortId,
        operable: bool,
    ) -> CoreResult<Option<bool>> {
        self.validate_member(lag, port)?;
        let changed = self
            .staged
            .get_mut(lag)?
            .add_member(self.hw.as_ref(), port, hw_port, operable)?;
        self.stats.members_added += 1;
        debug!("port {} joined lag {}", port, lag);
        if changed.is_some() {
            self.stats.state_changes += 1;
        }
        Ok(changed)
    }

    /// Returns the new aggregate state if it changed.
    pub fn remove_member(&mut self, lag: LagId, port: PortId) -> CoreResult<Option<bool>> {
        let hw_port = self.hw.hw_port_of(port)?;
        let changed = self
            .staged
            .get_mut(lag)?
            .remove_member(self.hw.as_ref(), port, hw_port)?;
        self.stats.members_removed += 1;
        debug!("port {} left lag {}", port, lag);
        if changed.is_some() {
            self.stats.state_changes += 1;
        }
        Ok(changed)
    }

    fn member_state_changed(&mut self, port: PortId, operable: bool) {
        let changes: Vec<(LagId, bool)> = self
            .staged
            .committed_mut()
            .values_mut()
            .filter_map(|lag| lag.set_member_state(port, operable).map(|up| (lag.id(), up)))
            .collect();
        for (lag, up) in changes {
            self.stats.state_changes += 1;
            publish_lag_state(&self.bus, lag, up);
        }
    }
}

impl Observer for LagManager {
    fn kind(&self) -> ObserverKind {
        LAG_OBSERVER
    }

    fn interests(&self) -> &[UpdateReason] {
        LAG_INTERESTS
    }

    fn update(&mut self, notification: &Notification) -> CoreResult<()> {
        let operable = match notification.reason {
            UpdateReason::PortUp => true,
            UpdateReason::PortDown => false,
            reason => return Err(CoreError::update_reason_not_supported("lag manager", reason)),
        };
        let Payload::Port(port) = notification.payload else {
            return Err(CoreError::fail(format!(
                "{} without a port payload",
                notification.reason
            )));
        };
        self.member_state_changed(port, operable);
        Ok(())
    }
}

impl std::fmt::Debug for LagManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LagManager")
            .field("staged", &self.staged)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// LAG member addition, run by the dispatch scheduler.
#[derive(Debug, Clone, Copy)]
pub struct LagMemberAddTask {
    lag: LagId,
    port: PortId,
}

impl LagMemberAddTask {
    pub fn new(lag: LagId, port: PortId) -> Self {
        Self { lag, port }
    }
}

impl DispatchTask<SwitchContext> for LagMemberAddTask {
    fn describe(&self) -> String {
        format!("add port {} to lag {}", self.port, self.lag)
    }

    fn run(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        let (hw_port, operable) = {
            let ports = ctx.ports.borrow();
            let port = ports.port(self.port)?;
            (port.hw_port(), port.is_operable())
        };
        let changed = ctx
            .lags
            .borrow_mut()
            .add_member(self.lag, self.port, hw_port, operable)?;
        if let Some(up) = changed {
            publish_lag_state(&ctx.bus, self.lag, up);
        }
        Ok(())
    }
}

/// Detaches a member from its LAG ahead of the port's deletion.
#[derive(Debug)]
pub struct LagMemberRemoveCommand {
    lag: LagId,
    port: PortId,
    /// Member operability at removal.
    removed: Option<bool>,
}

impl LagMemberRemoveCommand {
    pub fn new(lag: LagId, port: PortId) -> Self {
        Self {
            lag,
            port,
            removed: None,
        }
    }
}

impl Command<SwitchContext> for LagMemberRemoveCommand {
    fn commit_order(&self) -> CommitOrder {
        CommitOrder::LagRemoveMemberPorts
    }

    fn describe(&self) -> String {
        format!("remove port {} from lag {}", self.port, self.lag)
    }

    fn execute(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        let operable = ctx
            .lags
            .borrow()
            .lag(self.lag)?
            .member_state(self.port)
            .ok_or_else(|| {
                CoreError::not_exists("lag member", format!("port {} in lag {}", self.port, self.lag))
            })?;
        let changed = ctx.lags.borrow_mut().remove_member(self.lag, self.port)?;
        self.removed = Some(operable);
        if let Some(up) = changed {
            publish_lag_state(&ctx.bus, self.lag, up);
        }
        Ok(())
    }

    fn is_undoable(&self) -> bool {
        true
    }

    fn undo(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        let was_operable = self
            .removed
            .take()
            .ok_or_else(|| CoreError::command_not_undoable(self.describe()))?;
        let hw_port = ctx.hw.hw_port_of(self.port)?;
        // a re-created port starts from its own link state
        let operable = ctx
            .ports
            .borrow()
            .port(self.port)
            .map_or(was_operable, |port| port.is_operable());
        let changed = ctx
            .lags
            .borrow_mut()
            .add_member(self.lag, self.port, hw_port, operable)?;
        if let Some(up) = changed {
            publish_lag_state(&ctx.bus, self.lag, up);
        }
        Ok(())
    }
}
