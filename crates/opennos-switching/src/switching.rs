//! The switching facade: one object owning the controllers, the observer
//! bus, the link event bridge and the dispatch scheduler.
//!
//! Callers stage changes through the controller-level methods, then
//! [`Switching::commit`] turns everything staged into a single ordered
//! batch. [`Switching::run_once`] is one turn of the owning thread's loop.

use crate::config::SwitchingConfig;
use crate::context::{publish_lag_state, SwitchContext};
use crate::lag::{LagManager, LagMemberAddTask, LagMemberRemoveCommand};
use crate::phase::{CreatePhase, DeletePhase, LagEntities, PortEntities, StpEntities, VlanEntities};
use crate::ports::{FdbFlushCommand, PortDeinitCommand, PortInitCommand, PortManager, PortSettingExecutor};
use crate::stp::StpManager;
use crate::vlan::{VlanManager, VlanMemberAddTask};
use log::{debug, error, info, warn};
use opennos_core::{
    report_result, CommitBatch, CoreError, CoreResult, DispatchReport, LinkEventBridge,
    LinkEventSink, NotifyReport, ResourceClass, ResultCallback,
};
use opennos_hal::HwAbstraction;
use opennos_types::{LagId, PortId, StpId, StpPortState, TaggingMode, VlanId};
use std::cell::Ref;
use std::sync::Arc;
use std::time::Duration;

/// What one [`Switching::run_once`] turn did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Delivery of the link batch, if one was pending.
    pub link: Option<NotifyReport>,
    pub dispatch: DispatchReport,
}

impl RunReport {
    pub fn is_idle(&self) -> bool {
        self.link.is_none() && self.dispatch.executed() == 0
    }
}

pub struct Switching {
    ctx: SwitchContext,
    bridge: LinkEventBridge,
    config: SwitchingConfig,
    last_batch: Option<CommitBatch<SwitchContext>>,
    initialized: bool,
}

impl Switching {
    pub fn new(hw: Arc<dyn HwAbstraction>, config: SwitchingConfig) -> Self {
        let ctx = SwitchContext::new(Arc::clone(&hw));
        ctx.register_observers();
        let bridge = LinkEventBridge::new(config.bridge_capacity(), move |hw_port| {
            hw.hw_port_to_panel_port(hw_port)
        });
        Self {
            ctx,
            bridge,
            config,
            last_batch: None,
            initialized: false,
        }
    }

    /// Brings the hardware up, hooks the link-scan callback and commits the
    /// configured initial ports.
    pub fn init(&mut self, callback: &dyn ResultCallback) -> CoreResult<()> {
        if self.initialized {
            let result = Err(CoreError::fail("switching core is already initialized"));
            report_result(callback, &result);
            return result;
        }

        let hw_up = self
            .ctx
            .hw
            .init()
            .and_then(|()| {
                self.ctx
                    .hw
                    .register_link_scan_callback(self.bridge.sink().into_callback())
            })
            .map_err(|err| CoreError::fail(format!("hardware initialization failed: {}", err)));
        if let Err(err) = hw_up {
            error!("{}", err);
            let result = Err(err);
            report_result(callback, &result);
            return result;
        }
        self.initialized = true;
        info!(
            "hardware unit {} initialized, cpu port {}",
            self.config.asic.unit, self.config.asic.cpu_port
        );

        let initial = self.config.ports.initial.clone();
        if initial.is_empty() {
            report_result(callback, &Ok(()));
            return Ok(());
        }
        let staged = initial.into_iter().try_for_each(|port| self.add_port(port));
        if let Err(err) = staged {
            self.discard_pending();
            let result = Err(err);
            report_result(callback, &result);
            return result;
        }
        self.commit(callback)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &SwitchingConfig {
        &self.config
    }

    pub fn context(&self) -> &SwitchContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut SwitchContext {
        &mut self.ctx
    }

    pub fn ports(&self) -> Ref<'_, PortManager> {
        self.ctx.ports.borrow()
    }

    pub fn vlans(&self) -> Ref<'_, VlanManager> {
        self.ctx.vlans.borrow()
    }

    pub fn lags(&self) -> Ref<'_, LagManager> {
        self.ctx.lags.borrow()
    }

    pub fn stps(&self) -> Ref<'_, StpManager> {
        self.ctx.stps.borrow()
    }

    /// Producer handle of the link event bridge.
    pub fn link_sink(&self) -> LinkEventSink {
        self.bridge.sink()
    }

    pub fn add_port(&mut self, port: PortId) -> CoreResult<()> {
        self.ctx.ports.borrow_mut().add_port(port)
    }

    pub fn remove_port(&mut self, port: PortId) -> CoreResult<()> {
        self.ctx.ports.borrow_mut().remove_port(port)
    }

    pub fn set_port(&mut self, setting: PortSettingExecutor) -> CoreResult<()> {
        self.ctx.ports.borrow_mut().stage_setting(setting)
    }

    pub fn stage_fdb_flush(&mut self, port: PortId) -> CoreResult<()> {
        self.ctx.ports.borrow_mut().stage_fdb_flush(port)
    }

    pub fn add_vlan(&mut self, vlan: VlanId) -> CoreResult<()> {
        self.ctx.vlans.borrow_mut().add_vlan(vlan)
    }

    pub fn remove_vlan(&mut self, vlan: VlanId) -> CoreResult<()> {
        self.ctx.vlans.borrow_mut().remove_vlan(vlan)
    }

    pub fn add_vlan_member(&mut self, vlan: VlanId, port: PortId, mode: TaggingMode) -> CoreResult<()> {
        if !self.ctx.ports.borrow().staged().is_known(port) {
            return Err(CoreError::PortNotExists(port));
        }
        self.ctx.vlans.borrow_mut().add_member(vlan, port, mode)
    }

    pub fn remove_vlan_member(&mut self, vlan: VlanId, port: PortId) -> CoreResult<()> {
        self.ctx.vlans.borrow_mut().remove_member(vlan, port)
    }

    pub fn add_lag(&mut self, lag: LagId) -> CoreResult<()> {
        self.ctx.lags.borrow_mut().add_lag(lag)
    }

    pub fn remove_lag(&mut self, lag: LagId) -> CoreResult<()> {
        self.ctx.lags.borrow_mut().remove_lag(lag)
    }

    pub fn add_stp(&mut self, id: StpId) -> CoreResult<()> {
        self.ctx.stps.borrow_mut().add_instance(id)
    }

    pub fn remove_stp(&mut self, id: StpId) -> CoreResult<()> {
        self.ctx.stps.borrow_mut().remove_instance(id)
    }

    /// Queues a LAG member addition on the dispatch scheduler.
    pub fn enqueue_lag_member(&self, lag: LagId, port: PortId) -> CoreResult<()> {
        self.ctx.lags.borrow().validate_member(lag, port)?;
        self.ctx.ports.borrow().port(port)?;
        self.ctx
            .dispatcher
            .enqueue(ResourceClass::LagMemberAdd, LagMemberAddTask::new(lag, port));
        Ok(())
    }

    /// Queues a VLAN member addition on the dispatch scheduler.
    pub fn enqueue_vlan_member(&self, vlan: VlanId, port: PortId, mode: TaggingMode) -> CoreResult<()> {
        if !self.ctx.vlans.borrow().exists(vlan) {
            return Err(CoreError::VlanNotExists(vlan));
        }
        self.ctx.ports.borrow().port(port)?;
        self.ctx.dispatcher.enqueue(
            ResourceClass::VlanMemberAdd,
            VlanMemberAddTask::new(vlan, port, mode),
        );
        Ok(())
    }

    /// Removes a LAG member immediately.
    pub fn remove_lag_member(&mut self, lag: LagId, port: PortId) -> CoreResult<()> {
        let changed = self.ctx.lags.borrow_mut().remove_member(lag, port)?;
        if let Some(up) = changed {
            publish_lag_state(&self.ctx.bus, lag, up);
        }
        Ok(())
    }

    pub fn map_stp_vlan(&mut self, id: StpId, vlan: VlanId) -> CoreResult<()> {
        if !self.ctx.vlans.borrow().exists(vlan) {
            return Err(CoreError::VlanNotExists(vlan));
        }
        self.ctx.stps.borrow_mut().map_vlan(id, vlan)
    }

    pub fn unmap_stp_vlan(&mut self, id: StpId, vlan: VlanId) -> CoreResult<()> {
        self.ctx.stps.borrow_mut().unmap_vlan(id, vlan)
    }

    /// Sets a port's state in one STP instance, returning the previous state.
    pub fn set_stp_port_state(
        &mut self,
        id: StpId,
        port: PortId,
        state: StpPortState,
    ) -> CoreResult<StpPortState> {
        self.ctx.stps.borrow_mut().set_port_state(id, port, state)
    }

    pub fn has_pending(&self) -> bool {
        self.ctx.ports.borrow().has_pending()
            || self.ctx.vlans.borrow().has_pending()
            || self.ctx.lags.borrow().has_pending()
            || self.ctx.stps.borrow().has_pending()
    }

    /// Drops everything staged in every controller.
    pub fn discard_pending(&mut self) {
        self.ctx.ports.borrow_mut().discard_pending();
        self.ctx.vlans.borrow_mut().discard_pending();
        self.ctx.lags.borrow_mut().discard_pending();
        self.ctx.stps.borrow_mut().discard_pending();
    }

    fn build_batch(&mut self) -> CommitBatch<SwitchContext> {
        let mut batch = CommitBatch::new();
        let departing: Vec<PortId> = self
            .ctx
            .ports
            .borrow()
            .staged()
            .to_remove()
            .iter()
            .copied()
            .collect();

        {
            let mut ports = self.ctx.ports.borrow_mut();
            let to_add: Vec<PortId> = ports.staged().to_add().iter().copied().collect();
            if !to_add.is_empty() {
                batch.push(CreatePhase::<PortEntities>::new(to_add.clone()));
                batch.push(PortInitCommand::new(to_add));
            }
            if !departing.is_empty() {
                batch.push(PortDeinitCommand::new(departing.clone()));
                batch.push(DeletePhase::<PortEntities>::new(departing.clone()));
            }
            for setting in ports.take_settings() {
                batch.push(setting);
            }
            for port in ports.take_flushes() {
                batch.push(FdbFlushCommand::new(port));
            }
        }

        {
            let mut vlans = self.ctx.vlans.borrow_mut();
            // deleted ports leave their VLANs first
            for &port in &departing {
                vlans.stage_port_departure(port);
            }
            let to_add: Vec<VlanId> = vlans.staged().to_add().iter().copied().collect();
            let to_remove: Vec<VlanId> = vlans.staged().to_remove().iter().copied().collect();
            if !to_add.is_empty() {
                batch.push(CreatePhase::<VlanEntities>::new(to_add));
            }
            if !to_remove.is_empty() {
                batch.push(DeletePhase::<VlanEntities>::new(to_remove));
            }
            let (adds, removes) = vlans.take_member_commands();
            for command in adds {
                batch.push(command);
            }
            for command in removes {
                batch.push(command);
            }
        }

        {
            let lags = self.ctx.lags.borrow();
            for &port in &departing {
                if let Some(lag) = lags.lag_of(port) {
                    batch.push(LagMemberRemoveCommand::new(lag, port));
                }
            }
            let to_add: Vec<LagId> = lags.staged().to_add().iter().copied().collect();
            let to_remove: Vec<LagId> = lags.staged().to_remove().iter().copied().collect();
            if !to_add.is_empty() {
                batch.push(CreatePhase::<LagEntities>::new(to_add));
            }
            if !to_remove.is_empty() {
                batch.push(DeletePhase::<LagEntities>::new(to_remove));
            }
        }

        {
            let stps = self.ctx.stps.borrow();
            let to_add: Vec<StpId> = stps.staged().to_add().iter().copied().collect();
            let to_remove: Vec<StpId> = stps.staged().to_remove().iter().copied().collect();
            if !to_add.is_empty() {
                batch.push(CreatePhase::<StpEntities>::new(to_add));
            }
            if !to_remove.is_empty() {
                batch.push(DeletePhase::<StpEntities>::new(to_remove));
            }
        }

        batch
    }

    /// Commits everything staged in every controller as one ordered batch.
    ///
    /// On failure the batch rolls back and whatever was staged is dropped.
    pub fn commit(&mut self, callback: &dyn ResultCallback) -> CoreResult<()> {
        let mut batch = self.build_batch();
        if batch.is_empty() {
            debug!("commit with nothing staged");
            let result = Ok(());
            report_result(callback, &result);
            return result;
        }

        let result = batch.commit(&mut self.ctx, callback);
        self.discard_pending();
        match &result {
            Ok(()) => self.last_batch = Some(batch),
            Err(err) => {
                warn!("dropped staged changes after failed commit: {}", err);
                self.last_batch = None;
            }
        }
        result
    }

    /// Reverts the last successful commit.
    pub fn undo(&mut self, callback: &dyn ResultCallback) -> CoreResult<()> {
        match self.last_batch.take() {
            Some(mut batch) => batch.undo(&mut self.ctx, callback),
            None => {
                let result = Err(CoreError::command_not_undoable("no committed batch to undo"));
                report_result(callback, &result);
                result
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.last_batch.is_some()
    }

    /// Waits up to `timeout` for coalesced link events and delivers them on
    /// the link-scan subject.
    pub fn process_link_events(&mut self, timeout: Duration) -> Option<NotifyReport> {
        let batch = self.bridge.wait_batch_timeout(timeout)?;
        if batch.is_empty() {
            return None;
        }
        info!("delivering link status of {} ports", batch.ports.len());
        let report = self.ctx.bus.publish(&batch.into_notification());
        if !report.is_clean() {
            warn!("{} observers failed on link status update", report.failed);
        }
        Some(report)
    }

    /// Runs one round-robin pass of the dispatch scheduler.
    pub fn dispatch_pass(&mut self) -> DispatchReport {
        let dispatcher = Arc::clone(&self.ctx.dispatcher);
        dispatcher.dispatch_pass(&mut self.ctx)
    }

    /// One turn of the owning thread: link events, then one dispatch pass.
    pub fn run_once(&mut self, timeout: Duration) -> RunReport {
        let link = self.process_link_events(timeout);
        let dispatch = self.dispatch_pass();
        RunReport { link, dispatch }
    }

    /// Wakes a thread blocked in [`process_link_events`](Self::process_link_events)
    /// for teardown.
    pub fn shutdown(&self) {
        self.bridge.sink().shutdown();
        info!("switching core shutting down");
    }
}

impl std::fmt::Debug for Switching {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switching")
            .field("ctx", &self.ctx)
            .field("initialized", &self.initialized)
            .field("can_undo", &self.last_batch.is_some())
            .finish_non_exhaustive()
    }
}
