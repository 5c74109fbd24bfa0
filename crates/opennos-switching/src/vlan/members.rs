//! VLAN membership commands.

use crate::context::SwitchContext;
use opennos_core::{Command, CommitOrder, CoreError, CoreResult, DispatchTask};
use opennos_hal::HwAbstractionExt;
use opennos_types::{HwPortId, PortId, TaggingMode, VlanId};

fn member_hw_port(ctx: &SwitchContext, port: PortId) -> CoreResult<HwPortId> {
    Ok(ctx.ports.borrow().port(port)?.hw_port())
}

fn program(
    ctx: &SwitchContext,
    vlan: VlanId,
    port: PortId,
    mode: TaggingMode,
) -> CoreResult<Option<TaggingMode>> {
    let hw_port = member_hw_port(ctx, port)?;
    ctx.vlans
        .borrow_mut()
        .vlan_mut(vlan)?
        .program_member(ctx.hw.as_ref(), port, hw_port, mode)
}

fn unprogram(ctx: &SwitchContext, vlan: VlanId, port: PortId) -> CoreResult<TaggingMode> {
    // the port record may be gone already when undoing a port deletion
    let hw_port = ctx.hw.hw_port_of(port)?;
    ctx.vlans
        .borrow_mut()
        .vlan_mut(vlan)?
        .unprogram_member(ctx.hw.as_ref(), port, hw_port)
}

/// Adds (or re-tags) a VLAN member.
#[derive(Debug)]
pub struct VlanMemberAddCommand {
    vlan: VlanId,
    port: PortId,
    mode: TaggingMode,
    /// Tagging mode before execution; `Some(None)` for a new member.
    previous: Option<Option<TaggingMode>>,
}

impl VlanMemberAddCommand {
    pub fn new(vlan: VlanId, port: PortId, mode: TaggingMode) -> Self {
        Self {
            vlan,
            port,
            mode,
            previous: None,
        }
    }
}

impl Command<SwitchContext> for VlanMemberAddCommand {
    fn commit_order(&self) -> CommitOrder {
        CommitOrder::VlanAddMemberPorts
    }

    fn describe(&self) -> String {
        format!("add port {} to vlan {} {}", self.port, self.vlan, self.mode)
    }

    fn execute(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        let previous = program(ctx, self.vlan, self.port, self.mode)?;
        self.previous = Some(previous);
        Ok(())
    }

    fn is_undoable(&self) -> bool {
        true
    }

    fn undo(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        match self.previous.take() {
            None => Err(CoreError::command_not_undoable(self.describe())),
            Some(None) => unprogram(ctx, self.vlan, self.port).map(|_| ()),
            Some(Some(old)) => program(ctx, self.vlan, self.port, old).map(|_| ()),
        }
    }
}

/// Removes a VLAN member.
#[derive(Debug)]
pub struct VlanMemberRemoveCommand {
    vlan: VlanId,
    port: PortId,
    removed: Option<TaggingMode>,
}

impl VlanMemberRemoveCommand {
    pub fn new(vlan: VlanId, port: PortId) -> Self {
        Self {
            vlan,
            port,
            removed: None,
        }
    }
}

impl Command<SwitchContext> for VlanMemberRemoveCommand {
    fn commit_order(&self) -> CommitOrder {
        CommitOrder::VlanRemoveMemberPorts
    }

    fn describe(&self) -> String {
        format!("remove port {} from vlan {}", self.port, self.vlan)
    }

    fn execute(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        self.removed = Some(unprogram(ctx, self.vlan, self.port)?);
        Ok(())
    }

    fn is_undoable(&self) -> bool {
        true
    }

    fn undo(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        let mode = self
            .removed
            .take()
            .ok_or_else(|| CoreError::command_not_undoable(self.describe()))?;
        program(ctx, self.vlan, self.port, mode).map(|_| ())
    }
}

/// VLAN member addition queued on the dispatch scheduler instead of a batch.
#[derive(Debug, Clone, Copy)]
pub struct VlanMemberAddTask {
    vlan: VlanId,
    port: PortId,
    mode: TaggingMode,
}

impl VlanMemberAddTask {
    pub fn new(vlan: VlanId, port: PortId, mode: TaggingMode) -> Self {
        Self { vlan, port, mode }
    }
}

impl DispatchTask<SwitchContext> for VlanMemberAddTask {
    fn describe(&self) -> String {
        format!("add port {} to vlan {} {}", self.port, self.vlan, self.mode)
    }

    fn run(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        program(ctx, self.vlan, self.port, self.mode).map(|_| ())
    }
}
