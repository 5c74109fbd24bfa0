//! Entity creation and deletion as batch commands.
//!
//! [`CreatePhase`] and [`DeletePhase`] run the addition and removal halves
//! of one controller's staged manager at that entity type's ordering key.

use crate::context::SwitchContext;
use log::error;
use opennos_core::{
    Command, CommitOrder, CoreResult, EntityFactory, Payload, StagedManager, Subject, UpdateReason,
};
use opennos_types::VlanId;
use std::cell::RefMut;
use std::marker::PhantomData;

type IdOf<S> = <<S as StagedEntities>::Factory as EntityFactory>::Id;

/// Picks one controller's staged manager out of the context.
pub(crate) trait StagedEntities: 'static {
    type Factory: EntityFactory;

    fn select(ctx: &SwitchContext) -> RefMut<'_, StagedManager<Self::Factory>>;

    /// Runs after entities were created, with no controller borrowed.
    fn created(_ctx: &SwitchContext, _ids: &[IdOf<Self>]) {}

    /// Runs after entities were destroyed, with no controller borrowed.
    fn destroyed(_ctx: &SwitchContext, _ids: &[IdOf<Self>]) {}
}

pub(crate) enum PortEntities {}

impl StagedEntities for PortEntities {
    type Factory = crate::ports::PortFactory;

    fn select(ctx: &SwitchContext) -> RefMut<'_, StagedManager<Self::Factory>> {
        RefMut::map(ctx.ports.borrow_mut(), |ports| ports.staged_mut())
    }
}

pub(crate) enum VlanEntities {}

impl VlanEntities {
    fn publish(ctx: &SwitchContext, reason: UpdateReason, ids: &[VlanId]) {
        for vlan in ids {
            ctx.bus.notify(Subject::Vlans, reason, Payload::Vlan(*vlan));
        }
    }
}

impl StagedEntities for VlanEntities {
    type Factory = crate::vlan::VlanFactory;

    fn select(ctx: &SwitchContext) -> RefMut<'_, StagedManager<Self::Factory>> {
        RefMut::map(ctx.vlans.borrow_mut(), |vlans| vlans.staged_mut())
    }

    fn created(ctx: &SwitchContext, ids: &[VlanId]) {
        Self::publish(ctx, UpdateReason::VlanCreate, ids);
    }

    fn destroyed(ctx: &SwitchContext, ids: &[VlanId]) {
        Self::publish(ctx, UpdateReason::VlanDestroy, ids);
    }
}

pub(crate) enum LagEntities {}

impl StagedEntities for LagEntities {
    type Factory = crate::lag::LagFactory;

    fn select(ctx: &SwitchContext) -> RefMut<'_, StagedManager<Self::Factory>> {
        RefMut::map(ctx.lags.borrow_mut(), |lags| lags.staged_mut())
    }
}

pub(crate) enum StpEntities {}

impl StagedEntities for StpEntities {
    type Factory = crate::stp::StpFactory;

    fn select(ctx: &SwitchContext) -> RefMut<'_, StagedManager<Self::Factory>> {
        RefMut::map(ctx.stps.borrow_mut(), |stps| stps.staged_mut())
    }
}

fn describe_ids<I: std::fmt::Display>(ids: &[I]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Creates every staged addition of one entity type.
pub(crate) struct CreatePhase<S: StagedEntities> {
    ids: Vec<IdOf<S>>,
    _entities: PhantomData<S>,
}

impl<S: StagedEntities> CreatePhase<S> {
    pub(crate) fn new(ids: Vec<IdOf<S>>) -> Self {
        Self {
            ids,
            _entities: PhantomData,
        }
    }
}

impl<S: StagedEntities> Command<SwitchContext> for CreatePhase<S> {
    fn commit_order(&self) -> CommitOrder {
        <S::Factory as EntityFactory>::CREATE_ORDER
    }

    fn describe(&self) -> String {
        format!("create {} [{}]", <S::Factory as EntityFactory>::KIND, describe_ids(&self.ids))
    }

    fn execute(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        let created: Vec<IdOf<S>> = {
            let mut staged = S::select(ctx);
            staged.commit_additions()?;
            staged.memento_added().iter().copied().collect()
        };
        S::created(ctx, &created);
        Ok(())
    }

    fn is_undoable(&self) -> bool {
        true
    }

    fn undo(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        let (destroyed, result) = {
            let mut staged = S::select(ctx);
            let added: Vec<IdOf<S>> = staged.memento_added().iter().copied().collect();
            let result = staged.revert_additions();
            let destroyed: Vec<IdOf<S>> =
                added.into_iter().filter(|id| !staged.exists(*id)).collect();
            (destroyed, result)
        };
        S::destroyed(ctx, &destroyed);
        if let Err(err) = &result {
            error!("undo of {} failed: {}", self.describe(), err);
        }
        result
    }
}

/// Destroys every staged removal of one entity type.
pub(crate) struct DeletePhase<S: StagedEntities> {
    ids: Vec<IdOf<S>>,
    _entities: PhantomData<S>,
}

impl<S: StagedEntities> DeletePhase<S> {
    pub(crate) fn new(ids: Vec<IdOf<S>>) -> Self {
        Self {
            ids,
            _entities: PhantomData,
        }
    }
}

impl<S: StagedEntities> Command<SwitchContext> for DeletePhase<S> {
    fn commit_order(&self) -> CommitOrder {
        <S::Factory as EntityFactory>::DELETE_ORDER
    }

    fn describe(&self) -> String {
        format!("delete {} [{}]", <S::Factory as EntityFactory>::KIND, describe_ids(&self.ids))
    }

    fn execute(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        let destroyed: Vec<IdOf<S>> = {
            let mut staged = S::select(ctx);
            staged.commit_removals()?;
            staged.memento_removed().iter().copied().collect()
        };
        S::destroyed(ctx, &destroyed);
        Ok(())
    }

    fn is_undoable(&self) -> bool {
        true
    }

    fn undo(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        let (created, result) = {
            let mut staged = S::select(ctx);
            let removed: Vec<IdOf<S>> = staged.memento_removed().iter().copied().collect();
            let result = staged.revert_removals();
            let created: Vec<IdOf<S>> =
                removed.into_iter().filter(|id| staged.exists(*id)).collect();
            (created, result)
        };
        S::created(ctx, &created);
        if let Err(err) = &result {
            error!("undo of {} failed: {}", self.describe(), err);
        }
        result
    }
}
