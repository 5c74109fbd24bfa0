//! VLAN controller.

use super::members::{VlanMemberAddCommand, VlanMemberRemoveCommand};
use super::types::Vlan;
use log::debug;
use opennos_core::{CommitOrder, CoreError, CoreResult, EntityFactory, StagedManager};
use opennos_hal::{HwAbstraction, HwAbstractionExt, VlanKind};
use opennos_types::{PortId, TaggingMode, VlanId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub struct VlanFactory {
    hw: Arc<dyn HwAbstraction>,
}

impl EntityFactory for VlanFactory {
    type Id = VlanId;
    type Entity = Vlan;

    const KIND: &'static str = "vlan";
    const CREATE_ORDER: CommitOrder = CommitOrder::VlanCreate;
    const DELETE_ORDER: CommitOrder = CommitOrder::VlanDelete;

    fn create(&mut self, id: VlanId) -> CoreResult<Vlan> {
        let handle = self.hw.create::<VlanKind>(u32::from(id.as_u16()))?;
        Ok(Vlan::new(id, handle))
    }

    fn destroy(&mut self, _id: VlanId, vlan: &Vlan) -> CoreResult<()> {
        self.hw.destroy(vlan.handle())?;
        Ok(())
    }
}

/// Staged VLAN set plus staged membership changes.
pub struct VlanManager {
    staged: StagedManager<VlanFactory>,
    members_to_add: BTreeMap<(VlanId, PortId), TaggingMode>,
    members_to_remove: BTreeSet<(VlanId, PortId)>,
}

impl VlanManager {
    pub fn new(hw: Arc<dyn HwAbstraction>) -> Self {
        Self {
            staged: StagedManager::new(VlanFactory { hw }),
            members_to_add: BTreeMap::new(),
            members_to_remove: BTreeSet::new(),
        }
    }

    pub fn add_vlan(&mut self, id: VlanId) -> CoreResult<()> {
        self.staged.add(id)?;
        debug!("staged creation of vlan {}", id);
        Ok(())
    }

    /// Stages removal of a committed VLAN. Cancelling a staged creation also
    /// drops the member additions staged into it.
    pub fn remove_vlan(&mut self, id: VlanId) -> CoreResult<()> {
        if self.staged.to_add().contains(&id) {
            self.members_to_add.retain(|(vlan, _), _| *vlan != id);
        }
        self.staged.remove(id).map_err(|err| match err {
            CoreError::NotExists { .. } => CoreError::VlanNotExists(id),
            other => other,
        })?;
        debug!("staged removal of vlan {}", id);
        Ok(())
    }

    /// Stages `port` as a member of `vlan`.
    ///
    /// The VLAN must be committed or staged for creation. Staging a
    /// different tagging mode for an existing member re-tags it.
    pub fn add_member(&mut self, vlan: VlanId, port: PortId, mode: TaggingMode) -> CoreResult<()> {
        if !self.staged.is_known(vlan) {
            return Err(CoreError::VlanNotExists(vlan));
        }
        self.members_to_remove.remove(&(vlan, port));
        if let Ok(committed) = self.staged.get(vlan) {
            if committed.member_mode(port) == Some(mode) {
                return Err(CoreError::already_exists(
                    "vlan member",
                    format!("port {} in vlan {}", port, vlan),
                ));
            }
        }
        self.members_to_add.insert((vlan, port), mode);
        debug!("staged port {} into vlan {} as {}", port, vlan, mode);
        Ok(())
    }

    /// Stages removal of `port` from `vlan`. A staged addition of the same
    /// member is cancelled first.
    pub fn remove_member(&mut self, vlan: VlanId, port: PortId) -> CoreResult<()> {
        if !self.staged.is_known(vlan) {
            return Err(CoreError::VlanNotExists(vlan));
        }
        self.members_to_add.remove(&(vlan, port));
        let is_member = self
            .staged
            .get(vlan)
            .is_ok_and(|committed| committed.is_member(port));
        if !is_member {
            return Err(CoreError::port_in_vlan_not_exists(port, vlan));
        }
        self.members_to_remove.insert((vlan, port));
        debug!("staged port {} out of vlan {}", port, vlan);
        Ok(())
    }

    /// Stages removal of every committed membership of a port that is about
    /// to be deleted, dropping member additions staged for it.
    pub(crate) fn stage_port_departure(&mut self, port: PortId) {
        self.members_to_add.retain(|(_, member), _| *member != port);
        for vlan in self.vlans_of(port) {
            if self.members_to_remove.insert((vlan, port)) {
                debug!("staged port {} out of vlan {} ahead of its deletion", port, vlan);
            }
        }
    }

    pub fn exists(&self, id: VlanId) -> bool {
        self.staged.exists(id)
    }

    /// True when the VLAN is committed or staged for creation.
    pub fn is_known(&self, id: VlanId) -> bool {
        self.staged.is_known(id)
    }

    pub fn vlan(&self, id: VlanId) -> CoreResult<&Vlan> {
        self.staged.get(id).map_err(|_| CoreError::VlanNotExists(id))
    }

    pub fn vlan_mut(&mut self, id: VlanId) -> CoreResult<&mut Vlan> {
        self.staged.get_mut(id).map_err(|_| CoreError::VlanNotExists(id))
    }

    pub fn vlans(&self) -> impl Iterator<Item = &Vlan> {
        self.staged.committed().values()
    }

    /// VLANs `port` is a committed member of.
    pub fn vlans_of(&self, port: PortId) -> Vec<VlanId> {
        self.vlans()
            .filter(|vlan| vlan.is_member(port))
            .map(|vlan| vlan.id())
            .collect()
    }

    pub fn staged(&self) -> &StagedManager<VlanFactory> {
        &self.staged
    }

    pub fn staged_mut(&mut self) -> &mut StagedManager<VlanFactory> {
        &mut self.staged
    }

    pub fn has_pending(&self) -> bool {
        self.staged.has_pending()
            || !self.members_to_add.is_empty()
            || !self.members_to_remove.is_empty()
    }

    pub(crate) fn take_member_commands(
        &mut self,
    ) -> (Vec<VlanMemberAddCommand>, Vec<VlanMemberRemoveCommand>) {
        let adds = std::mem::take(&mut self.members_to_add)
            .into_iter()
            .map(|((vlan, port), mode)| VlanMemberAddCommand::new(vlan, port, mode))
            .collect();
        let removes = std::mem::take(&mut self.members_to_remove)
            .into_iter()
            .map(|(vlan, port)| VlanMemberRemoveCommand::new(vlan, port))
            .collect();
        (adds, removes)
    }

    pub fn discard_pending(&mut self) {
        self.staged.discard_pending();
        self.members_to_add.clear();
        self.members_to_remove.clear();
    }
}

impl std::fmt::Debug for VlanManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VlanManager")
            .field("staged", &self.staged)
            .field("members_to_add", &self.members_to_add)
            .field("members_to_remove", &self.members_to_remove)
            .finish()
    }
}
