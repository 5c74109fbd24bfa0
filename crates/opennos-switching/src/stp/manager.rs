//! STP controller.

use super::types::StpInstance;
use crate::context::STP_OBSERVER;
use log::{debug, info};
use opennos_core::{
    CommitOrder, CoreError, CoreResult, EntityFactory, Notification, Observer, ObserverKind,
    Payload, StagedManager, UpdateReason,
};
use opennos_hal::{HwAbstraction, HwAbstractionExt, StpKind};
use opennos_types::{PortId, StpId, StpPortState, VlanId};
use std::sync::Arc;

pub struct StpFactory {
    hw: Arc<dyn HwAbstraction>,
}

impl EntityFactory for StpFactory {
    type Id = StpId;
    type Entity = StpInstance;

    const KIND: &'static str = "stp instance";
    const CREATE_ORDER: CommitOrder = CommitOrder::StpCreate;
    const DELETE_ORDER: CommitOrder = CommitOrder::StpDelete;

    fn create(&mut self, id: StpId) -> CoreResult<StpInstance> {
        let handle = self.hw.create::<StpKind>(u32::from(id.as_u16()))?;
        Ok(StpInstance::new(id, handle))
    }

    fn destroy(&mut self, _id: StpId, instance: &StpInstance) -> CoreResult<()> {
        self.hw.destroy(instance.handle())?;
        Ok(())
    }
}

/// STP controller statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StpStats {
    pub vlans_mapped: u64,
    pub vlans_unmapped: u64,
    pub state_updates: u64,
}

const STP_INTERESTS: &[UpdateReason] = &[UpdateReason::VlanDestroy];

/// Staged STP instance set. Observes `VlanDestroy` and drops the VLAN from
/// whichever instance carries it.
pub struct StpManager {
    staged: StagedManager<StpFactory>,
    hw: Arc<dyn HwAbstraction>,
    stats: StpStats,
}

impl StpManager {
    pub fn new(hw: Arc<dyn HwAbstraction>) -> Self {
        Self {
            staged: StagedManager::new(StpFactory { hw: Arc::clone(&hw) }),
            hw,
            stats: StpStats::default(),
        }
    }

    pub fn add_instance(&mut self, id: StpId) -> CoreResult<()> {
        self.staged.add(id)?;
        debug!("staged creation of stp instance {}", id);
        Ok(())
    }

    pub fn remove_instance(&mut self, id: StpId) -> CoreResult<()> {
        self.staged.remove(id)?;
        debug!("staged removal of stp instance {}", id);
        Ok(())
    }

    pub fn exists(&self, id: StpId) -> bool {
        self.staged.exists(id)
    }

    pub fn instance(&self, id: StpId) -> CoreResult<&StpInstance> {
        self.staged.get(id)
    }

    pub fn instances(&self) -> impl Iterator<Item = &StpInstance> {
        self.staged.committed().values()
    }

    /// Instance carrying `vlan`, if any.
    pub fn instance_of(&self, vlan: VlanId) -> Option<StpId> {
        self.instances()
            .find(|instance| instance.has_vlan(vlan))
            .map(|instance| instance.id())
    }

    pub fn staged(&self) -> &StagedManager<StpFactory> {
        &self.staged
    }

    pub fn staged_mut(&mut self) -> &mut StagedManager<StpFactory> {
        &mut self.staged
    }

    pub fn has_pending(&self) -> bool {
        self.staged.has_pending()
    }

    pub fn discard_pending(&mut self) {
        self.staged.discard_pending();
    }

    pub fn stats(&self) -> &StpStats {
        &self.stats
    }

    /// Maps `vlan` to instance `id`. A VLAN belongs to at most one instance.
    pub fn map_vlan(&mut self, id: StpId, vlan: VlanId) -> CoreResult<()> {
        if let Some(owner) = self.instance_of(vlan) {
            return Err(CoreError::already_exists(
                "stp vlan",
                format!("vlan {} in stp instance {}", vlan, owner),
            ));
        }
        self.staged.get_mut(id)?.insert_vlan(vlan);
        self.stats.vlans_mapped += 1;
        info!("mapped vlan {} to stp instance {}", vlan, id);
        Ok(())
    }

    pub fn unmap_vlan(&mut self, id: StpId, vlan: VlanId) -> CoreResult<()> {
        if !self.staged.get_mut(id)?.remove_vlan(vlan) {
            return Err(CoreError::not_exists(
                "stp vlan",
                format!("vlan {} in stp instance {}", vlan, id),
            ));
        }
        self.stats.vlans_unmapped += 1;
        info!("unmapped vlan {} from stp instance {}", vlan, id);
        Ok(())
    }

    /// Sets the state of `port` in instance `id`, returning the previous one.
    pub fn set_port_state(
        &mut self,
        id: StpId,
        port: PortId,
        state: StpPortState,
    ) -> CoreResult<StpPortState> {
        let hw_port = self
            .hw
            .panel_port_to_hw_port(port)
            .ok_or(CoreError::PortNotExists(port))?;
        let previous = self
            .staged
            .get_mut(id)?
            .set_port_state(self.hw.as_ref(), port, hw_port, state)?;
        self.stats.state_updates += 1;
        debug!(
            "stp instance {} port {}: {} -> {}",
            id,
            port,
            previous.as_str(),
            state.as_str()
        );
        Ok(previous)
    }

    fn vlan_destroyed(&mut self, vlan: VlanId) {
        for instance in self.staged.committed_mut().values_mut() {
            if instance.remove_vlan(vlan) {
                self.stats.vlans_unmapped += 1;
                info!(
                    "dropped destroyed vlan {} from stp instance {}",
                    vlan,
                    instance.id()
                );
            }
        }
    }
}

impl Observer for StpManager {
    fn kind(&self) -> ObserverKind {
        STP_OBSERVER
    }

    fn interests(&self) -> &[UpdateReason] {
        STP_INTERESTS
    }

    fn update(&mut self, notification: &Notification) -> CoreResult<()> {
        match (notification.reason, &notification.payload) {
            (UpdateReason::VlanDestroy, Payload::Vlan(vlan)) => {
                self.vlan_destroyed(*vlan);
                Ok(())
            }
            (UpdateReason::VlanDestroy, payload) => Err(CoreError::fail(format!(
                "vlan destroy without a vlan payload: {:?}",
                payload
            ))),
            (reason, _) => Err(CoreError::update_reason_not_supported("stp manager", reason)),
        }
    }
}

impl std::fmt::Debug for StpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StpManager")
            .field("staged", &self.staged)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opennos_core::{NullResultCallback, ResultCode, Subject};
    use opennos_hal::{PortMapping, SimulatedAsic};
    use opennos_types::HwPortId;
    use pretty_assertions::assert_eq;

    fn vid(id: u16) -> VlanId {
        VlanId::new(id).unwrap()
    }

    fn manager() -> (Arc<SimulatedAsic>, StpManager) {
        let asic = Arc::new(SimulatedAsic::new(PortMapping::identity(8)));
        asic.init().unwrap();
        let mut stps = StpManager::new(asic.clone());
        stps.add_instance(StpId::new(1)).unwrap();
        stps.add_instance(StpId::new(2)).unwrap();
        stps.staged_mut().commit(&NullResultCallback).unwrap();
        (asic, stps)
    }

    #[test]
    fn test_vlan_belongs_to_one_instance() {
        let (_asic, mut stps) = manager();
        stps.map_vlan(StpId::new(1), vid(10)).unwrap();
        let err = stps.map_vlan(StpId::new(2), vid(10)).unwrap_err();
        assert_eq!(err.code(), ResultCode::AlreadyExists);
        assert_eq!(stps.instance_of(vid(10)), Some(StpId::new(1)));

        stps.unmap_vlan(StpId::new(1), vid(10)).unwrap();
        assert_eq!(
            stps.unmap_vlan(StpId::new(1), vid(10)).unwrap_err().code(),
            ResultCode::NotExists
        );
    }

    #[test]
    fn test_vlan_destroy_drops_mapping() {
        let (_asic, mut stps) = manager();
        stps.map_vlan(StpId::new(2), vid(20)).unwrap();

        let notification = Notification::new(
            Subject::Vlans,
            UpdateReason::VlanDestroy,
            Payload::Vlan(vid(20)),
        );
        stps.update(&notification).unwrap();
        assert_eq!(stps.instance_of(vid(20)), None);
        assert_eq!(stps.stats().vlans_unmapped, 1);
    }

    #[test]
    fn test_port_state() {
        let (asic, mut stps) = manager();
        let port = PortId::new(3);
        let previous = stps
            .set_port_state(StpId::new(1), port, StpPortState::Forwarding)
            .unwrap();
        assert_eq!(previous, StpPortState::Blocking);

        let instance = stps.instance(StpId::new(1)).unwrap();
        assert_eq!(instance.port_state(port), StpPortState::Forwarding);
        assert_eq!(
            asic.stp_port_state(instance.handle(), HwPortId::new(3)),
            Some(StpPortState::Forwarding)
        );
    }

    #[test]
    fn test_unknown_instance_and_port() {
        let (_asic, mut stps) = manager();
        assert_eq!(
            stps.set_port_state(StpId::new(9), PortId::new(1), StpPortState::Disabled)
                .unwrap_err()
                .code(),
            ResultCode::NotExists
        );
        assert_eq!(
            stps.set_port_state(StpId::new(1), PortId::new(50), StpPortState::Disabled)
                .unwrap_err(),
            CoreError::PortNotExists(PortId::new(50))
        );
    }

    #[test]
    fn test_unsupported_reason() {
        let (_asic, mut stps) = manager();
        let notification =
            Notification::new(Subject::Vlans, UpdateReason::VlanCreate, Payload::None);
        assert_eq!(
            stps.update(&notification).unwrap_err().code(),
            ResultCode::UpdateReasonNotSupported
        );
    }
}
