//! VLAN entity record.

use log::error;
use opennos_core::{CoreError, CoreResult};
use opennos_hal::{HwAbstraction, VlanHandle};
use opennos_types::{HwPortId, PortId, TaggingMode, VlanId};
use std::collections::BTreeMap;

/// A created VLAN and its member ports.
#[derive(Debug, Clone, PartialEq)]
pub struct Vlan {
    id: VlanId,
    handle: VlanHandle,
    members: BTreeMap<PortId, TaggingMode>,
}

impl Vlan {
    pub fn new(id: VlanId, handle: VlanHandle) -> Self {
        Self {
            id,
            handle,
            members: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> VlanId {
        self.id
    }

    pub fn handle(&self) -> VlanHandle {
        self.handle
    }

    pub fn members(&self) -> &BTreeMap<PortId, TaggingMode> {
        &self.members
    }

    pub fn is_member(&self, port: PortId) -> bool {
        self.members.contains_key(&port)
    }

    pub fn member_mode(&self, port: PortId) -> Option<TaggingMode> {
        self.members.get(&port).copied()
    }

    pub fn tagged_ports(&self) -> Vec<PortId> {
        self.ports_with(TaggingMode::Tagged)
    }

    pub fn untagged_ports(&self) -> Vec<PortId> {
        self.ports_with(TaggingMode::Untagged)
    }

    fn ports_with(&self, mode: TaggingMode) -> Vec<PortId> {
        self.members
            .iter()
            .filter(|(_, m)| **m == mode)
            .map(|(port, _)| *port)
            .collect()
    }

    /// Adds `port` with `mode`, re-tagging an existing member.
    ///
    /// Returns the previous tagging mode, `None` for a new member.
    pub fn program_member(
        &mut self,
        hw: &dyn HwAbstraction,
        port: PortId,
        hw_port: HwPortId,
        mode: TaggingMode,
    ) -> CoreResult<Option<TaggingMode>> {
        let previous = self.member_mode(port);
        match previous {
            Some(old) if old == mode => return Ok(previous),
            Some(old) => {
                hw.remove_vlan_member(self.handle, hw_port)?;
                if let Err(err) = hw.add_vlan_member(self.handle, hw_port, mode) {
                    if let Err(restore) = hw.add_vlan_member(self.handle, hw_port, old) {
                        error!(
                            "port {} lost membership of vlan {} while re-tagging: {}",
                            port, self.id, restore
                        );
                        self.members.remove(&port);
                    }
                    return Err(err.into());
                }
            }
            None => hw.add_vlan_member(self.handle, hw_port, mode)?,
        }
        self.members.insert(port, mode);
        Ok(previous)
    }

    /// Removes `port`, returning the tagging mode it had.
    pub fn unprogram_member(
        &mut self,
        hw: &dyn HwAbstraction,
        port: PortId,
        hw_port: HwPortId,
    ) -> CoreResult<TaggingMode> {
        let mode = self
            .member_mode(port)
            .ok_or_else(|| CoreError::port_in_vlan_not_exists(port, self.id))?;
        hw.remove_vlan_member(self.handle, hw_port)?;
        self.members.remove(&port);
        Ok(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opennos_hal::{HwAbstractionExt, HwOp, HwStatus, PortMapping, SimulatedAsic, VlanKind};
    use pretty_assertions::assert_eq;

    fn setup() -> (SimulatedAsic, Vlan) {
        let asic = SimulatedAsic::new(PortMapping::identity(8));
        asic.init().unwrap();
        let handle = asic.create::<VlanKind>(100).unwrap();
        let vlan = Vlan::new(VlanId::new(100).unwrap(), handle);
        (asic, vlan)
    }

    fn hw(port: i32) -> HwPortId {
        HwPortId::new(port)
    }

    #[test]
    fn test_add_and_retag_member() {
        let (asic, mut vlan) = setup();
        let port = PortId::new(3);

        assert_eq!(
            vlan.program_member(&asic, port, hw(3), TaggingMode::Untagged)
                .unwrap(),
            None
        );
        assert_eq!(
            vlan.program_member(&asic, port, hw(3), TaggingMode::Tagged)
                .unwrap(),
            Some(TaggingMode::Untagged)
        );
        assert_eq!(vlan.tagged_ports(), vec![port]);
        assert_eq!(
            asic.vlan_members(vlan.handle()),
            BTreeMap::from([(hw(3), TaggingMode::Tagged)])
        );
    }

    #[test]
    fn test_failed_retag_keeps_old_mode() {
        let (asic, mut vlan) = setup();
        let port = PortId::new(1);
        vlan.program_member(&asic, port, hw(1), TaggingMode::Untagged)
            .unwrap();

        asic.fail_next(HwOp::AddVlanMember, HwStatus::Internal);
        assert!(vlan
            .program_member(&asic, port, hw(1), TaggingMode::Tagged)
            .is_err());
        assert_eq!(vlan.member_mode(port), Some(TaggingMode::Untagged));
        assert_eq!(
            asic.vlan_members(vlan.handle()).get(&hw(1)),
            Some(&TaggingMode::Untagged)
        );
    }

    #[test]
    fn test_remove_non_member() {
        let (asic, mut vlan) = setup();
        let err = vlan
            .unprogram_member(&asic, PortId::new(2), hw(2))
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::port_in_vlan_not_exists(PortId::new(2), vlan.id())
        );
    }
}
