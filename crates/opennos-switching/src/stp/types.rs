//! Spanning-tree instance record.

use opennos_core::CoreResult;
use opennos_hal::{HwAbstraction, StpHandle};
use opennos_types::{HwPortId, PortId, StpId, StpPortState, VlanId};
use std::collections::{BTreeMap, BTreeSet};

/// A created spanning-tree instance with its VLANs and port states.
#[derive(Debug, Clone, PartialEq)]
pub struct StpInstance {
    id: StpId,
    handle: StpHandle,
    vlans: BTreeSet<VlanId>,
    port_states: BTreeMap<PortId, StpPortState>,
}

impl StpInstance {
    pub fn new(id: StpId, handle: StpHandle) -> Self {
        Self {
            id,
            handle,
            vlans: BTreeSet::new(),
            port_states: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> StpId {
        self.id
    }

    pub fn handle(&self) -> StpHandle {
        self.handle
    }

    pub fn vlans(&self) -> &BTreeSet<VlanId> {
        &self.vlans
    }

    pub fn has_vlan(&self, vlan: VlanId) -> bool {
        self.vlans.contains(&vlan)
    }

    /// State of `port`; ports never set are blocking.
    pub fn port_state(&self, port: PortId) -> StpPortState {
        self.port_states.get(&port).copied().unwrap_or_default()
    }

    pub fn port_states(&self) -> &BTreeMap<PortId, StpPortState> {
        &self.port_states
    }

    pub(crate) fn insert_vlan(&mut self, vlan: VlanId) -> bool {
        self.vlans.insert(vlan)
    }

    pub(crate) fn remove_vlan(&mut self, vlan: VlanId) -> bool {
        self.vlans.remove(&vlan)
    }

    /// Programs `state` for `port`, returning the previous state.
    pub fn set_port_state(
        &mut self,
        hw: &dyn HwAbstraction,
        port: PortId,
        hw_port: HwPortId,
        state: StpPortState,
    ) -> CoreResult<StpPortState> {
        let previous = self.port_state(port);
        hw.set_stp_port_state(self.handle, hw_port, state)?;
        self.port_states.insert(port, state);
        Ok(previous)
    }
}
