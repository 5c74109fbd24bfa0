//! LAG entity record.

use opennos_core::{CoreError, CoreResult};
use opennos_hal::{HwAbstraction, LagHandle};
use opennos_types::{HwPortId, LagId, PortId};
use std::collections::BTreeMap;

/// A created link-aggregation group.
///
/// Each member carries its last known operability; the group is up while
/// at least one member is operable.
#[derive(Debug, Clone, PartialEq)]
pub struct Lag {
    id: LagId,
    handle: LagHandle,
    members: BTreeMap<PortId, bool>,
}

impl Lag {
    pub fn new(id: LagId, handle: LagHandle) -> Self {
        Self {
            id,
            handle,
            members: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> LagId {
        self.id
    }

    pub fn handle(&self) -> LagHandle {
        self.handle
    }

    pub fn name(&self) -> String {
        format!("lag{}", self.id)
    }

    pub fn members(&self) -> impl Iterator<Item = PortId> + '_ {
        self.members.keys().copied()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_member(&self, port: PortId) -> bool {
        self.members.contains_key(&port)
    }

    /// Last known operability of a member.
    pub fn member_state(&self, port: PortId) -> Option<bool> {
        self.members.get(&port).copied()
    }

    pub fn is_up(&self) -> bool {
        self.members.values().any(|up| *up)
    }

    /// Programs a new member. Returns the new aggregate state if it changed.
    pub fn add_member(
        &mut self,
        hw: &dyn HwAbstraction,
        port: PortId,
        hw_port: HwPortId,
        operable: bool,
    ) -> CoreResult<Option<bool>> {
        if self.is_member(port) {
            return Err(CoreError::already_exists(
                "lag member",
                format!("port {} in lag {}", port, self.id),
            ));
        }
        hw.add_lag_member(self.handle, hw_port)?;
        Ok(self.track(|members| {
            members.insert(port, operable);
        }))
    }

    pub fn remove_member(
        &mut self,
        hw: &dyn HwAbstraction,
        port: PortId,
        hw_port: HwPortId,
    ) -> CoreResult<Option<bool>> {
        if !self.is_member(port) {
            return Err(CoreError::not_exists(
                "lag member",
                format!("port {} in lag {}", port, self.id),
            ));
        }
        hw.remove_lag_member(self.handle, hw_port)?;
        Ok(self.track(|members| {
            members.remove(&port);
        }))
    }

    /// Records a member's operability. Non-members are ignored.
    pub fn set_member_state(&mut self, port: PortId, operable: bool) -> Option<bool> {
        if !self.is_member(port) {
            return None;
        }
        self.track(|members| {
            members.insert(port, operable);
        })
    }

    fn track<F>(&mut self, change: F) -> Option<bool>
    where
        F: FnOnce(&mut BTreeMap<PortId, bool>),
    {
        let was = self.is_up();
        change(&mut self.members);
        let now = self.is_up();
        (was != now).then_some(now)
    }
}
