//! In-memory ASIC.
//!
//! `SimulatedAsic` implements [`HwAbstraction`] without any vendor driver.
//! It keeps the programmed state (handles, port attributes, memberships),
//! records every successful call in order, can be told to fail specific
//! operations, and fires link transitions through the registered link-scan
//! callback the way a driver thread would.

use crate::api::{HwAbstraction, LinkScanCallback};
use crate::error::{HwError, HwResult, HwStatus};
use crate::mapping::PortMapping;
use crate::types::{EntityKind, LagHandle, RawHwHandle, StpHandle, VlanHandle};
use log::{debug, trace};
use opennos_types::{HwPortId, PortId, PortParameters, PortSpeed, StpPortState, TaggingMode};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A successfully executed driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwCall {
    Init,
    CreateHandle {
        kind: EntityKind,
        id: u32,
        handle: RawHwHandle,
    },
    DestroyHandle {
        kind: EntityKind,
        id: u32,
    },
    SetPortAttributes {
        hw_port: HwPortId,
        attributes: PortParameters,
    },
    RegisterLinkScan,
    FlushFdb {
        hw_port: HwPortId,
    },
    AddVlanMember {
        vlan: RawHwHandle,
        hw_port: HwPortId,
        mode: TaggingMode,
    },
    RemoveVlanMember {
        vlan: RawHwHandle,
        hw_port: HwPortId,
    },
    AddLagMember {
        lag: RawHwHandle,
        hw_port: HwPortId,
    },
    RemoveLagMember {
        lag: RawHwHandle,
        hw_port: HwPortId,
    },
    SetStpPortState {
        stp: RawHwHandle,
        hw_port: HwPortId,
        state: StpPortState,
    },
}

/// Operation selector for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwOp {
    Init,
    CreateHandle(EntityKind),
    DestroyHandle(EntityKind),
    SetPortAttributes,
    RegisterLinkScan,
    FlushFdb,
    AddVlanMember,
    RemoveVlanMember,
    AddLagMember,
    RemoveLagMember,
    SetStpPortState,
}

impl HwOp {
    fn call_name(&self) -> &'static str {
        match self {
            HwOp::Init => "opennsl_driver_init",
            HwOp::CreateHandle(EntityKind::Port) => "opennsl_port_enable_set",
            HwOp::CreateHandle(EntityKind::Vlan) => "opennsl_vlan_create",
            HwOp::CreateHandle(EntityKind::Lag) => "opennsl_trunk_create",
            HwOp::CreateHandle(EntityKind::Stp) => "opennsl_stg_create",
            HwOp::DestroyHandle(EntityKind::Port) => "opennsl_port_enable_clear",
            HwOp::DestroyHandle(EntityKind::Vlan) => "opennsl_vlan_destroy",
            HwOp::DestroyHandle(EntityKind::Lag) => "opennsl_trunk_destroy",
            HwOp::DestroyHandle(EntityKind::Stp) => "opennsl_stg_destroy",
            HwOp::SetPortAttributes => "opennsl_port_selective_set",
            HwOp::RegisterLinkScan => "opennsl_linkscan_register",
            HwOp::FlushFdb => "opennsl_l2_addr_delete_by_port",
            HwOp::AddVlanMember => "opennsl_vlan_port_add",
            HwOp::RemoveVlanMember => "opennsl_vlan_port_remove",
            HwOp::AddLagMember => "opennsl_trunk_member_add",
            HwOp::RemoveLagMember => "opennsl_trunk_member_delete",
            HwOp::SetStpPortState => "opennsl_stg_stp_set",
        }
    }
}

#[derive(Debug)]
struct InjectedFailure {
    op: HwOp,
    skip: usize,
    status: HwStatus,
}

#[derive(Debug, Clone, Copy)]
struct HwObject {
    kind: EntityKind,
    id: u32,
}

#[derive(Default)]
struct SimState {
    initialized: bool,
    next_handle: RawHwHandle,
    objects: BTreeMap<RawHwHandle, HwObject>,
    port_attributes: BTreeMap<HwPortId, PortParameters>,
    vlan_members: BTreeMap<RawHwHandle, BTreeMap<HwPortId, TaggingMode>>,
    lag_members: BTreeMap<RawHwHandle, BTreeSet<HwPortId>>,
    stp_states: BTreeMap<(RawHwHandle, HwPortId), StpPortState>,
    calls: Vec<HwCall>,
    failures: Vec<InjectedFailure>,
    link_callback: Option<LinkScanCallback>,
}

impl SimState {
    /// Consumes a matching injected failure, if one is due.
    fn check(&mut self, op: HwOp) -> HwResult<()> {
        if op != HwOp::Init && !self.initialized {
            return Err(HwError::Uninitialized);
        }

        let Some(pos) = self.failures.iter().position(|f| f.op == op) else {
            return Ok(());
        };
        if self.failures[pos].skip > 0 {
            self.failures[pos].skip -= 1;
            return Ok(());
        }
        let failure = self.failures.remove(pos);
        debug!("injected failure for {:?}: {}", op, failure.status);
        Err(HwError::from_status(op.call_name(), failure.status))
    }

    fn object(&self, handle: RawHwHandle, kind: EntityKind) -> HwResult<HwObject> {
        match self.objects.get(&handle) {
            Some(object) if object.kind == kind => Ok(*object),
            _ => Err(HwError::UnknownHandle(handle)),
        }
    }
}

/// In-memory implementation of [`HwAbstraction`].
pub struct SimulatedAsic {
    mapping: PortMapping,
    state: Mutex<SimState>,
}

impl fmt::Debug for SimulatedAsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedAsic")
            .field("ports", &self.mapping.len())
            .field("initialized", &state.initialized)
            .field("objects", &state.objects.len())
            .field("link_callback", &state.link_callback.is_some())
            .finish()
    }
}

/// Speeds the port can advertise while autonegotiating.
fn autoneg_speed_supported(speed: PortSpeed) -> bool {
    matches!(
        speed,
        PortSpeed::Auto
            | PortSpeed::Gb1
            | PortSpeed::Gb10
            | PortSpeed::Gb20
            | PortSpeed::Gb25
            | PortSpeed::Gb40
            | PortSpeed::Gb50
            | PortSpeed::Gb100
    )
}

impl SimulatedAsic {
    pub fn new(mapping: PortMapping) -> Self {
        Self {
            mapping,
            state: Mutex::new(SimState {
                next_handle: 0x1000,
                ..SimState::default()
            }),
        }
    }

    /// Makes the next call of `op` fail with `status`.
    pub fn fail_next(&self, op: HwOp, status: HwStatus) {
        self.fail_after(op, 0, status);
    }

    /// Lets `successes` calls of `op` through, then fails the following one.
    pub fn fail_after(&self, op: HwOp, successes: usize, status: HwStatus) {
        self.state.lock().failures.push(InjectedFailure {
            op,
            skip: successes,
            status,
        });
    }

    /// Reports a link transition the way the driver's link-scan thread would.
    ///
    /// Returns false when no callback is registered. The callback runs
    /// without the simulator lock held.
    pub fn fire_link_event(&self, hw_port: HwPortId, up: bool) -> bool {
        let callback = self.state.lock().link_callback.clone();
        match callback {
            Some(callback) => {
                trace!("link scan: {} {}", hw_port, if up { "up" } else { "down" });
                callback(hw_port, up);
                true
            }
            None => false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn calls(&self) -> Vec<HwCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Logical ids of the live objects of `kind`, ascending.
    pub fn live_ids(&self, kind: EntityKind) -> Vec<u32> {
        let state = self.state.lock();
        let mut ids: Vec<u32> = state
            .objects
            .values()
            .filter(|o| o.kind == kind)
            .map(|o| o.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn port_attributes(&self, hw_port: HwPortId) -> Option<PortParameters> {
        self.state.lock().port_attributes.get(&hw_port).copied()
    }

    pub fn vlan_members(&self, vlan: VlanHandle) -> BTreeMap<HwPortId, TaggingMode> {
        self.state
            .lock()
            .vlan_members
            .get(&vlan.as_raw())
            .cloned()
            .unwrap_or_default()
    }

    pub fn lag_members(&self, lag: LagHandle) -> BTreeSet<HwPortId> {
        self.state
            .lock()
            .lag_members
            .get(&lag.as_raw())
            .cloned()
            .unwrap_or_default()
    }

    pub fn stp_port_state(&self, stp: StpHandle, hw_port: HwPortId) -> Option<StpPortState> {
        self.state
            .lock()
            .stp_states
            .get(&(stp.as_raw(), hw_port))
            .copied()
    }

    /// Ports flushed so far, in call order.
    pub fn fdb_flushes(&self) -> Vec<HwPortId> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                HwCall::FlushFdb { hw_port } => Some(*hw_port),
                _ => None,
            })
            .collect()
    }

    fn check_port(&self, hw_port: HwPortId) -> HwResult<()> {
        if self.mapping.to_panel(hw_port).is_some() {
            Ok(())
        } else {
            Err(HwError::from_status("opennsl_port_validate", HwStatus::Port))
        }
    }
}

impl HwAbstraction for SimulatedAsic {
    fn init(&self) -> HwResult<()> {
        let mut state = self.state.lock();
        state.check(HwOp::Init)?;
        state.initialized = true;
        state.calls.push(HwCall::Init);
        Ok(())
    }

    fn create_handle(&self, kind: EntityKind, id: u32) -> HwResult<RawHwHandle> {
        let mut state = self.state.lock();
        state.check(HwOp::CreateHandle(kind))?;
        if state.objects.values().any(|o| o.kind == kind && o.id == id) {
            return Err(HwError::from_status(
                HwOp::CreateHandle(kind).call_name(),
                HwStatus::Exists,
            ));
        }

        state.next_handle += 1;
        let handle = state.next_handle;
        state.objects.insert(handle, HwObject { kind, id });
        state.calls.push(HwCall::CreateHandle { kind, id, handle });
        Ok(handle)
    }

    fn destroy_handle(&self, handle: RawHwHandle) -> HwResult<()> {
        let mut state = self.state.lock();
        let object = state
            .objects
            .get(&handle)
            .copied()
            .ok_or(HwError::UnknownHandle(handle))?;
        state.check(HwOp::DestroyHandle(object.kind))?;

        state.objects.remove(&handle);
        state.vlan_members.remove(&handle);
        state.lag_members.remove(&handle);
        state.stp_states.retain(|(stp, _), _| *stp != handle);
        state.calls.push(HwCall::DestroyHandle {
            kind: object.kind,
            id: object.id,
        });
        Ok(())
    }

    fn set_port_attributes(&self, hw_port: HwPortId, attributes: &PortParameters) -> HwResult<()> {
        let mut state = self.state.lock();
        state.check(HwOp::SetPortAttributes)?;
        self.check_port(hw_port)?;
        if !attributes.shutdown && attributes.autoneg && !autoneg_speed_supported(attributes.speed) {
            return Err(HwError::from_status(
                HwOp::SetPortAttributes.call_name(),
                HwStatus::Param,
            ));
        }

        state.port_attributes.insert(hw_port, *attributes);
        state.calls.push(HwCall::SetPortAttributes {
            hw_port,
            attributes: *attributes,
        });
        Ok(())
    }

    fn register_link_scan_callback(&self, callback: LinkScanCallback) -> HwResult<()> {
        let mut state = self.state.lock();
        state.check(HwOp::RegisterLinkScan)?;
        state.link_callback = Some(callback);
        state.calls.push(HwCall::RegisterLinkScan);
        Ok(())
    }

    fn panel_port_to_hw_port(&self, port: PortId) -> Option<HwPortId> {
        self.mapping.to_hw(port)
    }

    fn hw_port_to_panel_port(&self, hw_port: HwPortId) -> Option<PortId> {
        self.mapping.to_panel(hw_port)
    }

    fn flush_fdb(&self, hw_port: HwPortId) -> HwResult<()> {
        let mut state = self.state.lock();
        state.check(HwOp::FlushFdb)?;
        self.check_port(hw_port)?;
        state.calls.push(HwCall::FlushFdb { hw_port });
        Ok(())
    }

    fn add_vlan_member(&self, vlan: VlanHandle, hw_port: HwPortId, mode: TaggingMode) -> HwResult<()> {
        let mut state = self.state.lock();
        state.check(HwOp::AddVlanMember)?;
        state.object(vlan.as_raw(), EntityKind::Vlan)?;
        self.check_port(hw_port)?;

        state
            .vlan_members
            .entry(vlan.as_raw())
            .or_default()
            .insert(hw_port, mode);
        state.calls.push(HwCall::AddVlanMember {
            vlan: vlan.as_raw(),
            hw_port,
            mode,
        });
        Ok(())
    }

    fn remove_vlan_member(&self, vlan: VlanHandle, hw_port: HwPortId) -> HwResult<()> {
        let mut state = self.state.lock();
        state.check(HwOp::RemoveVlanMember)?;
        state.object(vlan.as_raw(), EntityKind::Vlan)?;

        let removed = state
            .vlan_members
            .get_mut(&vlan.as_raw())
            .and_then(|members| members.remove(&hw_port));
        if removed.is_none() {
            return Err(HwError::from_status(
                HwOp::RemoveVlanMember.call_name(),
                HwStatus::NotFound,
            ));
        }
        state.calls.push(HwCall::RemoveVlanMember {
            vlan: vlan.as_raw(),
            hw_port,
        });
        Ok(())
    }

    fn add_lag_member(&self, lag: LagHandle, hw_port: HwPortId) -> HwResult<()> {
        let mut state = self.state.lock();
        state.check(HwOp::AddLagMember)?;
        state.object(lag.as_raw(), EntityKind::Lag)?;
        self.check_port(hw_port)?;

        if !state.lag_members.entry(lag.as_raw()).or_default().insert(hw_port) {
            return Err(HwError::from_status(
                HwOp::AddLagMember.call_name(),
                HwStatus::Exists,
            ));
        }
        state.calls.push(HwCall::AddLagMember {
            lag: lag.as_raw(),
            hw_port,
        });
        Ok(())
    }

    fn remove_lag_member(&self, lag: LagHandle, hw_port: HwPortId) -> HwResult<()> {
        let mut state = self.state.lock();
        state.check(HwOp::RemoveLagMember)?;
        state.object(lag.as_raw(), EntityKind::Lag)?;

        let removed = state
            .lag_members
            .get_mut(&lag.as_raw())
            .is_some_and(|members| members.remove(&hw_port));
        if !removed {
            return Err(HwError::from_status(
                HwOp::RemoveLagMember.call_name(),
                HwStatus::NotFound,
            ));
        }
        state.calls.push(HwCall::RemoveLagMember {
            lag: lag.as_raw(),
            hw_port,
        });
        Ok(())
    }

    fn set_stp_port_state(&self, stp: StpHandle, hw_port: HwPortId, port_state: StpPortState) -> HwResult<()> {
        let mut state = self.state.lock();
        state.check(HwOp::SetStpPortState)?;
        state.object(stp.as_raw(), EntityKind::Stp)?;
        self.check_port(hw_port)?;

        state.stp_states.insert((stp.as_raw(), hw_port), port_state);
        state.calls.push(HwCall::SetStpPortState {
            stp: stp.as_raw(),
            hw_port,
            state: port_state,
        });
        Ok(())
    }
}
