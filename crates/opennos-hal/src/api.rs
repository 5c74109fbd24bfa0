//! The hardware abstraction boundary.
//!
//! Everything above this trait is vendor-neutral: controllers create and
//! destroy handles, program port attributes and membership through it, and
//! receive link transitions through the registered link-scan callback.

use crate::error::{HwError, HwResult};
use crate::types::{EntityKind, HwHandle, HwObjectKind, LagHandle, RawHwHandle, StpHandle, VlanHandle};
use opennos_types::{HwPortId, PortId, PortParameters, StpPortState, TaggingMode};
use std::sync::Arc;

/// Callback invoked from the driver's link-scan context with
/// `(hardware port, link up)`. Must return promptly.
pub type LinkScanCallback = Arc<dyn Fn(HwPortId, bool) + Send + Sync>;

/// Switch ASIC driver interface.
///
/// All calls are synchronous. Implementations are shared between the owning
/// control thread and the driver callback context, hence `Send + Sync`.
pub trait HwAbstraction: Send + Sync {
    /// Brings the ASIC up. Must succeed before any other call.
    fn init(&self) -> HwResult<()>;

    /// Creates the hardware object backing logical entity `id` of `kind`.
    fn create_handle(&self, kind: EntityKind, id: u32) -> HwResult<RawHwHandle>;

    fn destroy_handle(&self, handle: RawHwHandle) -> HwResult<()>;

    fn set_port_attributes(&self, hw_port: HwPortId, attributes: &PortParameters) -> HwResult<()>;

    fn register_link_scan_callback(&self, callback: LinkScanCallback) -> HwResult<()>;

    fn panel_port_to_hw_port(&self, port: PortId) -> Option<HwPortId>;

    fn hw_port_to_panel_port(&self, hw_port: HwPortId) -> Option<PortId>;

    /// Deletes every learned L2 address on the port.
    fn flush_fdb(&self, hw_port: HwPortId) -> HwResult<()>;

    fn add_vlan_member(&self, vlan: VlanHandle, hw_port: HwPortId, mode: TaggingMode) -> HwResult<()>;

    fn remove_vlan_member(&self, vlan: VlanHandle, hw_port: HwPortId) -> HwResult<()>;

    fn add_lag_member(&self, lag: LagHandle, hw_port: HwPortId) -> HwResult<()>;

    fn remove_lag_member(&self, lag: LagHandle, hw_port: HwPortId) -> HwResult<()>;

    fn set_stp_port_state(&self, stp: StpHandle, hw_port: HwPortId, state: StpPortState) -> HwResult<()>;
}

/// Typed helpers over [`HwAbstraction`].
pub trait HwAbstractionExt {
    /// Creates a handle whose kind is fixed by the marker type.
    fn create<K: HwObjectKind>(&self, id: u32) -> HwResult<HwHandle<K>>;

    fn destroy<K: HwObjectKind>(&self, handle: HwHandle<K>) -> HwResult<()>;

    /// Maps a panel port, failing with [`HwError::UnmappedPort`].
    fn hw_port_of(&self, port: PortId) -> HwResult<HwPortId>;
}

impl<T: HwAbstraction + ?Sized> HwAbstractionExt for T {
    fn create<K: HwObjectKind>(&self, id: u32) -> HwResult<HwHandle<K>> {
        let raw = self.create_handle(K::ENTITY_KIND, id)?;
        HwHandle::from_raw(raw).ok_or_else(|| {
            HwError::invalid_parameter(format!(
                "driver returned a null {} handle for id {}",
                K::ENTITY_KIND,
                id
            ))
        })
    }

    fn destroy<K: HwObjectKind>(&self, handle: HwHandle<K>) -> HwResult<()> {
        self.destroy_handle(handle.as_raw())
    }

    fn hw_port_of(&self, port: PortId) -> HwResult<HwPortId> {
        self.panel_port_to_hw_port(port)
            .ok_or_else(|| HwError::unmapped_port(port))
    }
}
