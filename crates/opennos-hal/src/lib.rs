//! Hardware abstraction for the OpenNOS switching core.
//!
//! The control plane talks to the switch ASIC only through the
//! [`HwAbstraction`] trait defined here, never through a vendor type.
//!
//! # Architecture
//!
//! - [`types`]: type-safe hardware handles (`VlanHandle`, `LagHandle`, ...)
//! - [`error`]: driver status codes and error handling
//! - [`api`]: the [`HwAbstraction`] trait and typed helpers
//! - [`mapping`]: panel port ↔ hardware port table
//! - [`sim`]: an in-memory ASIC used when no vendor driver is linked
//!
//! # Example
//!
//! ```
//! use opennos_hal::{HwAbstraction, HwAbstractionExt, PortMapping, SimulatedAsic, VlanKind};
//!
//! let asic = SimulatedAsic::new(PortMapping::identity(4));
//! asic.init().unwrap();
//!
//! // The marker type picks the entity kind and the handle type
//! let vlan = asic.create::<VlanKind>(100).unwrap();
//! assert!(!vlan.is_null());
//! ```

pub mod api;
pub mod error;
pub mod mapping;
pub mod sim;
pub mod types;

pub use api::{HwAbstraction, HwAbstractionExt, LinkScanCallback};
pub use error::{HwError, HwResult, HwStatus, HwStatusExt};
pub use mapping::PortMapping;
pub use sim::{HwCall, HwOp, SimulatedAsic};
pub use types::{
    EntityKind, HwHandle, HwObjectKind, LagHandle, LagKind, PortHandle, PortKind, RawHwHandle,
    StpHandle, StpKind, VlanHandle, VlanKind,
};
