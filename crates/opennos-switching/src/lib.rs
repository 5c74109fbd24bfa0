//! OpenNOS switching controllers and the `opennosd` daemon library.
//!
//! # Architecture
//!
//! ```text
//! [driver link scan] ──> [LinkEventBridge] ──> [ObserverBus] ──> PortManager
//!                                                   │               │ PortUp/PortDown
//!                                                   │               ↓
//!                                                   │           LagManager ──> LagUp/LagDown
//!                                                   └─ VlanDestroy ──> StpManager
//!
//! [Switching::commit] ──> one CommitBatch in CommitOrder order ──> [HwAbstraction]
//! ```
//!
//! # Key Components
//!
//! - [`Switching`]: the facade that stages, commits, undoes and runs the loop
//! - [`ports`]: port lifecycle, setting executors and FDB flushes
//! - [`vlan`]: VLANs and their tagged/untagged members
//! - [`lag`]: link aggregation groups and their aggregate state
//! - [`stp`]: spanning-tree instances, VLAN mapping and port states
//! - [`config`]: the daemon's TOML configuration
//!
//! # Example
//!
//! ```
//! use opennos_core::NullResultCallback;
//! use opennos_hal::{PortMapping, SimulatedAsic};
//! use opennos_switching::{Switching, SwitchingConfig};
//! use opennos_types::{PortId, TaggingMode, VlanId};
//! use std::sync::Arc;
//!
//! let asic = Arc::new(SimulatedAsic::new(PortMapping::identity(8)));
//! let mut switching = Switching::new(asic, SwitchingConfig::default());
//! switching.init(&NullResultCallback).unwrap();
//!
//! let vlan = VlanId::new(100).unwrap();
//! switching.add_vlan(vlan).unwrap();
//! switching.add_port(PortId::new(1)).unwrap();
//! switching.add_vlan_member(vlan, PortId::new(1), TaggingMode::Tagged).unwrap();
//! switching.commit(&NullResultCallback).unwrap();
//!
//! assert!(switching.vlans().vlan(vlan).unwrap().is_member(PortId::new(1)));
//! ```

pub mod config;
pub mod context;
pub mod lag;
mod phase;
pub mod ports;
pub mod stp;
pub mod switching;
pub mod vlan;

pub use config::{ConfigError, SwitchingConfig};
pub use context::SwitchContext;
pub use switching::{RunReport, Switching};
