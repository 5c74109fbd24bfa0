//! Spanning-tree instances.
//!
//! Instances are staged like every other entity. VLAN mapping and port
//! states are applied directly to committed instances. When a VLAN is
//! destroyed the controller drops it from its instance.

mod manager;
mod types;

pub use manager::{StpFactory, StpManager, StpStats};
pub use types::StpInstance;
