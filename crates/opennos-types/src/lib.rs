//! Common OpenNOS types for switch entity management.
//!
//! This crate provides type-safe representations of the identifiers and
//! attribute sets shared by the switching control plane:
//!
//! - [`PortId`], [`LagId`], [`StpId`]: independent entity id spaces
//! - [`HwPortId`]: hardware (ASIC) port number
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers
//! - [`PortParameters`]: the attribute set programmed into a physical port
//! - [`TaggingMode`]: VLAN membership tagging
//! - [`StpPortState`]: spanning-tree port states

mod ids;
mod port;
mod stp;
mod vlan;

pub use ids::{HwPortId, LagId, PortId, StpId};
pub use port::{port_name, PortParameters, PortSpeed, SplitMode};
pub use stp::StpPortState;
pub use vlan::{TaggingMode, VlanId};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),

    #[error("invalid port speed: {0}")]
    InvalidPortSpeed(String),

    #[error("invalid split mode: {0}")]
    InvalidSplitMode(String),

    #[error("invalid STP port state: {0}")]
    InvalidStpState(String),

    #[error("invalid tagging mode: {0}")]
    InvalidTaggingMode(String),

    #[error("invalid {kind} id: {value}")]
    InvalidId { kind: &'static str, value: String },
}
