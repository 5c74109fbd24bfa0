//! Entity identifiers.
//!
//! Ports, LAGs and spanning-tree instances each have an independent id space.
//! Wrapping the raw numbers keeps a `LagId` from being handed to code that
//! expects a `PortId`.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! define_entity_id {
    ($name:ident, $kind:literal) => {
        #[doc = concat!("Logical ", $kind, " identifier.")]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u16);

        impl $name {
            /// Creates a new identifier.
            pub const fn new(id: u16) -> Self {
                Self(id)
            }

            /// Returns the identifier as a u16.
            pub const fn as_u16(&self) -> u16 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u16> for $name {
            fn from(id: u16) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u16 {
            fn from(id: $name) -> u16 {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u16>()
                    .map(Self)
                    .map_err(|_| ParseError::InvalidId {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }
    };
}

define_entity_id!(PortId, "port");
define_entity_id!(LagId, "LAG");
define_entity_id!(StpId, "STP instance");

/// Hardware port number as seen by the ASIC driver.
///
/// Distinct from [`PortId`]: the panel (front plate) numbering and the ASIC
/// numbering are related only through the port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HwPortId(i32);

impl HwPortId {
    /// Creates a new hardware port number.
    pub const fn new(port: i32) -> Self {
        Self(port)
    }

    /// Returns the raw hardware port number.
    pub const fn as_i32(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for HwPortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hw{}", self.0)
    }
}
