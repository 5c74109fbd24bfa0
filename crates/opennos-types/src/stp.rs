//! Spanning-tree port states.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 802.1D port state within a spanning-tree instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum StpPortState {
    Disabled = 0,
    #[default]
    Blocking = 1,
    Listening = 2,
    Learning = 3,
    Forwarding = 4,
}

impl StpPortState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Blocking => "blocking",
            Self::Listening => "listening",
            Self::Learning => "learning",
            Self::Forwarding => "forwarding",
        }
    }

    /// True when the port forwards data frames in this state.
    pub const fn forwards(&self) -> bool {
        matches!(self, Self::Forwarding)
    }

    /// True when the port learns source addresses in this state.
    pub const fn learns(&self) -> bool {
        matches!(self, Self::Learning | Self::Forwarding)
    }
}

impl fmt::Display for StpPortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StpPortState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" | "disabled" => Ok(Self::Disabled),
            "1" | "blocking" => Ok(Self::Blocking),
            "2" | "listening" => Ok(Self::Listening),
            "3" | "learning" => Ok(Self::Learning),
            "4" | "forwarding" => Ok(Self::Forwarding),
            _ => Err(ParseError::InvalidStpState(s.to_string())),
        }
    }
}
