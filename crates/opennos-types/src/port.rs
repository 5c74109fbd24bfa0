//! Physical port attribute types.

use crate::{ParseError, PortId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Port speed in megabits per second.
///
/// [`PortSpeed::Auto`] requests the highest speed the port and its link
/// partner agree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(u32)]
pub enum PortSpeed {
    #[default]
    Auto = 0,
    Mb1 = 1,
    Mb10 = 10,
    Mb100 = 100,
    Gb1 = 1_000,
    Gb10 = 10_000,
    Gb20 = 20_000,
    Gb25 = 25_000,
    Gb40 = 40_000,
    Gb50 = 50_000,
    Gb100 = 100_000,
    Gb200 = 200_000,
    Gb400 = 400_000,
}

impl PortSpeed {
    /// Returns the speed in Mbps (0 for auto).
    pub const fn as_mbps(&self) -> u32 {
        *self as u32
    }

    pub const fn is_auto(&self) -> bool {
        matches!(self, PortSpeed::Auto)
    }

    /// Looks a speed up by its Mbps value.
    pub fn from_mbps(mbps: u32) -> Option<Self> {
        let speed = match mbps {
            0 => PortSpeed::Auto,
            1 => PortSpeed::Mb1,
            10 => PortSpeed::Mb10,
            100 => PortSpeed::Mb100,
            1_000 => PortSpeed::Gb1,
            10_000 => PortSpeed::Gb10,
            20_000 => PortSpeed::Gb20,
            25_000 => PortSpeed::Gb25,
            40_000 => PortSpeed::Gb40,
            50_000 => PortSpeed::Gb50,
            100_000 => PortSpeed::Gb100,
            200_000 => PortSpeed::Gb200,
            400_000 => PortSpeed::Gb400,
            _ => return None,
        };
        Some(speed)
    }
}

impl fmt::Display for PortSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mbps = self.as_mbps();
        if mbps == 0 {
            write!(f, "auto")
        } else if mbps >= 1_000 {
            write!(f, "{}G", mbps / 1_000)
        } else {
            write!(f, "{}M", mbps)
        }
    }
}

impl FromStr for PortSpeed {
    type Err = ParseError;

    /// Parses "auto", "100M", "25G" or a bare Mbps number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if lower == "auto" {
            return Ok(PortSpeed::Auto);
        }

        let invalid = || ParseError::InvalidPortSpeed(s.to_string());
        let mbps = if let Some(gbps) = lower.strip_suffix('g') {
            gbps.parse::<u32>().map_err(|_| invalid())?.checked_mul(1_000)
        } else if let Some(mbps) = lower.strip_suffix('m') {
            mbps.parse::<u32>().ok()
        } else {
            lower.parse::<u32>().ok()
        };

        mbps.and_then(PortSpeed::from_mbps).ok_or_else(invalid)
    }
}

impl TryFrom<String> for PortSpeed {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PortSpeed> for String {
    fn from(speed: PortSpeed) -> String {
        speed.to_string()
    }
}

/// Breakout configuration of a physical port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SplitMode {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "4x10G")]
    Split4x10G,
    #[serde(rename = "4x25G")]
    Split4x25G,
    #[serde(rename = "2x50G")]
    Split2x50G,
    #[serde(rename = "4x100G")]
    Split4x100G,
    #[serde(rename = "2x200G")]
    Split2x200G,
}

impl SplitMode {
    /// Number of logical lanes the port is broken out into.
    pub const fn lanes(&self) -> u8 {
        match self {
            SplitMode::None => 1,
            SplitMode::Split2x50G | SplitMode::Split2x200G => 2,
            SplitMode::Split4x10G | SplitMode::Split4x25G | SplitMode::Split4x100G => 4,
        }
    }

    /// Speed of each lane once broken out.
    pub const fn lane_speed(&self) -> Option<PortSpeed> {
        match self {
            SplitMode::None => None,
            SplitMode::Split4x10G => Some(PortSpeed::Gb10),
            SplitMode::Split4x25G => Some(PortSpeed::Gb25),
            SplitMode::Split2x50G => Some(PortSpeed::Gb50),
            SplitMode::Split4x100G => Some(PortSpeed::Gb100),
            SplitMode::Split2x200G => Some(PortSpeed::Gb200),
        }
    }
}

impl FromStr for SplitMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NONE" => Ok(SplitMode::None),
            "4X10G" => Ok(SplitMode::Split4x10G),
            "4X25G" => Ok(SplitMode::Split4x25G),
            "2X50G" => Ok(SplitMode::Split2x50G),
            "4X100G" => Ok(SplitMode::Split4x100G),
            "2X200G" => Ok(SplitMode::Split2x200G),
            _ => Err(ParseError::InvalidSplitMode(s.to_string())),
        }
    }
}

/// Attribute set programmed into a physical port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortParameters {
    pub shutdown: bool,
    pub autoneg: bool,
    pub fec: bool,
    pub full_duplex: bool,
    pub rx_pause: bool,
    pub tx_pause: bool,
    pub speed: PortSpeed,
    pub split_mode: SplitMode,
}

impl Default for PortParameters {
    /// Parameters applied to a freshly created port: administratively down,
    /// full duplex, autonegotiating at the best available speed.
    fn default() -> Self {
        Self {
            shutdown: true,
            autoneg: true,
            fec: false,
            full_duplex: true,
            rx_pause: false,
            tx_pause: false,
            speed: PortSpeed::Auto,
            split_mode: SplitMode::None,
        }
    }
}

/// Interface name of a panel port.
///
/// Port 0 is the CPU port. A breakout lane is suffixed with `:lane`.
pub fn port_name(port: PortId, lane: Option<u8>) -> String {
    match (port.as_u16(), lane) {
        (0, _) => "cpu0".to_string(),
        (p, Some(lane)) => format!("port-{}:{}", p, lane),
        (p, None) => format!("port-{}", p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_speed_parse() {
        assert_eq!("auto".parse::<PortSpeed>().unwrap(), PortSpeed::Auto);
        assert_eq!("100G".parse::<PortSpeed>().unwrap(), PortSpeed::Gb100);
        assert_eq!("25g".parse::<PortSpeed>().unwrap(), PortSpeed::Gb25);
        assert_eq!("100M".parse::<PortSpeed>().unwrap(), PortSpeed::Mb100);
        assert_eq!("10000".parse::<PortSpeed>().unwrap(), PortSpeed::Gb10);
        assert!("30G".parse::<PortSpeed>().is_err());
        assert!("fast".parse::<PortSpeed>().is_err());
    }

    #[test]
    fn test_speed_display() {
        assert_eq!(PortSpeed::Gb400.to_string(), "400G");
        assert_eq!(PortSpeed::Mb10.to_string(), "10M");
        assert_eq!(PortSpeed::Auto.to_string(), "auto");
        assert_eq!(PortSpeed::Gb40.as_mbps(), 40_000);
    }

    #[test]
    fn test_split_mode() {
        assert_eq!("4x25G".parse::<SplitMode>().unwrap(), SplitMode::Split4x25G);
        assert_eq!(SplitMode::Split2x50G.lanes(), 2);
        assert_eq!(SplitMode::None.lane_speed(), None);
        assert_eq!(SplitMode::Split4x10G.lane_speed(), Some(PortSpeed::Gb10));
    }

    #[test]
    fn test_default_parameters() {
        let params = PortParameters::default();
        assert!(params.shutdown);
        assert!(params.autoneg);
        assert!(params.full_duplex);
        assert_eq!(params.speed, PortSpeed::Auto);
    }

    #[test]
    fn test_port_name() {
        assert_eq!(port_name(PortId::new(0), None), "cpu0");
        assert_eq!(port_name(PortId::new(5), None), "port-5");
        assert_eq!(port_name(PortId::new(5), Some(2)), "port-5:2");
    }
}
