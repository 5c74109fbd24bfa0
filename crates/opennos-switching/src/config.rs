//! Configuration file support for opennosd
//!
//! Loads and validates the daemon configuration from TOML files.
//! Default location: /etc/opennos/opennosd.toml

use opennos_hal::PortMapping;
use opennos_types::{HwPortId, PortId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/opennos/opennosd.toml";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("failed to serialize config: {0}")]
    Serialize(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// One explicit panel port to hardware port assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapEntry {
    pub port: PortId,
    pub hw_port: HwPortId,
}

/// ASIC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsicConfig {
    /// Driver unit number
    #[serde(default = "default_unit")]
    pub unit: u32,

    /// Panel number of the CPU port
    #[serde(default = "default_cpu_port")]
    pub cpu_port: u16,

    /// Number of panel ports; with no explicit map, port N is hardware port N
    #[serde(default = "default_max_ports")]
    pub max_ports: u16,

    /// Explicit panel to hardware port map; overrides the identity map
    #[serde(default)]
    pub port_map: Vec<PortMapEntry>,
}

/// Run loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// How long one loop iteration waits for link events, in milliseconds
    #[serde(default = "default_link_wait_ms")]
    pub link_wait_ms: u64,

    /// Initial capacity of the link event maps; 0 sizes them to the port count
    #[serde(default)]
    pub bridge_capacity: usize,
}

/// Ports configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortsConfig {
    /// Ports created and committed right after init
    #[serde(default)]
    pub initial: Vec<PortId>,
}

/// Complete opennosd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchingConfig {
    #[serde(default)]
    pub asic: AsicConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub ports: PortsConfig,
}

fn default_unit() -> u32 {
    0
}

fn default_cpu_port() -> u16 {
    0
}

fn default_max_ports() -> u16 {
    32
}

fn default_link_wait_ms() -> u64 {
    100
}

impl Default for AsicConfig {
    fn default() -> Self {
        Self {
            unit: default_unit(),
            cpu_port: default_cpu_port(),
            max_ports: default_max_ports(),
            port_map: Vec::new(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            link_wait_ms: default_link_wait_ms(),
            bridge_capacity: 0,
        }
    }
}

impl SwitchingConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn link_wait(&self) -> Duration {
        Duration::from_millis(self.runtime.link_wait_ms)
    }

    /// Capacity for the link event bridge maps.
    pub fn bridge_capacity(&self) -> usize {
        match self.runtime.bridge_capacity {
            0 => self.port_count(),
            capacity => capacity,
        }
    }

    fn port_count(&self) -> usize {
        if self.asic.port_map.is_empty() {
            usize::from(self.asic.max_ports)
        } else {
            self.asic.port_map.len()
        }
    }

    /// Builds the panel to hardware port table.
    pub fn port_mapping(&self) -> Result<PortMapping> {
        if self.asic.port_map.is_empty() {
            return Ok(PortMapping::identity(self.asic.max_ports));
        }
        PortMapping::from_pairs(self.asic.port_map.iter().map(|e| (e.port, e.hw_port)))
            .map_err(|e| ConfigError::invalid(format!("port_map: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.asic.max_ports == 0 && self.asic.port_map.is_empty() {
            return Err(ConfigError::invalid("max_ports must be > 0"));
        }

        if self.runtime.link_wait_ms == 0 {
            return Err(ConfigError::invalid("link_wait_ms must be > 0"));
        }

        let mapping = self.port_mapping()?;
        if mapping.to_hw(PortId::new(self.asic.cpu_port)).is_none() {
            return Err(ConfigError::invalid(format!(
                "cpu_port {} is not mapped",
                self.asic.cpu_port
            )));
        }

        let mut seen = BTreeSet::new();
        for port in &self.ports.initial {
            if !seen.insert(*port) {
                return Err(ConfigError::invalid(format!("initial port {} listed twice", port)));
            }
            if mapping.to_hw(*port).is_none() {
                return Err(ConfigError::invalid(format!("initial port {} is not mapped", port)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = SwitchingConfig::default();
        assert_eq!(config.asic.unit, 0);
        assert_eq!(config.asic.cpu_port, 0);
        assert_eq!(config.asic.max_ports, 32);
        assert!(config.asic.port_map.is_empty());
        assert!(config.ports.initial.is_empty());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(SwitchingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_ports() {
        let mut config = SwitchingConfig::default();
        config.asic.max_ports = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_unmapped_initial_port() {
        let mut config = SwitchingConfig::default();
        config.ports.initial = vec![PortId::new(1), PortId::new(40)];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("initial port 40"));
    }

    #[test]
    fn test_validate_duplicate_initial_port() {
        let mut config = SwitchingConfig::default();
        config.ports.initial = vec![PortId::new(3), PortId::new(3)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_link_wait_duration() {
        let config = SwitchingConfig::default();
        assert_eq!(config.link_wait(), Duration::from_millis(100));
    }

    #[test]
    fn test_bridge_capacity_follows_port_count() {
        let mut config = SwitchingConfig::default();
        assert_eq!(config.bridge_capacity(), 32);
        config.runtime.bridge_capacity = 8;
        assert_eq!(config.bridge_capacity(), 8);
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[asic]
max_ports = 4
port_map = [
    { port = 0, hw_port = 0 },
    { port = 1, hw_port = 13 },
    { port = 2, hw_port = 17 },
]

[ports]
initial = [1, 2]
"#;
        let config: SwitchingConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.asic.max_ports, 4);
        assert_eq!(config.ports.initial, vec![PortId::new(1), PortId::new(2)]);
        // Unspecified values should use defaults
        assert_eq!(config.runtime.link_wait_ms, 100);

        let mapping = config.port_mapping().unwrap();
        assert_eq!(mapping.to_hw(PortId::new(1)), Some(HwPortId::new(13)));
        assert_eq!(mapping.to_panel(HwPortId::new(17)), Some(PortId::new(2)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_hw_port_rejected() {
        let toml_str = r#"
[asic]
port_map = [
    { port = 0, hw_port = 5 },
    { port = 1, hw_port = 5 },
]
"#;
        let config: SwitchingConfig = toml::from_str(toml_str).unwrap();
        assert!(matches!(config.port_mapping(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = SwitchingConfig::load_or_default("/nonexistent/path.toml").unwrap();
        assert_eq!(config.asic.max_ports, 32);
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opennosd.toml");
        fs::write(&path, "[asic\nmax_ports = ").unwrap();
        assert!(matches!(
            SwitchingConfig::load_or_default(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opennosd.toml");

        let mut config = SwitchingConfig::default();
        config.asic.max_ports = 8;
        config.ports.initial = vec![PortId::new(5)];
        config.save(&path).unwrap();

        let loaded = SwitchingConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.asic.max_ports, 8);
        assert_eq!(loaded.ports.initial, vec![PortId::new(5)]);
    }
}
