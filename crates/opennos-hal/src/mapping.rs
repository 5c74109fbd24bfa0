//! Panel port to hardware port mapping.

use crate::error::{HwError, HwResult};
use opennos_types::{HwPortId, PortId};
use std::collections::BTreeMap;

/// Bidirectional panel ↔ hardware port table.
///
/// Both directions are kept consistent: a panel port maps to exactly one
/// hardware port and vice versa.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortMapping {
    panel_to_hw: BTreeMap<PortId, HwPortId>,
    hw_to_panel: BTreeMap<HwPortId, PortId>,
}

impl PortMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps panel port N to hardware port N for `0..max_ports`.
    pub fn identity(max_ports: u16) -> Self {
        let mut mapping = Self::new();
        for port in 0..max_ports {
            mapping
                .panel_to_hw
                .insert(PortId::new(port), HwPortId::new(i32::from(port)));
            mapping
                .hw_to_panel
                .insert(HwPortId::new(i32::from(port)), PortId::new(port));
        }
        mapping
    }

    /// Builds a mapping from explicit pairs, rejecting duplicates on either side.
    pub fn from_pairs<I>(pairs: I) -> HwResult<Self>
    where
        I: IntoIterator<Item = (PortId, HwPortId)>,
    {
        let mut mapping = Self::new();
        for (port, hw_port) in pairs {
            mapping.insert(port, hw_port)?;
        }
        Ok(mapping)
    }

    pub fn insert(&mut self, port: PortId, hw_port: HwPortId) -> HwResult<()> {
        if self.panel_to_hw.contains_key(&port) {
            return Err(HwError::invalid_parameter(format!(
                "panel port {} is already mapped",
                port
            )));
        }
        if self.hw_to_panel.contains_key(&hw_port) {
            return Err(HwError::invalid_parameter(format!(
                "{} is already mapped",
                hw_port
            )));
        }
        self.panel_to_hw.insert(port, hw_port);
        self.hw_to_panel.insert(hw_port, port);
        Ok(())
    }

    pub fn to_hw(&self, port: PortId) -> Option<HwPortId> {
        self.panel_to_hw.get(&port).copied()
    }

    pub fn to_panel(&self, hw_port: HwPortId) -> Option<PortId> {
        self.hw_to_panel.get(&hw_port).copied()
    }

    pub fn len(&self) -> usize {
        self.panel_to_hw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panel_to_hw.is_empty()
    }

    pub fn panel_ports(&self) -> impl Iterator<Item = PortId> + '_ {
        self.panel_to_hw.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_identity_mapping() {
        let mapping = PortMapping::identity(4);
        assert_eq!(mapping.len(), 4);
        assert_eq!(mapping.to_hw(PortId::new(3)), Some(HwPortId::new(3)));
        assert_eq!(mapping.to_panel(HwPortId::new(0)), Some(PortId::new(0)));
        assert_eq!(mapping.to_hw(PortId::new(4)), None);
    }

    #[test]
    fn test_explicit_mapping() {
        let mapping = PortMapping::from_pairs([
            (PortId::new(1), HwPortId::new(34)),
            (PortId::new(2), HwPortId::new(38)),
        ])
        .unwrap();
        assert_eq!(mapping.to_hw(PortId::new(2)), Some(HwPortId::new(38)));
        assert_eq!(mapping.to_panel(HwPortId::new(34)), Some(PortId::new(1)));
        assert_eq!(mapping.panel_ports().collect::<Vec<_>>(), vec![PortId::new(1), PortId::new(2)]);
    }

    #[test]
    fn test_duplicate_mapping_rejected() {
        let result = PortMapping::from_pairs([
            (PortId::new(1), HwPortId::new(34)),
            (PortId::new(2), HwPortId::new(34)),
        ]);
        assert!(matches!(result, Err(HwError::InvalidParameter { .. })));

        let result = PortMapping::from_pairs([
            (PortId::new(1), HwPortId::new(34)),
            (PortId::new(1), HwPortId::new(35)),
        ]);
        assert!(result.is_err());
    }
}
