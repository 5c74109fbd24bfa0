//! Port entity record.

use opennos_core::CoreResult;
use opennos_hal::{HwAbstraction, PortHandle};
use opennos_types::{port_name, HwPortId, PortId, PortParameters, SplitMode};

/// A created physical port and the parameters last programmed into it.
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    id: PortId,
    hw_port: HwPortId,
    handle: PortHandle,
    params: PortParameters,
    created: bool,
    link_up: bool,
}

impl Port {
    pub fn new(id: PortId, hw_port: HwPortId, handle: PortHandle) -> Self {
        Self {
            id,
            hw_port,
            handle,
            params: PortParameters::default(),
            created: false,
            link_up: false,
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn hw_port(&self) -> HwPortId {
        self.hw_port
    }

    pub fn handle(&self) -> PortHandle {
        self.handle
    }

    pub fn name(&self) -> String {
        port_name(self.id, None)
    }

    /// Interface names of the breakout lanes, or the port name when unsplit.
    pub fn lane_names(&self) -> Vec<String> {
        let lanes = match self.params.split_mode {
            SplitMode::None => return vec![self.name()],
            SplitMode::Split2x50G | SplitMode::Split2x200G => 2,
            SplitMode::Split4x10G | SplitMode::Split4x25G | SplitMode::Split4x100G => 4,
        };
        (1..=lanes).map(|lane| port_name(self.id, Some(lane))).collect()
    }

    pub fn parameters(&self) -> &PortParameters {
        &self.params
    }

    pub fn is_shutdown(&self) -> bool {
        self.params.shutdown
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_link_up(&self) -> bool {
        self.link_up
    }

    /// Created, administratively up and with link.
    pub fn is_operable(&self) -> bool {
        self.created && !self.params.shutdown && self.link_up
    }

    pub(crate) fn set_link_status(&mut self, up: bool) {
        self.link_up = up;
    }

    /// Programs `params`; unchanged parameters are not sent to hardware.
    pub fn apply(&mut self, hw: &dyn HwAbstraction, params: PortParameters) -> CoreResult<()> {
        if self.params == params {
            return Ok(());
        }
        hw.set_port_attributes(self.hw_port, &params)?;
        self.params = params;
        Ok(())
    }

    pub fn update<F>(&mut self, hw: &dyn HwAbstraction, change: F) -> CoreResult<()>
    where
        F: FnOnce(&mut PortParameters),
    {
        let mut params = self.params;
        change(&mut params);
        self.apply(hw, params)
    }

    /// Programs the default parameter set and marks the port created.
    pub fn init(&mut self, hw: &dyn HwAbstraction) -> CoreResult<()> {
        let params = PortParameters::default();
        hw.set_port_attributes(self.hw_port, &params)?;
        self.params = params;
        self.created = true;
        Ok(())
    }

    /// Shuts the port and flushes its learned addresses.
    pub fn deinit(&mut self, hw: &dyn HwAbstraction) -> CoreResult<()> {
        self.update(hw, |p| p.shutdown = true)?;
        hw.flush_fdb(self.hw_port)?;
        self.created = false;
        Ok(())
    }

    pub(crate) fn restore(
        &mut self,
        hw: &dyn HwAbstraction,
        params: PortParameters,
        created: bool,
    ) -> CoreResult<()> {
        self.apply(hw, params)?;
        self.created = created;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opennos_hal::{HwAbstractionExt, PortKind, PortMapping, SimulatedAsic};
    use opennos_types::PortSpeed;
    use pretty_assertions::assert_eq;

    fn asic(ports: u16) -> SimulatedAsic {
        let asic = SimulatedAsic::new(PortMapping::identity(ports));
        asic.init().unwrap();
        asic
    }

    fn port(asic: &SimulatedAsic, id: u16) -> Port {
        let id = PortId::new(id);
        let hw_port = asic.hw_port_of(id).unwrap();
        let handle = asic.create::<PortKind>(u32::from(id.as_u16())).unwrap();
        Port::new(id, hw_port, handle)
    }

    #[test]
    fn test_operability_truth_table() {
        for created in [false, true] {
            for shutdown in [false, true] {
                for link_up in [false, true] {
                    let mut p = Port::new(PortId::new(1), HwPortId::new(1), PortHandle::NULL);
                    p.created = created;
                    p.params.shutdown = shutdown;
                    p.link_up = link_up;
                    assert_eq!(
                        p.is_operable(),
                        created && !shutdown && link_up,
                        "created={} shutdown={} link_up={}",
                        created,
                        shutdown,
                        link_up
                    );
                }
            }
        }
    }

    #[test]
    fn test_init_programs_defaults() {
        let asic = asic(4);
        let mut p = port(&asic, 2);
        p.init(&asic).unwrap();

        assert!(p.is_created());
        assert!(p.is_shutdown());
        assert_eq!(
            asic.port_attributes(HwPortId::new(2)),
            Some(PortParameters::default())
        );
    }

    #[test]
    fn test_unchanged_parameters_skip_hardware() {
        let asic = asic(4);
        let mut p = port(&asic, 1);
        p.init(&asic).unwrap();
        asic.clear_calls();

        p.update(&asic, |params| params.shutdown = true).unwrap();
        assert!(asic.calls().is_empty());

        p.update(&asic, |params| params.speed = PortSpeed::Gb25).unwrap();
        assert_eq!(asic.calls().len(), 1);
        assert_eq!(p.parameters().speed, PortSpeed::Gb25);
    }

    #[test]
    fn test_rejected_parameters_are_not_recorded() {
        let asic = asic(4);
        let mut p = port(&asic, 1);
        p.init(&asic).unwrap();

        let result = p.update(&asic, |params| {
            params.shutdown = false;
            params.speed = PortSpeed::Mb1;
        });
        assert!(result.is_err());
        assert!(p.is_shutdown());
    }

    #[test]
    fn test_deinit_shuts_and_flushes() {
        let asic = asic(4);
        let mut p = port(&asic, 3);
        p.init(&asic).unwrap();
        p.update(&asic, |params| params.shutdown = false).unwrap();

        p.deinit(&asic).unwrap();
        assert!(!p.is_created());
        assert!(p.is_shutdown());
        assert_eq!(asic.fdb_flushes(), vec![HwPortId::new(3)]);
    }

    #[test]
    fn test_names() {
        let asic = asic(8);
        assert_eq!(port(&asic, 0).name(), "cpu0");

        let mut p = port(&asic, 5);
        assert_eq!(p.lane_names(), vec!["port-5".to_string()]);
        p.params.split_mode = SplitMode::Split2x50G;
        assert_eq!(
            p.lane_names(),
            vec!["port-5:1".to_string(), "port-5:2".to_string()]
        );
    }
}
