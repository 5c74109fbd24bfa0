//! Port attribute changes as undoable commands.
//!
//! A [`PortSetting`] is the strategy for one attribute: it snapshots the
//! current value, programs the new one and can put the snapshot back.
//! [`PortSettingExecutor`] wraps a setting into a batch command.

use super::port::Port;
use crate::context::{publish_port_state, SwitchContext};
use opennos_core::{Command, CommitOrder, CoreError, CoreResult};
use opennos_hal::HwAbstraction;
use opennos_types::{PortId, PortParameters, PortSpeed};
use std::fmt;

/// Strategy for changing one port attribute.
pub trait PortSetting: fmt::Debug {
    fn describe(&self) -> String;

    /// Records the value about to be overwritten.
    fn create_memento(&mut self, port: &Port);

    fn process(&self, port: &mut Port, hw: &dyn HwAbstraction) -> CoreResult<()>;

    /// Puts the recorded value back.
    fn restore(&self, port: &mut Port, hw: &dyn HwAbstraction) -> CoreResult<()>;
}

/// Setting for a single field (or field group) of [`PortParameters`].
#[derive(Clone)]
pub struct ParameterSetting<T> {
    name: &'static str,
    value: T,
    memento: Option<T>,
    read: fn(&PortParameters) -> T,
    write: fn(&mut PortParameters, T),
}

impl<T: Copy> ParameterSetting<T> {
    pub fn new(
        name: &'static str,
        value: T,
        read: fn(&PortParameters) -> T,
        write: fn(&mut PortParameters, T),
    ) -> Self {
        Self {
            name,
            value,
            memento: None,
            read,
            write,
        }
    }

    pub fn value(&self) -> T {
        self.value
    }

    pub fn memento(&self) -> Option<T> {
        self.memento
    }
}

impl<T: fmt::Debug> fmt::Debug for ParameterSetting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterSetting")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("memento", &self.memento)
            .finish_non_exhaustive()
    }
}

impl<T: Copy + fmt::Debug> PortSetting for ParameterSetting<T> {
    fn describe(&self) -> String {
        format!("{}={:?}", self.name, self.value)
    }

    fn create_memento(&mut self, port: &Port) {
        self.memento = Some((self.read)(port.parameters()));
    }

    fn process(&self, port: &mut Port, hw: &dyn HwAbstraction) -> CoreResult<()> {
        port.update(hw, |params| (self.write)(params, self.value))
    }

    fn restore(&self, port: &mut Port, hw: &dyn HwAbstraction) -> CoreResult<()> {
        let memento = self
            .memento
            .ok_or_else(|| CoreError::command_not_undoable(self.describe()))?;
        port.update(hw, |params| (self.write)(params, memento))
    }
}

/// Applies a [`PortSetting`] to one port inside a commit batch.
#[derive(Debug)]
pub struct PortSettingExecutor {
    port: PortId,
    setting: Box<dyn PortSetting>,
    executed: bool,
}

impl PortSettingExecutor {
    pub fn new(port: PortId, setting: impl PortSetting + 'static) -> Self {
        Self {
            port,
            setting: Box::new(setting),
            executed: false,
        }
    }

    pub fn shutdown(port: PortId, shutdown: bool) -> Self {
        Self::new(
            port,
            ParameterSetting::new("shutdown", shutdown, |p| p.shutdown, |p, v| p.shutdown = v),
        )
    }

    pub fn speed(port: PortId, speed: PortSpeed) -> Self {
        Self::new(
            port,
            ParameterSetting::new("speed", speed, |p| p.speed, |p, v| p.speed = v),
        )
    }

    pub fn autoneg(port: PortId, autoneg: bool) -> Self {
        Self::new(
            port,
            ParameterSetting::new("autoneg", autoneg, |p| p.autoneg, |p, v| p.autoneg = v),
        )
    }

    pub fn full_duplex(port: PortId, full_duplex: bool) -> Self {
        Self::new(
            port,
            ParameterSetting::new(
                "full_duplex",
                full_duplex,
                |p| p.full_duplex,
                |p, v| p.full_duplex = v,
            ),
        )
    }

    pub fn fec(port: PortId, fec: bool) -> Self {
        Self::new(
            port,
            ParameterSetting::new("fec", fec, |p| p.fec, |p, v| p.fec = v),
        )
    }

    /// Receive and transmit pause frames, set together.
    pub fn pause(port: PortId, rx: bool, tx: bool) -> Self {
        Self::new(
            port,
            ParameterSetting::new(
                "pause",
                (rx, tx),
                |p| (p.rx_pause, p.tx_pause),
                |p, (rx, tx)| {
                    p.rx_pause = rx;
                    p.tx_pause = tx;
                },
            ),
        )
    }

    pub fn port(&self) -> PortId {
        self.port
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Runs `step` against the port and reports whether operability changed.
    fn run_step<F>(&mut self, ctx: &SwitchContext, step: F) -> CoreResult<Option<bool>>
    where
        F: FnOnce(&mut dyn PortSetting, &mut Port, &dyn HwAbstraction) -> CoreResult<()>,
    {
        let mut ports = ctx.ports.borrow_mut();
        let port = ports.port_mut(self.port)?;
        let was = port.is_operable();
        step(self.setting.as_mut(), port, ctx.hw.as_ref())?;
        let now = port.is_operable();
        Ok((was != now).then_some(now))
    }
}

impl Command<SwitchContext> for PortSettingExecutor {
    fn commit_order(&self) -> CommitOrder {
        CommitOrder::PortSet
    }

    fn describe(&self) -> String {
        format!("port {} set {}", self.port, self.setting.describe())
    }

    fn execute(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        let changed = self.run_step(ctx, |setting, port, hw| {
            setting.create_memento(port);
            setting.process(port, hw)
        })?;
        self.executed = true;
        if let Some(operable) = changed {
            publish_port_state(&ctx.bus, self.port, operable);
        }
        Ok(())
    }

    fn is_undoable(&self) -> bool {
        true
    }

    fn undo(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        if !self.executed {
            return Err(CoreError::command_not_undoable(self.describe()));
        }
        let changed = self.run_step(ctx, |setting, port, hw| setting.restore(port, hw))?;
        self.executed = false;
        if let Some(operable) = changed {
            publish_port_state(&ctx.bus, self.port, operable);
        }
        Ok(())
    }
}
