//! Port lifecycle commands and the FDB flush task.

use crate::context::{publish_port_state, SwitchContext};
use log::{error, warn};
use opennos_core::{Command, CommitOrder, CoreError, CoreResult, DispatchTask};
use opennos_types::{PortId, PortParameters};

fn describe_ports(ports: &[PortId]) -> String {
    ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Programs default parameters into freshly created ports.
#[derive(Debug)]
pub struct PortInitCommand {
    ports: Vec<PortId>,
    initialized: Vec<(PortId, PortParameters, bool)>,
}

impl PortInitCommand {
    pub fn new(ports: Vec<PortId>) -> Self {
        Self {
            ports,
            initialized: Vec::new(),
        }
    }

    fn rollback(&mut self, ctx: &SwitchContext) -> CoreResult<()> {
        let mut first_error = None;
        let mut ports = ctx.ports.borrow_mut();
        while let Some((id, params, created)) = self.initialized.pop() {
            let result = ports
                .port_mut(id)
                .and_then(|port| port.restore(ctx.hw.as_ref(), params, created));
            if let Err(err) = result {
                error!("failed to revert init of port {}: {}", id, err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Command<SwitchContext> for PortInitCommand {
    fn commit_order(&self) -> CommitOrder {
        CommitOrder::PortInit
    }

    fn describe(&self) -> String {
        format!("init ports [{}]", describe_ports(&self.ports))
    }

    fn execute(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        self.initialized.clear();
        let mut came_up = Vec::new();
        let mut failure = None;
        {
            let mut ports = ctx.ports.borrow_mut();
            for id in &self.ports {
                let port = match ports.port_mut(*id) {
                    Ok(port) => port,
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                };
                let memento = (*id, *port.parameters(), port.is_created());
                let was = port.is_operable();
                if let Err(err) = port.init(ctx.hw.as_ref()) {
                    failure = Some(err);
                    break;
                }
                self.initialized.push(memento);
                if !was && port.is_operable() {
                    came_up.push(*id);
                }
            }
        }

        if let Some(err) = failure {
            if let Err(revert) = self.rollback(ctx) {
                warn!("port init rollback incomplete: {}", revert);
            }
            return Err(err);
        }
        for id in came_up {
            publish_port_state(&ctx.bus, id, true);
        }
        Ok(())
    }

    fn is_undoable(&self) -> bool {
        true
    }

    fn undo(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        self.rollback(ctx)
    }
}

/// Shuts ports down and flushes their FDB before they are deleted.
#[derive(Debug)]
pub struct PortDeinitCommand {
    ports: Vec<PortId>,
    mementos: Vec<(PortId, PortParameters, bool)>,
}

impl PortDeinitCommand {
    pub fn new(ports: Vec<PortId>) -> Self {
        Self {
            ports,
            mementos: Vec::new(),
        }
    }

    /// Restores every recorded port, newest first, and returns the ports that
    /// became operable again.
    fn restore_all(&mut self, ctx: &SwitchContext) -> (Vec<PortId>, CoreResult<()>) {
        let mut came_up = Vec::new();
        let mut first_error = None;
        let mut ports = ctx.ports.borrow_mut();
        while let Some((id, params, created)) = self.mementos.pop() {
            let result = ports.port_mut(id).and_then(|port| {
                port.restore(ctx.hw.as_ref(), params, created)?;
                Ok(port.is_operable())
            });
            match result {
                Ok(true) => came_up.push(id),
                Ok(false) => {}
                Err(err) => {
                    error!("failed to restore port {}: {}", id, err);
                    first_error.get_or_insert(err);
                }
            }
        }
        (came_up, first_error.map_or(Ok(()), Err))
    }
}

impl Command<SwitchContext> for PortDeinitCommand {
    fn commit_order(&self) -> CommitOrder {
        CommitOrder::PortDeinit
    }

    fn describe(&self) -> String {
        format!("deinit ports [{}]", describe_ports(&self.ports))
    }

    fn execute(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        self.mementos.clear();
        let mut went_down = Vec::new();
        let mut failure = None;
        {
            let mut ports = ctx.ports.borrow_mut();
            for id in &self.ports {
                let port = match ports.port_mut(*id) {
                    Ok(port) => port,
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                };
                let memento = (*id, *port.parameters(), port.is_created());
                let was = port.is_operable();
                if let Err(err) = port.deinit(ctx.hw.as_ref()) {
                    failure = Some(err);
                    break;
                }
                self.mementos.push(memento);
                if was {
                    went_down.push(*id);
                }
            }
        }

        if let Some(err) = failure {
            let (_, revert) = self.restore_all(ctx);
            if let Err(revert) = revert {
                warn!("port deinit rollback incomplete: {}", revert);
            }
            return Err(err);
        }
        for id in went_down {
            publish_port_state(&ctx.bus, id, false);
        }
        Ok(())
    }

    fn is_undoable(&self) -> bool {
        true
    }

    fn undo(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        let (came_up, result) = self.restore_all(ctx);
        for id in came_up {
            publish_port_state(&ctx.bus, id, true);
        }
        result
    }
}

fn flush_port_fdb(ctx: &SwitchContext, port: PortId) -> CoreResult<()> {
    let hw_port = ctx.ports.borrow().port(port)?.hw_port();
    ctx.hw.flush_fdb(hw_port)?;
    Ok(())
}

/// Deferred FDB flush queued when a port loses link.
#[derive(Debug, Clone, Copy)]
pub struct FdbFlushTask {
    port: PortId,
}

impl FdbFlushTask {
    pub fn new(port: PortId) -> Self {
        Self { port }
    }
}

impl DispatchTask<SwitchContext> for FdbFlushTask {
    fn describe(&self) -> String {
        format!("flush fdb of port {}", self.port)
    }

    fn run(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        flush_port_fdb(ctx, self.port)
    }
}

/// FDB flush staged as part of a batch. Flushed addresses cannot be put
/// back, so the command is not undoable.
#[derive(Debug, Clone, Copy)]
pub struct FdbFlushCommand {
    port: PortId,
}

impl FdbFlushCommand {
    pub fn new(port: PortId) -> Self {
        Self { port }
    }
}

impl Command<SwitchContext> for FdbFlushCommand {
    fn commit_order(&self) -> CommitOrder {
        CommitOrder::FdbFlush
    }

    fn describe(&self) -> String {
        format!("flush fdb of port {}", self.port)
    }

    fn execute(&mut self, ctx: &mut SwitchContext) -> CoreResult<()> {
        flush_port_fdb(ctx, self.port)
    }

    fn undo(&mut self, _ctx: &mut SwitchContext) -> CoreResult<()> {
        Err(CoreError::command_not_undoable(self.describe()))
    }
}
