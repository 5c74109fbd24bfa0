//! State shared by every command and dispatch task.

use crate::lag::LagManager;
use crate::ports::PortManager;
use crate::stp::StpManager;
use crate::vlan::VlanManager;
use log::info;
use opennos_core::{CommandDispatcher, ObserverBus, ObserverKind, Payload, Subject, UpdateReason};
use opennos_hal::HwAbstraction;
use opennos_types::{LagId, PortId};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

pub const PORT_OBSERVER: ObserverKind = ObserverKind::new(1);
pub const LAG_OBSERVER: ObserverKind = ObserverKind::new(2);
pub const STP_OBSERVER: ObserverKind = ObserverKind::new(3);

/// Everything a staged command or a dispatched task may touch.
///
/// Controllers sit behind `RefCell` because the observer bus holds them
/// too. A command borrows one controller at a time and releases it before
/// publishing, so observers can borrow theirs during delivery.
pub struct SwitchContext {
    pub hw: Arc<dyn HwAbstraction>,
    pub ports: Rc<RefCell<PortManager>>,
    pub vlans: Rc<RefCell<VlanManager>>,
    pub lags: Rc<RefCell<LagManager>>,
    pub stps: Rc<RefCell<StpManager>>,
    pub bus: ObserverBus,
    pub dispatcher: Arc<CommandDispatcher<SwitchContext>>,
}

impl SwitchContext {
    pub fn new(hw: Arc<dyn HwAbstraction>) -> Self {
        let bus = ObserverBus::new();
        let dispatcher = Arc::new(CommandDispatcher::new());
        Self {
            ports: Rc::new(RefCell::new(PortManager::new(
                Arc::clone(&hw),
                bus.clone(),
                Arc::clone(&dispatcher),
            ))),
            vlans: Rc::new(RefCell::new(VlanManager::new(Arc::clone(&hw)))),
            lags: Rc::new(RefCell::new(LagManager::new(Arc::clone(&hw), bus.clone()))),
            stps: Rc::new(RefCell::new(StpManager::new(Arc::clone(&hw)))),
            hw,
            bus,
            dispatcher,
        }
    }

    /// Subscribes the controllers to each other's subjects.
    pub fn register_observers(&self) {
        self.bus.register(Subject::LinkScan, self.ports.clone());
        self.bus.register(Subject::Ports, self.lags.clone());
        self.bus.register(Subject::Vlans, self.stps.clone());
    }
}

impl std::fmt::Debug for SwitchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchContext")
            .field("bus", &self.bus)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

pub(crate) fn publish_port_state(bus: &ObserverBus, port: PortId, operable: bool) {
    let reason = if operable {
        UpdateReason::PortUp
    } else {
        UpdateReason::PortDown
    };
    info!("port {} is now {}", port, if operable { "up" } else { "down" });
    bus.notify(Subject::Ports, reason, Payload::Port(port));
}

pub(crate) fn publish_lag_state(bus: &ObserverBus, lag: LagId, up: bool) {
    let reason = if up {
        UpdateReason::LagUp
    } else {
        UpdateReason::LagDown
    };
    info!("lag {} is now {}", lag, if up { "up" } else { "down" });
    bus.notify(Subject::Lags, reason, Payload::Lag(lag));
}
