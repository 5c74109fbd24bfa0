//! Subject/observer notification bus.
//!
//! Observers register on a subject with the set of update reasons they
//! care about. Delivery is synchronous and happens on the thread that owns
//! the bus; one failing observer never stops delivery to the others.

use crate::error::CoreResult;
use log::{debug, error, warn};
use opennos_types::{LagId, PortId, VlanId};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// Why a subject notified its observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpdateReason {
    LagDown,
    LagUp,
    PortDown,
    PortUp,
    VlanCreate,
    VlanDestroy,
    LinkStatusUpdate,
}

impl fmt::Display for UpdateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateReason::LagDown => "LagDown",
            UpdateReason::LagUp => "LagUp",
            UpdateReason::PortDown => "PortDown",
            UpdateReason::PortUp => "PortUp",
            UpdateReason::VlanCreate => "VlanCreate",
            UpdateReason::VlanDestroy => "VlanDestroy",
            UpdateReason::LinkStatusUpdate => "LinkStatusUpdate",
        };
        f.write_str(s)
    }
}

/// Who is notifying.
///
/// Entity subjects cover every entity of that type; the entity id travels in
/// the [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subject {
    /// Hardware link scan, fed by the link event bridge.
    LinkScan,
    Ports,
    Vlans,
    Lags,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Subject::LinkScan => "link-scan",
            Subject::Ports => "ports",
            Subject::Vlans => "vlans",
            Subject::Lags => "lags",
        };
        f.write_str(s)
    }
}

/// Identity of an observer. At most one observer per kind is registered on
/// a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverKind(u16);

impl ObserverKind {
    pub const fn new(kind: u16) -> Self {
        Self(kind)
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for ObserverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// Data attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    None,
    /// Coalesced link transitions, last value per port.
    LinkStatus(BTreeMap<PortId, bool>),
    Port(PortId),
    Vlan(VlanId),
    Lag(LagId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: Subject,
    pub reason: UpdateReason,
    pub payload: Payload,
}

impl Notification {
    pub fn new(subject: Subject, reason: UpdateReason, payload: Payload) -> Self {
        Self {
            subject,
            reason,
            payload,
        }
    }
}

pub trait Observer {
    fn kind(&self) -> ObserverKind;

    /// Reasons this observer wants delivered.
    fn interests(&self) -> &[UpdateReason];

    /// Handles one notification. Unhandled reasons should fail with
    /// `UpdateReasonNotSupported`.
    fn update(&mut self, notification: &Notification) -> CoreResult<()>;
}

/// Shared handle to a registered observer.
pub type ObserverHandle = Rc<RefCell<dyn Observer>>;

struct Registration {
    interests: BTreeSet<UpdateReason>,
    observer: ObserverHandle,
}

/// Outcome of one `notify` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub delivered: usize,
    pub failed: usize,
}

impl NotifyReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// The notification bus. Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct ObserverBus {
    subjects: Rc<RefCell<BTreeMap<Subject, BTreeMap<ObserverKind, Registration>>>>,
}

impl ObserverBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `observer` on `subject` with its declared interests.
    ///
    /// Returns the observer of the same kind it replaced, if any.
    pub fn register(&self, subject: Subject, observer: ObserverHandle) -> Option<ObserverHandle> {
        let (kind, interests): (ObserverKind, BTreeSet<UpdateReason>) = {
            let o = observer.borrow();
            (o.kind(), o.interests().iter().copied().collect())
        };
        self.register_with(subject, kind, interests, observer)
    }

    /// Registers with an explicit interest set and kind.
    pub fn register_with(
        &self,
        subject: Subject,
        kind: ObserverKind,
        interests: BTreeSet<UpdateReason>,
        observer: ObserverHandle,
    ) -> Option<ObserverHandle> {
        let replaced = self
            .subjects
            .borrow_mut()
            .entry(subject)
            .or_default()
            .insert(kind, Registration { interests, observer })
            .map(|old| old.observer);
        if replaced.is_some() {
            warn!("replaced {} registered on {}", kind, subject);
        } else {
            debug!("registered {} on {}", kind, subject);
        }
        replaced
    }

    pub fn unregister(&self, subject: Subject, kind: ObserverKind) -> bool {
        let mut subjects = self.subjects.borrow_mut();
        let Some(observers) = subjects.get_mut(&subject) else {
            return false;
        };
        let removed = observers.remove(&kind).is_some();
        if observers.is_empty() {
            subjects.remove(&subject);
        }
        removed
    }

    pub fn observer_count(&self, subject: Subject) -> usize {
        self.subjects
            .borrow()
            .get(&subject)
            .map_or(0, |observers| observers.len())
    }

    pub fn notify(&self, subject: Subject, reason: UpdateReason, payload: Payload) -> NotifyReport {
        self.publish(&Notification::new(subject, reason, payload))
    }

    /// Delivers `notification` to every interested observer of its subject.
    ///
    /// Works on a snapshot of the registrations, so observers may notify or
    /// register from inside `update`. An observer that is already busy
    /// handling an outer notification is skipped and counted as failed.
    pub fn publish(&self, notification: &Notification) -> NotifyReport {
        let targets: Vec<(ObserverKind, ObserverHandle)> = {
            let subjects = self.subjects.borrow();
            let Some(observers) = subjects.get(&notification.subject) else {
                return NotifyReport::default();
            };
            observers
                .iter()
                .filter(|(_, reg)| reg.interests.contains(&notification.reason))
                .map(|(kind, reg)| (*kind, Rc::clone(&reg.observer)))
                .collect()
        };

        let mut report = NotifyReport::default();
        for (kind, handle) in targets {
            let Ok(mut observer) = handle.try_borrow_mut() else {
                error!(
                    "{} is busy, dropping {} from {}",
                    kind, notification.reason, notification.subject
                );
                report.failed += 1;
                continue;
            };
            match observer.update(notification) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    error!(
                        "{} failed to handle {} from {}: {}",
                        kind, notification.reason, notification.subject, err
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }
}

impl fmt::Debug for ObserverBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subjects = self.subjects.borrow();
        let mut map = f.debug_map();
        for (subject, observers) in subjects.iter() {
            map.entry(subject, &observers.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}
