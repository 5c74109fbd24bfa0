//! Type-safe hardware handle wrappers.
//!
//! A handle returned by the driver for a VLAN must never be passed where a
//! LAG handle is expected. The phantom kind parameter enforces that at
//! compile time.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Raw hardware handle as returned by the driver.
pub type RawHwHandle = u64;

/// Kinds of hardware-backed entities the driver creates handles for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Port,
    Vlan,
    Lag,
    Stp,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Port => "port",
            EntityKind::Vlan => "vlan",
            EntityKind::Lag => "lag",
            EntityKind::Stp => "stp",
        };
        f.write_str(s)
    }
}

/// Marker trait for hardware handle kinds.
pub trait HwObjectKind: Send + Sync + 'static {
    /// Entity kind the driver is asked to create.
    const ENTITY_KIND: EntityKind;

    /// Returns the kind name for debugging.
    fn type_name() -> &'static str;
}

/// A type-safe hardware handle.
#[derive(Clone, Copy)]
pub struct HwHandle<T: HwObjectKind> {
    raw: RawHwHandle,
    _marker: PhantomData<T>,
}

impl<T: HwObjectKind> HwHandle<T> {
    /// The null handle.
    pub const NULL: Self = Self {
        raw: 0,
        _marker: PhantomData,
    };

    /// Wraps a raw handle. Returns `None` for the null handle.
    pub fn from_raw(raw: RawHwHandle) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self {
                raw,
                _marker: PhantomData,
            })
        }
    }

    pub const fn as_raw(&self) -> RawHwHandle {
        self.raw
    }

    pub const fn is_null(&self) -> bool {
        self.raw == 0
    }
}

impl<T: HwObjectKind> fmt::Debug for HwHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:x})", T::type_name(), self.raw)
    }
}

impl<T: HwObjectKind> fmt::Display for HwHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.raw)
    }
}

impl<T: HwObjectKind> PartialEq for HwHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: HwObjectKind> Eq for HwHandle<T> {}

impl<T: HwObjectKind> Hash for HwHandle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T: HwObjectKind> Default for HwHandle<T> {
    fn default() -> Self {
        Self::NULL
    }
}

macro_rules! define_object_kind {
    ($name:ident, $entity:ident, $type_name:literal, $alias:ident) => {
        #[doc = concat!("Marker type for ", $type_name, " handles.")]
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl HwObjectKind for $name {
            const ENTITY_KIND: EntityKind = EntityKind::$entity;

            fn type_name() -> &'static str {
                $type_name
            }
        }

        #[doc = concat!("Hardware handle of a ", $type_name, ".")]
        pub type $alias = HwHandle<$name>;
    };
}

define_object_kind!(PortKind, Port, "Port", PortHandle);
define_object_kind!(VlanKind, Vlan, "Vlan", VlanHandle);
define_object_kind!(LagKind, Lag, "Lag", LagHandle);
define_object_kind!(StpKind, Stp, "Stp", StpHandle);
