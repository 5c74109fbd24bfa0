//! Physical port lifecycle.
//!
//! Ports are created and destroyed through the staged manager, initialized
//! with default parameters after creation and shut down (with an FDB flush)
//! before deletion. Attribute changes go through [`PortSettingExecutor`],
//! which keeps a memento of the overwritten value for undo.
//!
//! Link transitions arrive as `LinkStatusUpdate` notifications. A port is
//! operable when it is created, not administratively shut down and has link.

mod commands;
mod manager;
mod port;
mod settings;

pub use commands::{FdbFlushCommand, FdbFlushTask, PortDeinitCommand, PortInitCommand};
pub use manager::{PortFactory, PortManager, PortStats};
pub use port::Port;
pub use settings::{ParameterSetting, PortSetting, PortSettingExecutor};
