//! Command result codes and the core error type.

use crate::observer::UpdateReason;
use opennos_hal::HwError;
use opennos_types::{PortId, VlanId};
use std::fmt;
use thiserror::Error;

/// Outcome code delivered to result callbacks.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success = 0,
    NotExists = 1,
    PortNotExists = 2,
    VlanNotExists = 3,
    PortInVlanNotExists = 4,
    AlreadyExists = 5,
    NoMemory = 6,
    UpdateReasonNotSupported = 7,
    CommandNotUndoable = 8,
    Fail = 255,
}

impl ResultCode {
    pub fn is_success(&self) -> bool {
        *self == ResultCode::Success
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::Success => "Success",
            ResultCode::NotExists => "NotExists",
            ResultCode::PortNotExists => "PortNotExists",
            ResultCode::VlanNotExists => "VlanNotExists",
            ResultCode::PortInVlanNotExists => "PortInVlanNotExists",
            ResultCode::AlreadyExists => "AlreadyExists",
            ResultCode::NoMemory => "NoMemory",
            ResultCode::UpdateReasonNotSupported => "UpdateReasonNotSupported",
            ResultCode::CommandNotUndoable => "CommandNotUndoable",
            ResultCode::Fail => "Fail",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for staging, commit, undo and notification failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// The entity is not committed.
    #[error("{kind} {id} does not exist")]
    NotExists { kind: &'static str, id: String },

    /// The entity is already committed, or the member already present.
    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("port {0} does not exist")]
    PortNotExists(PortId),

    #[error("vlan {0} does not exist")]
    VlanNotExists(VlanId),

    #[error("port {port} is not a member of vlan {vlan}")]
    PortInVlanNotExists { port: PortId, vlan: VlanId },

    /// The hardware ran out of table or memory space.
    #[error("out of hardware resources: {message}")]
    NoMemory { message: String },

    /// An observer was notified with a reason it does not handle.
    #[error("observer {observer} does not handle {reason}")]
    UpdateReasonNotSupported {
        observer: String,
        reason: UpdateReason,
    },

    /// Undo was requested for a command that has nothing to revert.
    #[error("command cannot be undone: {command}")]
    CommandNotUndoable { command: String },

    /// A hardware call failed.
    #[error(transparent)]
    Hardware(HwError),

    /// Generic failure, including a commit that was rolled back.
    #[error("{message}")]
    Fail { message: String },
}

impl CoreError {
    pub fn not_exists(kind: &'static str, id: impl fmt::Display) -> Self {
        CoreError::NotExists {
            kind,
            id: id.to_string(),
        }
    }

    pub fn already_exists(kind: &'static str, id: impl fmt::Display) -> Self {
        CoreError::AlreadyExists {
            kind,
            id: id.to_string(),
        }
    }

    pub fn port_in_vlan_not_exists(port: PortId, vlan: VlanId) -> Self {
        CoreError::PortInVlanNotExists { port, vlan }
    }

    pub fn update_reason_not_supported(observer: impl Into<String>, reason: UpdateReason) -> Self {
        CoreError::UpdateReasonNotSupported {
            observer: observer.into(),
            reason,
        }
    }

    pub fn command_not_undoable(command: impl Into<String>) -> Self {
        CoreError::CommandNotUndoable {
            command: command.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        CoreError::Fail {
            message: message.into(),
        }
    }

    /// Maps this error to the code reported through result callbacks.
    pub fn code(&self) -> ResultCode {
        match self {
            CoreError::NotExists { .. } => ResultCode::NotExists,
            CoreError::AlreadyExists { .. } => ResultCode::AlreadyExists,
            CoreError::PortNotExists(_) => ResultCode::PortNotExists,
            CoreError::VlanNotExists(_) => ResultCode::VlanNotExists,
            CoreError::PortInVlanNotExists { .. } => ResultCode::PortInVlanNotExists,
            CoreError::NoMemory { .. } => ResultCode::NoMemory,
            CoreError::UpdateReasonNotSupported { .. } => ResultCode::UpdateReasonNotSupported,
            CoreError::CommandNotUndoable { .. } => ResultCode::CommandNotUndoable,
            CoreError::Hardware(_) | CoreError::Fail { .. } => ResultCode::Fail,
        }
    }
}

impl From<HwError> for CoreError {
    fn from(err: HwError) -> Self {
        if err.is_resource_exhausted() {
            CoreError::NoMemory {
                message: err.to_string(),
            }
        } else {
            CoreError::Hardware(err)
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Extension trait for converting a CoreResult to its result code.
pub trait CoreResultExt {
    fn code(&self) -> ResultCode;
}

impl<T> CoreResultExt for CoreResult<T> {
    fn code(&self) -> ResultCode {
        match self {
            Ok(_) => ResultCode::Success,
            Err(e) => e.code(),
        }
    }
}
