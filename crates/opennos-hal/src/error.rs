//! Hardware error types and status handling.
//!
//! Driver calls report an integer status in the OpenNSL error space. This
//! module converts those raw codes into Rust's `Result` type.

use crate::types::RawHwHandle;
use std::fmt;
use thiserror::Error;

/// Driver status codes.
///
/// These values correspond to `opennsl_error_t`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwStatus {
    None = 0,
    Internal = -1,
    Memory = -2,
    Unit = -3,
    Param = -4,
    Empty = -5,
    Full = -6,
    NotFound = -7,
    Exists = -8,
    Timeout = -9,
    Busy = -10,
    Fail = -11,
    Disabled = -12,
    BadId = -13,
    Resource = -14,
    Config = -15,
    Unavail = -16,
    Init = -17,
    Port = -18,
}

impl HwStatus {
    /// Creates a status from a raw driver return value.
    pub fn from_raw(status: i32) -> Self {
        match status {
            0 => HwStatus::None,
            -1 => HwStatus::Internal,
            -2 => HwStatus::Memory,
            -3 => HwStatus::Unit,
            -4 => HwStatus::Param,
            -5 => HwStatus::Empty,
            -6 => HwStatus::Full,
            -7 => HwStatus::NotFound,
            -8 => HwStatus::Exists,
            -9 => HwStatus::Timeout,
            -10 => HwStatus::Busy,
            -11 => HwStatus::Fail,
            -12 => HwStatus::Disabled,
            -13 => HwStatus::BadId,
            -14 => HwStatus::Resource,
            -15 => HwStatus::Config,
            -16 => HwStatus::Unavail,
            -17 => HwStatus::Init,
            -18 => HwStatus::Port,
            _ => HwStatus::Internal,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == HwStatus::None
    }

    /// Converts to a Result, returning Ok(()) for success.
    pub fn into_result(self, call: &'static str) -> HwResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(HwError::from_status(call, self))
        }
    }
}

impl fmt::Display for HwStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HwStatus::None => "OPENNSL_E_NONE",
            HwStatus::Internal => "OPENNSL_E_INTERNAL",
            HwStatus::Memory => "OPENNSL_E_MEMORY",
            HwStatus::Unit => "OPENNSL_E_UNIT",
            HwStatus::Param => "OPENNSL_E_PARAM",
            HwStatus::Empty => "OPENNSL_E_EMPTY",
            HwStatus::Full => "OPENNSL_E_FULL",
            HwStatus::NotFound => "OPENNSL_E_NOT_FOUND",
            HwStatus::Exists => "OPENNSL_E_EXISTS",
            HwStatus::Timeout => "OPENNSL_E_TIMEOUT",
            HwStatus::Busy => "OPENNSL_E_BUSY",
            HwStatus::Fail => "OPENNSL_E_FAIL",
            HwStatus::Disabled => "OPENNSL_E_DISABLED",
            HwStatus::BadId => "OPENNSL_E_BADID",
            HwStatus::Resource => "OPENNSL_E_RESOURCE",
            HwStatus::Config => "OPENNSL_E_CONFIG",
            HwStatus::Unavail => "OPENNSL_E_UNAVAIL",
            HwStatus::Init => "OPENNSL_E_INIT",
            HwStatus::Port => "OPENNSL_E_PORT",
        };
        write!(f, "{} ({})", s, *self as i32)
    }
}

/// Error type for hardware operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HwError {
    /// A driver call returned an error status.
    #[error("driver call {call} failed: {status}")]
    Status { call: &'static str, status: HwStatus },

    /// The driver has not been initialized.
    #[error("hardware not initialized")]
    Uninitialized,

    /// The handle does not refer to a live hardware object.
    #[error("unknown hardware handle 0x{0:x}")]
    UnknownHandle(RawHwHandle),

    /// The panel port has no hardware counterpart.
    #[error("port {0} has no hardware mapping")]
    UnmappedPort(String),

    /// Invalid parameter passed to the driver.
    #[error("invalid parameter: {message}")]
    InvalidParameter { message: String },
}

impl HwError {
    pub fn from_status(call: &'static str, status: HwStatus) -> Self {
        match status {
            HwStatus::Init => HwError::Uninitialized,
            _ => HwError::Status { call, status },
        }
    }

    pub fn unmapped_port(port: impl fmt::Display) -> Self {
        HwError::UnmappedPort(port.to_string())
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        HwError::InvalidParameter {
            message: message.into(),
        }
    }

    /// Returns the underlying driver status if this is a Status error.
    pub fn status(&self) -> Option<HwStatus> {
        match self {
            HwError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the driver ran out of table or memory space.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(
            self.status(),
            Some(HwStatus::Memory | HwStatus::Full | HwStatus::Resource)
        )
    }
}

/// Result type for hardware operations.
pub type HwResult<T> = Result<T, HwError>;

/// Extension trait for converting raw driver return codes.
pub trait HwStatusExt {
    fn to_result(self, call: &'static str) -> HwResult<()>;
}

impl HwStatusExt for i32 {
    fn to_result(self, call: &'static str) -> HwResult<()> {
        HwStatus::from_raw(self).into_result(call)
    }
}
