use crate::backend::ControlCode;
use crate::device::DevicePath;
use std::fmt;
use std::io;
use thiserror::Error;

/// Direction of a raw transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transfer {
    Read,
    Write,
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transfer::Read => f.write_str("read"),
            Transfer::Write => f.write_str("write"),
        }
    }
}

/// Error category of a [`DiskError`].
///
/// Unlike `DiskError` this is `Copy`, so a session can remember why it closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    OpenFailed,
    LockFailed,
    DismountFailed,
    QueryFailed,
    UnsupportedTopology,
    InvalidState,
    TransferError,
}

/// Errors returned by the device access layer.
#[derive(Error, Debug)]
pub enum DiskError {
    #[error("failed to open {path}")]
    OpenFailed {
        path: DevicePath,
        #[source]
        source: io::Error,
    },

    #[error("failed to lock {path}, it is in use by another process")]
    LockFailed {
        path: DevicePath,
        #[source]
        source: io::Error,
    },

    /// The volume lock has already been rolled back when this is returned.
    #[error("failed to dismount {path}")]
    DismountFailed {
        path: DevicePath,
        #[source]
        source: io::Error,
    },

    #[error("{request} on {path} failed")]
    QueryFailed {
        path: DevicePath,
        request: ControlCode,
        #[source]
        source: io::Error,
    },

    #[error("{path} spans {extents} disk extents, exactly one is supported")]
    UnsupportedTopology { path: DevicePath, extents: u32 },

    #[error("invalid state: cannot {operation}")]
    InvalidState { operation: &'static str },

    #[error("raw {direction} on {path} failed")]
    TransferError {
        path: DevicePath,
        direction: Transfer,
        #[source]
        source: io::Error,
    },
}

impl DiskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DiskError::OpenFailed { .. } => ErrorKind::OpenFailed,
            DiskError::LockFailed { .. } => ErrorKind::LockFailed,
            DiskError::DismountFailed { .. } => ErrorKind::DismountFailed,
            DiskError::QueryFailed { .. } => ErrorKind::QueryFailed,
            DiskError::UnsupportedTopology { .. } => ErrorKind::UnsupportedTopology,
            DiskError::InvalidState { .. } => ErrorKind::InvalidState,
            DiskError::TransferError { .. } => ErrorKind::TransferError,
        }
    }
}

/// Result type alias for device access operations.
pub type Result<T> = std::result::Result<T, DiskError>;
