use crate::backend::{Access, ControlCode, DiskBackend, RawHandle, Share};
use crate::device::DevicePath;
use crate::error::{DiskError, Result, Transfer};
use std::fmt;
use std::io;
use tracing::{debug, warn};

/// An open device or volume, owned by whoever opened it.
///
/// The handle is released exactly once: by [`DeviceHandle::close`], or when it
/// is dropped if it was never closed explicitly. Closing twice is a no-op.
pub struct DeviceHandle<'a> {
    backend: &'a dyn DiskBackend,
    path: DevicePath,
    raw: Option<RawHandle>,
}

impl<'a> DeviceHandle<'a> {
    pub fn open(
        backend: &'a dyn DiskBackend,
        path: &DevicePath,
        access: Access,
        share: Share,
    ) -> Result<Self> {
        if path.is_empty() {
            return Err(DiskError::OpenFailed {
                path: path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty device path"),
            });
        }

        let raw = backend
            .open(path, access, share)
            .map_err(|source| DiskError::OpenFailed {
                path: path.clone(),
                source,
            })?;
        debug!(%path, ?access, ?share, "opened device");

        Ok(Self {
            backend,
            path: path.clone(),
            raw: Some(raw),
        })
    }

    pub fn path(&self) -> &DevicePath {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.raw.is_some()
    }

    fn raw(&self, operation: &'static str) -> Result<RawHandle> {
        self.raw.ok_or(DiskError::InvalidState { operation })
    }

    /// Issues a control request.
    ///
    /// The error kind follows the request: a refused lock is `LockFailed`, a
    /// refused dismount `DismountFailed`, anything else `QueryFailed`.
    pub fn control(&self, code: ControlCode, out: &mut [u8]) -> Result<usize> {
        let raw = self.raw("issue a control request")?;
        self.backend
            .control(raw, code, out)
            .map_err(|source| match code {
                ControlCode::LockVolume => DiskError::LockFailed {
                    path: self.path.clone(),
                    source,
                },
                ControlCode::DismountVolume => DiskError::DismountFailed {
                    path: self.path.clone(),
                    source,
                },
                _ => DiskError::QueryFailed {
                    path: self.path.clone(),
                    request: code,
                    source,
                },
            })
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let raw = self.raw("read")?;
        self.backend
            .read(raw, buf)
            .map_err(|source| DiskError::TransferError {
                path: self.path.clone(),
                direction: Transfer::Read,
                source,
            })
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let raw = self.raw("write")?;
        self.backend
            .write(raw, buf)
            .map_err(|source| DiskError::TransferError {
                path: self.path.clone(),
                direction: Transfer::Write,
                source,
            })
    }

    /// Releases the handle. Does nothing if it is already closed.
    pub fn close(&mut self) {
        if let Some(raw) = self.raw.take() {
            match self.backend.close(raw) {
                Ok(()) => debug!(path = %self.path, "closed device"),
                Err(e) => warn!(path = %self.path, error = %e, "failed to close device handle"),
            }
        }
    }
}

impl fmt::Debug for DeviceHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("path", &self.path)
            .field("raw", &self.raw)
            .finish()
    }
}

impl Drop for DeviceHandle<'_> {
    fn drop(&mut self) {
        self.close();
    }
}
