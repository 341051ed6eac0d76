//! Sequential raw I/O against a physical disk.

use crate::backend::{Access, ControlCode, DiskBackend, Share};
use crate::device::DevicePath;
use crate::error::{DiskError, Result};
use crate::handle::DeviceHandle;
use tracing::{debug, trace};

/// An exclusively held physical disk open for raw reads and writes.
///
/// Transfers go through the OS handle's own cursor, starting at offset zero.
/// A default-constructed channel is closed and refuses transfers.
#[derive(Debug, Default)]
pub struct RawChannel<'a> {
    handle: Option<DeviceHandle<'a>>,
}

impl<'a> RawChannel<'a> {
    /// Opens `physical` for reading and writing and locks it.
    ///
    /// A handle that cannot be locked is closed again and `LockFailed` returned.
    pub fn open(backend: &'a dyn DiskBackend, physical: &DevicePath) -> Result<Self> {
        let mut handle = DeviceHandle::open(
            backend,
            physical,
            Access::READ | Access::WRITE,
            Share::READ | Share::WRITE,
        )?;

        if let Err(e) = handle.control(ControlCode::LockVolume, &mut []) {
            handle.close();
            return Err(e);
        }
        debug!(%physical, "raw channel open");

        Ok(Self {
            handle: Some(handle),
        })
    }

    pub fn is_open(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.is_open())
    }

    fn handle(&mut self, operation: &'static str) -> Result<&mut DeviceHandle<'a>> {
        self.handle
            .as_mut()
            .filter(|h| h.is_open())
            .ok_or(DiskError::InvalidState { operation })
    }

    /// Reads up to `buf.len()` bytes. Fewer are returned at the end of the medium.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.handle("read")?.read(buf)?;
        trace!(requested = buf.len(), read = n, "raw read");
        Ok(n)
    }

    /// Writes `buf` in a single transfer, returning the bytes accepted.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let n = self.handle("write")?.write(buf)?;
        trace!(requested = buf.len(), written = n, "raw write");
        Ok(n)
    }

    /// Closes the disk, which also drops its lock. Does nothing if already closed.
    pub fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
    }
}
