//! Exclusive locks on logical volumes.

use crate::backend::{Access, ControlCode, DiskBackend, Share};
use crate::device::DevicePath;
use crate::error::Result;
use crate::handle::DeviceHandle;
use tracing::{debug, info, warn};

/// A logical volume held locked and dismounted.
///
/// The volume handle stays open for as long as the lock is held, so the OS
/// does not remount the filesystem mid-transfer.
#[derive(Debug)]
pub struct VolumeLock<'a> {
    handle: DeviceHandle<'a>,
}

/// Locks `logical` and forces its filesystem off.
///
/// The volume is opened for reading with read sharing only, so no other
/// process can hold it open for writing. If the dismount fails the lock is
/// rolled back before the error is returned.
pub fn lock_and_dismount<'a>(
    backend: &'a dyn DiskBackend,
    logical: &DevicePath,
) -> Result<VolumeLock<'a>> {
    let mut handle = DeviceHandle::open(backend, logical, Access::READ, Share::READ)?;

    if let Err(e) = handle.control(ControlCode::LockVolume, &mut []) {
        handle.close();
        return Err(e);
    }
    debug!(%logical, "locked volume");

    if let Err(e) = handle.control(ControlCode::DismountVolume, &mut []) {
        if let Err(unlock) = handle.control(ControlCode::UnlockVolume, &mut []) {
            warn!(%logical, error = %unlock, "failed to roll back volume lock");
        }
        handle.close();
        return Err(e);
    }
    info!(%logical, "volume locked and dismounted");

    Ok(VolumeLock { handle })
}

impl VolumeLock<'_> {
    pub fn path(&self) -> &DevicePath {
        self.handle.path()
    }

    pub fn is_held(&self) -> bool {
        self.handle.is_open()
    }

    /// Unlocks the volume and closes its handle. Further calls do nothing.
    pub fn unlock(&mut self) {
        if !self.handle.is_open() {
            return;
        }
        if let Err(e) = self.handle.control(ControlCode::UnlockVolume, &mut []) {
            // Closing the handle releases the lock regardless.
            warn!(volume = %self.handle.path(), error = %e, "unlock request failed");
        }
        self.handle.close();
        debug!(volume = %self.handle.path(), "volume unlocked");
    }
}

impl Drop for VolumeLock<'_> {
    fn drop(&mut self) {
        self.unlock();
    }
}
