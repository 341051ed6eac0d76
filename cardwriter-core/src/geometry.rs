//! Capacity queries against physical disks.

use crate::backend::{Access, ControlCode, DiskBackend, Share};
use crate::device::DevicePath;
use crate::error::{DiskError, Result};
use crate::handle::DeviceHandle;
use crate::layout::{self, DISK_GEOMETRY_EX_LEN, DiskGeometry};
use tracing::debug;

/// Reads the extended geometry of a physical disk.
///
/// The disk is opened for writing with no sharing: some card readers only
/// report their true capacity to an exclusive writer. A fresh query is made on
/// every call since the medium may have been swapped in between.
pub fn get_geometry(backend: &dyn DiskBackend, physical: &DevicePath) -> Result<DiskGeometry> {
    let mut handle = DeviceHandle::open(backend, physical, Access::WRITE, Share::empty())?;

    let mut buf = [0u8; DISK_GEOMETRY_EX_LEN];
    let geometry = handle
        .control(ControlCode::GetDriveGeometryEx, &mut buf)
        .and_then(|returned| {
            layout::decode_disk_geometry(&buf, returned).map_err(|source| {
                DiskError::QueryFailed {
                    path: physical.clone(),
                    request: ControlCode::GetDriveGeometryEx,
                    source,
                }
            })
        });
    handle.close();

    let geometry = geometry?;
    debug!(%physical, size = geometry.total_size_bytes, sector = geometry.bytes_per_sector, "queried geometry");
    Ok(geometry)
}

/// Returns the total size of a physical disk in bytes.
///
/// A size of zero is reported as such (e.g. an empty card reader).
pub fn get_drive_size(backend: &dyn DiskBackend, physical: &DevicePath) -> Result<u64> {
    get_geometry(backend, physical).map(|g| g.total_size_bytes)
}
