//! Maps a logical volume to the physical disk it lives on.

use crate::backend::{Access, ControlCode, DiskBackend, Share};
use crate::device::DevicePath;
use crate::error::{DiskError, Result};
use crate::handle::DeviceHandle;
use crate::layout::{self, DiskExtentMap, VOLUME_DISK_EXTENTS_LEN};
use tracing::debug;

/// Returns the single disk extent backing `logical`.
///
/// Volumes with no extents, or spanning several, fail with
/// `UnsupportedTopology` rather than picking one.
pub fn volume_extent(backend: &dyn DiskBackend, logical: &DevicePath) -> Result<DiskExtentMap> {
    let mut handle = DeviceHandle::open(backend, logical, Access::READ, Share::READ)?;
    let extent = query_single_extent(&handle);
    handle.close();
    extent
}

fn query_single_extent(handle: &DeviceHandle<'_>) -> Result<DiskExtentMap> {
    let mut buf = [0u8; VOLUME_DISK_EXTENTS_LEN];
    let returned = handle.control(ControlCode::GetVolumeDiskExtents, &mut buf)?;
    let extents =
        layout::decode_volume_extents(&buf, returned).map_err(|source| DiskError::QueryFailed {
            path: handle.path().clone(),
            request: ControlCode::GetVolumeDiskExtents,
            source,
        })?;

    match (extents.count, extents.first) {
        (1, Some(extent)) => Ok(extent),
        (count, _) => Err(DiskError::UnsupportedTopology {
            path: handle.path().clone(),
            extents: count,
        }),
    }
}

/// Resolves a logical volume path to the path of its physical disk.
pub fn resolve_physical_path(backend: &dyn DiskBackend, logical: &DevicePath) -> Result<DevicePath> {
    let extent = volume_extent(backend, logical)?;
    let physical = DevicePath::physical_drive(extent.disk_number);
    debug!(%logical, %physical, offset = extent.starting_offset, length = extent.extent_length, "resolved volume");
    Ok(physical)
}
