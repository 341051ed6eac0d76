//! An in-memory [`DiskBackend`].
//!
//! Disks are byte vectors addressed as `\\.\PhysicalDriveN`; volumes are named
//! extents over those disks. The backend follows the Win32 rules that matter
//! for exclusive access:
//!
//! - opens are checked against the share modes of every other open handle on
//!   the same path,
//! - a volume lock is owned by one handle and fails while any other handle on
//!   the path is open,
//! - a dismounted volume stays dismounted until the handle that dismounted it
//!   closes,
//! - writes to a disk range covered by a mounted volume are refused.
//!
//! Faults can be injected per control request or transfer direction, and the
//! number of open handles is observable so tests can assert nothing leaked.

use super::{Access, ControlCode, DiskBackend, RawHandle, Share};
use crate::device::DevicePath;
use crate::layout::{self, DiskExtentMap, DiskGeometry};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

/// A failure the backend can be told to report.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Opening this path is refused with "access denied".
    Open(DevicePath),
    /// This control request fails on every handle.
    Control(ControlCode),
    Read,
    Write,
    /// Writes succeed but accept only half of the requested bytes.
    ShortWrite,
    /// Reads return nothing past this offset, short of the reported size.
    EndOfMedium(u64),
}

const REMOVABLE_MEDIA: u32 = 11;
const TRACKS_PER_CYLINDER: u32 = 255;
const SECTORS_PER_TRACK: u32 = 63;

struct MemoryDisk {
    data: Vec<u8>,
    bytes_per_sector: u32,
}

struct MemoryVolume {
    extents: Vec<DiskExtentMap>,
    /// Handle that dismounted the volume, if it is currently dismounted.
    dismounted_by: Option<RawHandle>,
}

#[derive(Clone, Copy)]
enum Target {
    Disk(u32),
    Volume,
}

struct OpenHandle {
    path: DevicePath,
    target: Target,
    access: Access,
    share: Share,
    position: u64,
}

#[derive(Default)]
struct State {
    disks: BTreeMap<u32, MemoryDisk>,
    volumes: BTreeMap<DevicePath, MemoryVolume>,
    handles: HashMap<RawHandle, OpenHandle>,
    locks: HashMap<DevicePath, RawHandle>,
    faults: HashSet<Fault>,
    next_handle: u64,
    total_opened: u64,
}

/// Disks and volumes held in memory.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

fn error(kind: io::ErrorKind, msg: &str) -> io::Error {
    io::Error::new(kind, msg.to_string())
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves the maps consistent enough to inspect.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a zero-filled disk reachable as `\\.\PhysicalDrive{index}`.
    pub fn with_disk(self, index: u32, size_bytes: u64, bytes_per_sector: u32) -> Self {
        self.state().disks.insert(
            index,
            MemoryDisk {
                data: vec![0; size_bytes as usize],
                bytes_per_sector,
            },
        );
        self
    }

    /// Adds a mounted volume backed by the given extents.
    pub fn with_volume(self, id: &str, extents: Vec<DiskExtentMap>) -> Self {
        self.state().volumes.insert(
            DevicePath::volume(id),
            MemoryVolume {
                extents,
                dismounted_by: None,
            },
        );
        self
    }

    /// Adds a mounted volume covering all of disk `index`.
    pub fn with_whole_disk_volume(self, id: &str, index: u32) -> Self {
        let length = self
            .state()
            .disks
            .get(&index)
            .map_or(0, |disk| disk.data.len() as u64);
        self.with_volume(
            id,
            vec![DiskExtentMap {
                disk_number: index,
                starting_offset: 0,
                extent_length: length,
            }],
        )
    }

    pub fn inject(&self, fault: Fault) {
        self.state().faults.insert(fault);
    }

    pub fn clear_fault(&self, fault: &Fault) {
        self.state().faults.remove(fault);
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.state().handles.len()
    }

    /// Number of successful opens over the backend's lifetime.
    pub fn total_opened(&self) -> u64 {
        self.state().total_opened
    }

    pub fn is_locked(&self, path: &DevicePath) -> bool {
        self.state().locks.contains_key(path)
    }

    /// Whether the volume is mounted. Unknown volumes are reported unmounted.
    pub fn is_mounted(&self, volume: &DevicePath) -> bool {
        self.state()
            .volumes
            .get(volume)
            .is_some_and(|v| v.dismounted_by.is_none())
    }

    /// Copy of the contents of disk `index`.
    pub fn disk_contents(&self, index: u32) -> Option<Vec<u8>> {
        self.state().disks.get(&index).map(|disk| disk.data.clone())
    }

    /// Overwrites the start of disk `index` without going through a handle.
    pub fn fill_disk(&self, index: u32, bytes: &[u8]) {
        if let Some(disk) = self.state().disks.get_mut(&index) {
            let len = bytes.len().min(disk.data.len());
            disk.data[..len].copy_from_slice(&bytes[..len]);
        }
    }
}

impl State {
    fn handle(&mut self, handle: RawHandle) -> io::Result<&mut OpenHandle> {
        self.handles
            .get_mut(&handle)
            .ok_or_else(|| error(io::ErrorKind::InvalidInput, "invalid handle"))
    }

    fn target_of(&self, path: &DevicePath) -> Option<Target> {
        if self.volumes.contains_key(path) {
            return Some(Target::Volume);
        }
        path.physical_index()
            .filter(|index| self.disks.contains_key(index))
            .map(Target::Disk)
    }

    fn sharing_conflict(&self, path: &DevicePath, access: Access, share: Share) -> bool {
        let wants = Share::from_bits_truncate(access.bits());
        self.handles.values().filter(|h| &h.path == path).any(|h| {
            let held = Share::from_bits_truncate(h.access.bits());
            !h.share.contains(wants) || !share.contains(held)
        })
    }

    /// Whether a write to `disk` over `range` would land on a mounted volume.
    fn blocked_by_mounted_volume(&self, disk: u32, start: u64, end: u64) -> bool {
        self.volumes
            .values()
            .filter(|v| v.dismounted_by.is_none())
            .flat_map(|v| v.extents.iter())
            .filter(|e| e.disk_number == disk)
            .any(|e| start < e.starting_offset + e.extent_length && e.starting_offset < end)
    }

    fn lock_volume(&mut self, handle: RawHandle) -> io::Result<usize> {
        let path = self.handle(handle)?.path.clone();
        match self.locks.get(&path) {
            Some(owner) if *owner == handle => return Ok(0),
            Some(_) => return Err(error(io::ErrorKind::ResourceBusy, "volume is locked")),
            None => {}
        }
        let others = self
            .handles
            .iter()
            .any(|(id, h)| *id != handle && h.path == path);
        if others {
            return Err(error(io::ErrorKind::ResourceBusy, "volume has other open handles"));
        }
        self.locks.insert(path, handle);
        Ok(0)
    }

    fn unlock_volume(&mut self, handle: RawHandle) -> io::Result<usize> {
        let path = self.handle(handle)?.path.clone();
        if self.locks.get(&path) != Some(&handle) {
            return Err(error(io::ErrorKind::InvalidInput, "volume is not locked by this handle"));
        }
        self.locks.remove(&path);
        Ok(0)
    }

    fn dismount_volume(&mut self, handle: RawHandle) -> io::Result<usize> {
        let path = self.handle(handle)?.path.clone();
        let volume = self
            .volumes
            .get_mut(&path)
            .ok_or_else(|| error(io::ErrorKind::InvalidInput, "not a volume"))?;
        volume.dismounted_by.get_or_insert(handle);
        Ok(0)
    }

    fn volume_extents(&mut self, handle: RawHandle, out: &mut [u8]) -> io::Result<usize> {
        let path = self.handle(handle)?.path.clone();
        let volume = self
            .volumes
            .get(&path)
            .ok_or_else(|| error(io::ErrorKind::InvalidInput, "not a volume"))?;
        layout::encode_volume_extents(&volume.extents, out)
    }

    fn geometry(&mut self, handle: RawHandle, out: &mut [u8]) -> io::Result<usize> {
        let Target::Disk(index) = self.handle(handle)?.target else {
            return Err(error(io::ErrorKind::InvalidInput, "not a disk"));
        };
        let disk = &self.disks[&index];
        let size = disk.data.len() as u64;
        let cylinder_bytes =
            u64::from(TRACKS_PER_CYLINDER * SECTORS_PER_TRACK) * u64::from(disk.bytes_per_sector);
        let geometry = DiskGeometry {
            cylinders: size / cylinder_bytes.max(1),
            media_type: REMOVABLE_MEDIA,
            tracks_per_cylinder: TRACKS_PER_CYLINDER,
            sectors_per_track: SECTORS_PER_TRACK,
            bytes_per_sector: disk.bytes_per_sector,
            total_size_bytes: size,
        };
        layout::encode_disk_geometry(&geometry, out)
    }
}

impl DiskBackend for MemoryBackend {
    fn open(&self, path: &DevicePath, access: Access, share: Share) -> io::Result<RawHandle> {
        let mut state = self.state();
        if state.faults.contains(&Fault::Open(path.clone())) {
            return Err(error(io::ErrorKind::PermissionDenied, "access denied"));
        }
        let target = state
            .target_of(path)
            .ok_or_else(|| error(io::ErrorKind::NotFound, "no such device"))?;
        if state.sharing_conflict(path, access, share) {
            return Err(error(io::ErrorKind::PermissionDenied, "sharing violation"));
        }

        state.next_handle += 1;
        state.total_opened += 1;
        let handle = RawHandle(state.next_handle);
        state.handles.insert(
            handle,
            OpenHandle {
                path: path.clone(),
                target,
                access,
                share,
                position: 0,
            },
        );
        trace!(%path, ?handle, ?access, ?share, "memory device opened");
        Ok(handle)
    }

    fn control(&self, handle: RawHandle, code: ControlCode, out: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        state.handle(handle)?;
        if state.faults.contains(&Fault::Control(code)) {
            return Err(error(io::ErrorKind::Other, "injected control failure"));
        }
        match code {
            ControlCode::LockVolume => state.lock_volume(handle),
            ControlCode::UnlockVolume => state.unlock_volume(handle),
            ControlCode::DismountVolume => state.dismount_volume(handle),
            ControlCode::GetVolumeDiskExtents => state.volume_extents(handle, out),
            ControlCode::GetDriveGeometryEx => state.geometry(handle, out),
        }
    }

    fn read(&self, handle: RawHandle, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        if state.faults.contains(&Fault::Read) {
            return Err(error(io::ErrorKind::Other, "injected read failure"));
        }
        let open = state.handle(handle)?;
        if !open.access.contains(Access::READ) {
            return Err(error(io::ErrorKind::PermissionDenied, "handle not opened for reading"));
        }
        let Target::Disk(index) = open.target else {
            return Err(error(io::ErrorKind::Unsupported, "volume reads are not modelled"));
        };
        let position = open.position;

        let end_of_medium = state
            .faults
            .iter()
            .filter_map(|fault| match fault {
                Fault::EndOfMedium(offset) => Some(*offset as usize),
                _ => None,
            })
            .min();

        let data = &state.disks[&index].data;
        let readable = end_of_medium.map_or(data.len(), |end| end.min(data.len()));
        let start = (position as usize).min(readable);
        let len = buf.len().min(readable - start);
        buf[..len].copy_from_slice(&data[start..start + len]);

        state.handle(handle)?.position += len as u64;
        Ok(len)
    }

    fn write(&self, handle: RawHandle, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        if state.faults.contains(&Fault::Write) {
            return Err(error(io::ErrorKind::Other, "injected write failure"));
        }
        let open = state.handle(handle)?;
        if !open.access.contains(Access::WRITE) {
            return Err(error(io::ErrorKind::PermissionDenied, "handle not opened for writing"));
        }
        let Target::Disk(index) = open.target else {
            return Err(error(io::ErrorKind::Unsupported, "volume writes are not modelled"));
        };
        let position = open.position;

        let disk_len = state.disks[&index].data.len();
        let start = (position as usize).min(disk_len);
        let mut len = buf.len().min(disk_len - start);
        if state.faults.contains(&Fault::ShortWrite) {
            len /= 2;
        }
        if len > 0 && state.blocked_by_mounted_volume(index, start as u64, (start + len) as u64) {
            return Err(error(
                io::ErrorKind::PermissionDenied,
                "write overlaps a mounted volume",
            ));
        }

        if let Some(disk) = state.disks.get_mut(&index) {
            disk.data[start..start + len].copy_from_slice(&buf[..len]);
        }
        state.handle(handle)?.position += len as u64;
        Ok(len)
    }

    fn close(&self, handle: RawHandle) -> io::Result<()> {
        let mut state = self.state();
        let open = state
            .handles
            .remove(&handle)
            .ok_or_else(|| error(io::ErrorKind::InvalidInput, "invalid handle"))?;
        if state.locks.get(&open.path) == Some(&handle) {
            state.locks.remove(&open.path);
        }
        for volume in state.volumes.values_mut() {
            if volume.dismounted_by == Some(handle) {
                volume.dismounted_by = None;
            }
        }
        trace!(path = %open.path, ?handle, "memory device closed");
        Ok(())
    }
}
