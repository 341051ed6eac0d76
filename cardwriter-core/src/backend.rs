//! The seam between the device access logic and the operating system.
//!
//! Every OS call the crate makes goes through [`DiskBackend`]. The Win32
//! implementation lives in [`crate::platform`]; [`memory::MemoryBackend`] keeps
//! disks and volumes in memory and is what the tests run against.

use crate::device::DevicePath;
use bitflags::bitflags;
use std::fmt;
use std::io;

pub mod memory;

bitflags! {
    /// Access requested when opening a device.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

bitflags! {
    /// Access other openers of the same device are still allowed.
    ///
    /// An empty set opens the device exclusively.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Share: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

/// Control requests issued against an open device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlCode {
    LockVolume,
    UnlockVolume,
    DismountVolume,
    /// Fills a `VOLUME_DISK_EXTENTS` record.
    GetVolumeDiskExtents,
    /// Fills a `DISK_GEOMETRY_EX` record.
    GetDriveGeometryEx,
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlCode::LockVolume => "lock volume",
            ControlCode::UnlockVolume => "unlock volume",
            ControlCode::DismountVolume => "dismount volume",
            ControlCode::GetVolumeDiskExtents => "volume disk extents query",
            ControlCode::GetDriveGeometryEx => "drive geometry query",
        };
        f.write_str(name)
    }
}

/// A backend-issued token for one open device.
///
/// Tokens are plain values; ownership and release are tracked by
/// [`crate::handle::DeviceHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawHandle(pub u64);

/// Blocking, synchronous access to OS devices.
///
/// Implementations must not assume calls on different handles are ordered in
/// any way, but callers never issue two calls on the same handle at once.
pub trait DiskBackend {
    /// Opens an existing device.
    fn open(&self, path: &DevicePath, access: Access, share: Share) -> io::Result<RawHandle>;

    /// Issues a control request, writing any result record into `out`.
    ///
    /// Returns the number of bytes written to `out`.
    fn control(&self, handle: RawHandle, code: ControlCode, out: &mut [u8]) -> io::Result<usize>;

    /// Reads from the handle's current position, advancing it.
    fn read(&self, handle: RawHandle, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes at the handle's current position, advancing it.
    fn write(&self, handle: RawHandle, buf: &[u8]) -> io::Result<usize>;

    /// Releases the handle and anything the OS tied to it, such as a volume lock.
    fn close(&self, handle: RawHandle) -> io::Result<()>;
}
