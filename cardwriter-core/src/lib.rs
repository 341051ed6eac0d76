//! The core, UI-agnostic library for the `cardwriter` disk imaging utility.
//!
//! `cardwriter-core` takes exclusive ownership of a removable disk, such as an
//! SD card mounted as a logical volume, so that a raw image can be written to
//! or read from it without the operating system's filesystem layer getting in
//! the way.
//!
//! The library is structured into several key modules:
//! - [`device`]: The [`DevicePath`] type and volume identifier normalization.
//! - [`backend`]: The [`DiskBackend`] trait every OS call goes through, and an
//!   in-memory implementation.
//! - [`platform`]: The backend for the running operating system.
//! - [`resolve`]: Maps a logical volume to the physical disk behind it.
//! - [`volume`]: Locks and dismounts logical volumes.
//! - [`geometry`]: Queries a physical disk's capacity.
//! - [`channel`]: Exclusive sequential raw I/O on a physical disk.
//! - [`session`]: Composes all of the above into one [`DiskSession`].
//! - [`mod@read`] and [`mod@write`]: Whole-image transfers built on a session.
//!
//! Every operation is blocking and returns an explicit [`Result`]. Nothing is
//! retried, and anything acquired before a failure is released before the
//! error is returned.
//!
//! ## Example: Writing to a volume through a session
//!
//! ```rust,no_run
//! use cardwriter_core::{DevicePath, DiskSession, platform};
//!
//! fn main() -> anyhow::Result<()> {
//!     let backend = platform::native_backend()?;
//!     let volume = DevicePath::volume("E:");
//!
//!     let mut session = DiskSession::new(backend.as_ref())
//!         .on_progress(|bytes| println!("{bytes} bytes written"))
//!         .on_log(|msg| println!("{msg}"));
//!     session.open(&volume)?;
//!
//!     let chunk = vec![0u8; 1024 * 1024];
//!     for _ in 0..4 {
//!         session.write(&chunk)?;
//!     }
//!
//!     // Releases the disk, then unlocks the volume.
//!     session.close();
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod channel;
pub mod device;
pub mod error;
pub mod geometry;
pub mod handle;
pub mod layout;
pub mod platform;
pub mod read;
pub mod resolve;
pub mod session;
pub mod volume;
pub mod write;

pub use backend::DiskBackend;
pub use channel::RawChannel;
pub use device::DevicePath;
pub use error::{DiskError, ErrorKind, Result};
pub use geometry::{get_drive_size, get_geometry};
pub use handle::DeviceHandle;
pub use layout::{DiskExtentMap, DiskGeometry};
pub use resolve::{resolve_physical_path, volume_extent};
pub use session::{DiskSession, SessionState};
pub use volume::{VolumeLock, lock_and_dismount};
