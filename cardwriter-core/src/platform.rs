//! Provides the operating system's [`DiskBackend`].
//!
//! It uses conditional compilation (`#[cfg]`) to expose the implementation for
//! the target OS. Raw volume locking and dismounting are Win32 concepts, so on
//! other targets [`native_backend`] reports the platform as unsupported and
//! only [`crate::backend::memory::MemoryBackend`] is available.

use crate::backend::DiskBackend;
use std::io;

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
pub use self::windows::WindowsBackend;

/// Returns the backend that talks to this machine's devices.
pub fn native_backend() -> io::Result<Box<dyn DiskBackend>> {
    #[cfg(target_os = "windows")]
    {
        Ok(Box::new(WindowsBackend::new()))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "raw volume access is only supported on Windows",
        ))
    }
}
