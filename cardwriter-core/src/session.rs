//! Ownership of one physical disk for the length of a transfer.
//!
//! A [`DiskSession`] resolves a logical volume to its disk, locks and
//! dismounts the volume, then opens and locks the disk for raw I/O. Whatever
//! it managed to acquire is released in reverse order when it closes, fails,
//! or is dropped.

use crate::backend::DiskBackend;
use crate::channel::RawChannel;
use crate::device::DevicePath;
use crate::error::{DiskError, ErrorKind, Result, Transfer};
use crate::resolve::resolve_physical_path;
use crate::volume::{VolumeLock, lock_and_dismount};
use tracing::{debug, info, warn};

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Resolving,
    Locking,
    Opened,
    Reading,
    Writing,
    Closing,
    Closed,
}

/// A physical disk held exclusively for raw reads and writes.
///
/// Sessions are single use: once closed, by the caller or by a failure, every
/// further operation returns `InvalidState`. There is no internal
/// synchronization; a session belongs to one thread at a time.
pub struct DiskSession<'a> {
    backend: &'a dyn DiskBackend,
    state: SessionState,
    physical: Option<DevicePath>,
    volume: Option<VolumeLock<'a>>,
    channel: RawChannel<'a>,
    transferred: u64,
    failure: Option<ErrorKind>,
    on_progress: Option<Box<dyn FnMut(u64) + 'a>>,
    on_log: Option<Box<dyn FnMut(&str) + 'a>>,
}

impl<'a> DiskSession<'a> {
    pub fn new(backend: &'a dyn DiskBackend) -> Self {
        Self {
            backend,
            state: SessionState::Unopened,
            physical: None,
            volume: None,
            channel: RawChannel::default(),
            transferred: 0,
            failure: None,
            on_progress: None,
            on_log: None,
        }
    }

    /// Sets a callback receiving the total bytes transferred after each chunk.
    pub fn on_progress(mut self, f: impl FnMut(u64) + 'a) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    /// Sets a callback receiving human-readable messages, at each lifecycle
    /// step and after every completed chunk.
    pub fn on_log(mut self, f: impl FnMut(&str) + 'a) -> Self {
        self.on_log = Some(Box::new(f));
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The physical disk this session holds, once open.
    pub fn physical_path(&self) -> Option<&DevicePath> {
        self.physical.as_ref()
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// Kind of the error that closed the session, if one did.
    pub fn failure(&self) -> Option<ErrorKind> {
        self.failure
    }

    fn log(&mut self, msg: &str) {
        if let Some(f) = self.on_log.as_mut() {
            f(msg);
        }
    }

    /// Takes ownership of the disk behind `logical`.
    pub fn open(&mut self, logical: &DevicePath) -> Result<()> {
        if self.state != SessionState::Unopened {
            return Err(DiskError::InvalidState {
                operation: "reopen a used session",
            });
        }

        self.state = SessionState::Resolving;
        let physical = match resolve_physical_path(self.backend, logical) {
            Ok(physical) => physical,
            Err(e) => return Err(self.fail(e)),
        };
        self.log(&format!("{logical} is on {physical}"));

        self.state = SessionState::Locking;
        match lock_and_dismount(self.backend, logical) {
            Ok(lock) => self.volume = Some(lock),
            Err(e) => return Err(self.fail(e)),
        }
        self.log(&format!("Locked and dismounted {logical}"));

        match RawChannel::open(self.backend, &physical) {
            Ok(channel) => self.channel = channel,
            Err(e) => return Err(self.fail(e)),
        }
        self.log(&format!("Opened {physical}"));
        info!(%logical, %physical, "disk session open");

        self.physical = Some(physical);
        self.state = SessionState::Opened;
        Ok(())
    }

    fn ready(&self, operation: &'static str) -> Result<()> {
        match self.state {
            SessionState::Opened | SessionState::Reading | SessionState::Writing => Ok(()),
            _ => Err(DiskError::InvalidState { operation }),
        }
    }

    fn record(&mut self, direction: Transfer, n: usize) {
        self.transferred += n as u64;
        let total = self.transferred;
        if let Some(f) = self.on_progress.as_mut() {
            f(total);
        }
        if self.on_log.is_some() {
            let verb = match direction {
                Transfer::Read => "read",
                Transfer::Write => "wrote",
            };
            self.log(&format!("{verb} {n} bytes (total {total})"));
        }
    }

    /// Reads the next chunk from the disk.
    ///
    /// Returns fewer bytes than `buf` holds at the end of the medium.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ready("read")?;
        self.state = SessionState::Reading;
        match self.channel.read(buf) {
            Ok(n) => {
                self.record(Transfer::Read, n);
                Ok(n)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Writes the next chunk to the disk in a single transfer.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.ready("write")?;
        self.state = SessionState::Writing;
        match self.channel.write(buf) {
            Ok(n) => {
                self.record(Transfer::Write, n);
                Ok(n)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Releases the disk and then the volume. Does nothing if already closed.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.release();
        let msg = format!("Session closed after {} bytes", self.transferred);
        self.log(&msg);
    }

    fn fail(&mut self, e: DiskError) -> DiskError {
        warn!(error = %e, state = ?self.state, "disk session failed");
        self.failure = Some(e.kind());
        self.release();
        self.log(&format!("Error: {e}"));
        e
    }

    fn release(&mut self) {
        self.state = SessionState::Closing;
        self.channel.close();
        if let Some(mut volume) = self.volume.take() {
            volume.unlock();
        }
        self.state = SessionState::Closed;
        debug!(transferred = self.transferred, "disk session released");
    }
}

impl Drop for DiskSession<'_> {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            self.release();
        }
    }
}
