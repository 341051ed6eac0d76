//! Contains the logic for reading a removable disk into an image file.
use crate::backend::DiskBackend;
use crate::device::DevicePath;
use crate::geometry::get_drive_size;
use crate::resolve::resolve_physical_path;
use crate::session::DiskSession;
use anyhow::{Context, Result, anyhow, bail};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::NamedTempFile;
use tracing::info;

/// Reads the entire disk behind a logical volume into an image file.
///
/// The disk size comes from its reported geometry. The volume is locked and
/// dismounted for the duration of the read so no filesystem writes land in
/// the middle of the copy.
///
/// # Arguments
///
/// * `backend` - The device backend to go through.
/// * `volume` - The logical volume on the source disk (e.g. `\\.\E:`).
/// * `image_path` - The path where the output image file will be created.
/// * `chunk_size` - Bytes per raw read.
/// * `running` - An `Arc<AtomicBool>` used to gracefully cancel the operation.
/// * `on_read_start` - Called once with the total number of bytes to read.
/// * `on_progress` - Called with the total number of bytes read so far.
/// * `on_log` - Called with session lifecycle and per-chunk messages.
///
/// The image is assembled in a temporary file next to `image_path` and only
/// moved into place once every byte has been read, so a failed or cancelled
/// read leaves nothing behind.
///
/// # Errors
///
/// This function will return an error if:
/// - The volume cannot be resolved or locked, or the disk size is unknown.
/// - The disk reports a size of zero.
/// - The output file cannot be created or written.
/// - A raw read fails, or the medium ends before the reported size.
/// - The operation is cancelled by the user.
#[allow(clippy::too_many_arguments)]
pub fn run<F>(
    backend: &dyn DiskBackend,
    volume: &DevicePath,
    image_path: &Path,
    chunk_size: usize,
    running: Arc<AtomicBool>,
    on_read_start: impl FnOnce(u64),
    on_progress: F,
    on_log: impl FnMut(&str),
) -> Result<()>
where
    F: FnMut(u64),
{
    if chunk_size == 0 {
        bail!("chunk size must not be zero");
    }

    let physical = resolve_physical_path(backend, volume)?;
    let size_bytes = get_drive_size(backend, &physical)?;
    if size_bytes == 0 {
        return Err(anyhow!("Device size is reported as zero"));
    }

    let mut session = DiskSession::new(backend)
        .on_progress(on_progress)
        .on_log(on_log);
    session.open(volume)?;

    on_read_start(size_bytes);

    let dir = image_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut image_file = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create image {}", image_path.display()))?;

    let mut buffer = vec![0u8; chunk_size];
    let mut read_total: u64 = 0;
    while read_total < size_bytes {
        if !running.load(Ordering::SeqCst) {
            session.close();
            return Err(anyhow!("Operation cancelled by user"));
        }

        let to_read = std::cmp::min(chunk_size as u64, size_bytes - read_total) as usize;
        let n = session.read(&mut buffer[..to_read])?;
        if n == 0 {
            bail!(
                "{physical} ended after {read_total} of {size_bytes} bytes"
            );
        }

        image_file.write_all(&buffer[..n])?;
        read_total += n as u64;
    }

    session.close();
    image_file.flush()?;
    image_file
        .persist(image_path)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to save image {}", image_path.display()))?;
    info!(%physical, bytes = read_total, "image read");
    Ok(())
}
