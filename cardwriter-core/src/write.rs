//! Contains the logic for writing an image file to a removable disk.
//!
//! The image is an opaque byte stream. It is copied chunk by chunk through a
//! [`DiskSession`], so the target volume stays locked and dismounted for the
//! whole transfer and is released however the write ends.
use crate::backend::DiskBackend;
use crate::device::DevicePath;
use crate::geometry::get_geometry;
use crate::resolve::resolve_physical_path;
use crate::session::DiskSession;
use anyhow::{Context, Result, anyhow, bail};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Writes an image file to the disk behind a logical volume.
///
/// # Arguments
///
/// * `backend` - The device backend to go through.
/// * `image_path` - Path to the raw image file.
/// * `volume` - The logical volume on the target disk (e.g. `\\.\E:`).
/// * `chunk_size` - Bytes per raw write. Must be a non-zero multiple of the
///   disk's sector size.
/// * `running` - An `Arc<AtomicBool>` to allow for graceful cancellation.
/// * `on_write_start` - Closure called once the disk is held, with the image size.
/// * `on_write_progress` - Closure called with the number of bytes written so far.
/// * `on_log` - Closure called with session lifecycle messages.
///
/// The final chunk is padded with zeros up to a sector boundary.
///
/// # Errors
///
/// This function will return an error if:
/// - The image cannot be read, or is larger than the disk.
/// - The volume cannot be resolved, locked or dismounted, or the disk opened.
/// - A raw write fails or accepts fewer bytes than requested.
/// - The operation is cancelled.
#[allow(clippy::too_many_arguments)]
pub fn run<F>(
    backend: &dyn DiskBackend,
    image_path: &Path,
    volume: &DevicePath,
    chunk_size: usize,
    running: Arc<AtomicBool>,
    on_write_start: impl FnOnce(u64),
    on_write_progress: F,
    on_log: impl FnMut(&str),
) -> Result<()>
where
    F: FnMut(u64),
{
    let mut image_file = File::open(image_path)
        .with_context(|| format!("failed to open image {}", image_path.display()))?;
    let image_len = image_file.metadata()?.len();

    let physical = resolve_physical_path(backend, volume)?;
    let geometry = get_geometry(backend, &physical)?;
    let sector = geometry.bytes_per_sector.max(1) as usize;

    if chunk_size == 0 || chunk_size % sector != 0 {
        bail!("chunk size {chunk_size} is not a multiple of the {sector}-byte sector size");
    }
    if image_len > geometry.total_size_bytes {
        bail!(
            "image is {} bytes but {} only holds {} bytes",
            image_len,
            physical,
            geometry.total_size_bytes
        );
    }

    let mut session = DiskSession::new(backend)
        .on_progress(on_write_progress)
        .on_log(on_log);
    session.open(volume)?;

    on_write_start(image_len);

    let mut buffer = vec![0u8; chunk_size];
    let mut consumed: u64 = 0;
    while consumed < image_len {
        if !running.load(Ordering::SeqCst) {
            session.close();
            return Err(anyhow!("Operation cancelled by user"));
        }

        let to_read = std::cmp::min(chunk_size as u64, image_len - consumed) as usize;
        image_file.read_exact(&mut buffer[..to_read])?;

        // Raw disks only take whole sectors.
        let padded = to_read.div_ceil(sector) * sector;
        buffer[to_read..padded].fill(0);

        let written = session.write(&buffer[..padded])?;
        if written != padded {
            bail!(
                "short write to {physical}: {written} of {padded} bytes at offset {consumed}"
            );
        }
        consumed += to_read as u64;
    }

    session.close();
    info!(%physical, bytes = image_len, "image written");
    Ok(())
}
