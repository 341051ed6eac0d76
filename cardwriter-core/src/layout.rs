//! Fixed-layout decoding of the records returned by control requests.
//!
//! The offsets follow the 64-bit Win32 definitions of `VOLUME_DISK_EXTENTS` and
//! `DISK_GEOMETRY_EX`. Nothing outside the resolver and the geometry query
//! should need to look at these bytes.

use byteorder::{ByteOrder, LittleEndian};
use std::io;

/// Size of a `VOLUME_DISK_EXTENTS` record holding exactly one extent.
pub const VOLUME_DISK_EXTENTS_LEN: usize = 32;
const EXTENT_COUNT_LEN: usize = 8;

/// Size of a `DISK_GEOMETRY_EX` record, including its one-byte trailing data
/// array and alignment padding.
pub const DISK_GEOMETRY_EX_LEN: usize = 40;
const DISK_GEOMETRY_EX_MIN_LEN: usize = 32;

/// The single contiguous extent a logical volume occupies on a physical disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskExtentMap {
    pub disk_number: u32,
    pub starting_offset: u64,
    pub extent_length: u64,
}

/// Decoded header of a volume extents query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VolumeExtents {
    /// Number of extents the volume reports, which may exceed what fit in the buffer.
    pub count: u32,
    pub first: Option<DiskExtentMap>,
}

/// Snapshot of a physical disk's extended geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskGeometry {
    pub cylinders: u64,
    pub media_type: u32,
    pub tracks_per_cylinder: u32,
    pub sectors_per_track: u32,
    pub bytes_per_sector: u32,
    pub total_size_bytes: u64,
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn non_negative(value: i64, field: &str) -> io::Result<u64> {
    u64::try_from(value).map_err(|_| invalid(format!("{field} is negative ({value})")))
}

/// Decodes the first `returned` bytes of a volume extents record.
pub fn decode_volume_extents(buf: &[u8], returned: usize) -> io::Result<VolumeExtents> {
    let returned = returned.min(buf.len());
    if returned < EXTENT_COUNT_LEN {
        return Err(invalid(format!(
            "volume extents record truncated to {returned} bytes"
        )));
    }

    let count = LittleEndian::read_u32(&buf[0..4]);
    let first = if count >= 1 && returned >= VOLUME_DISK_EXTENTS_LEN {
        Some(DiskExtentMap {
            disk_number: LittleEndian::read_u32(&buf[8..12]),
            starting_offset: non_negative(LittleEndian::read_i64(&buf[16..24]), "starting offset")?,
            extent_length: non_negative(LittleEndian::read_i64(&buf[24..32]), "extent length")?,
        })
    } else {
        None
    };

    Ok(VolumeExtents { count, first })
}

/// Encodes a volume extents record into `out`, returning the bytes written.
///
/// Only as many extents as fit are written; the count always reflects `extents.len()`.
pub fn encode_volume_extents(extents: &[DiskExtentMap], out: &mut [u8]) -> io::Result<usize> {
    if out.len() < EXTENT_COUNT_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "buffer too small for the extent count",
        ));
    }
    out[..EXTENT_COUNT_LEN].fill(0);
    LittleEndian::write_u32(&mut out[0..4], extents.len() as u32);

    let mut written = EXTENT_COUNT_LEN;
    for extent in extents {
        let record = &mut out[written..];
        if record.len() < 24 {
            break;
        }
        record[..24].fill(0);
        LittleEndian::write_u32(&mut record[0..4], extent.disk_number);
        LittleEndian::write_i64(&mut record[8..16], extent.starting_offset as i64);
        LittleEndian::write_i64(&mut record[16..24], extent.extent_length as i64);
        written += 24;
    }
    Ok(written)
}

/// Decodes the first `returned` bytes of an extended geometry record.
pub fn decode_disk_geometry(buf: &[u8], returned: usize) -> io::Result<DiskGeometry> {
    let returned = returned.min(buf.len());
    if returned < DISK_GEOMETRY_EX_MIN_LEN {
        return Err(invalid(format!(
            "drive geometry record truncated to {returned} bytes"
        )));
    }

    Ok(DiskGeometry {
        cylinders: non_negative(LittleEndian::read_i64(&buf[0..8]), "cylinder count")?,
        media_type: LittleEndian::read_u32(&buf[8..12]),
        tracks_per_cylinder: LittleEndian::read_u32(&buf[12..16]),
        sectors_per_track: LittleEndian::read_u32(&buf[16..20]),
        bytes_per_sector: LittleEndian::read_u32(&buf[20..24]),
        total_size_bytes: non_negative(LittleEndian::read_i64(&buf[24..32]), "disk size")?,
    })
}

/// Encodes an extended geometry record into `out`, returning the bytes written.
pub fn encode_disk_geometry(geometry: &DiskGeometry, out: &mut [u8]) -> io::Result<usize> {
    if out.len() < DISK_GEOMETRY_EX_MIN_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "buffer too small for a drive geometry record",
        ));
    }
    let len = out.len().min(DISK_GEOMETRY_EX_LEN);
    out[..len].fill(0);
    LittleEndian::write_i64(&mut out[0..8], geometry.cylinders as i64);
    LittleEndian::write_u32(&mut out[8..12], geometry.media_type);
    LittleEndian::write_u32(&mut out[12..16], geometry.tracks_per_cylinder);
    LittleEndian::write_u32(&mut out[16..20], geometry.sectors_per_track);
    LittleEndian::write_u32(&mut out[20..24], geometry.bytes_per_sector);
    LittleEndian::write_i64(&mut out[24..32], geometry.total_size_bytes as i64);
    Ok(len)
}
