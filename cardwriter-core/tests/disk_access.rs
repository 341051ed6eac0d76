use cardwriter_core::backend::memory::{Fault, MemoryBackend};
use cardwriter_core::backend::{Access, ControlCode, Share};
use cardwriter_core::{
    DeviceHandle, DevicePath, DiskExtentMap, DiskSession, ErrorKind, RawChannel, SessionState,
    get_drive_size, lock_and_dismount, resolve_physical_path,
};

const SECTOR: u32 = 512;
const DISK_SIZE: u64 = 64 * 1024;

fn card_reader() -> MemoryBackend {
    MemoryBackend::new()
        .with_disk(2, DISK_SIZE, SECTOR)
        .with_whole_disk_volume("E:", 2)
}

fn extent(disk_number: u32) -> DiskExtentMap {
    DiskExtentMap {
        disk_number,
        starting_offset: 0,
        extent_length: 4096,
    }
}

#[test]
fn resolves_single_extent_volumes_to_their_disk() {
    let backend = MemoryBackend::new()
        .with_disk(0, 4096, SECTOR)
        .with_disk(5, 4096, SECTOR)
        .with_volume("C:", vec![extent(0)])
        .with_volume("G:", vec![extent(5)]);

    for (volume, index) in [("C:", 0), ("G:", 5)] {
        let physical = resolve_physical_path(&backend, &DevicePath::volume(volume)).unwrap();
        assert_eq!(physical, DevicePath::physical_drive(index));
        assert_eq!(physical.physical_index(), Some(index));
    }
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn volumes_without_exactly_one_extent_are_unsupported() {
    let backend = MemoryBackend::new()
        .with_disk(0, 4096, SECTOR)
        .with_disk(1, 4096, SECTOR)
        .with_volume("H:", vec![])
        .with_volume("S:", vec![extent(0), extent(1)]);

    for (volume, count) in [("H:", 0), ("S:", 2)] {
        let err = resolve_physical_path(&backend, &DevicePath::volume(volume)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedTopology);
        assert!(err.to_string().contains(&format!("spans {count} disk extents")));
        assert_eq!(backend.open_handles(), 0, "handle leaked resolving {volume}");
    }
}

#[test]
fn unlock_twice_is_a_no_op() {
    let backend = card_reader();
    let volume = DevicePath::volume("E:");

    let mut lock = lock_and_dismount(&backend, &volume).unwrap();
    assert!(lock.is_held());
    assert!(backend.is_locked(&volume));
    assert!(!backend.is_mounted(&volume));

    lock.unlock();
    lock.unlock();
    assert!(!lock.is_held());
    assert!(!backend.is_locked(&volume));
    assert!(backend.is_mounted(&volume));
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn second_locker_is_refused_while_the_volume_is_held() {
    let backend = card_reader();
    let volume = DevicePath::volume("E:");

    let _lock = lock_and_dismount(&backend, &volume).unwrap();
    let err = lock_and_dismount(&backend, &volume).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::OpenFailed | ErrorKind::LockFailed));
    assert_eq!(backend.open_handles(), 1);
}

#[test]
fn failed_dismount_rolls_the_lock_back() {
    let backend = card_reader();
    let volume = DevicePath::volume("E:");

    backend.inject(Fault::Control(ControlCode::DismountVolume));
    let err = lock_and_dismount(&backend, &volume).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DismountFailed);
    assert!(!backend.is_locked(&volume));
    assert_eq!(backend.open_handles(), 0);

    // Another caller can now take the lock.
    let handle = DeviceHandle::open(&backend, &volume, Access::READ, Share::READ).unwrap();
    handle.control(ControlCode::LockVolume, &mut []).unwrap();
    assert!(backend.is_locked(&volume));
    drop(handle);

    backend.clear_fault(&Fault::Control(ControlCode::DismountVolume));
    let mut lock = lock_and_dismount(&backend, &volume).unwrap();
    lock.unlock();
}

#[test]
fn drive_size_is_reported_exactly() {
    let backend = MemoryBackend::new().with_disk(4, 7_340_544, SECTOR);
    let size = get_drive_size(&backend, &DevicePath::physical_drive(4)).unwrap();
    assert_eq!(size, 7_340_544);
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn empty_reader_reports_zero_bytes() {
    let backend = MemoryBackend::new().with_disk(1, 0, SECTOR);
    assert_eq!(get_drive_size(&backend, &DevicePath::physical_drive(1)).unwrap(), 0);
}

#[test]
fn failed_geometry_query_closes_its_handle() {
    let backend = card_reader();
    backend.inject(Fault::Control(ControlCode::GetDriveGeometryEx));

    let err = get_drive_size(&backend, &DevicePath::physical_drive(2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueryFailed);
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn geometry_needs_the_disk_to_itself() {
    let backend = card_reader();
    let physical = DevicePath::physical_drive(2);
    let mut channel = RawChannel::open(&backend, &physical).unwrap();

    let err = get_drive_size(&backend, &physical).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OpenFailed);

    channel.close();
    assert_eq!(get_drive_size(&backend, &physical).unwrap(), DISK_SIZE);
}

#[test]
fn image_round_trips_through_different_chunk_sizes() {
    let backend = card_reader();
    let volume = DevicePath::volume("E:");
    let image: Vec<u8> = (0..16 * SECTOR as usize).map(|i| (i * 7 % 251) as u8).collect();

    let mut session = DiskSession::new(&backend);
    session.open(&volume).unwrap();
    let mut offset = 0;
    for chunk in [512, 1536, 100, 3000, 4096].iter().cycle() {
        if offset == image.len() {
            break;
        }
        let end = (offset + chunk).min(image.len());
        assert_eq!(session.write(&image[offset..end]).unwrap(), end - offset);
        offset = end;
    }
    session.close();
    assert_eq!(session.transferred(), image.len() as u64);

    let mut session = DiskSession::new(&backend);
    session.open(&volume).unwrap();
    let mut read_back = Vec::new();
    let mut buf = vec![0u8; 8192];
    for chunk in [1024, 777, 2048].iter().cycle() {
        if read_back.len() == image.len() {
            break;
        }
        let want = (*chunk).min(image.len() - read_back.len());
        let n = session.read(&mut buf[..want]).unwrap();
        assert!(n > 0);
        read_back.extend_from_slice(&buf[..n]);
    }
    session.close();

    assert_eq!(read_back, image);
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn reads_come_up_short_at_the_end_of_the_medium() {
    let backend = card_reader();
    let mut session = DiskSession::new(&backend);
    session.open(&DevicePath::volume("E:")).unwrap();

    let mut buf = vec![0u8; 48 * 1024];
    assert_eq!(session.read(&mut buf).unwrap(), 48 * 1024);
    assert_eq!(session.read(&mut buf).unwrap(), 16 * 1024);
    assert_eq!(session.read(&mut buf).unwrap(), 0);
}

#[test]
fn end_to_end_write_then_release() {
    let backend = card_reader();
    let volume = DevicePath::volume("E:");

    let physical = resolve_physical_path(&backend, &volume).unwrap();
    assert_eq!(physical.as_str(), r"\\.\PhysicalDrive2");

    let mut lock = lock_and_dismount(&backend, &volume).unwrap();
    let mut channel = RawChannel::open(&backend, &DevicePath::new(r"\\.\PhysicalDrive2")).unwrap();
    assert_eq!(channel.write(&[0u8; 512]).unwrap(), 512);
    channel.close();
    lock.unlock();
    assert_eq!(backend.open_handles(), 0);

    let mut fresh = RawChannel::open(&backend, &physical).unwrap();
    assert!(fresh.is_open());
    fresh.close();
}

#[test]
fn opening_a_disk_locked_elsewhere_fails_cleanly() {
    let backend = card_reader();
    let physical = DevicePath::physical_drive(2);
    let _held = RawChannel::open(&backend, &physical).unwrap();
    let before = backend.open_handles();

    let err = RawChannel::open(&backend, &physical).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockFailed);
    assert_eq!(backend.open_handles(), before);
}

#[test]
fn session_against_a_busy_disk_holds_nothing() {
    let backend = card_reader();
    let volume = DevicePath::volume("E:");
    let mut first = DiskSession::new(&backend);
    first.open(&volume).unwrap();
    let before = backend.open_handles();

    let mut second = DiskSession::new(&backend);
    let err = second.open(&volume).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::OpenFailed | ErrorKind::LockFailed));
    assert_eq!(second.state(), SessionState::Closed);
    assert_eq!(second.failure(), Some(err.kind()));
    assert_eq!(backend.open_handles(), before);

    first.close();
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn writes_are_refused_until_the_volume_is_dismounted() {
    let backend = card_reader();
    let physical = DevicePath::physical_drive(2);
    let mut channel = RawChannel::open(&backend, &physical).unwrap();

    let err = channel.write(&[0xAB; 512]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransferError);
    assert!(channel.is_open());
    assert_eq!(backend.disk_contents(2).unwrap()[0], 0);
}
