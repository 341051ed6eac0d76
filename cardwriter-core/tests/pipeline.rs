use cardwriter_core::backend::memory::{Fault, MemoryBackend};
use cardwriter_core::{DevicePath, read, write};
use std::cell::Cell;
use std::fs;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tempfile::{NamedTempFile, tempdir};

const DISK_SIZE: u64 = 32 * 1024;

fn card_reader() -> MemoryBackend {
    MemoryBackend::new()
        .with_disk(1, DISK_SIZE, 512)
        .with_whole_disk_volume("E:", 1)
}

fn image_file(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

fn running() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(true))
}

#[test]
fn writes_an_image_and_pads_the_last_sector() {
    let backend = card_reader();
    backend.fill_disk(1, &[0xEE; 4096]);
    let image: Vec<u8> = (0..3000u32).map(|i| (i % 256) as u8).collect();
    let file = image_file(&image);

    let started = Cell::new(0);
    let last_progress = Cell::new(0);
    write::run(
        &backend,
        file.path(),
        &DevicePath::volume("E:"),
        1024,
        running(),
        |len| started.set(len),
        |bytes| last_progress.set(bytes),
        |_| {},
    )
    .unwrap();

    assert_eq!(started.get(), 3000);
    assert_eq!(last_progress.get(), 3072);

    let disk = backend.disk_contents(1).unwrap();
    assert_eq!(&disk[..3000], &image[..]);
    assert!(disk[3000..3072].iter().all(|b| *b == 0));
    assert!(disk[3072..4096].iter().all(|b| *b == 0xEE));
    assert_eq!(backend.open_handles(), 0);
    assert!(backend.is_mounted(&DevicePath::volume("E:")));
}

#[test]
fn refuses_an_image_larger_than_the_disk() {
    let backend = card_reader();
    let file = image_file(&vec![1u8; DISK_SIZE as usize + 1]);

    let err = write::run(
        &backend,
        file.path(),
        &DevicePath::volume("E:"),
        4096,
        running(),
        |_| {},
        |_| {},
        |_| {},
    )
    .unwrap_err();

    assert!(err.to_string().contains("only holds"));
    assert_eq!(backend.total_opened(), 2);
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn refuses_chunks_that_are_not_whole_sectors() {
    let backend = card_reader();
    let file = image_file(&[0u8; 512]);

    let err = write::run(
        &backend,
        file.path(),
        &DevicePath::volume("E:"),
        1000,
        running(),
        |_| {},
        |_| {},
        |_| {},
    )
    .unwrap_err();
    assert!(err.to_string().contains("not a multiple"));
}

#[test]
fn cancelled_write_releases_the_disk() {
    let backend = card_reader();
    let file = image_file(&[5u8; 8192]);

    let err = write::run(
        &backend,
        file.path(),
        &DevicePath::volume("E:"),
        512,
        Arc::new(AtomicBool::new(false)),
        |_| {},
        |_| {},
        |_| {},
    )
    .unwrap_err();

    assert_eq!(err.to_string(), "Operation cancelled by user");
    assert_eq!(backend.open_handles(), 0);
    assert!(!backend.is_locked(&DevicePath::physical_drive(1)));
}

#[test]
fn failed_write_surfaces_the_transfer_error() {
    let backend = card_reader();
    backend.inject(Fault::Write);
    let file = image_file(&[5u8; 2048]);
    let messages = std::cell::RefCell::new(Vec::new());

    let err = write::run(
        &backend,
        file.path(),
        &DevicePath::volume("E:"),
        512,
        running(),
        |_| {},
        |_| {},
        |m| messages.borrow_mut().push(m.to_string()),
    )
    .unwrap_err();

    let disk_error = err.downcast_ref::<cardwriter_core::DiskError>().unwrap();
    assert_eq!(disk_error.kind(), cardwriter_core::ErrorKind::TransferError);
    assert_eq!(backend.open_handles(), 0);
    assert!(messages.borrow().iter().any(|m| m.starts_with("Error:")));
}

#[test]
fn reads_the_whole_disk_into_an_image() {
    let backend = card_reader();
    let contents: Vec<u8> = (0..DISK_SIZE).map(|i| (i % 253) as u8).collect();
    backend.fill_disk(1, &contents);

    let dir = tempdir().unwrap();
    let image_path = dir.path().join("card.img");
    let total = Cell::new(0);
    let last_progress = Cell::new(0);

    read::run(
        &backend,
        &DevicePath::volume("E:"),
        &image_path,
        3 * 1024,
        running(),
        |len| total.set(len),
        |bytes| last_progress.set(bytes),
        |_| {},
    )
    .unwrap();

    assert_eq!(total.get(), DISK_SIZE);
    assert_eq!(last_progress.get(), DISK_SIZE);
    assert_eq!(fs::read(&image_path).unwrap(), contents);
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn cancelled_read_removes_the_partial_image() {
    let backend = card_reader();
    let dir = tempdir().unwrap();
    let image_path = dir.path().join("card.img");

    let err = read::run(
        &backend,
        &DevicePath::volume("E:"),
        &image_path,
        4096,
        Arc::new(AtomicBool::new(false)),
        |_| {},
        |_| {},
        |_| {},
    )
    .unwrap_err();

    assert_eq!(err.to_string(), "Operation cancelled by user");
    assert!(!image_path.exists());
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn empty_reader_is_refused() {
    let backend = MemoryBackend::new()
        .with_disk(1, 0, 512)
        .with_whole_disk_volume("E:", 1);
    let dir = tempdir().unwrap();

    let err = read::run(
        &backend,
        &DevicePath::volume("E:"),
        &dir.path().join("card.img"),
        4096,
        running(),
        |_| {},
        |_| {},
        |_| {},
    )
    .unwrap_err();
    assert!(err.to_string().contains("zero"));
}

#[test]
fn short_write_aborts_and_releases_the_disk() {
    let backend = card_reader();
    backend.inject(Fault::ShortWrite);
    let file = image_file(&[7u8; 4096]);

    let err = write::run(
        &backend,
        file.path(),
        &DevicePath::volume("E:"),
        1024,
        running(),
        |_| {},
        |_| {},
        |_| {},
    )
    .unwrap_err();

    assert!(err.to_string().contains("short write"));
    assert_eq!(backend.open_handles(), 0);
    assert!(backend.is_mounted(&DevicePath::volume("E:")));
}

#[test]
fn medium_ending_early_fails_the_read_and_keeps_no_image() {
    let backend = card_reader();
    backend.inject(Fault::EndOfMedium(DISK_SIZE / 2));
    let dir = tempdir().unwrap();
    let image_path = dir.path().join("card.img");

    let err = read::run(
        &backend,
        &DevicePath::volume("E:"),
        &image_path,
        4096,
        running(),
        |_| {},
        |_| {},
        |_| {},
    )
    .unwrap_err();

    assert!(err.to_string().contains("ended after 16384"));
    assert_eq!(backend.open_handles(), 0);
    assert!(!image_path.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn failed_read_keeps_no_image() {
    let backend = card_reader();
    backend.inject(Fault::Read);
    let dir = tempdir().unwrap();
    let image_path = dir.path().join("card.img");

    let err = read::run(
        &backend,
        &DevicePath::volume("E:"),
        &image_path,
        4096,
        running(),
        |_| {},
        |_| {},
        |_| {},
    )
    .unwrap_err();

    let disk_error = err.downcast_ref::<cardwriter_core::DiskError>().unwrap();
    assert_eq!(disk_error.kind(), cardwriter_core::ErrorKind::TransferError);
    assert!(!image_path.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(backend.open_handles(), 0);
}
