//! Store registry integration tests.
//!
//! Tests verify:
//! - Files written through a handle can be read through another handle
//! - Stale handles are rejected after close
//! - Concurrent readers share one registry safely
//! - A writer keeps its path reserved while its service is shared

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use tilestore::format::tiff::{Compression, ImageDescriptor, OffsetWidth, OpenMode};
use tilestore::registry::StoreRegistry;
use tilestore::tile::Rect;
use tilestore::TiffError;

use super::test_utils::gradient_pixels;

struct TempFile(PathBuf);

impl TempFile {
    fn new(name: &str) -> Self {
        Self(std::env::temp_dir().join(format!(
            "tilestore-it-{}-{}",
            std::process::id(),
            name
        )))
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn write_sample(registry: &StoreRegistry, path: &Path, pixels: &[u8]) {
    let handle = registry
        .open(path, OpenMode::Create(OffsetWidth::Big))
        .unwrap();
    let service = registry.get(handle).unwrap();
    let frame = service
        .store()
        .create_frame(
            ImageDescriptor::new(64, 64)
                .with_tile_size(16, 16)
                .with_compression(Compression::Lzw),
        )
        .unwrap();
    service.write_image(frame, pixels, 0).unwrap();
    drop(service);
    registry.close(handle).unwrap();
}

#[test]
fn test_write_then_read_through_handles() {
    let file = TempFile::new("roundtrip.tif");
    let registry = StoreRegistry::new();
    let pixels = gradient_pixels(64, 64, 1);
    write_sample(&registry, &file.0, &pixels);
    assert!(registry.is_empty());

    let handle = registry.open(&file.0, OpenMode::Read).unwrap();
    let service = registry.get(handle).unwrap();
    let frame = service.store().frame_id(0).unwrap();
    let rect = Rect::new(10, 20, 30, 40);
    let mut out = vec![0u8; 30 * 40];
    service
        .load_rect(frame, rect.size(), rect, &mut out, 0)
        .unwrap();
    assert_eq!(out[0], pixels[20 * 64 + 10]);
    assert_eq!(out[30 * 40 - 1], pixels[59 * 64 + 39]);

    drop(service);
    registry.close(handle).unwrap();
    assert!(matches!(registry.get(handle), Err(TiffError::InvalidHandle)));
}

#[test]
fn test_readers_allowed_alongside_writer() {
    let file = TempFile::new("readers.tif");
    let registry = StoreRegistry::new();
    write_sample(&registry, &file.0, &gradient_pixels(64, 64, 1));

    let writer = registry.open(&file.0, OpenMode::ReadWrite).unwrap();
    let reader = registry.open(&file.0, OpenMode::Read).unwrap();
    assert!(matches!(
        registry.open(&file.0, OpenMode::ReadWrite),
        Err(TiffError::WrongOpenMode)
    ));
    assert_eq!(registry.len(), 2);

    registry.close(writer).unwrap();
    let second_writer = registry.open(&file.0, OpenMode::ReadWrite).unwrap();
    registry.close(second_writer).unwrap();
    registry.close(reader).unwrap();
}

#[test]
fn test_concurrent_readers() {
    let file = TempFile::new("concurrent.tif");
    let registry = Arc::new(StoreRegistry::new());
    let pixels = Arc::new(gradient_pixels(64, 64, 1));
    write_sample(&registry, &file.0, &pixels);

    let handle = registry.open(&file.0, OpenMode::Read).unwrap();
    let workers: Vec<_> = (0..4u32)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let pixels = Arc::clone(&pixels);
            thread::spawn(move || {
                let service = registry.get(handle).unwrap();
                let frame = service.store().frame_id(0).unwrap();
                let rect = Rect::new(i * 8, i * 8, 24, 24);
                let mut out = vec![0u8; 24 * 24];
                service
                    .load_rect(frame, rect.size(), rect, &mut out, 0)
                    .unwrap();
                assert_eq!(out[0], pixels[(i * 8 * 64 + i * 8) as usize]);
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    registry.close(handle).unwrap();
}

#[test]
fn test_writer_stays_reserved_until_released() {
    let file = TempFile::new("reserved.tif");
    let registry = StoreRegistry::new();
    let pixels = gradient_pixels(64, 64, 1);

    let handle = registry
        .open(&file.0, OpenMode::Create(OffsetWidth::Classic))
        .unwrap();
    let service = registry.get(handle).unwrap();
    let frame = service
        .store()
        .create_frame(ImageDescriptor::new(64, 64).with_tile_size(16, 16))
        .unwrap();

    assert!(matches!(registry.close(handle), Err(TiffError::StoreInUse)));
    assert!(matches!(
        registry.open(&file.0, OpenMode::Create(OffsetWidth::Big)),
        Err(TiffError::WrongOpenMode)
    ));

    // The refused close left the store usable
    service.write_image(frame, &pixels, 0).unwrap();
    drop(service);
    registry.close(handle).unwrap();

    let reader = registry.open(&file.0, OpenMode::Read).unwrap();
    let service = registry.get(reader).unwrap();
    assert_eq!(service.store().offset_width(), OffsetWidth::Classic);
    let frame = service.store().frame_id(0).unwrap();
    let rect = Rect::new(0, 0, 64, 64);
    let mut out = vec![0u8; 64 * 64];
    service
        .load_rect(frame, rect.size(), rect, &mut out, 0)
        .unwrap();
    assert_eq!(out, pixels);
    drop(service);
    registry.close(reader).unwrap();
}
