//! Test utilities for integration tests.
//!
//! This module provides in-memory store helpers, deterministic pixel
//! generators and raw classic file builders for malformed-input cases.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use tilestore::format::tiff::{OffsetWidth, OpenMode, TiffStore};
use tilestore::io::MemoryStorage;
use tilestore::tile::Rect;

// =============================================================================
// Stores
// =============================================================================

/// Create an empty in-memory store of the given width variant.
pub fn create_store(width: OffsetWidth) -> TiffStore<MemoryStorage> {
    TiffStore::open_storage(MemoryStorage::new(), OpenMode::Create(width)).unwrap()
}

/// Close a store and return the bytes of the finished file.
pub fn finish(store: TiffStore<MemoryStorage>) -> Vec<u8> {
    store.close().unwrap().into_inner()
}

/// Close a store and open its file again read-only.
pub fn reopen(store: TiffStore<MemoryStorage>) -> TiffStore<MemoryStorage> {
    open_bytes(finish(store), OpenMode::Read)
}

/// Open raw file bytes.
pub fn open_bytes(bytes: Vec<u8>, mode: OpenMode) -> TiffStore<MemoryStorage> {
    TiffStore::open_storage(MemoryStorage::from_bytes(bytes), mode).unwrap()
}

// =============================================================================
// Pixels
// =============================================================================

/// Smooth pixels: every byte depends on its column, row and channel.
pub fn gradient_pixels(width: u32, height: u32, bytes_per_pixel: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * bytes_per_pixel) as usize);
    for y in 0..height {
        for x in 0..width {
            for c in 0..bytes_per_pixel {
                pixels.push(((x * 7 + y * 13 + c * 31) % 251) as u8);
            }
        }
    }
    pixels
}

/// Seeded random bytes.
pub fn random_pixels(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pixels = vec![0u8; len];
    rng.fill_bytes(&mut pixels);
    pixels
}

/// Copy `rect` out of a tightly packed image.
pub fn crop(pixels: &[u8], image_width: u32, bytes_per_pixel: u32, rect: Rect) -> Vec<u8> {
    let row_bytes = (rect.width * bytes_per_pixel) as usize;
    let image_row = (image_width * bytes_per_pixel) as usize;
    let mut out = Vec::with_capacity(row_bytes * rect.height as usize);
    for y in rect.y..rect.y + rect.height {
        let start = y as usize * image_row + (rect.x * bytes_per_pixel) as usize;
        out.extend_from_slice(&pixels[start..start + row_bytes]);
    }
    out
}

// =============================================================================
// Raw Files
// =============================================================================

const SHORT: u16 = 3;
const LONG: u16 = 4;

fn push_entry(buf: &mut Vec<u8>, id: u16, field_type: u16, value: u32) {
    buf.extend_from_slice(&id.to_le_bytes());
    buf.extend_from_slice(&field_type.to_le_bytes());
    buf.extend_from_slice(&1u32.to_le_bytes());
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Classic single-strip, 8-bit grayscale file as another writer would lay
/// it out: header, directory at offset 8, pixel data after the directory.
pub fn classic_strip_file(width: u16, height: u16, pixels: &[u8]) -> Vec<u8> {
    const ENTRIES: u16 = 6;
    let directory_len = 2 + ENTRIES as u32 * 12 + 4;
    let data_offset = 8 + directory_len;

    let mut buf = Vec::new();
    buf.extend_from_slice(b"II\x2A\x00");
    buf.extend_from_slice(&8u32.to_le_bytes());

    buf.extend_from_slice(&ENTRIES.to_le_bytes());
    push_entry(&mut buf, 256, SHORT, width as u32);
    push_entry(&mut buf, 257, SHORT, height as u32);
    push_entry(&mut buf, 258, SHORT, 8);
    push_entry(&mut buf, 273, LONG, data_offset);
    push_entry(&mut buf, 278, LONG, height as u32);
    push_entry(&mut buf, 279, LONG, pixels.len() as u32);
    buf.extend_from_slice(&0u32.to_le_bytes());

    assert_eq!(buf.len() as u32, data_offset);
    buf.extend_from_slice(pixels);
    buf
}

/// Classic file whose only directory declares `count` tags.
pub fn classic_file_with_tag_count(count: u16) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"II\x2A\x00");
    buf.extend_from_slice(&8u32.to_le_bytes());
    buf.extend_from_slice(&count.to_le_bytes());
    buf.resize(64, 0);
    buf
}
