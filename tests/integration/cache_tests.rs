//! Decoded-tile cache integration tests.
//!
//! Tests verify:
//! - Rectangle reads fill the cache once per touched block
//! - Saving a tile invalidates its cached copy
//! - A zero capacity disables caching without changing results

use tilestore::format::tiff::{Compression, ImageDescriptor, OffsetWidth, Predictor};
use tilestore::tile::{Rect, TileCache, TileCacheKey, TileService};

use super::test_utils::{create_store, gradient_pixels};

fn descriptor() -> ImageDescriptor {
    ImageDescriptor::new(96, 64)
        .with_tile_size(32, 32)
        .with_compression(Compression::Lzw)
        .with_predictor(Predictor::Horizontal)
}

#[test]
fn test_reads_fill_cache_per_block() {
    let service = TileService::new(create_store(OffsetWidth::Classic));
    let frame = service.store().create_frame(descriptor()).unwrap();
    let pixels = gradient_pixels(96, 64, 1);
    service.write_image(frame, &pixels, 0).unwrap();
    assert!(service.cache().is_empty());

    // Touches blocks 0, 1, 3 and 4
    let rect = Rect::new(16, 16, 32, 32);
    let mut out = vec![0u8; 32 * 32];
    service
        .load_rect(frame, rect.size(), rect, &mut out, 0)
        .unwrap();
    assert_eq!(service.cache().len(), 4);
    for block in [0, 1, 3, 4] {
        assert!(service.cache().contains(&TileCacheKey::new(frame.index(), block)));
    }
    assert_eq!(service.cache().size(), 4 * 32 * 32);

    // Same rectangle again is served from the cache
    let mut again = vec![0u8; 32 * 32];
    service
        .load_rect(frame, rect.size(), rect, &mut again, 0)
        .unwrap();
    assert_eq!(again, out);
    assert_eq!(service.cache().len(), 4);
}

#[test]
fn test_save_invalidates_cached_tile() {
    let service = TileService::new(create_store(OffsetWidth::Big));
    let frame = service.store().create_frame(descriptor()).unwrap();
    service
        .write_image(frame, &gradient_pixels(96, 64, 1), 0)
        .unwrap();

    let rect = Rect::new(0, 0, 32, 32);
    let mut out = vec![0u8; 32 * 32];
    service
        .load_rect(frame, rect.size(), rect, &mut out, 0)
        .unwrap();
    let key = TileCacheKey::new(frame.index(), 0);
    assert!(service.cache().contains(&key));

    service.save_tile(frame, rect, &[9u8; 32 * 32], 0).unwrap();
    assert!(!service.cache().contains(&key));

    service
        .load_rect(frame, rect.size(), rect, &mut out, 0)
        .unwrap();
    assert!(out.iter().all(|&b| b == 9));
}

#[test]
fn test_disabled_cache() {
    let service = TileService::with_cache_capacity(create_store(OffsetWidth::Classic), 0);
    let frame = service.store().create_frame(descriptor()).unwrap();
    let pixels = gradient_pixels(96, 64, 1);
    service.write_image(frame, &pixels, 0).unwrap();

    let rect = Rect::new(0, 0, 96, 64);
    let mut out = vec![0u8; 96 * 64];
    service
        .load_rect(frame, rect.size(), rect, &mut out, 0)
        .unwrap();
    assert_eq!(out, pixels);
    assert!(!service.cache().is_enabled());
    assert!(service.cache().is_empty());
}

#[test]
fn test_small_cache_evicts_but_reads_stay_correct() {
    // Room for two decoded tiles
    let cache = TileCache::with_capacity(2 * 32 * 32);
    let service = TileService::with_cache(create_store(OffsetWidth::Classic), cache);
    let frame = service.store().create_frame(descriptor()).unwrap();
    let pixels = gradient_pixels(96, 64, 1);
    service.write_image(frame, &pixels, 0).unwrap();

    let rect = Rect::new(0, 0, 96, 64);
    let mut out = vec![0u8; 96 * 64];
    service
        .load_rect(frame, rect.size(), rect, &mut out, 0)
        .unwrap();
    assert_eq!(out, pixels);
    assert_eq!(service.cache().len(), 2);
    assert!(service.cache().size() <= service.cache().capacity());
}
