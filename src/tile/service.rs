//! Tile service: pixel rectangles on top of the block store.
//!
//! The TileService maps pixel rectangles to blocks and back. It orchestrates:
//! - Rectangle and stride validation
//! - Staging caller pixels into full-width tile buffers
//! - Predictor and LZW encoding on write
//! - Cache lookups, decoding and stitching on read
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          TileService                             │
//! │  save_tile(): stage → predict → compress → save_block            │
//! │  load_rect(): partition → get_one_block (cache) → copy           │
//! │           │                    │                    │            │
//! │           ▼                    ▼                    ▼            │
//! │    ┌───────────┐      ┌──────────────┐    ┌──────────────────┐  │
//! │    │ TileCache │      │  TiffStore   │    │   codec (LZW)    │  │
//! │    └───────────┘      └──────────────┘    └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Block Sizes
//!
//! Stored blocks always span the full tile width. Tiles are zero padded to
//! the full tile height. Strips in the last strip row hold only the rows
//! that exist. On read, the last tile row accepts both forms: a decoded
//! block must be either a full tile or exactly the truncated size.
//!
//! # Strides
//!
//! A stride of 0 means rows are tightly packed.

use bytes::Bytes;
use rayon::prelude::*;
use tracing::debug;

use crate::codec::{horizontal_accumulate, horizontal_differencing, lzw, SampleLayout};
use crate::error::TileError;
use crate::format::tiff::{Compression, FrameId, ImageDescriptor, Predictor, TiffStore};
use crate::io::{FileStorage, Storage};

use super::cache::{TileCache, TileCacheKey};
use super::geometry::{
    block_id, copy_rows, partition, required_len, tile_rect, truncated_rows, Rect, Size,
};

// =============================================================================
// Tile Service
// =============================================================================

/// Tile addressing layer over one open store.
///
/// # Example
///
/// ```
/// use tilestore::format::tiff::{ImageDescriptor, OffsetWidth, OpenMode, TiffStore};
/// use tilestore::io::MemoryStorage;
/// use tilestore::tile::{Rect, Size, TileService};
///
/// let store = TiffStore::open_storage(MemoryStorage::new(), OpenMode::Create(OffsetWidth::Classic)).unwrap();
/// let service = TileService::new(store);
///
/// let frame = service.store().create_frame(ImageDescriptor::new(32, 32).with_tile_size(16, 16)).unwrap();
/// let pixels: Vec<u8> = (0..32 * 32).map(|i| i as u8).collect();
/// service.write_image(frame, &pixels, 0).unwrap();
///
/// let mut out = vec![0u8; 8 * 8];
/// service.load_rect(frame, Size::new(8, 8), Rect::new(12, 12, 8, 8), &mut out, 0).unwrap();
/// assert_eq!(out[0], pixels[12 * 32 + 12]);
/// ```
pub struct TileService<S: Storage = FileStorage> {
    store: TiffStore<S>,
    cache: TileCache,
}

impl<S: Storage> TileService<S> {
    /// Create a tile service with the default decoded-tile cache.
    pub fn new(store: TiffStore<S>) -> Self {
        Self::with_cache(store, TileCache::new())
    }

    /// Create a tile service with a cache of `capacity` bytes (0 disables it).
    pub fn with_cache_capacity(store: TiffStore<S>, capacity: usize) -> Self {
        Self::with_cache(store, TileCache::with_capacity(capacity))
    }

    pub fn with_cache(store: TiffStore<S>, cache: TileCache) -> Self {
        Self { store, cache }
    }

    /// The underlying block store.
    pub fn store(&self) -> &TiffStore<S> {
        &self.store
    }

    /// The decoded-tile cache.
    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Release the service and return its store.
    pub fn into_store(self) -> TiffStore<S> {
        self.store
    }

    /// Block containing pixel `(x, y)` of a frame.
    pub fn block_id(&self, frame: FrameId, x: u32, y: u32) -> Result<u32, TileError> {
        let d = self.store.descriptor(frame)?;
        Ok(block_id(x, y, d.tile_width, d.tile_height, d.width))
    }

    // -------------------------------------------------------------------------
    // Writing
    // -------------------------------------------------------------------------

    /// Compress and store the pixels of one tile.
    ///
    /// `rect` must start on a tile boundary and lie inside one tile. Pixels
    /// are read from `data` with `stride` bytes per row.
    ///
    /// # Errors
    /// - `RectOutOfBounds` if `rect` is empty or leaves the image
    /// - `UnalignedRect` if the origin is not on the tile grid
    /// - `RectSpansTiles` if `rect` is larger than a tile
    /// - `StrideTooSmall` / `BufferTooSmall` for undersized input
    /// - `CompressionNotSupported` for compression other than none or LZW
    /// - any store error from `save_block`
    pub fn save_tile(
        &self,
        frame: FrameId,
        rect: Rect,
        data: &[u8],
        stride: u32,
    ) -> Result<(), TileError> {
        let descriptor = self.store.descriptor(frame)?;
        check_tile_rect(&descriptor, rect)?;

        let staged = stage_tile(&descriptor, rect, data, stride)?;
        let payload = encode_block(&descriptor, staged.pixels, staged.rows)?;

        let block = block_id(
            rect.x,
            rect.y,
            descriptor.tile_width,
            descriptor.tile_height,
            descriptor.width,
        );
        self.store.save_block(frame, block, &payload)?;
        self.cache.remove(&TileCacheKey::new(frame.index(), block));

        debug!(
            frame = frame.index(),
            block = block,
            raw = descriptor.tile_bytes(),
            stored = payload.len(),
            "Saved tile"
        );
        Ok(())
    }

    /// Store the tile at grid position `row`, `column`.
    ///
    /// # Errors
    /// `RowOutOfRange` / `ColumnOutOfRange` for indices past the grid, then
    /// any error of [`TileService::save_tile`].
    pub fn save_tile_at(
        &self,
        frame: FrameId,
        row: u32,
        column: u32,
        data: &[u8],
        stride: u32,
    ) -> Result<(), TileError> {
        let rect = self.tile_rect(frame, row, column)?;
        self.save_tile(frame, rect, data, stride)
    }

    /// Compress every tile of a whole image and store them in block order.
    ///
    /// Tiles are encoded in parallel; the appends happen one after another
    /// under the store lock.
    pub fn write_image(&self, frame: FrameId, data: &[u8], stride: u32) -> Result<(), TileError> {
        let descriptor = self.store.descriptor(frame)?;
        let image = Rect::new(0, 0, descriptor.width, descriptor.height);
        let row_bytes = row_bytes(&descriptor, image.width);
        let stride = effective_stride(stride, row_bytes)?;
        check_buffer(data.len(), stride, row_bytes, image.height)?;

        let across = descriptor.tiles_across();
        let payloads = (0..descriptor.block_count())
            .into_par_iter()
            .map(|block| {
                let rect = tile_rect(
                    block / across,
                    block % across,
                    Size::new(descriptor.width, descriptor.height),
                    Size::new(descriptor.tile_width, descriptor.tile_height),
                )?;
                let offset = rect.y as usize * stride + rect.x as usize * descriptor.bytes_per_pixel() as usize;
                let staged = stage_tile(&descriptor, rect, &data[offset..], stride as u32)?;
                encode_block(&descriptor, staged.pixels, staged.rows)
            })
            .collect::<Result<Vec<Vec<u8>>, TileError>>()?;

        for (block, payload) in payloads.iter().enumerate() {
            let block = block as u32;
            self.store.save_block(frame, block, payload)?;
            self.cache.remove(&TileCacheKey::new(frame.index(), block));
        }

        debug!(
            frame = frame.index(),
            blocks = payloads.len(),
            stored = payloads.iter().map(Vec::len).sum::<usize>(),
            "Wrote image"
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reading
    // -------------------------------------------------------------------------

    /// Read a pixel rectangle into `out`.
    ///
    /// The rectangle may span any number of tiles. Rows are written to `out`
    /// with `stride` bytes per row.
    ///
    /// # Errors
    /// - `ResizeNotSupported` if `dst_size` differs from the size of `src`
    /// - `RectOutOfBounds` if `src` is empty or leaves the image
    /// - `StrideTooSmall` / `BufferTooSmall` for an undersized output
    /// - `EmptyBlock` if a covering block was never written
    /// - `DecodedSizeMismatch` and codec errors for damaged blocks
    pub fn load_rect(
        &self,
        frame: FrameId,
        dst_size: Size,
        src: Rect,
        out: &mut [u8],
        stride: u32,
    ) -> Result<(), TileError> {
        if dst_size != src.size() {
            return Err(TileError::ResizeNotSupported {
                src_width: src.width,
                src_height: src.height,
                dst_width: dst_size.width,
                dst_height: dst_size.height,
            });
        }

        let descriptor = self.store.descriptor(frame)?;
        let image = Size::new(descriptor.width, descriptor.height);
        if !src.fits_in(image) {
            return Err(src.out_of_bounds(image));
        }

        let bpp = descriptor.bytes_per_pixel() as usize;
        let row_bytes = row_bytes(&descriptor, src.width);
        let stride = effective_stride(stride, row_bytes)?;
        check_buffer(out.len(), stride, row_bytes, src.height)?;

        let tile = Size::new(descriptor.tile_width, descriptor.tile_height);
        let tile_stride = descriptor.tile_width as usize * bpp;

        for piece in partition(src, tile, descriptor.width) {
            let decoded = self.get_one_block(frame, &descriptor, piece.block)?;
            let from = piece.in_tile_y as usize * tile_stride + piece.in_tile_x as usize * bpp;
            let to = piece.dst_y as usize * stride + piece.dst_x as usize * bpp;
            copy_rows(
                &decoded[from..],
                tile_stride,
                &mut out[to..],
                stride,
                piece.region.width as usize * bpp,
                piece.region.height as usize,
            );
        }
        Ok(())
    }

    /// Read the tile at grid position `row`, `column`, clipped to the image.
    pub fn load_tile(
        &self,
        frame: FrameId,
        row: u32,
        column: u32,
        out: &mut [u8],
        stride: u32,
    ) -> Result<Rect, TileError> {
        let rect = self.tile_rect(frame, row, column)?;
        self.load_rect(frame, rect.size(), rect, out, stride)?;
        Ok(rect)
    }

    /// Decoded bytes of one block, full tile width.
    ///
    /// The result holds either a full tile or, for the last tile row, only
    /// the rows inside the image.
    pub fn get_one_block(
        &self,
        frame: FrameId,
        descriptor: &ImageDescriptor,
        block: u32,
    ) -> Result<Bytes, TileError> {
        let key = TileCacheKey::new(frame.index(), block);
        if let Some(tile) = self.cache.get(&key) {
            return Ok(tile);
        }

        if self.store.load_block(frame, block, None)? == 0 {
            return Err(TileError::EmptyBlock(block));
        }
        let raw = self.store.read_block(frame, block)?;

        let grid_row = block / descriptor.tiles_across().max(1);
        let tile_row_bytes = row_bytes(descriptor, descriptor.tile_width);
        let short_rows = truncated_rows(grid_row, descriptor.height, descriptor.tile_height);
        let full = descriptor.tile_bytes();
        let truncated = short_rows as usize * tile_row_bytes;

        let mut decoded = match descriptor.compression {
            Compression::None => raw.to_vec(),
            Compression::Lzw => lzw::decode(&raw, full)?,
            other => return Err(TileError::CompressionNotSupported(other.name().to_string())),
        };

        let rows = if decoded.len() == full {
            descriptor.tile_height
        } else if decoded.len() == truncated {
            short_rows
        } else {
            return Err(TileError::DecodedSizeMismatch {
                block,
                actual: decoded.len(),
                full,
                truncated,
            });
        };

        if descriptor.compression == Compression::Lzw && descriptor.predictor == Predictor::Horizontal {
            horizontal_accumulate(&mut decoded, &sample_layout(descriptor, rows))?;
        }

        debug!(frame = frame.index(), block = block, stored = raw.len(), rows = rows, "Decoded block");
        let tile = Bytes::from(decoded);
        self.cache.put(key, tile.clone());
        Ok(tile)
    }

    fn tile_rect(&self, frame: FrameId, row: u32, column: u32) -> Result<Rect, TileError> {
        let d = self.store.descriptor(frame)?;
        tile_rect(
            row,
            column,
            Size::new(d.width, d.height),
            Size::new(d.tile_width, d.tile_height),
        )
    }
}

impl<S: Storage> std::fmt::Debug for TileService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileService")
            .field("store", &self.store)
            .field("cache", &self.cache)
            .finish()
    }
}

// =============================================================================
// Block Encoding
// =============================================================================

/// Pixels of one tile laid out at full tile width.
struct StagedTile {
    pixels: Vec<u8>,
    rows: u32,
}

fn row_bytes(descriptor: &ImageDescriptor, width: u32) -> usize {
    width as usize * descriptor.bytes_per_pixel() as usize
}

fn effective_stride(stride: u32, row_bytes: usize) -> Result<usize, TileError> {
    let stride = if stride == 0 { row_bytes } else { stride as usize };
    if stride < row_bytes {
        return Err(TileError::StrideTooSmall {
            stride: stride as u32,
            required: row_bytes as u64,
        });
    }
    Ok(stride)
}

fn check_buffer(len: usize, stride: usize, row_bytes: usize, rows: u32) -> Result<(), TileError> {
    let required = required_len(stride, row_bytes, rows as usize);
    if len < required {
        return Err(TileError::BufferTooSmall {
            required: required as u64,
            actual: len as u64,
        });
    }
    Ok(())
}

fn check_tile_rect(descriptor: &ImageDescriptor, rect: Rect) -> Result<(), TileError> {
    let image = Size::new(descriptor.width, descriptor.height);
    if !rect.fits_in(image) {
        return Err(rect.out_of_bounds(image));
    }
    if rect.x % descriptor.tile_width != 0 || rect.y % descriptor.tile_height != 0 {
        return Err(TileError::UnalignedRect {
            x: rect.x,
            y: rect.y,
            tile_width: descriptor.tile_width,
            tile_height: descriptor.tile_height,
        });
    }
    if rect.width > descriptor.tile_width || rect.height > descriptor.tile_height {
        return Err(TileError::RectSpansTiles {
            width: rect.width,
            height: rect.height,
            tile_width: descriptor.tile_width,
            tile_height: descriptor.tile_height,
        });
    }
    Ok(())
}

/// Copy the pixels of `rect` into a zeroed full-width block buffer.
fn stage_tile(
    descriptor: &ImageDescriptor,
    rect: Rect,
    data: &[u8],
    stride: u32,
) -> Result<StagedTile, TileError> {
    let row_bytes = row_bytes(descriptor, rect.width);
    let stride = effective_stride(stride, row_bytes)?;
    check_buffer(data.len(), stride, row_bytes, rect.height)?;

    // Only the last strip is stored short
    let rows = if descriptor.is_striped() {
        truncated_rows(
            rect.y / descriptor.tile_height.max(1),
            descriptor.height,
            descriptor.tile_height,
        )
    } else {
        descriptor.tile_height
    };
    let tile_row_bytes = self::row_bytes(descriptor, descriptor.tile_width);
    let mut pixels = vec![0u8; rows as usize * tile_row_bytes];
    copy_rows(
        data,
        stride,
        &mut pixels,
        tile_row_bytes,
        row_bytes,
        rect.height as usize,
    );
    Ok(StagedTile { pixels, rows })
}

fn sample_layout(descriptor: &ImageDescriptor, rows: u32) -> SampleLayout {
    SampleLayout::new(
        descriptor.tile_width as usize,
        rows as usize,
        descriptor.bytes_per_sample() as usize,
        usize::from(descriptor.samples_per_pixel),
    )
}

/// Turn staged pixels into the stored block payload.
fn encode_block(
    descriptor: &ImageDescriptor,
    mut pixels: Vec<u8>,
    rows: u32,
) -> Result<Vec<u8>, TileError> {
    match descriptor.compression {
        Compression::None => Ok(pixels),
        Compression::Lzw => {
            if descriptor.predictor == Predictor::Horizontal {
                horizontal_differencing(&mut pixels, &sample_layout(descriptor, rows))?;
            }
            let outcome = lzw::encode(&pixels, lzw::output_budget(pixels.len()));
            if !outcome.complete {
                return Err(TileError::CompressFailed {
                    consumed: outcome.consumed,
                    total: pixels.len(),
                });
            }
            Ok(outcome.output)
        }
        other => Err(TileError::CompressionNotSupported(other.name().to_string())),
    }
}

// =============================================================================
// Tests
// =============================================================================
