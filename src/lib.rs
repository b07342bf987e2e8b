//! # tilestore
//!
//! A storage engine for tiled, multi-frame TIFF and BigTIFF raster containers.
//!
//! This library writes and reads image frames as grids of independently
//! compressed blocks. Frames are appended to a single file as a chain of
//! directories; each block is located through the frame's offset and length
//! tables, so a pixel rectangle can be read without decoding the whole image.
//!
//! ## Features
//!
//! - **Two width variants**: classic files with 32-bit offsets and big files
//!   with 64-bit offsets, chosen at creation and detected on open
//! - **Tag access**: read, add and patch tags of any frame by id
//! - **LZW compression**: with the horizontal differencing predictor
//! - **Rectangle access**: save tiles and load arbitrary rectangles that span
//!   several tiles, with an LRU cache of decoded tiles
//! - **Parallel writes**: whole images are compressed tile by tile on a
//!   rayon pool
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`io`] - Positioned storage over files and memory buffers
//! - [`mod@format`] - Header, directory and tag engine ([`TiffStore`])
//! - [`codec`] - LZW codec and horizontal predictor
//! - [`tile`] - Tile addressing, rectangle reads and the decoded-tile cache
//! - [`registry`] - Open stores addressed by generation-checked handles
//! - [`config`] - CLI configuration types
//!
//! ## Example
//!
//! ```rust
//! use tilestore::{
//!     Compression, ImageDescriptor, MemoryStorage, OffsetWidth, OpenMode, Rect, TiffStore,
//!     TileService,
//! };
//!
//! let store = TiffStore::open_storage(MemoryStorage::new(), OpenMode::Create(OffsetWidth::Big))?;
//! let service = TileService::new(store);
//!
//! let descriptor = ImageDescriptor::new(64, 64)
//!     .with_tile_size(32, 32)
//!     .with_compression(Compression::Lzw);
//! let frame = service.store().create_frame(descriptor)?;
//!
//! let pixels: Vec<u8> = (0..64 * 64).map(|i| (i % 251) as u8).collect();
//! service.write_image(frame, &pixels, 0)?;
//! service.store().flush_frame(frame)?;
//!
//! let rect = Rect::new(16, 16, 32, 32);
//! let mut out = vec![0u8; 32 * 32];
//! service.load_rect(frame, rect.size(), rect, &mut out, 0)?;
//! assert_eq!(out[0], pixels[16 * 64 + 16]);
//! # Ok::<(), tilestore::TileError>(())
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod registry;
pub mod tile;

// Re-export commonly used types
pub use config::{CheckConfig, Cli, Command, ExtractConfig, InspectConfig};
pub use error::{CodecError, IoError, TiffError, TileError};
pub use format::tiff::{
    validate_descriptor, validate_frame, Compression, FieldType, Frame, FrameId, ImageDescriptor,
    OffsetWidth, OpenMode, Predictor, Tag, TagValue, TiffHeader, TiffStore, TiffTag,
    ValidationError, ValidationResult,
};
pub use io::{FileAccess, FileStorage, MemoryStorage, Storage};
pub use registry::{StoreHandle, StoreRegistry};
pub use tile::{
    block_id, Rect, Size, TileCache, TileCacheKey, TileService, DEFAULT_TILE_CACHE_CAPACITY,
};
