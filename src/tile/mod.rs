//! Tile addressing layer.
//!
//! This module maps pixel rectangles onto the blocks of a frame, runs the
//! codec over block payloads and stitches partial tiles into caller buffers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Caller pixel buffers           │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │  geometry +     │  │
//! │  │  (decoded    │  │  codec          │  │
//! │  │   tiles)     │  │                 │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               TiffStore                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: save/load tiles and rectangles of a frame
//! - [`TileCache`]: LRU cache for decoded tiles with size-based eviction
//! - [`Rect`], [`Size`], [`block_id`]: grid arithmetic

mod cache;
mod geometry;
mod service;

pub use cache::{TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use geometry::{block_id, partition, tile_rect, truncated_rows, Rect, Size, TilePiece};
pub use service::TileService;
