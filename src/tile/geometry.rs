//! Tile grid arithmetic.
//!
//! Pure functions mapping pixel rectangles onto the block grid of a frame:
//! block numbering, tile index to rectangle conversion, partitioning of an
//! arbitrary rectangle along tile boundaries, and stride-aware row copies.

use crate::error::TileError;

// =============================================================================
// Rectangles
// =============================================================================

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Pixel rectangle with its origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    #[inline]
    pub fn right(&self) -> u64 {
        u64::from(self.x) + u64::from(self.width)
    }

    /// Exclusive bottom edge.
    #[inline]
    pub fn bottom(&self) -> u64 {
        u64::from(self.y) + u64::from(self.height)
    }

    #[inline]
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the rectangle is non-empty and lies inside an image of `size`.
    pub fn fits_in(&self, size: Size) -> bool {
        !self.is_empty() && self.right() <= u64::from(size.width) && self.bottom() <= u64::from(size.height)
    }

    pub(crate) fn out_of_bounds(&self, size: Size) -> TileError {
        TileError::RectOutOfBounds {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            image_width: size.width,
            image_height: size.height,
        }
    }
}

// =============================================================================
// Block Addressing
// =============================================================================

/// Block number of the tile containing pixel `(x, y)`.
///
/// Blocks are numbered row by row: `x / tile_width + (y / tile_height) *
/// ceil(image_width / tile_width)`. Degenerate tile sizes map to block 0.
pub fn block_id(x: u32, y: u32, tile_width: u32, tile_height: u32, image_width: u32) -> u32 {
    if tile_width == 0 || tile_height == 0 {
        return 0;
    }
    let across = image_width.div_ceil(tile_width);
    x / tile_width + (y / tile_height) * across
}

/// Pixel rectangle covered by the tile at `row`, `column`, clipped to the image.
///
/// # Errors
/// - `RowOutOfRange` if `row` is past the last tile row
/// - `ColumnOutOfRange` if `column` is past the last tile column
pub fn tile_rect(row: u32, column: u32, image: Size, tile: Size) -> Result<Rect, TileError> {
    let rows = image.height.div_ceil(tile.height.max(1));
    let columns = image.width.div_ceil(tile.width.max(1));
    if row >= rows {
        return Err(TileError::RowOutOfRange { row, rows });
    }
    if column >= columns {
        return Err(TileError::ColumnOutOfRange { column, columns });
    }

    let x = column * tile.width;
    let y = row * tile.height;
    Ok(Rect::new(
        x,
        y,
        tile.width.min(image.width - x),
        tile.height.min(image.height - y),
    ))
}

/// Number of rows stored in the block at grid row `row` when the last tile
/// row is truncated to the image height.
pub fn truncated_rows(row: u32, image_height: u32, tile_height: u32) -> u32 {
    let tail = image_height % tile_height.max(1);
    let last_row = image_height.div_ceil(tile_height.max(1)).saturating_sub(1);
    if tail > 0 && row == last_row {
        tail
    } else {
        tile_height
    }
}

// =============================================================================
// Partitioning
// =============================================================================

/// Part of a requested rectangle that falls inside one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePiece {
    /// Block containing this piece
    pub block: u32,

    /// Piece in image coordinates
    pub region: Rect,

    /// Piece origin relative to the tile origin
    pub in_tile_x: u32,
    pub in_tile_y: u32,

    /// Piece origin relative to the requested rectangle
    pub dst_x: u32,
    pub dst_y: u32,
}

/// Split `rect` along tile boundaries, row of tiles by row of tiles.
///
/// Tile dimensions must be non-zero.
pub fn partition(rect: Rect, tile: Size, image_width: u32) -> Vec<TilePiece> {
    let mut pieces = Vec::new();
    if rect.is_empty() || tile.width == 0 || tile.height == 0 {
        return pieces;
    }

    let mut dst_y = 0;
    while dst_y < rect.height {
        let y = rect.y + dst_y;
        let in_tile_y = y % tile.height;
        let height = (tile.height - in_tile_y).min(rect.height - dst_y);

        let mut dst_x = 0;
        while dst_x < rect.width {
            let x = rect.x + dst_x;
            let in_tile_x = x % tile.width;
            let width = (tile.width - in_tile_x).min(rect.width - dst_x);

            pieces.push(TilePiece {
                block: block_id(x, y, tile.width, tile.height, image_width),
                region: Rect::new(x, y, width, height),
                in_tile_x,
                in_tile_y,
                dst_x,
                dst_y,
            });
            dst_x += width;
        }
        dst_y += height;
    }
    pieces
}

// =============================================================================
// Buffer Copies
// =============================================================================

/// Bytes a buffer needs to hold `rows` rows of `row_bytes` at `stride`.
#[inline]
pub fn required_len(stride: usize, row_bytes: usize, rows: usize) -> usize {
    if rows == 0 {
        0
    } else {
        stride * (rows - 1) + row_bytes
    }
}

/// Copy `rows` rows of `row_bytes` between two strided buffers.
///
/// Both slices start at the first byte to copy. Callers check the lengths
/// with [`required_len`].
pub fn copy_rows(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    row_bytes: usize,
    rows: usize,
) {
    for row in 0..rows {
        let from = row * src_stride;
        let to = row * dst_stride;
        dst[to..to + row_bytes].copy_from_slice(&src[from..from + row_bytes]);
    }
}

// =============================================================================
// Tests
// =============================================================================
