//! Horizontal differencing predictor (TIFF predictor 2).
//!
//! Each row is replaced by the difference between every sample and the
//! sample of the same channel in the previous pixel. Smooth images turn into
//! runs of small values, which LZW compresses much better.
//!
//! Samples are 1, 2 or 4 bytes wide and processed modulo their width. Native
//! samples are little-endian. With [`SampleLayout::big_endian`] the encoded
//! side holds big-endian samples: differencing swaps after the arithmetic and
//! accumulation swaps before it.

use crate::error::CodecError;

/// Shape of the rows a predictor runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLayout {
    /// Bytes in one row
    pub row_bytes: usize,

    /// Number of rows
    pub rows: usize,

    /// Bytes per sample (1, 2 or 4)
    pub bytes_per_sample: usize,

    /// Samples per pixel; the distance between predicted samples
    pub samples_per_pixel: usize,

    /// Whether the encoded samples are big-endian
    pub big_endian: bool,
}

impl SampleLayout {
    /// Layout of `rows` rows of `width` pixels.
    pub fn new(width: usize, rows: usize, bytes_per_sample: usize, samples_per_pixel: usize) -> Self {
        Self {
            row_bytes: width * bytes_per_sample * samples_per_pixel,
            rows,
            bytes_per_sample,
            samples_per_pixel,
            big_endian: false,
        }
    }

    pub fn with_big_endian(mut self, big_endian: bool) -> Self {
        self.big_endian = big_endian;
        self
    }

    fn check(&self, len: usize) -> Result<(), CodecError> {
        if !matches!(self.bytes_per_sample, 1 | 2 | 4) {
            return Err(CodecError::UnsupportedElementWidth(self.bytes_per_sample));
        }
        let unit = self.bytes_per_sample * self.samples_per_pixel;
        if unit == 0 || self.row_bytes % unit != 0 {
            return Err(CodecError::RowLengthMismatch {
                len: self.row_bytes,
                unit,
            });
        }
        let required = self.row_bytes * self.rows;
        if len < required {
            return Err(CodecError::BufferTooSmall {
                required,
                actual: len,
            });
        }
        Ok(())
    }

    fn rows_of<'a>(&self, data: &'a mut [u8]) -> impl Iterator<Item = &'a mut [u8]> {
        data.chunks_exact_mut(self.row_bytes.max(1)).take(self.rows)
    }
}

// =============================================================================
// Sample Access
// =============================================================================

#[inline]
fn load(row: &[u8], index: usize, width: usize) -> u32 {
    let at = index * width;
    match width {
        1 => u32::from(row[at]),
        2 => u32::from(u16::from_le_bytes([row[at], row[at + 1]])),
        _ => u32::from_le_bytes([row[at], row[at + 1], row[at + 2], row[at + 3]]),
    }
}

#[inline]
fn store(row: &mut [u8], index: usize, width: usize, value: u32) {
    let at = index * width;
    row[at..at + width].copy_from_slice(&value.to_le_bytes()[..width]);
}

fn swap_samples(row: &mut [u8], width: usize) {
    if width > 1 {
        for sample in row.chunks_exact_mut(width) {
            sample.reverse();
        }
    }
}

// =============================================================================
// Transforms
// =============================================================================

/// Replace every sample by its difference to the previous pixel's sample.
///
/// Rows are walked backward so every difference uses original values.
///
/// # Errors
/// - `UnsupportedElementWidth` for samples other than 1, 2 or 4 bytes
/// - `RowLengthMismatch` if a row is not a whole number of pixels
/// - `BufferTooSmall` if `data` is shorter than `rows * row_bytes`
pub fn horizontal_differencing(data: &mut [u8], layout: &SampleLayout) -> Result<(), CodecError> {
    layout.check(data.len())?;
    let width = layout.bytes_per_sample;
    let stride = layout.samples_per_pixel;
    let samples = layout.row_bytes / width;

    for row in layout.rows_of(data) {
        for i in (stride..samples).rev() {
            let value = load(row, i, width).wrapping_sub(load(row, i - stride, width));
            store(row, i, width, value);
        }
        if layout.big_endian {
            swap_samples(row, width);
        }
    }
    Ok(())
}

/// Undo [`horizontal_differencing`] by summing along each row.
///
/// # Errors
/// Same as [`horizontal_differencing`].
pub fn horizontal_accumulate(data: &mut [u8], layout: &SampleLayout) -> Result<(), CodecError> {
    layout.check(data.len())?;
    let width = layout.bytes_per_sample;
    let stride = layout.samples_per_pixel;
    let samples = layout.row_bytes / width;

    for row in layout.rows_of(data) {
        if layout.big_endian {
            swap_samples(row, width);
        }
        for i in stride..samples {
            let value = load(row, i, width).wrapping_add(load(row, i - stride, width));
            store(row, i, width, value);
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
