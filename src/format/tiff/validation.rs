//! Descriptor and frame validation.
//!
//! Descriptors are validated before a frame is created so that the block
//! geometry is always well defined. Frames read from disk are validated by
//! `tilestore check` against the file size.
//!
//! # Rules
//!
//! Errors (the descriptor or frame is unusable):
//! - **Geometry**: non-zero image and tile dimensions
//! - **Samples**: at least one sample per pixel, 1 to 32 bits per sample
//! - **Predictor**: horizontal differencing needs 1, 2 or 4 byte samples
//! - **Blocks**: every written block lies inside the file
//!
//! Warnings (the frame works but is unusual):
//! - tile dimensions that are not multiples of 16 in tiled layout
//! - a predictor without LZW compression
//! - compression kinds the tile layer cannot encode
//! - blocks that were never written

use thiserror::Error;

use crate::error::TiffError;

use super::directory::{Frame, ImageDescriptor};
use super::tags::{Compression, Predictor};

/// Tile dimensions in tiled layout should be multiples of this value.
const TILE_ALIGNMENT: u32 = 16;

/// Largest supported bits per sample.
const MAX_BITS_PER_SAMPLE: u16 = 32;

// =============================================================================
// Validation Result
// =============================================================================

/// Result of validating a descriptor or frame.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether no error was found
    pub is_valid: bool,

    /// List of validation errors (empty if valid)
    pub errors: Vec<ValidationError>,

    /// List of validation warnings (non-fatal issues)
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Create a successful validation result.
    pub fn ok() -> Self {
        ValidationResult {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }

    /// Add a warning to the result.
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Convert to a TiffError if invalid.
    ///
    /// Returns the first error as a TiffError, or Ok(()) if valid.
    pub fn into_result(self) -> Result<(), TiffError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

/// A specific validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Image has a zero dimension
    #[error("image dimensions {width}x{height} must be non-zero")]
    ZeroDimensions { width: u32, height: u32 },

    /// Tile has a zero dimension
    #[error("tile dimensions {tile_width}x{tile_height} must be non-zero")]
    ZeroTileDimensions { tile_width: u32, tile_height: u32 },

    /// No samples per pixel
    #[error("samples per pixel must be at least 1")]
    ZeroSamples,

    /// Bits per sample outside 1..=32
    #[error("bits per sample {0} outside 1..=32")]
    BitsPerSampleOutOfRange(u16),

    /// Horizontal predictor with an element width it cannot handle
    #[error("horizontal predictor cannot process {bytes}-byte samples")]
    UnsupportedPredictorWidth { bytes: u32 },

    /// Block recorded outside the file
    #[error("block {block} at offset {offset} with length {length} exceeds file size {file_size}")]
    BlockOutOfFile {
        block: u32,
        offset: u64,
        length: u64,
        file_size: u64,
    },
}

impl From<ValidationError> for TiffError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::BlockOutOfFile {
                offset,
                length,
                file_size,
                ..
            } => TiffError::BlockOffsetOutOfRange {
                offset,
                length,
                size: file_size,
            },
            other => TiffError::InvalidDescriptor(other.to_string()),
        }
    }
}

// =============================================================================
// Descriptor Validation
// =============================================================================

/// Validate a descriptor before a frame is created from it.
pub fn validate_descriptor(descriptor: &ImageDescriptor) -> ValidationResult {
    let mut result = ValidationResult::ok();

    if descriptor.width == 0 || descriptor.height == 0 {
        result.add_error(ValidationError::ZeroDimensions {
            width: descriptor.width,
            height: descriptor.height,
        });
    }

    if descriptor.tile_width == 0 || descriptor.tile_height == 0 {
        result.add_error(ValidationError::ZeroTileDimensions {
            tile_width: descriptor.tile_width,
            tile_height: descriptor.tile_height,
        });
    } else if !descriptor.is_striped()
        && (descriptor.tile_width % TILE_ALIGNMENT != 0
            || descriptor.tile_height % TILE_ALIGNMENT != 0)
    {
        result.add_warning(format!(
            "Tile dimensions {}x{} are not multiples of {}",
            descriptor.tile_width, descriptor.tile_height, TILE_ALIGNMENT
        ));
    }

    if descriptor.samples_per_pixel == 0 {
        result.add_error(ValidationError::ZeroSamples);
    }

    if descriptor.bits_per_sample == 0 || descriptor.bits_per_sample > MAX_BITS_PER_SAMPLE {
        result.add_error(ValidationError::BitsPerSampleOutOfRange(
            descriptor.bits_per_sample,
        ));
    }

    match descriptor.predictor {
        Predictor::None => {}
        Predictor::Horizontal => {
            let bytes = descriptor.bytes_per_sample();
            if !matches!(bytes, 1 | 2 | 4) {
                result.add_error(ValidationError::UnsupportedPredictorWidth { bytes });
            }
            if descriptor.compression != Compression::Lzw {
                result.add_warning(format!(
                    "Predictor is set but compression is {}",
                    descriptor.compression.name()
                ));
            }
        }
        other => result.add_warning(format!(
            "Predictor {} is stored but not applied by the tile layer",
            other.as_u16()
        )),
    }

    if !descriptor.compression.is_supported() {
        result.add_warning(format!(
            "Compression {} ({}) can be stored but not encoded by the tile layer",
            descriptor.compression.name(),
            descriptor.compression.as_u16()
        ));
    }

    result
}

// =============================================================================
// Frame Validation
// =============================================================================

/// Validate a frame's block tables against the file size.
pub fn validate_frame(frame: &Frame, file_size: u64) -> ValidationResult {
    let mut result = validate_descriptor(frame.descriptor());
    let mut unwritten = 0u32;

    for (block, (&offset, &length)) in frame.offsets().iter().zip(frame.lengths()).enumerate() {
        if length == 0 {
            unwritten += 1;
            continue;
        }
        if offset.checked_add(length).map_or(true, |end| end > file_size) {
            result.add_error(ValidationError::BlockOutOfFile {
                block: block as u32,
                offset,
                length,
                file_size,
            });
        }
    }

    if unwritten > 0 {
        result.add_warning(format!(
            "{} of {} blocks were never written",
            unwritten,
            frame.block_count()
        ));
    }

    result
}

// =============================================================================
// Tests
// =============================================================================
