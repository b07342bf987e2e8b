//! Tag and field type definitions.
//!
//! This module defines the vocabulary of the directory engine:
//! - Field types that determine how values are encoded
//! - Tag IDs the engine generates or interprets
//! - Compression, predictor and photometric values
//!
//! The definitions are shared by the classic and big variants.

use super::parser::OffsetWidth;

// =============================================================================
// Field Types
// =============================================================================

/// Field types that determine how tag values are encoded.
///
/// Each field type has a fixed element size, which decides whether a value
/// fits inline in a tag entry or lives out of line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FieldType {
    /// Unsigned 8-bit integer
    Byte = 1,
    /// 8-bit ASCII character
    Ascii = 2,
    /// Unsigned 16-bit integer
    Short = 3,
    /// Unsigned 32-bit integer
    Long = 4,
    /// Two LONGs: numerator and denominator
    Rational = 5,
    /// Signed 8-bit integer
    SByte = 6,
    /// Undefined byte data
    Undefined = 7,
    /// Signed 16-bit integer
    SShort = 8,
    /// Signed 32-bit integer
    SLong = 9,
    /// Two SLONGs: numerator and denominator
    SRational = 10,
    /// IEEE single precision float
    Float = 11,
    /// IEEE double precision float
    Double = 12,
    /// 32-bit directory offset
    Ifd = 13,
    /// Unsigned 64-bit integer (big variant)
    Long8 = 16,
    /// Signed 64-bit integer (big variant)
    SLong8 = 17,
    /// 64-bit directory offset (big variant)
    Ifd8 = 18,
}

impl FieldType {
    /// Size of a single value of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Float | FieldType::Ifd => 4,
            FieldType::Rational
            | FieldType::SRational
            | FieldType::Double
            | FieldType::Long8
            | FieldType::SLong8
            | FieldType::Ifd8 => 8,
        }
    }

    /// Create a FieldType from its numeric value.
    ///
    /// Returns `None` for unknown type values.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            5 => Some(FieldType::Rational),
            6 => Some(FieldType::SByte),
            7 => Some(FieldType::Undefined),
            8 => Some(FieldType::SShort),
            9 => Some(FieldType::SLong),
            10 => Some(FieldType::SRational),
            11 => Some(FieldType::Float),
            12 => Some(FieldType::Double),
            13 => Some(FieldType::Ifd),
            16 => Some(FieldType::Long8),
            17 => Some(FieldType::SLong8),
            18 => Some(FieldType::Ifd8),
            _ => None,
        }
    }

    /// Get the numeric type code.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Check if a value with this type and count fits in the entry's value slot.
    #[inline]
    pub fn fits_inline(self, count: u64, width: OffsetWidth) -> bool {
        (self.size_in_bytes() as u64).saturating_mul(count) <= width.offset_size() as u64
    }

    /// Type used for unsigned scalars of the given magnitude in this variant.
    ///
    /// Big files use LONG throughout; classic files use SHORT when the
    /// value fits 16 bits.
    pub fn scalar_for(value: u64, width: OffsetWidth) -> Self {
        match width {
            OffsetWidth::Big => FieldType::Long,
            OffsetWidth::Classic if value <= u16::MAX as u64 => FieldType::Short,
            OffsetWidth::Classic => FieldType::Long,
        }
    }

    /// Type used for block offset and length tables in this variant.
    pub const fn table_for(width: OffsetWidth) -> Self {
        match width {
            OffsetWidth::Classic => FieldType::Long,
            OffsetWidth::Big => FieldType::Long8,
        }
    }
}

// =============================================================================
// Tags
// =============================================================================

/// Tag IDs the directory engine generates or interprets.
///
/// Other tags are carried through untouched and can be read or patched by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TiffTag {
    // -------------------------------------------------------------------------
    // Basic Image Structure
    // -------------------------------------------------------------------------
    /// Image width in pixels
    ImageWidth = 256,

    /// Image height (length) in pixels
    ImageLength = 257,

    /// Bits per sample
    BitsPerSample = 258,

    /// Compression scheme used
    Compression = 259,

    /// Photometric interpretation
    PhotometricInterpretation = 262,

    /// Free-form description string
    ImageDescription = 270,

    /// Number of components per pixel
    SamplesPerPixel = 277,

    /// How components are organized (chunky vs planar)
    PlanarConfiguration = 284,

    /// Differencing applied before compression
    Predictor = 317,

    // -------------------------------------------------------------------------
    // Strip Organization
    // -------------------------------------------------------------------------
    /// Byte offsets of strips
    StripOffsets = 273,

    /// Row count per strip
    RowsPerStrip = 278,

    /// Byte counts of strips
    StripByteCounts = 279,

    // -------------------------------------------------------------------------
    // Tile Organization
    // -------------------------------------------------------------------------
    /// Width of each tile in pixels
    TileWidth = 322,

    /// Height (length) of each tile in pixels
    TileLength = 323,

    /// Byte offsets of each tile in the file
    TileOffsets = 324,

    /// Byte counts of each tile
    TileByteCounts = 325,
}

impl TiffTag {
    /// Tags rewritten from the frame descriptor every time a frame is flushed.
    pub const GENERATED: [TiffTag; 15] = [
        TiffTag::ImageWidth,
        TiffTag::ImageLength,
        TiffTag::BitsPerSample,
        TiffTag::Compression,
        TiffTag::PhotometricInterpretation,
        TiffTag::SamplesPerPixel,
        TiffTag::PlanarConfiguration,
        TiffTag::Predictor,
        TiffTag::StripOffsets,
        TiffTag::RowsPerStrip,
        TiffTag::StripByteCounts,
        TiffTag::TileWidth,
        TiffTag::TileLength,
        TiffTag::TileOffsets,
        TiffTag::TileByteCounts,
    ];

    /// Whether `id` is rewritten from the descriptor and block tables on flush.
    pub fn is_generated(id: u16) -> bool {
        Self::GENERATED.iter().any(|tag| tag.as_u16() == id)
    }

    /// Create a TiffTag from its numeric value.
    ///
    /// Returns `None` for tags the engine does not interpret.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            256 => Some(TiffTag::ImageWidth),
            257 => Some(TiffTag::ImageLength),
            258 => Some(TiffTag::BitsPerSample),
            259 => Some(TiffTag::Compression),
            262 => Some(TiffTag::PhotometricInterpretation),
            270 => Some(TiffTag::ImageDescription),
            273 => Some(TiffTag::StripOffsets),
            277 => Some(TiffTag::SamplesPerPixel),
            278 => Some(TiffTag::RowsPerStrip),
            279 => Some(TiffTag::StripByteCounts),
            284 => Some(TiffTag::PlanarConfiguration),
            317 => Some(TiffTag::Predictor),
            322 => Some(TiffTag::TileWidth),
            323 => Some(TiffTag::TileLength),
            324 => Some(TiffTag::TileOffsets),
            325 => Some(TiffTag::TileByteCounts),
            _ => None,
        }
    }

    /// Get the numeric tag ID.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Conventional name of the tag.
    pub const fn name(self) -> &'static str {
        match self {
            TiffTag::ImageWidth => "ImageWidth",
            TiffTag::ImageLength => "ImageLength",
            TiffTag::BitsPerSample => "BitsPerSample",
            TiffTag::Compression => "Compression",
            TiffTag::PhotometricInterpretation => "PhotometricInterpretation",
            TiffTag::ImageDescription => "ImageDescription",
            TiffTag::SamplesPerPixel => "SamplesPerPixel",
            TiffTag::PlanarConfiguration => "PlanarConfiguration",
            TiffTag::Predictor => "Predictor",
            TiffTag::StripOffsets => "StripOffsets",
            TiffTag::RowsPerStrip => "RowsPerStrip",
            TiffTag::StripByteCounts => "StripByteCounts",
            TiffTag::TileWidth => "TileWidth",
            TiffTag::TileLength => "TileLength",
            TiffTag::TileOffsets => "TileOffsets",
            TiffTag::TileByteCounts => "TileByteCounts",
        }
    }
}

// =============================================================================
// Compression Values
// =============================================================================

/// Compression scheme identifiers.
///
/// The tile layer encodes and decodes `None` and `Lzw`. Other schemes can be
/// stored and read back as raw blocks but not decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    /// No compression
    None,
    /// LZW compression
    Lzw,
    /// "Old-style" JPEG
    OldJpeg,
    /// JPEG compression
    Jpeg,
    /// Deflate/zlib compression
    Deflate,
    /// Adobe Deflate
    AdobeDeflate,
    /// JPEG 2000
    Jpeg2000,
    /// Any other registered or private scheme
    Other(u16),
}

impl Compression {
    /// Map a numeric compression value.
    pub const fn from_u16(value: u16) -> Self {
        match value {
            1 => Compression::None,
            5 => Compression::Lzw,
            6 => Compression::OldJpeg,
            7 => Compression::Jpeg,
            8 => Compression::Deflate,
            32946 => Compression::AdobeDeflate,
            33003 => Compression::Jpeg2000,
            other => Compression::Other(other),
        }
    }

    /// Numeric compression value written to the Compression tag.
    pub const fn as_u16(self) -> u16 {
        match self {
            Compression::None => 1,
            Compression::Lzw => 5,
            Compression::OldJpeg => 6,
            Compression::Jpeg => 7,
            Compression::Deflate => 8,
            Compression::AdobeDeflate => 32946,
            Compression::Jpeg2000 => 33003,
            Compression::Other(value) => value,
        }
    }

    /// Check if the tile layer can encode and decode this scheme.
    #[inline]
    pub const fn is_supported(self) -> bool {
        matches!(self, Compression::None | Compression::Lzw)
    }

    /// Get a human-readable name for the compression scheme.
    pub const fn name(self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::Lzw => "LZW",
            Compression::OldJpeg => "Old JPEG",
            Compression::Jpeg => "JPEG",
            Compression::Deflate => "Deflate",
            Compression::AdobeDeflate => "Adobe Deflate",
            Compression::Jpeg2000 => "JPEG 2000",
            Compression::Other(_) => "Unknown",
        }
    }
}

// =============================================================================
// Predictor Values
// =============================================================================

/// Predictor applied to pixel rows before compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predictor {
    /// No prediction
    None,
    /// Horizontal differencing
    Horizontal,
    /// Floating point horizontal differencing
    FloatingPoint,
    /// Unrecognized predictor value
    Other(u16),
}

impl Predictor {
    /// Map a numeric predictor value.
    pub const fn from_u16(value: u16) -> Self {
        match value {
            1 => Predictor::None,
            2 => Predictor::Horizontal,
            3 => Predictor::FloatingPoint,
            other => Predictor::Other(other),
        }
    }

    /// Numeric predictor value written to the Predictor tag.
    pub const fn as_u16(self) -> u16 {
        match self {
            Predictor::None => 1,
            Predictor::Horizontal => 2,
            Predictor::FloatingPoint => 3,
            Predictor::Other(value) => value,
        }
    }
}

// =============================================================================
// Photometric and Planar Values
// =============================================================================

/// PhotometricInterpretation: 0 is white
pub const PHOTOMETRIC_MIN_IS_WHITE: u16 = 0;

/// PhotometricInterpretation: 0 is black
pub const PHOTOMETRIC_MIN_IS_BLACK: u16 = 1;

/// PhotometricInterpretation: RGB
pub const PHOTOMETRIC_RGB: u16 = 2;

/// PlanarConfiguration: samples interleaved per pixel
pub const PLANAR_CHUNKY: u16 = 1;

/// PlanarConfiguration: one plane per sample
pub const PLANAR_SEPARATE: u16 = 2;

// =============================================================================
// Tests
// =============================================================================
