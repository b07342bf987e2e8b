//! Container header parsing and the classic/big width capability.
//!
//! Every size and layout computation that differs between the two variants
//! goes through [`OffsetWidth`], so the classic and big code paths share one
//! implementation.
//!
//! # Header Structure
//!
//! ## Classic (32-bit offsets)
//! ```text
//! Bytes 0-1:   Byte order "II" (little-endian only)
//! Bytes 2-3:   Version 42 (0x002A)
//! Bytes 4-7:   Offset to the root directory (0 until the first flush)
//! Bytes 8-21:  Identification string "MICRO TIFF V2\0"
//! ```
//!
//! ## Big (64-bit offsets)
//! ```text
//! Bytes 0-1:   Byte order "II" (little-endian only)
//! Bytes 2-3:   Version 43 (0x002B)
//! Bytes 4-5:   Offset byte size (8)
//! Bytes 6-7:   Reserved (0)
//! Bytes 8-15:  Offset to the root directory (0 until the first flush)
//! Bytes 16-29: Identification string "MICRO TIFF V2\0"
//! ```

use crate::error::TiffError;
use crate::io::{read_u16_le, read_u32_le, read_u64_le};

// =============================================================================
// Constants
// =============================================================================

/// Little-endian byte order marker ("II")
const BYTE_ORDER_LITTLE_ENDIAN: [u8; 2] = *b"II";

/// Big-endian byte order marker ("MM")
const BYTE_ORDER_BIG_ENDIAN: [u8; 2] = *b"MM";

/// Version number for classic files
const VERSION_CLASSIC: u16 = 42;

/// Version number for big files
const VERSION_BIG: u16 = 43;

/// Number of bytes read from the start of a file to detect its variant
pub const HEADER_PROBE_SIZE: usize = 16;

/// Identification string written right after the root pointer at creation
pub const IDENTIFICATION: &[u8] = b"MICRO TIFF V2\0";

const MAGIC_CLASSIC: [u8; 4] = [0x49, 0x49, 0x2A, 0x00];
const MAGIC_BIG: [u8; 8] = [0x49, 0x49, 0x2B, 0x00, 0x08, 0x00, 0x00, 0x00];

// =============================================================================
// OffsetWidth
// =============================================================================

/// Width variant of a container, chosen at creation and detected on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetWidth {
    /// 32-bit offsets and counts
    #[default]
    Classic,
    /// 64-bit offsets and counts
    Big,
}

impl OffsetWidth {
    /// Size of an offset, of the inline value slot, and of the forward link.
    #[inline]
    pub const fn offset_size(self) -> usize {
        match self {
            OffsetWidth::Classic => 4,
            OffsetWidth::Big => 8,
        }
    }

    /// Size of the tag count field at the start of a directory.
    #[inline]
    pub const fn count_size(self) -> usize {
        match self {
            OffsetWidth::Classic => 2,
            OffsetWidth::Big => 8,
        }
    }

    /// Size of one tag entry.
    ///
    /// Classic: 12 bytes (2 id + 2 type + 4 count + 4 value/offset)
    /// Big: 20 bytes (2 id + 2 type + 8 count + 8 value/offset)
    #[inline]
    pub const fn entry_size(self) -> usize {
        match self {
            OffsetWidth::Classic => 12,
            OffsetWidth::Big => 20,
        }
    }

    /// Size of the element count field inside a tag entry.
    #[inline]
    pub const fn entry_count_size(self) -> usize {
        self.offset_size()
    }

    /// Position of the root directory pointer in the header.
    #[inline]
    pub const fn root_pointer_position(self) -> u64 {
        match self {
            OffsetWidth::Classic => 4,
            OffsetWidth::Big => 8,
        }
    }

    /// Magic bytes that precede the root pointer.
    pub const fn magic(self) -> &'static [u8] {
        match self {
            OffsetWidth::Classic => &MAGIC_CLASSIC,
            OffsetWidth::Big => &MAGIC_BIG,
        }
    }

    /// Largest offset or length representable in this variant.
    #[inline]
    pub const fn max_offset(self) -> u64 {
        match self {
            OffsetWidth::Classic => u32::MAX as u64,
            OffsetWidth::Big => u64::MAX,
        }
    }

    /// Human-readable variant name.
    pub const fn name(self) -> &'static str {
        match self {
            OffsetWidth::Classic => "classic",
            OffsetWidth::Big => "big",
        }
    }

    /// Read an offset-sized little-endian value.
    #[inline]
    pub fn read_offset(self, bytes: &[u8]) -> u64 {
        match self {
            OffsetWidth::Classic => read_u32_le(bytes) as u64,
            OffsetWidth::Big => read_u64_le(bytes),
        }
    }

    /// Read a directory tag count.
    #[inline]
    pub fn read_count(self, bytes: &[u8]) -> u64 {
        match self {
            OffsetWidth::Classic => read_u16_le(bytes) as u64,
            OffsetWidth::Big => read_u64_le(bytes),
        }
    }

    /// Append an offset-sized little-endian value.
    ///
    /// # Errors
    /// `OffsetOverflow` if the value does not fit a classic 32-bit field.
    pub fn put_offset(self, buf: &mut Vec<u8>, value: u64) -> Result<(), TiffError> {
        match self {
            OffsetWidth::Classic => {
                let value = u32::try_from(value).map_err(|_| TiffError::OffsetOverflow(value))?;
                buf.extend_from_slice(&value.to_le_bytes());
            }
            OffsetWidth::Big => buf.extend_from_slice(&value.to_le_bytes()),
        }
        Ok(())
    }

    /// Append a directory tag count.
    pub fn put_count(self, buf: &mut Vec<u8>, count: u64) -> Result<(), TiffError> {
        match self {
            OffsetWidth::Classic => {
                let value = u16::try_from(count).map_err(|_| TiffError::OffsetOverflow(count))?;
                buf.extend_from_slice(&value.to_le_bytes());
            }
            OffsetWidth::Big => buf.extend_from_slice(&count.to_le_bytes()),
        }
        Ok(())
    }

    /// Encode an offset into a fresh buffer.
    pub fn encode_offset(self, value: u64) -> Result<Vec<u8>, TiffError> {
        let mut buf = Vec::with_capacity(self.offset_size());
        self.put_offset(&mut buf, value)?;
        Ok(buf)
    }
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Width variant of the file
    pub width: OffsetWidth,

    /// Offset of the root directory (0 if no frame was ever flushed)
    pub root_offset: u64,
}

impl TiffHeader {
    /// Parse the header from the first bytes of a file.
    ///
    /// # Arguments
    /// * `bytes` - At least [`HEADER_PROBE_SIZE`] bytes from the start of the file
    ///
    /// # Errors
    /// - `NotATiffFormat` if fewer than 16 bytes are available, the byte order
    ///   marker is missing, or the version is neither 42 nor 43
    /// - `BigEndianUnsupported` if the file declares "MM" byte order
    pub fn parse(bytes: &[u8]) -> Result<Self, TiffError> {
        if bytes.len() < HEADER_PROBE_SIZE {
            return Err(TiffError::NotATiffFormat);
        }

        let marker = [bytes[0], bytes[1]];
        if marker == BYTE_ORDER_BIG_ENDIAN {
            return Err(TiffError::BigEndianUnsupported);
        }
        if marker != BYTE_ORDER_LITTLE_ENDIAN {
            return Err(TiffError::NotATiffFormat);
        }

        let width = match read_u16_le(&bytes[2..4]) {
            VERSION_CLASSIC => OffsetWidth::Classic,
            VERSION_BIG => {
                // Bytes 4-5 hold the offset size and must be 8
                if read_u16_le(&bytes[4..6]) != 8 {
                    return Err(TiffError::NotATiffFormat);
                }
                OffsetWidth::Big
            }
            _ => return Err(TiffError::NotATiffFormat),
        };

        let pos = width.root_pointer_position() as usize;
        let root_offset = width.read_offset(&bytes[pos..pos + width.offset_size()]);

        Ok(TiffHeader { width, root_offset })
    }

    /// Bytes written when a new file is created: magic, a zero root pointer
    /// and the identification string.
    pub fn encode_new(width: OffsetWidth) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + IDENTIFICATION.len());
        buf.extend_from_slice(width.magic());
        buf.extend(std::iter::repeat(0u8).take(width.offset_size()));
        buf.extend_from_slice(IDENTIFICATION);
        buf
    }
}

// =============================================================================
// Tests
// =============================================================================
