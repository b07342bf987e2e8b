//! Tag entries and tag value encoding.
//!
//! A tag value is stored either inline in the entry's value slot (when its
//! byte size fits the variant's offset width) or out of line, in which case
//! the slot holds the file offset of the value bytes. This module holds the
//! in-memory [`Tag`] model and the pure byte-level encoders and decoders for
//! entries and unsigned integer arrays. Reading out-of-line bytes is done by
//! the store, which owns the storage.

use crate::error::TiffError;
use crate::io::{read_u16_le, read_uint_le};

use super::parser::OffsetWidth;
use super::tags::FieldType;

// =============================================================================
// Tag
// =============================================================================

/// Location of a tag's value bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagValue {
    /// Value bytes held in the entry slot, zero padded to 8 bytes
    Inline([u8; 8]),
    /// File offset of the value bytes
    OutOfLine(u64),
}

/// One tag of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Tag ID
    pub id: u16,

    /// Element type
    pub field_type: FieldType,

    /// Number of elements
    pub count: u64,

    /// Inline bytes or out-of-line offset
    pub value: TagValue,
}

impl Tag {
    /// Build an inline tag from value bytes that fit the slot.
    pub fn inline(id: u16, field_type: FieldType, count: u64, bytes: &[u8]) -> Self {
        let mut slot = [0u8; 8];
        let n = bytes.len().min(8);
        slot[..n].copy_from_slice(&bytes[..n]);
        Self {
            id,
            field_type,
            count,
            value: TagValue::Inline(slot),
        }
    }

    /// Build a tag whose value lives at `offset`.
    pub fn out_of_line(id: u16, field_type: FieldType, count: u64, offset: u64) -> Self {
        Self {
            id,
            field_type,
            count,
            value: TagValue::OutOfLine(offset),
        }
    }

    /// Build an inline single unsigned value using the narrowest type the variant allows.
    pub fn scalar(id: u16, value: u64, width: OffsetWidth) -> Self {
        let field_type = FieldType::scalar_for(value, width);
        Self::inline(id, field_type, 1, &encode_uint_array(&[value], field_type))
    }

    /// Total size of the value in bytes.
    #[inline]
    pub fn byte_size(&self) -> u64 {
        (self.field_type.size_in_bytes() as u64).saturating_mul(self.count)
    }

    /// Inline slot bytes trimmed to the value size, if the value is inline.
    pub fn inline_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            TagValue::Inline(slot) => Some(&slot[..(self.byte_size() as usize).min(8)]),
            TagValue::OutOfLine(_) => None,
        }
    }

    /// Single unsigned value held inline, if the tag has one.
    ///
    /// Returns `None` for out-of-line values, arrays, and non-integer types.
    pub fn inline_u64(&self) -> Option<u64> {
        if self.count != 1 {
            return None;
        }
        let bytes = self.inline_bytes()?;
        decode_uint_array(bytes, 1, self.field_type)
            .ok()
            .and_then(|v| v.first().copied())
    }
}

// =============================================================================
// Entry Encoding
// =============================================================================

/// Append one tag entry in the variant's layout.
///
/// # Errors
/// `OffsetOverflow` if the count or offset does not fit a classic entry.
pub fn encode_entry(tag: &Tag, width: OffsetWidth, buf: &mut Vec<u8>) -> Result<(), TiffError> {
    buf.extend_from_slice(&tag.id.to_le_bytes());
    buf.extend_from_slice(&tag.field_type.as_u16().to_le_bytes());
    width.put_offset(buf, tag.count)?;

    match &tag.value {
        TagValue::Inline(slot) => buf.extend_from_slice(&slot[..width.offset_size()]),
        TagValue::OutOfLine(offset) => width.put_offset(buf, *offset)?,
    }
    Ok(())
}

/// Decode one tag entry.
///
/// The slot is treated as inline when the value's byte size fits the
/// variant's offset width.
///
/// # Errors
/// `UnknownFieldType` if the entry's type code is not a known field type.
pub fn decode_entry(bytes: &[u8], width: OffsetWidth) -> Result<Tag, TiffError> {
    let id = read_u16_le(&bytes[0..2]);
    let type_raw = read_u16_le(&bytes[2..4]);
    let field_type = FieldType::from_u16(type_raw).ok_or(TiffError::UnknownFieldType(type_raw))?;

    let size = width.offset_size();
    let count = width.read_offset(&bytes[4..4 + size]);
    let slot = &bytes[4 + size..4 + 2 * size];

    if field_type.fits_inline(count, width) {
        Ok(Tag::inline(id, field_type, count, slot))
    } else {
        Ok(Tag::out_of_line(id, field_type, count, width.read_offset(slot)))
    }
}

// =============================================================================
// Array Encoding
// =============================================================================

/// Check that `field_type` holds unsigned integers.
fn uint_width(field_type: FieldType) -> Option<usize> {
    match field_type {
        FieldType::Byte
        | FieldType::Undefined
        | FieldType::Short
        | FieldType::Long
        | FieldType::Ifd
        | FieldType::Long8
        | FieldType::Ifd8 => Some(field_type.size_in_bytes()),
        _ => None,
    }
}

/// Decode `count` little-endian unsigned values of `field_type`.
///
/// # Errors
/// - `InvalidTagValue` if the type is not an unsigned integer type
/// - `BufferTooSmall` if `bytes` holds fewer than `count` elements
pub fn decode_uint_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
) -> Result<Vec<u64>, TiffError> {
    let elem = uint_width(field_type).ok_or_else(|| TiffError::InvalidTagValue {
        tag: "array",
        message: format!("expected an unsigned integer type, got {:?}", field_type),
    })?;

    let required = (elem * count) as u64;
    if (bytes.len() as u64) < required {
        return Err(TiffError::BufferTooSmall {
            required,
            actual: bytes.len() as u64,
        });
    }

    Ok(bytes
        .chunks_exact(elem)
        .take(count)
        .map(|chunk| read_uint_le(chunk, elem))
        .collect())
}

/// Encode unsigned values as little-endian elements of `field_type`.
///
/// Values are truncated to the element width; callers pick a type wide enough.
pub fn encode_uint_array(values: &[u64], field_type: FieldType) -> Vec<u8> {
    let elem = field_type.size_in_bytes();
    let mut out = Vec::with_capacity(values.len() * elem);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes()[..elem]);
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
