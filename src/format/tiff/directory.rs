//! Frame directories: image geometry, tag tables and block tables.
//!
//! A [`Frame`] lives in memory until it is flushed. Flushing lays the frame
//! out as one contiguous byte run appended at the end of the file:
//!
//! ```text
//! [block offset table]   only when block_count > 1
//! [block length table]   only when block_count > 1
//! [tag count]            directory_offset points here
//! [tag entries]          ascending tag id
//! [forward link]         0, patched when the next frame is flushed
//! ```
//!
//! Tag entries are kept in a `BTreeMap`, so the on-disk position of every
//! entry is a pure function of the tag's ordinal in the map. Tags are never
//! removed or added after flush, which keeps those positions stable for
//! in-place patches.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{IoError, TiffError};
use crate::io::Storage;

use super::parser::OffsetWidth;
use super::tags::{
    Compression, FieldType, Predictor, TiffTag, PHOTOMETRIC_MIN_IS_BLACK, PLANAR_CHUNKY,
};
use super::values::{
    decode_entry, decode_uint_array, encode_entry, encode_uint_array, Tag, TagValue,
};

/// Smallest tag count accepted in a directory.
pub const MIN_TAG_COUNT: u64 = 1;

/// Largest tag count accepted in a directory.
pub const MAX_TAG_COUNT: u64 = 1000;

// =============================================================================
// ImageDescriptor
// =============================================================================

/// Geometry and pixel format of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDescriptor {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Block width in pixels (equal to `width` for strips)
    pub tile_width: u32,
    /// Block height in pixels (rows per strip for strips)
    pub tile_height: u32,
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Samples per pixel
    pub samples_per_pixel: u16,
    /// Block compression
    pub compression: Compression,
    /// Predictor applied before compression
    pub predictor: Predictor,
    /// PhotometricInterpretation value
    pub photometric: u16,
    /// PlanarConfiguration value
    pub planar_config: u16,
}

impl ImageDescriptor {
    /// Single-block, 8-bit, single-sample, uncompressed image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tile_width: width,
            tile_height: height,
            bits_per_sample: 8,
            samples_per_pixel: 1,
            compression: Compression::None,
            predictor: Predictor::None,
            photometric: PHOTOMETRIC_MIN_IS_BLACK,
            planar_config: PLANAR_CHUNKY,
        }
    }

    pub fn with_tile_size(mut self, tile_width: u32, tile_height: u32) -> Self {
        self.tile_width = tile_width;
        self.tile_height = tile_height;
        self
    }

    /// Strip layout: full-width blocks of `rows_per_strip` rows.
    pub fn with_strips(mut self, rows_per_strip: u32) -> Self {
        self.tile_width = self.width;
        self.tile_height = rows_per_strip;
        self
    }

    pub fn with_bits_per_sample(mut self, bits: u16) -> Self {
        self.bits_per_sample = bits;
        self
    }

    pub fn with_samples_per_pixel(mut self, samples: u16) -> Self {
        self.samples_per_pixel = samples;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_predictor(mut self, predictor: Predictor) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn with_photometric(mut self, photometric: u16) -> Self {
        self.photometric = photometric;
        self
    }

    pub fn with_planar_config(mut self, planar_config: u16) -> Self {
        self.planar_config = planar_config;
        self
    }

    /// Bytes per sample, rounded up from the bit depth.
    #[inline]
    pub fn bytes_per_sample(&self) -> u32 {
        (self.bits_per_sample as u32).div_ceil(8)
    }

    /// Bytes per pixel across all samples.
    #[inline]
    pub fn bytes_per_pixel(&self) -> u32 {
        self.bytes_per_sample() * self.samples_per_pixel as u32
    }

    /// Number of block columns.
    #[inline]
    pub fn tiles_across(&self) -> u32 {
        if self.tile_width == 0 {
            0
        } else {
            self.width.div_ceil(self.tile_width)
        }
    }

    /// Number of block rows.
    #[inline]
    pub fn tiles_down(&self) -> u32 {
        if self.tile_height == 0 {
            0
        } else {
            self.height.div_ceil(self.tile_height)
        }
    }

    /// Number of blocks: `ceil(width / tile_width) * ceil(height / tile_height)`.
    #[inline]
    pub fn block_count(&self) -> u32 {
        self.tiles_across().saturating_mul(self.tiles_down())
    }

    /// True when blocks span the full image width.
    #[inline]
    pub fn is_striped(&self) -> bool {
        self.tile_width == self.width
    }

    /// Bytes in one full decoded block.
    #[inline]
    pub fn tile_bytes(&self) -> usize {
        self.tile_width as usize * self.tile_height as usize * self.bytes_per_pixel() as usize
    }
}

// =============================================================================
// Frame
// =============================================================================

/// One frame: descriptor, tag table, block tables and flush state.
#[derive(Debug, Clone)]
pub struct Frame {
    descriptor: ImageDescriptor,
    tags: BTreeMap<u16, Tag>,
    offsets: Vec<u64>,
    lengths: Vec<u64>,
    directory_offset: Option<u64>,
    link_position: u64,
    next_directory: u64,
}

/// Serialized directory ready to be appended at `base`.
#[derive(Debug)]
pub struct DirectoryImage {
    /// Bytes to append
    pub bytes: Vec<u8>,
    /// Tag table as written
    pub tags: BTreeMap<u16, Tag>,
    /// Position of the tag count field
    pub directory_offset: u64,
    /// Position of the forward link field
    pub link_position: u64,
}

impl Frame {
    /// Create an unflushed frame with empty block tables.
    pub fn new(descriptor: ImageDescriptor) -> Self {
        let blocks = descriptor.block_count() as usize;
        Self {
            descriptor,
            tags: BTreeMap::new(),
            offsets: vec![0; blocks],
            lengths: vec![0; blocks],
            directory_offset: None,
            link_position: 0,
            next_directory: 0,
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &ImageDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn is_flushed(&self) -> bool {
        self.directory_offset.is_some()
    }

    /// Position of the tag count field, once flushed.
    #[inline]
    pub fn directory_offset(&self) -> Option<u64> {
        self.directory_offset
    }

    /// Position of the forward link field, once flushed.
    #[inline]
    pub fn link_position(&self) -> u64 {
        self.link_position
    }

    /// Forward link read from disk (0 for the last frame).
    #[inline]
    pub fn next_directory(&self) -> u64 {
        self.next_directory
    }

    #[inline]
    pub fn block_count(&self) -> u32 {
        self.offsets.len() as u32
    }

    /// Offset and length of a block. Unwritten blocks are `(0, 0)`.
    pub fn block(&self, block: u32) -> Option<(u64, u64)> {
        let i = block as usize;
        Some((*self.offsets.get(i)?, *self.lengths.get(i)?))
    }

    /// Record where a block was written.
    pub fn set_block(&mut self, block: u32, offset: u64, length: u64) -> Result<(), TiffError> {
        let count = self.block_count();
        let i = block as usize;
        if i >= self.offsets.len() {
            return Err(TiffError::BlockOutOfRange { block, count });
        }
        self.offsets[i] = offset;
        self.lengths[i] = length;
        Ok(())
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn lengths(&self) -> &[u64] {
        &self.lengths
    }

    pub fn tags(&self) -> &BTreeMap<u16, Tag> {
        &self.tags
    }

    pub fn tag(&self, id: u16) -> Option<&Tag> {
        self.tags.get(&id)
    }

    /// Insert or replace a tag on an unflushed frame.
    pub fn insert_tag(&mut self, tag: Tag) {
        self.tags.insert(tag.id, tag);
    }

    /// Replace the value of an existing tag after an in-place patch.
    pub fn replace_tag(&mut self, tag: Tag) {
        if let Some(slot) = self.tags.get_mut(&tag.id) {
            *slot = tag;
        }
    }

    /// Ordinal of a tag in ascending id order.
    pub fn tag_ordinal(&self, id: u16) -> Option<usize> {
        if self.tags.contains_key(&id) {
            Some(self.tags.range(..id).count())
        } else {
            None
        }
    }

    /// Build the directory image for this frame as if appended at `base`.
    ///
    /// Generated tags describing the geometry and the block tables replace
    /// any user tag with the same id.
    ///
    /// # Errors
    /// `OffsetOverflow` if a classic file would need an offset, length or
    /// count above 32 bits.
    pub fn layout(&self, width: OffsetWidth, base: u64) -> Result<DirectoryImage, TiffError> {
        let d = &self.descriptor;
        let mut tags = self.tags.clone();

        let scalar = |tags: &mut BTreeMap<u16, Tag>, tag: TiffTag, value: u64| {
            tags.insert(tag.as_u16(), Tag::scalar(tag.as_u16(), value, width));
        };
        scalar(&mut tags, TiffTag::ImageWidth, d.width as u64);
        scalar(&mut tags, TiffTag::ImageLength, d.height as u64);
        scalar(&mut tags, TiffTag::BitsPerSample, d.bits_per_sample as u64);
        scalar(&mut tags, TiffTag::Compression, d.compression.as_u16() as u64);
        scalar(&mut tags, TiffTag::PhotometricInterpretation, d.photometric as u64);
        scalar(&mut tags, TiffTag::SamplesPerPixel, d.samples_per_pixel as u64);
        scalar(&mut tags, TiffTag::PlanarConfiguration, d.planar_config as u64);
        scalar(&mut tags, TiffTag::Predictor, d.predictor.as_u16() as u64);

        let long = |tags: &mut BTreeMap<u16, Tag>, tag: TiffTag, value: u32| {
            tags.insert(
                tag.as_u16(),
                Tag::inline(tag.as_u16(), FieldType::Long, 1, &value.to_le_bytes()),
            );
        };
        let (offsets_tag, lengths_tag) = if d.is_striped() {
            for stale in [
                TiffTag::TileWidth,
                TiffTag::TileLength,
                TiffTag::TileOffsets,
                TiffTag::TileByteCounts,
            ] {
                tags.remove(&stale.as_u16());
            }
            long(&mut tags, TiffTag::RowsPerStrip, d.tile_height);
            (TiffTag::StripOffsets, TiffTag::StripByteCounts)
        } else {
            for stale in [
                TiffTag::RowsPerStrip,
                TiffTag::StripOffsets,
                TiffTag::StripByteCounts,
            ] {
                tags.remove(&stale.as_u16());
            }
            long(&mut tags, TiffTag::TileWidth, d.tile_width);
            long(&mut tags, TiffTag::TileLength, d.tile_height);
            (TiffTag::TileOffsets, TiffTag::TileByteCounts)
        };

        for value in self.offsets.iter().chain(self.lengths.iter()) {
            if *value > width.max_offset() {
                return Err(TiffError::OffsetOverflow(*value));
            }
        }

        let table_type = FieldType::table_for(width);
        let count = self.offsets.len() as u64;
        let mut bytes = Vec::new();

        if self.offsets.len() > 1 {
            let offsets_bytes = encode_uint_array(&self.offsets, table_type);
            let lengths_at = base + offsets_bytes.len() as u64;
            bytes.extend_from_slice(&offsets_bytes);
            bytes.extend_from_slice(&encode_uint_array(&self.lengths, table_type));

            tags.insert(
                offsets_tag.as_u16(),
                Tag::out_of_line(offsets_tag.as_u16(), table_type, count, base),
            );
            tags.insert(
                lengths_tag.as_u16(),
                Tag::out_of_line(lengths_tag.as_u16(), table_type, count, lengths_at),
            );
        } else {
            let offset = self.offsets.first().copied().unwrap_or(0);
            let length = self.lengths.first().copied().unwrap_or(0);
            for (tag, value) in [(offsets_tag, offset), (lengths_tag, length)] {
                let bytes = encode_uint_array(&[value], table_type);
                tags.insert(tag.as_u16(), Tag::inline(tag.as_u16(), table_type, 1, &bytes));
            }
        }

        let directory_offset = base + bytes.len() as u64;
        width.put_count(&mut bytes, tags.len() as u64)?;
        for tag in tags.values() {
            encode_entry(tag, width, &mut bytes)?;
        }
        let link_position = base + bytes.len() as u64;
        width.put_offset(&mut bytes, 0)?;

        Ok(DirectoryImage {
            bytes,
            tags,
            directory_offset,
            link_position,
        })
    }

    /// Adopt a directory image once it is on disk.
    pub fn commit(&mut self, image: DirectoryImage) {
        self.tags = image.tags;
        self.directory_offset = Some(image.directory_offset);
        self.link_position = image.link_position;
    }

    /// Parse the directory at `offset`.
    ///
    /// # Errors
    /// - `TagCountOutOfRange` if the directory declares fewer than 1 or more than 1000 tags
    /// - `InvalidTagValue` if entries are not in ascending id order or the
    ///   geometry or block tables are inconsistent
    /// - `MissingTag` if width, length or block tables are absent
    pub fn parse<S: Storage>(
        storage: &mut S,
        offset: u64,
        width: OffsetWidth,
    ) -> Result<Self, TiffError> {
        let mut count_bytes = [0u8; 8];
        storage.read_exact_at(offset, &mut count_bytes[..width.count_size()])?;
        let count = width.read_count(&count_bytes);

        if !(MIN_TAG_COUNT..=MAX_TAG_COUNT).contains(&count) {
            return Err(TiffError::TagCountOutOfRange { offset, count });
        }

        let entries_len = count as usize * width.entry_size();
        let mut body = vec![0u8; entries_len + width.offset_size()];
        storage.read_exact_at(offset + width.count_size() as u64, &mut body)?;

        let mut tags = BTreeMap::new();
        let mut previous: Option<u16> = None;
        for chunk in body[..entries_len].chunks_exact(width.entry_size()) {
            let tag = decode_entry(chunk, width)?;
            if previous.is_some_and(|p| p >= tag.id) {
                return Err(TiffError::InvalidTagValue {
                    tag: "directory",
                    message: format!("entries at offset {} are not in ascending id order", offset),
                });
            }
            previous = Some(tag.id);
            tags.insert(tag.id, tag);
        }

        let next_directory = width.read_offset(&body[entries_len..]);
        let link_position = offset + width.count_size() as u64 + entries_len as u64;

        let (descriptor, offsets, lengths) = read_geometry(storage, &tags, width)?;

        debug!(
            offset = offset,
            tags = count,
            blocks = offsets.len(),
            next = next_directory,
            "Parsed directory"
        );

        Ok(Self {
            descriptor,
            tags,
            offsets,
            lengths,
            directory_offset: Some(offset),
            link_position,
            next_directory,
        })
    }
}

/// On-disk position of the entry with the given ordinal.
///
/// `directory_offset + count_size + ordinal * entry_size`
#[inline]
pub fn entry_position(directory_offset: u64, ordinal: usize, width: OffsetWidth) -> u64 {
    directory_offset + width.count_size() as u64 + (ordinal * width.entry_size()) as u64
}

// =============================================================================
// Value Reading
// =============================================================================

/// Read the value bytes of a tag, inline or out of line.
pub fn read_tag_value<S: Storage>(storage: &mut S, tag: &Tag) -> Result<Vec<u8>, TiffError> {
    if let Some(bytes) = tag.inline_bytes() {
        return Ok(bytes.to_vec());
    }

    let TagValue::OutOfLine(offset) = tag.value else {
        return Ok(Vec::new());
    };
    let size = tag.byte_size();
    let file_len = storage.len()?;
    if offset.checked_add(size).map_or(true, |end| end > file_len) {
        return Err(TiffError::Io(IoError::RangeOutOfBounds {
            offset,
            requested: size,
            size: file_len,
        }));
    }

    let mut buf = vec![0u8; size as usize];
    storage.read_exact_at(offset, &mut buf)?;
    Ok(buf)
}

/// Read a tag as unsigned integers.
pub fn read_uint_values<S: Storage>(storage: &mut S, tag: &Tag) -> Result<Vec<u64>, TiffError> {
    let bytes = read_tag_value(storage, tag)?;
    decode_uint_array(&bytes, tag.count as usize, tag.field_type)
}

fn required_u64<S: Storage>(
    storage: &mut S,
    tags: &BTreeMap<u16, Tag>,
    tag: TiffTag,
) -> Result<u64, TiffError> {
    optional_u64(storage, tags, tag)?.ok_or(TiffError::MissingTag(tag.name()))
}

/// First element of a tag, if present.
fn optional_u64<S: Storage>(
    storage: &mut S,
    tags: &BTreeMap<u16, Tag>,
    tag: TiffTag,
) -> Result<Option<u64>, TiffError> {
    let Some(entry) = tags.get(&tag.as_u16()) else {
        return Ok(None);
    };
    if let Some(value) = entry.inline_u64() {
        return Ok(Some(value));
    }
    let values = read_uint_values(storage, entry)?;
    values
        .first()
        .copied()
        .map(Some)
        .ok_or_else(|| TiffError::InvalidTagValue {
            tag: tag.name(),
            message: "empty value".to_string(),
        })
}

fn narrow<T: TryFrom<u64>>(tag: TiffTag, value: u64) -> Result<T, TiffError> {
    T::try_from(value).map_err(|_| TiffError::InvalidTagValue {
        tag: tag.name(),
        message: format!("value {} out of range", value),
    })
}

type Geometry = (ImageDescriptor, Vec<u64>, Vec<u64>);

fn read_geometry<S: Storage>(
    storage: &mut S,
    tags: &BTreeMap<u16, Tag>,
    width: OffsetWidth,
) -> Result<Geometry, TiffError> {
    let image_width = required_u64(storage, tags, TiffTag::ImageWidth)?;
    let image_width: u32 = narrow(TiffTag::ImageWidth, image_width)?;
    let image_height = required_u64(storage, tags, TiffTag::ImageLength)?;
    let image_height: u32 = narrow(TiffTag::ImageLength, image_height)?;

    let value_or_one = |storage: &mut S, tag: TiffTag| -> Result<u64, TiffError> {
        Ok(optional_u64(storage, tags, tag)?.unwrap_or(1))
    };
    let bits = value_or_one(storage, TiffTag::BitsPerSample)?;
    let samples = value_or_one(storage, TiffTag::SamplesPerPixel)?;
    let compression = value_or_one(storage, TiffTag::Compression)?;
    let photometric = value_or_one(storage, TiffTag::PhotometricInterpretation)?;
    let planar = value_or_one(storage, TiffTag::PlanarConfiguration)?;
    let predictor = value_or_one(storage, TiffTag::Predictor)?;

    let (tile_width, tile_height, offsets_tag, lengths_tag) =
        if tags.contains_key(&TiffTag::TileLength.as_u16()) {
            let tw = required_u64(storage, tags, TiffTag::TileWidth)?;
            let th = required_u64(storage, tags, TiffTag::TileLength)?;
            (
                narrow::<u32>(TiffTag::TileWidth, tw)?,
                narrow::<u32>(TiffTag::TileLength, th)?,
                TiffTag::TileOffsets,
                TiffTag::TileByteCounts,
            )
        } else {
            let rows = optional_u64(storage, tags, TiffTag::RowsPerStrip)?
                .unwrap_or(image_height as u64)
                .min(image_height as u64);
            (
                image_width,
                rows as u32,
                TiffTag::StripOffsets,
                TiffTag::StripByteCounts,
            )
        };

    if image_width == 0 || image_height == 0 || tile_width == 0 || tile_height == 0 {
        return Err(TiffError::InvalidTagValue {
            tag: "geometry",
            message: format!(
                "image {}x{} with blocks {}x{}",
                image_width, image_height, tile_width, tile_height
            ),
        });
    }

    let descriptor = ImageDescriptor {
        width: image_width,
        height: image_height,
        tile_width,
        tile_height,
        bits_per_sample: narrow(TiffTag::BitsPerSample, bits)?,
        samples_per_pixel: narrow(TiffTag::SamplesPerPixel, samples)?,
        compression: Compression::from_u16(narrow(TiffTag::Compression, compression)?),
        predictor: Predictor::from_u16(narrow(TiffTag::Predictor, predictor)?),
        photometric: narrow(TiffTag::PhotometricInterpretation, photometric)?,
        planar_config: narrow(TiffTag::PlanarConfiguration, planar)?,
    };

    let offsets_entry = tags
        .get(&offsets_tag.as_u16())
        .ok_or(TiffError::MissingTag(offsets_tag.name()))?;
    let lengths_entry = tags
        .get(&lengths_tag.as_u16())
        .ok_or(TiffError::MissingTag(lengths_tag.name()))?;

    let offsets = read_uint_values(storage, offsets_entry)?;
    let lengths = read_uint_values(storage, lengths_entry)?;

    if offsets.len() != lengths.len() {
        return Err(TiffError::InvalidTagValue {
            tag: lengths_tag.name(),
            message: format!("{} byte counts for {} offsets", lengths.len(), offsets.len()),
        });
    }
    if (offsets.len() as u64) < descriptor.block_count() as u64 {
        return Err(TiffError::InvalidTagValue {
            tag: offsets_tag.name(),
            message: format!(
                "{} entries for {} blocks ({} file)",
                offsets.len(),
                descriptor.block_count(),
                width.name()
            ),
        });
    }

    Ok((descriptor, offsets, lengths))
}

// =============================================================================
// Tests
// =============================================================================
