//! The directory store: one open container file and its chain of frames.
//!
//! A [`TiffStore`] owns its storage and every frame read from or created in
//! it. All operations serialize on one coarse lock, so a store can be shared
//! between threads behind an `Arc`; different stores never contend.
//!
//! # Frame Lifecycle
//!
//! 1. [`TiffStore::create_frame`] allocates empty block tables in memory
//! 2. [`TiffStore::save_block`] appends block payloads at the end of the file
//! 3. [`TiffStore::flush_frame`] appends the directory and links it into the chain
//!
//! Frames are flushed in creation order. A flushed frame is immutable except
//! for tags that already exist, whose values can be patched in place.
//!
//! Flushing appends the complete directory before it back-patches the
//! previous forward link (or the root pointer), and marks the frame flushed
//! only after both writes succeed. A failed flush leaves the existing chain
//! intact and can be retried.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::TiffError;
use crate::io::{FileAccess, FileStorage, Storage};

use super::directory::{entry_position, read_tag_value, read_uint_values, Frame, ImageDescriptor};
use super::parser::{OffsetWidth, TiffHeader, HEADER_PROBE_SIZE};
use super::tags::{FieldType, TiffTag};
use super::validation::validate_descriptor;
use super::values::{encode_entry, Tag, TagValue};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Open Mode
// =============================================================================

/// How a store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing file, read only
    Read,
    /// Existing file; new frames are appended after the loaded chain
    ReadWrite,
    /// New file of the given width variant
    Create(OffsetWidth),
}

impl OpenMode {
    /// Legacy flag: read access (no bits set)
    pub const READ: u8 = 0x00;
    /// Legacy flag: write access
    pub const WRITE: u8 = 0x01;
    /// Legacy flag: create a new file
    pub const CREATE: u8 = 0x02;
    /// Legacy flag: create with 64-bit offsets
    pub const BIGTIFF: u8 = 0x04;

    /// Map legacy bit flags to an open mode.
    ///
    /// # Errors
    /// `InvalidOpenFlags` for unknown bits, CREATE without WRITE, or BIGTIFF without CREATE.
    pub fn from_flags(flags: u8) -> Result<Self, TiffError> {
        if flags & !(Self::WRITE | Self::CREATE | Self::BIGTIFF) != 0 {
            return Err(TiffError::InvalidOpenFlags(flags));
        }

        let write = flags & Self::WRITE != 0;
        let create = flags & Self::CREATE != 0;
        let big = flags & Self::BIGTIFF != 0;

        match (write, create, big) {
            (false, false, false) => Ok(OpenMode::Read),
            (true, false, false) => Ok(OpenMode::ReadWrite),
            (true, true, false) => Ok(OpenMode::Create(OffsetWidth::Classic)),
            (true, true, true) => Ok(OpenMode::Create(OffsetWidth::Big)),
            _ => Err(TiffError::InvalidOpenFlags(flags)),
        }
    }

    /// Whether this mode allows mutation.
    #[inline]
    pub const fn is_writable(self) -> bool {
        !matches!(self, OpenMode::Read)
    }

    fn file_access(self) -> FileAccess {
        match self {
            OpenMode::Read => FileAccess::Read,
            OpenMode::ReadWrite => FileAccess::ReadWrite,
            OpenMode::Create(_) => FileAccess::Create,
        }
    }
}

// =============================================================================
// Frame Identifier
// =============================================================================

/// Opaque identifier of a frame within one store.
///
/// Ids carry the identity of the store that issued them, so an id from one
/// store is rejected by another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId {
    store: u64,
    index: u32,
}

impl FrameId {
    /// Position of the frame in the chain.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }
}

// =============================================================================
// TiffStore
// =============================================================================

struct StoreState<S> {
    storage: S,
    frames: Vec<Frame>,
}

/// One open container file.
pub struct TiffStore<S: Storage = FileStorage> {
    id: u64,
    width: OffsetWidth,
    writable: bool,
    identifier: String,
    state: Mutex<Option<StoreState<S>>>,
}

impl TiffStore<FileStorage> {
    /// Open or create a file on disk.
    ///
    /// # Errors
    /// - `Io(NotFound)` if the file does not exist in `Read` or `ReadWrite` mode
    /// - any error of [`TiffStore::open_storage`]
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self, TiffError> {
        let storage = FileStorage::open(path, mode.file_access())?;
        Self::open_storage(storage, mode)
    }
}

impl<S: Storage> TiffStore<S> {
    /// Open a store over an existing storage.
    ///
    /// `Create` writes a fresh header at offset 0. `Read` and `ReadWrite`
    /// detect the width variant and load the whole frame chain.
    ///
    /// # Errors
    /// - `NotATiffFormat` if the header is missing or unrecognized
    /// - `BigEndianUnsupported` for "MM" files
    /// - `NoFrameFound` if the root pointer is 0
    /// - `TagCountOutOfRange` and other parse errors from any directory in the chain
    pub fn open_storage(mut storage: S, mode: OpenMode) -> Result<Self, TiffError> {
        let (width, frames) = match mode {
            OpenMode::Create(width) => {
                storage.write_all_at(0, &TiffHeader::encode_new(width))?;
                (width, Vec::new())
            }
            OpenMode::Read | OpenMode::ReadWrite => load_chain(&mut storage)?,
        };

        let identifier = storage.identifier().to_string();
        info!(
            path = %identifier,
            variant = width.name(),
            frames = frames.len(),
            writable = mode.is_writable(),
            "Opened store"
        );

        Ok(Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            width,
            writable: mode.is_writable(),
            identifier,
            state: Mutex::new(Some(StoreState { storage, frames })),
        })
    }

    /// Flush every unflushed frame in order and release the storage.
    ///
    /// Read-only stores are released without writing. If a flush fails the
    /// storage stays attached, so the drop path flushes the remaining frames
    /// once more before releasing it.
    pub fn close(self) -> Result<S, TiffError> {
        if self.writable {
            let width = self.width;
            self.with_state(|state| {
                state.flush_all(width)?;
                state.storage.flush()?;
                Ok(())
            })?;
        }

        let state = self.lock().take().ok_or(TiffError::InvalidHandle)?;
        info!(path = %self.identifier, frames = state.frames.len(), "Closed store");
        Ok(state.storage)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Width variant of the file.
    #[inline]
    pub fn offset_width(&self) -> OffsetWidth {
        self.width
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Identifier of the underlying storage.
    #[inline]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Number of frames, flushed or not.
    pub fn frame_count(&self) -> Result<u32, TiffError> {
        self.with_state(|state| Ok(state.frames.len() as u32))
    }

    /// Id of the frame at `index`.
    pub fn frame_id(&self, index: u32) -> Result<FrameId, TiffError> {
        self.with_state(|state| {
            state.frame(index)?;
            Ok(FrameId {
                store: self.id,
                index,
            })
        })
    }

    /// Ids of all frames in chain order.
    pub fn frame_ids(&self) -> Result<Vec<FrameId>, TiffError> {
        let count = self.frame_count()?;
        Ok((0..count)
            .map(|index| FrameId {
                store: self.id,
                index,
            })
            .collect())
    }

    /// Geometry of a frame.
    pub fn descriptor(&self, frame: FrameId) -> Result<ImageDescriptor, TiffError> {
        let index = self.resolve(frame)?;
        self.with_state(|state| Ok(*state.frame(index)?.descriptor()))
    }

    /// Snapshot of a frame's tables.
    pub fn frame(&self, frame: FrameId) -> Result<Frame, TiffError> {
        let index = self.resolve(frame)?;
        self.with_state(|state| Ok(state.frame(index)?.clone()))
    }

    /// Current size of the file in bytes.
    pub fn file_len(&self) -> Result<u64, TiffError> {
        self.with_state(|state| Ok(state.storage.len()?))
    }

    // -------------------------------------------------------------------------
    // Frames and Blocks
    // -------------------------------------------------------------------------

    /// Create a new unflushed frame at the end of the chain.
    ///
    /// # Errors
    /// - `WrongOpenMode` on a read-only store
    /// - `InvalidDescriptor` if the descriptor fails validation
    pub fn create_frame(&self, descriptor: ImageDescriptor) -> Result<FrameId, TiffError> {
        if !self.writable {
            return Err(TiffError::WrongOpenMode);
        }

        let validation = validate_descriptor(&descriptor);
        for warning in &validation.warnings {
            warn!(path = %self.identifier, "{}", warning);
        }
        validation.into_result()?;

        self.with_state(|state| {
            let index = state.frames.len() as u32;
            let frame = Frame::new(descriptor);
            info!(
                frame = index,
                width = descriptor.width,
                height = descriptor.height,
                tile_width = descriptor.tile_width,
                tile_height = descriptor.tile_height,
                blocks = frame.block_count(),
                "Created frame"
            );
            state.frames.push(frame);
            Ok(FrameId {
                store: self.id,
                index,
            })
        })
    }

    /// Append a block payload and record it in the frame's block table.
    ///
    /// # Errors
    /// - `WrongOpenMode` on a read-only store
    /// - `FrameAlreadyFlushed` if the frame's tables are already on disk
    /// - `BlockOutOfRange` if `block >= block_count`
    /// - `OffsetOverflow` if a classic file would grow past 4 GiB
    pub fn save_block(&self, frame: FrameId, block: u32, data: &[u8]) -> Result<(), TiffError> {
        if !self.writable {
            return Err(TiffError::WrongOpenMode);
        }
        let index = self.resolve(frame)?;
        let width = self.width;

        self.with_state(|state| {
            let target = state.frame(index)?;
            if target.is_flushed() {
                return Err(TiffError::FrameAlreadyFlushed(index));
            }
            let count = target.block_count();
            if block >= count {
                return Err(TiffError::BlockOutOfRange { block, count });
            }

            let offset = state.append_checked(data, width)?;
            state.frame_mut(index)?.set_block(block, offset, data.len() as u64)?;

            debug!(frame = index, block = block, offset = offset, length = data.len(), "Saved block");
            Ok(())
        })
    }

    /// Read a block payload, or probe its length.
    ///
    /// With `out == None` only the stored length is returned. Otherwise the
    /// payload is copied into the front of `out` and its length returned.
    /// Unwritten blocks have length 0.
    ///
    /// # Errors
    /// - `BlockOutOfRange` if `block >= block_count`
    /// - `BufferTooSmall` if `out` is shorter than the payload
    /// - `BlockOffsetOutOfRange` if the recorded range lies outside the file
    pub fn load_block(
        &self,
        frame: FrameId,
        block: u32,
        out: Option<&mut [u8]>,
    ) -> Result<u64, TiffError> {
        let index = self.resolve(frame)?;
        self.with_state(|state| {
            let (offset, length) = state.block(index, block)?;
            let Some(out) = out else {
                return Ok(length);
            };
            if (out.len() as u64) < length {
                return Err(TiffError::BufferTooSmall {
                    required: length,
                    actual: out.len() as u64,
                });
            }
            state.read_range(offset, &mut out[..length as usize])?;
            debug!(frame = index, block = block, length = length, "Loaded block");
            Ok(length)
        })
    }

    /// Read a whole block payload into a new buffer.
    pub fn read_block(&self, frame: FrameId, block: u32) -> Result<Bytes, TiffError> {
        let index = self.resolve(frame)?;
        self.with_state(|state| {
            let (offset, length) = state.block(index, block)?;
            let mut buf = vec![0u8; length as usize];
            state.read_range(offset, &mut buf)?;
            Ok(Bytes::from(buf))
        })
    }

    /// Write a frame's directory and link it into the chain.
    ///
    /// Flushing an already flushed frame does nothing.
    ///
    /// # Errors
    /// - `PreviousFrameNotClosed` if the previous frame is not flushed yet
    /// - `OffsetOverflow` if a classic file would grow past 4 GiB
    pub fn flush_frame(&self, frame: FrameId) -> Result<(), TiffError> {
        let index = self.resolve(frame)?;
        let width = self.width;
        self.with_state(|state| state.flush(index, width))
    }

    // -------------------------------------------------------------------------
    // Tags
    // -------------------------------------------------------------------------

    /// Set a tag value.
    ///
    /// Before the frame is flushed, tags are inserted or replaced freely and
    /// out-of-line values are appended at the end of the file. After flush,
    /// only existing tags with identical type and count can be patched; the
    /// value is rewritten at its existing location and the entry is rewritten
    /// at its position in the directory.
    ///
    /// # Arguments
    /// * `field_type` - Numeric field type code
    /// * `count` - Number of elements
    /// * `data` - Little-endian value bytes, exactly `count * type size` long
    ///
    /// # Errors
    /// - `WrongOpenMode` on a read-only store
    /// - `TagTypeIncorrect` for unknown types or, after flush, a type change
    /// - `TagSizeIncorrect` for a zero count, a payload of the wrong length,
    ///   a classic single value wider than 4 bytes, or, after flush, a count change
    /// - `AppendNotAllowed` for a new tag after flush
    /// - `GeneratedTag` for a descriptor or block-table tag after flush
    pub fn set_tag(
        &self,
        frame: FrameId,
        id: u16,
        field_type: u16,
        count: u64,
        data: &[u8],
    ) -> Result<(), TiffError> {
        if !self.writable {
            return Err(TiffError::WrongOpenMode);
        }
        let field_type = FieldType::from_u16(field_type).ok_or_else(|| TiffError::TagTypeIncorrect {
            tag: id,
            message: format!("unknown field type {}", field_type),
        })?;
        if count < 1 {
            return Err(TiffError::TagSizeIncorrect {
                tag: id,
                message: "count must be at least 1".to_string(),
            });
        }
        let elem = field_type.size_in_bytes();
        if self.width == OffsetWidth::Classic && elem > 4 && count == 1 {
            return Err(TiffError::TagSizeIncorrect {
                tag: id,
                message: format!("{:?} values do not fit a classic entry", field_type),
            });
        }
        let size = (elem as u64).checked_mul(count);
        if size != Some(data.len() as u64) {
            return Err(TiffError::TagSizeIncorrect {
                tag: id,
                message: format!(
                    "{} bytes given for {} {:?} values",
                    data.len(),
                    count,
                    field_type
                ),
            });
        }

        let index = self.resolve(frame)?;
        let width = self.width;
        self.with_state(|state| {
            if state.frame(index)?.is_flushed() {
                state.patch_tag(index, id, field_type, count, data, width)
            } else {
                let tag = if field_type.fits_inline(count, width) {
                    Tag::inline(id, field_type, count, data)
                } else {
                    let offset = state.append_checked(data, width)?;
                    Tag::out_of_line(id, field_type, count, offset)
                };
                state.frame_mut(index)?.insert_tag(tag);
                debug!(frame = index, tag = id, count = count, "Set tag");
                Ok(())
            }
        })
    }

    /// Field type code and element count of a tag.
    ///
    /// # Errors
    /// `TagNotFound` if the frame has no such tag.
    pub fn get_tag_info(&self, frame: FrameId, id: u16) -> Result<(u16, u64), TiffError> {
        let index = self.resolve(frame)?;
        self.with_state(|state| {
            let tag = state.tag(index, id)?;
            Ok((tag.field_type.as_u16(), tag.count))
        })
    }

    /// Copy a tag's value bytes, or probe their size.
    ///
    /// With `out == None` only the value size in bytes is returned.
    ///
    /// # Errors
    /// - `TagNotFound` if the frame has no such tag
    /// - `BufferTooSmall` if `out` is shorter than the value
    pub fn get_tag(
        &self,
        frame: FrameId,
        id: u16,
        out: Option<&mut [u8]>,
    ) -> Result<u64, TiffError> {
        let index = self.resolve(frame)?;
        self.with_state(|state| {
            let tag = *state.tag(index, id)?;
            let size = tag.byte_size();
            let Some(out) = out else {
                return Ok(size);
            };
            if (out.len() as u64) < size {
                return Err(TiffError::BufferTooSmall {
                    required: size,
                    actual: out.len() as u64,
                });
            }
            let dst = &mut out[..size as usize];
            match (tag.inline_bytes(), tag.value) {
                (Some(bytes), _) => dst.copy_from_slice(bytes),
                (None, TagValue::OutOfLine(offset)) => state.storage.read_exact_at(offset, dst)?,
                (None, TagValue::Inline(_)) => {}
            }
            Ok(size)
        })
    }

    /// Value bytes of a tag.
    pub fn tag_bytes(&self, frame: FrameId, id: u16) -> Result<Bytes, TiffError> {
        let index = self.resolve(frame)?;
        self.with_state(|state| {
            let tag = *state.tag(index, id)?;
            Ok(Bytes::from(read_tag_value(&mut state.storage, &tag)?))
        })
    }

    /// First element of an unsigned integer tag.
    pub fn tag_u64(&self, frame: FrameId, id: u16) -> Result<u64, TiffError> {
        self.tag_u64_array(frame, id)?
            .first()
            .copied()
            .ok_or(TiffError::TagNotFound(id))
    }

    /// All elements of an unsigned integer tag.
    pub fn tag_u64_array(&self, frame: FrameId, id: u16) -> Result<Vec<u64>, TiffError> {
        let index = self.resolve(frame)?;
        self.with_state(|state| {
            let tag = *state.tag(index, id)?;
            read_uint_values(&mut state.storage, &tag)
        })
    }

    /// Tag ids of a frame in ascending order.
    pub fn tag_ids(&self, frame: FrameId) -> Result<Vec<u16>, TiffError> {
        let index = self.resolve(frame)?;
        self.with_state(|state| Ok(state.frame(index)?.tags().keys().copied().collect()))
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, Option<StoreState<S>>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut StoreState<S>) -> Result<T, TiffError>,
    ) -> Result<T, TiffError> {
        let mut guard = self.lock();
        let state = guard.as_mut().ok_or(TiffError::InvalidHandle)?;
        f(state)
    }

    fn resolve(&self, frame: FrameId) -> Result<u32, TiffError> {
        if frame.store != self.id {
            return Err(TiffError::FrameNotFound(frame.index));
        }
        Ok(frame.index)
    }
}

impl<S: Storage> Drop for TiffStore<S> {
    fn drop(&mut self) {
        let state = self.lock().take();
        let Some(mut state) = state else {
            return;
        };
        if !self.writable {
            return;
        }
        let result = state
            .flush_all(self.width)
            .and_then(|()| state.storage.flush().map_err(TiffError::from));
        if let Err(e) = result {
            warn!(path = %self.identifier, error = %e, "Failed to flush store on drop");
        }
    }
}

impl<S: Storage> std::fmt::Debug for TiffStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiffStore")
            .field("identifier", &self.identifier)
            .field("width", &self.width)
            .field("writable", &self.writable)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Store State
// =============================================================================

impl<S: Storage> StoreState<S> {
    fn frame(&self, index: u32) -> Result<&Frame, TiffError> {
        self.frames
            .get(index as usize)
            .ok_or(TiffError::FrameNotFound(index))
    }

    fn frame_mut(&mut self, index: u32) -> Result<&mut Frame, TiffError> {
        self.frames
            .get_mut(index as usize)
            .ok_or(TiffError::FrameNotFound(index))
    }

    fn tag(&self, index: u32, id: u16) -> Result<&Tag, TiffError> {
        self.frame(index)?.tag(id).ok_or(TiffError::TagNotFound(id))
    }

    fn block(&self, index: u32, block: u32) -> Result<(u64, u64), TiffError> {
        let frame = self.frame(index)?;
        frame.block(block).ok_or(TiffError::BlockOutOfRange {
            block,
            count: frame.block_count(),
        })
    }

    /// Append data, refusing to grow a classic file past 32-bit offsets.
    fn append_checked(&mut self, data: &[u8], width: OffsetWidth) -> Result<u64, TiffError> {
        let end = self.storage.len()? + data.len() as u64;
        if end > width.max_offset() {
            return Err(TiffError::OffsetOverflow(end));
        }
        Ok(self.storage.append(data)?)
    }

    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), TiffError> {
        let length = buf.len() as u64;
        let size = self.storage.len()?;
        if offset.checked_add(length).map_or(true, |end| end > size) {
            return Err(TiffError::BlockOffsetOutOfRange {
                offset,
                length,
                size,
            });
        }
        self.storage.read_exact_at(offset, buf)?;
        Ok(())
    }

    fn flush(&mut self, index: u32, width: OffsetWidth) -> Result<(), TiffError> {
        if self.frame(index)?.is_flushed() {
            return Ok(());
        }

        let patch_position = match index.checked_sub(1) {
            None => width.root_pointer_position(),
            Some(previous) => {
                let previous = self.frame(previous)?;
                if !previous.is_flushed() {
                    return Err(TiffError::PreviousFrameNotClosed(index));
                }
                previous.link_position()
            }
        };

        let base = self.storage.len()?;
        let image = self.frame(index)?.layout(width, base)?;
        let end = base + image.bytes.len() as u64;
        if end > width.max_offset() {
            return Err(TiffError::OffsetOverflow(end));
        }
        let pointer = width.encode_offset(image.directory_offset)?;

        self.storage.append(&image.bytes)?;
        self.storage.write_all_at(patch_position, &pointer)?;

        info!(
            frame = index,
            directory_offset = image.directory_offset,
            tags = image.tags.len(),
            patched = patch_position,
            "Flushed frame"
        );
        self.frame_mut(index)?.commit(image);
        Ok(())
    }

    fn flush_all(&mut self, width: OffsetWidth) -> Result<(), TiffError> {
        for index in 0..self.frames.len() as u32 {
            self.flush(index, width)?;
        }
        Ok(())
    }

    fn patch_tag(
        &mut self,
        index: u32,
        id: u16,
        field_type: FieldType,
        count: u64,
        data: &[u8],
        width: OffsetWidth,
    ) -> Result<(), TiffError> {
        let frame = self.frame(index)?;
        let existing = *frame.tag(id).ok_or(TiffError::AppendNotAllowed(id))?;
        if TiffTag::is_generated(id) {
            return Err(TiffError::GeneratedTag(id));
        }
        if existing.field_type != field_type {
            return Err(TiffError::TagTypeIncorrect {
                tag: id,
                message: format!(
                    "stored as {:?}, patched as {:?}",
                    existing.field_type, field_type
                ),
            });
        }
        if existing.count != count {
            return Err(TiffError::TagSizeIncorrect {
                tag: id,
                message: format!("stored with {} values, patched with {}", existing.count, count),
            });
        }

        let ordinal = frame.tag_ordinal(id).ok_or(TiffError::TagNotFound(id))?;
        let directory_offset = frame.directory_offset().ok_or(TiffError::FrameNotFound(index))?;

        let tag = match existing.value {
            TagValue::OutOfLine(offset) => {
                self.storage.write_all_at(offset, data)?;
                existing
            }
            TagValue::Inline(_) => Tag::inline(id, field_type, count, data),
        };

        let mut entry = Vec::with_capacity(width.entry_size());
        encode_entry(&tag, width, &mut entry)?;
        let position = entry_position(directory_offset, ordinal, width);
        self.storage.write_all_at(position, &entry)?;

        self.frame_mut(index)?.replace_tag(tag);
        debug!(frame = index, tag = id, position = position, "Patched tag");
        Ok(())
    }
}

/// Detect the width variant and load every directory of the chain.
fn load_chain<S: Storage>(storage: &mut S) -> Result<(OffsetWidth, Vec<Frame>), TiffError> {
    let len = storage.len()?;
    if len < HEADER_PROBE_SIZE as u64 {
        return Err(TiffError::NotATiffFormat);
    }
    let mut probe = [0u8; HEADER_PROBE_SIZE];
    storage.read_exact_at(0, &mut probe)?;
    let header = TiffHeader::parse(&probe)?;

    if header.root_offset == 0 {
        return Err(TiffError::NoFrameFound);
    }

    let mut frames = Vec::new();
    let mut visited = HashSet::new();
    let mut offset = header.root_offset;
    while offset != 0 {
        if !visited.insert(offset) {
            return Err(TiffError::InvalidTagValue {
                tag: "directory chain",
                message: format!("directory at offset {} is linked twice", offset),
            });
        }
        let frame = Frame::parse(storage, offset, header.width)?;
        offset = frame.next_directory();
        frames.push(frame);
    }

    Ok((header.width, frames))
}

// =============================================================================
// Tests
// =============================================================================
