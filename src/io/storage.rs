use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::IoError;

/// Positional access to the bytes of one container file.
///
/// The directory store serializes every call behind its own lock, so
/// implementations take `&mut self` and need not be internally synchronized.
/// New data always lands at the end of the resource through [`Storage::append`];
/// [`Storage::write_all_at`] is reserved for back-patching fields that were
/// already written.
pub trait Storage: Send {
    /// Read exactly `buf.len()` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds or if the read fails.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), IoError>;

    /// Overwrite bytes starting at `offset`, extending the resource if needed.
    fn write_all_at(&mut self, offset: u64, data: &[u8]) -> Result<(), IoError>;

    /// Append bytes at the end of the resource and return the offset they were written at.
    fn append(&mut self, data: &[u8]) -> Result<u64, IoError>;

    /// Current size of the resource in bytes.
    fn len(&mut self) -> Result<u64, IoError>;

    /// Push buffered writes down to the underlying medium.
    fn flush(&mut self) -> Result<(), IoError>;

    /// Identifier used in log lines (a path for files).
    fn identifier(&self) -> &str;
}

// =============================================================================
// File Storage
// =============================================================================

/// How a [`FileStorage`] opens its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAccess {
    /// Existing file, read only
    Read,
    /// Existing file, read and write
    ReadWrite,
    /// New or truncated file, read and write
    Create,
}

/// [`Storage`] backed by a file on the local filesystem.
pub struct FileStorage {
    file: File,
    path: String,
    len: u64,
}

impl FileStorage {
    /// Open `path` with the requested access.
    ///
    /// # Errors
    /// `IoError::NotFound` if the file does not exist and `access` is not `Create`.
    pub fn open(path: impl AsRef<Path>, access: FileAccess) -> Result<Self, IoError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let mut options = OpenOptions::new();
        match access {
            FileAccess::Read => options.read(true),
            FileAccess::ReadWrite => options.read(true).write(true),
            FileAccess::Create => options.read(true).write(true).create(true).truncate(true),
        };

        let file = options.open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(display.clone()),
            _ => IoError::from(e),
        })?;
        let len = file.metadata()?.len();

        Ok(Self {
            file,
            path: display,
            len,
        })
    }
}

impl Storage for FileStorage {
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), IoError> {
        check_range(offset, buf.len(), self.len)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => IoError::RangeOutOfBounds {
                offset,
                requested: buf.len() as u64,
                size: self.len,
            },
            _ => IoError::from(e),
        })
    }

    fn write_all_at(&mut self, offset: u64, data: &[u8]) -> Result<(), IoError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.len = self.len.max(offset + data.len() as u64);
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> Result<u64, IoError> {
        let offset = self.len;
        self.write_all_at(offset, data)?;
        Ok(offset)
    }

    fn len(&mut self) -> Result<u64, IoError> {
        Ok(self.len)
    }

    fn flush(&mut self) -> Result<(), IoError> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    fn identifier(&self) -> &str {
        &self.path
    }
}

// =============================================================================
// Memory Storage
// =============================================================================

/// [`Storage`] backed by a growable in-memory buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: Vec<u8>,
    identifier: String,
}

impl MemoryStorage {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::from_bytes(Vec::new())
    }

    /// Wrap existing file bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data,
            identifier: "memory".to_string(),
        }
    }

    /// Set the identifier reported in logs.
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Borrow the current contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the storage and return its contents.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Storage for MemoryStorage {
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), IoError> {
        check_range(offset, buf.len(), self.data.len() as u64)?;
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn write_all_at(&mut self, offset: u64, data: &[u8]) -> Result<(), IoError> {
        let start = offset as usize;
        let end = start + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> Result<u64, IoError> {
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(data);
        Ok(offset)
    }

    fn len(&mut self) -> Result<u64, IoError> {
        Ok(self.data.len() as u64)
    }

    fn flush(&mut self) -> Result<(), IoError> {
        Ok(())
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

fn check_range(offset: u64, len: usize, size: u64) -> Result<(), IoError> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        }),
    }
}

// =============================================================================
// Endian Helper Functions
// =============================================================================
//
// The container is little-endian only. These helpers are used extensively
// by the directory parser and the entry codec.

/// Read a little-endian u16 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 2 bytes.
#[inline]
pub fn read_u16_le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

/// Read a little-endian u32 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 4 bytes.
#[inline]
pub fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Read a little-endian u64 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 8 bytes.
#[inline]
pub fn read_u64_le(bytes: &[u8]) -> u64 {
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// Read a little-endian unsigned value of 1, 2, 4 or 8 bytes, widened to u64.
///
/// Other widths read as 0.
#[inline]
pub fn read_uint_le(bytes: &[u8], width: usize) -> u64 {
    match width {
        1 => bytes[0] as u64,
        2 => read_u16_le(bytes) as u64,
        4 => read_u32_le(bytes) as u64,
        8 => read_u64_le(bytes),
        _ => 0,
    }
}
