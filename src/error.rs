use thiserror::Error;

/// I/O errors that can occur when reading from or writing to storage
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error reported by the operating system
    #[error("I/O error ({kind:?}): {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File does not exist
    #[error("File not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        IoError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Errors raised by the LZW codec and the horizontal predictor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The code stream references a table entry that cannot exist
    #[error("Corrupt LZW table: {0}")]
    CorruptTable(&'static str),

    /// Predictor element width other than 1, 2 or 4 bytes
    #[error("Unsupported predictor element width: {0} bytes")]
    UnsupportedElementWidth(usize),

    /// Row length is not a whole number of pixels
    #[error("Row of {len} bytes is not a multiple of the {unit}-byte pixel size")]
    RowLengthMismatch { len: usize, unit: usize },

    /// Buffer is shorter than the rows it is supposed to hold
    #[error("Buffer too small: need {required} bytes, got {actual}")]
    BufferTooSmall { required: usize, actual: usize },
}

/// Errors from the directory store: file format, frames, tags and blocks
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while accessing the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Missing byte order marker, unknown version, or truncated header
    #[error("Not a TIFF file")]
    NotATiffFormat,

    /// File declares big-endian ("MM") byte order
    #[error("Big-endian TIFF files are not supported")]
    BigEndianUnsupported,

    /// Directory declares a tag count outside [1, 1000]
    #[error("Directory at offset {offset} declares {count} tags (allowed 1..=1000)")]
    TagCountOutOfRange { offset: u64, count: u64 },

    /// The file holds no directory
    #[error("No frame found in file")]
    NoFrameFound,

    /// Frame id does not address a frame of this store
    #[error("Frame not found: {0}")]
    FrameNotFound(u32),

    /// Handle was closed or never issued
    #[error("Invalid or stale handle")]
    InvalidHandle,

    /// Mutation requested on a handle opened without write access
    #[error("Operation not allowed in the current open mode")]
    WrongOpenMode,

    /// Legacy open flags combine CREATE without WRITE
    #[error("Invalid open flags: 0x{0:02X}")]
    InvalidOpenFlags(u8),

    /// Block index beyond the frame's block table
    #[error("Block {block} out of range (frame has {count} blocks)")]
    BlockOutOfRange { block: u32, count: u32 },

    /// Stored block lies outside the file
    #[error("Block at offset {offset} with length {length} lies outside the file ({size} bytes)")]
    BlockOffsetOutOfRange { offset: u64, length: u64, size: u64 },

    /// Block write requested on a frame that was already flushed
    #[error("Frame {0} was already flushed and its blocks are immutable")]
    FrameAlreadyFlushed(u32),

    /// Flush requested before the previous frame was flushed
    #[error("Frame {0} cannot be flushed before the previous frame")]
    PreviousFrameNotClosed(u32),

    /// New tag requested on a flushed frame
    #[error("Tag {0} cannot be added after the frame was flushed")]
    AppendNotAllowed(u16),

    /// Patch requested on a tag the flush derives from the frame state
    #[error("Tag {0} is generated on flush and cannot be patched")]
    GeneratedTag(u16),

    /// Close requested while the store is still shared
    #[error("Store is still in use")]
    StoreInUse,

    /// Field type is unknown or differs from the stored tag
    #[error("Incorrect type for tag {tag}: {message}")]
    TagTypeIncorrect { tag: u16, message: String },

    /// Element count or payload length is not acceptable
    #[error("Incorrect size for tag {tag}: {message}")]
    TagSizeIncorrect { tag: u16, message: String },

    /// Tag is absent from the frame
    #[error("Tag not found: {0}")]
    TagNotFound(u16),

    /// Required tag is missing from a directory read from disk
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unknown field type in a directory entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// Descriptor rejected by validation
    #[error("Invalid image descriptor: {0}")]
    InvalidDescriptor(String),

    /// Caller buffer is smaller than the value to copy
    #[error("Buffer too small: need {required} bytes, got {actual}")]
    BufferTooSmall { required: u64, actual: u64 },

    /// Offset or length does not fit the 32-bit fields of a classic file
    #[error("Value {0} does not fit in a classic TIFF offset field")]
    OffsetOverflow(u64),
}

/// Errors from the tile addressing layer
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Error from the directory store
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// Error from the codec
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Requested output size differs from the source rectangle
    #[error("Resizing from {src_width}x{src_height} to {dst_width}x{dst_height} is not supported")]
    ResizeNotSupported {
        src_width: u32,
        src_height: u32,
        dst_width: u32,
        dst_height: u32,
    },

    /// Stride cannot hold one row of the rectangle
    #[error("Stride {stride} is smaller than the {required}-byte row")]
    StrideTooSmall { stride: u32, required: u64 },

    /// Caller buffer is smaller than the rectangle it must hold
    #[error("Buffer too small: need {required} bytes, got {actual}")]
    BufferTooSmall { required: u64, actual: u64 },

    /// Rectangle is empty or reaches outside the image
    #[error("Rectangle ({x}, {y}, {width}x{height}) is outside the {image_width}x{image_height} image")]
    RectOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    /// Rectangle origin is not on a tile boundary
    #[error("Rectangle origin ({x}, {y}) is not aligned to the {tile_width}x{tile_height} tile grid")]
    UnalignedRect {
        x: u32,
        y: u32,
        tile_width: u32,
        tile_height: u32,
    },

    /// Rectangle to save covers more than one tile
    #[error("Rectangle {width}x{height} does not fit in one {tile_width}x{tile_height} tile")]
    RectSpansTiles {
        width: u32,
        height: u32,
        tile_width: u32,
        tile_height: u32,
    },

    /// Tile row index past the last tile row
    #[error("Tile row {row} out of range ({rows} rows)")]
    RowOutOfRange { row: u32, rows: u32 },

    /// Tile column index past the last tile column
    #[error("Tile column {column} out of range ({columns} columns)")]
    ColumnOutOfRange { column: u32, columns: u32 },

    /// Compression kind the tile layer cannot encode or decode
    #[error("Compression not supported: {0}")]
    CompressionNotSupported(String),

    /// LZW encoder ran out of output budget
    #[error("LZW compression consumed {consumed} of {total} bytes")]
    CompressFailed { consumed: usize, total: usize },

    /// Decoded block matches neither the full nor the truncated tile size
    #[error("Decoded block {block} has {actual} bytes, expected {full} or {truncated}")]
    DecodedSizeMismatch {
        block: u32,
        actual: usize,
        full: usize,
        truncated: usize,
    },

    /// Block has never been written
    #[error("Block {0} is empty")]
    EmptyBlock(u32),
}
