//! Directory engine for tiled, multi-frame TIFF containers.
//!
//! # Key Concepts
//!
//! - **Width variants**: classic files use 32-bit offsets and counts, big files
//!   use 64-bit ones. The variant is chosen at creation and detected on open;
//!   all layout arithmetic goes through [`OffsetWidth`].
//!
//! - **Frames**: each frame is one directory in the file's chain. Frames are
//!   built in memory and committed on flush, which appends the directory and
//!   back-patches the previous forward link.
//!
//! - **Inline vs out-of-line values**: a tag value that fits the offset width
//!   is stored in the entry itself, larger values are stored elsewhere in the
//!   file and the entry holds their offset.
//!
//! Only little-endian files are supported.

mod directory;
mod parser;
mod store;
mod tags;
mod validation;
mod values;

pub use directory::{entry_position, Frame, ImageDescriptor, MAX_TAG_COUNT, MIN_TAG_COUNT};
pub use parser::{OffsetWidth, TiffHeader, HEADER_PROBE_SIZE, IDENTIFICATION};
pub use store::{FrameId, OpenMode, TiffStore};
pub use tags::{
    Compression, FieldType, Predictor, TiffTag, PHOTOMETRIC_MIN_IS_BLACK,
    PHOTOMETRIC_MIN_IS_WHITE, PHOTOMETRIC_RGB, PLANAR_CHUNKY, PLANAR_SEPARATE,
};
pub use validation::{validate_descriptor, validate_frame, ValidationError, ValidationResult};
pub use values::{Tag, TagValue};
