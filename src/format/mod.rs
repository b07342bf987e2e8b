//! Container formats.
//!
//! The only format is the tiled TIFF family, in its classic and big variants.

pub mod tiff;
