//! Block codecs.
//!
//! Pure, stateless transforms applied to tile payloads:
//!
//! - [`lzw`]: TIFF LZW encoder and decoder
//! - [`predictor`]: horizontal differencing and its inverse
//!
//! Every function works on caller-owned buffers and can run concurrently on
//! different buffers.

pub mod lzw;
mod predictor;

pub use lzw::EncodeOutcome;
pub use predictor::{horizontal_accumulate, horizontal_differencing, SampleLayout};
