//! Command-line configuration for the `tilestore` tool.
//!
//! This module provides the CLI definition, which supports:
//! - Subcommands for inspecting, checking and extracting from container files
//! - Environment variables with the `TILESTORE_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use tilestore::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Command::Inspect(config) => println!("inspecting {}", config.path.display()),
//!     _ => {}
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `TILESTORE_VERBOSE` - Enable debug logging (default: false)
//! - `TILESTORE_JSON` - Print `inspect` output as JSON (default: false)
//! - `TILESTORE_FRAME` - Frame index for `extract` (default: 0)
//! - `TILESTORE_CACHE_BYTES` - Decoded tile cache size for `extract` (default: 64MB)
//! - `TILESTORE_MAX_TAG_VALUES` - Values shown per tag by `inspect` (default: 8)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::tile::DEFAULT_TILE_CACHE_CAPACITY;

// =============================================================================
// Default Values
// =============================================================================

/// Default frame index for `extract`.
pub const DEFAULT_FRAME: u32 = 0;

/// Default number of values printed per tag.
pub const DEFAULT_MAX_TAG_VALUES: usize = 8;

// =============================================================================
// CLI Arguments
// =============================================================================

/// tilestore - Inspect and read tiled multi-frame TIFF containers.
#[derive(Parser, Debug, Clone)]
#[command(name = "tilestore")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false, env = "TILESTORE_VERBOSE")]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the width variant, frames, descriptors and tags of a file.
    Inspect(InspectConfig),

    /// Validate every frame and decode every written block.
    Check(CheckConfig),

    /// Read a pixel rectangle of one frame into a raw file.
    Extract(ExtractConfig),
}

// =============================================================================
// Inspect
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// Container file to inspect.
    pub path: PathBuf,

    /// Print the report as JSON.
    #[arg(long, default_value_t = false, env = "TILESTORE_JSON")]
    pub json: bool,

    /// Maximum number of values shown for array tags.
    #[arg(long, default_value_t = DEFAULT_MAX_TAG_VALUES, env = "TILESTORE_MAX_TAG_VALUES")]
    pub max_tag_values: usize,
}

impl InspectConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_path(&self.path)
    }
}

// =============================================================================
// Check
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// Container file to check.
    pub path: PathBuf,

    /// Only validate directories, skip decoding blocks.
    #[arg(long, default_value_t = false)]
    pub skip_decode: bool,
}

impl CheckConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_path(&self.path)
    }
}

// =============================================================================
// Extract
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ExtractConfig {
    /// Container file to read from.
    pub path: PathBuf,

    /// Frame index in the chain.
    #[arg(long, default_value_t = DEFAULT_FRAME, env = "TILESTORE_FRAME")]
    pub frame: u32,

    /// Left edge of the rectangle in pixels.
    #[arg(long, default_value_t = 0)]
    pub x: u32,

    /// Top edge of the rectangle in pixels.
    #[arg(long, default_value_t = 0)]
    pub y: u32,

    /// Rectangle width in pixels.
    #[arg(long)]
    pub width: u32,

    /// Rectangle height in pixels.
    #[arg(long)]
    pub height: u32,

    /// Output file for the raw, tightly packed pixels.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Decoded tile cache size in bytes (0 disables the cache).
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "TILESTORE_CACHE_BYTES")]
    pub cache_bytes: usize,
}

impl ExtractConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        validate_path(&self.path)?;

        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }
        if self.output.as_os_str().is_empty() {
            return Err("output path is required. Set --output".to_string());
        }
        if self.output == self.path {
            return Err("output path must differ from the input file".to_string());
        }
        Ok(())
    }
}

fn validate_path(path: &std::path::Path) -> Result<(), String> {
    if path.as_os_str().is_empty() {
        return Err("input path is required".to_string());
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
