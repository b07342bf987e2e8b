//! tilestore - inspect, check and extract from tiled TIFF containers.

use clap::Parser;
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilestore::{
    config::{CheckConfig, Cli, Command, ExtractConfig, InspectConfig},
    format::tiff::{validate_frame, FieldType, FrameId, OffsetWidth, OpenMode, TiffStore, TiffTag},
    tile::{Rect, TileService},
    TileError,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Inspect(config) => run_inspect(config),
        Command::Check(config) => run_check(config),
        Command::Extract(config) => run_extract(config),
    }
}

/// Initialize the tracing/logging subsystem.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tilestore=debug"
    } else {
        "tilestore=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_read(path: &Path) -> Result<TiffStore, ExitCode> {
    TiffStore::open(path, OpenMode::Read).map_err(|e| {
        error!("Failed to open {}: {}", path.display(), e);
        eprintln!("Error: cannot open {}: {}", path.display(), e);
        ExitCode::FAILURE
    })
}

// =============================================================================
// Inspect Command
// =============================================================================

#[derive(Debug, Serialize)]
struct FileReport {
    path: String,
    variant: OffsetWidth,
    file_size: u64,
    frames: Vec<FrameReport>,
}

#[derive(Debug, Serialize)]
struct FrameReport {
    index: u32,
    width: u32,
    height: u32,
    layout: &'static str,
    tile_width: u32,
    tile_height: u32,
    bits_per_sample: u16,
    samples_per_pixel: u16,
    compression: String,
    predictor: u16,
    photometric: u16,
    blocks: u32,
    written_blocks: u32,
    stored_bytes: u64,
    directory_offset: Option<u64>,
    tags: Vec<TagReport>,
}

#[derive(Debug, Serialize)]
struct TagReport {
    id: u16,
    name: Option<&'static str>,
    field_type: u16,
    count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

fn run_inspect(config: InspectConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let store = match open_read(&config.path) {
        Ok(store) => store,
        Err(code) => return code,
    };

    let report = match build_report(&store, &config) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if config.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: cannot serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_report(&report);
    }

    ExitCode::SUCCESS
}

fn build_report(store: &TiffStore, config: &InspectConfig) -> Result<FileReport, TileError> {
    let mut frames = Vec::new();
    for id in store.frame_ids()? {
        frames.push(frame_report(store, id, config.max_tag_values)?);
    }

    Ok(FileReport {
        path: config.path.display().to_string(),
        variant: store.offset_width(),
        file_size: store.file_len()?,
        frames,
    })
}

fn frame_report(store: &TiffStore, id: FrameId, max_values: usize) -> Result<FrameReport, TileError> {
    let frame = store.frame(id)?;
    let d = *frame.descriptor();

    let mut tags = Vec::new();
    for tag_id in store.tag_ids(id)? {
        let (type_code, count) = store.get_tag_info(id, tag_id)?;
        let field_type = FieldType::from_u16(type_code);

        let (values, text) = match field_type {
            Some(FieldType::Ascii) => {
                let bytes = store.tag_bytes(id, tag_id)?;
                let text = String::from_utf8_lossy(&bytes)
                    .trim_end_matches('\0')
                    .to_string();
                (None, Some(text))
            }
            Some(
                FieldType::Byte
                | FieldType::Short
                | FieldType::Long
                | FieldType::Long8
                | FieldType::Ifd
                | FieldType::Ifd8,
            ) => {
                let mut values = store.tag_u64_array(id, tag_id)?;
                values.truncate(max_values);
                (Some(values), None)
            }
            _ => (None, None),
        };

        tags.push(TagReport {
            id: tag_id,
            name: TiffTag::from_u16(tag_id).map(TiffTag::name),
            field_type: type_code,
            count,
            values,
            text,
        });
    }

    Ok(FrameReport {
        index: id.index(),
        width: d.width,
        height: d.height,
        layout: if d.is_striped() { "strips" } else { "tiles" },
        tile_width: d.tile_width,
        tile_height: d.tile_height,
        bits_per_sample: d.bits_per_sample,
        samples_per_pixel: d.samples_per_pixel,
        compression: d.compression.name().to_string(),
        predictor: d.predictor.as_u16(),
        photometric: d.photometric,
        blocks: frame.block_count(),
        written_blocks: frame.lengths().iter().filter(|&&len| len > 0).count() as u32,
        stored_bytes: frame.lengths().iter().sum(),
        directory_offset: frame.directory_offset(),
        tags,
    })
}

fn print_report(report: &FileReport) {
    println!("File: {}", report.path);
    println!("  Variant: {}", report.variant.name());
    println!("  Size: {} bytes", report.file_size);
    println!("  Frames: {}", report.frames.len());

    for frame in &report.frames {
        println!();
        println!("Frame {}", frame.index);
        println!("─────────────────");
        println!("  Dimensions: {}x{}", frame.width, frame.height);
        println!(
            "  Layout: {} of {}x{}",
            frame.layout, frame.tile_width, frame.tile_height
        );
        println!(
            "  Samples: {} x {} bits",
            frame.samples_per_pixel, frame.bits_per_sample
        );
        println!(
            "  Compression: {} (predictor {})",
            frame.compression, frame.predictor
        );
        println!(
            "  Blocks: {} of {} written, {} bytes",
            frame.written_blocks, frame.blocks, frame.stored_bytes
        );
        if let Some(offset) = frame.directory_offset {
            println!("  Directory offset: {}", offset);
        }

        println!("  Tags:");
        for tag in &frame.tags {
            let name = tag.name.unwrap_or("?");
            let value = match (&tag.values, &tag.text) {
                (Some(values), _) => format_values(values, tag.count),
                (_, Some(text)) => format!("{:?}", text),
                _ => String::new(),
            };
            println!(
                "    {:>5} {:<26} type {:>2} count {:>6}  {}",
                tag.id, name, tag.field_type, tag.count, value
            );
        }
    }
}

fn format_values(values: &[u64], count: u64) -> String {
    let shown: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    if (values.len() as u64) < count {
        format!("[{}, ...]", shown.join(", "))
    } else {
        format!("[{}]", shown.join(", "))
    }
}

// =============================================================================
// Check Command
// =============================================================================

fn run_check(config: CheckConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    println!("tilestore check: {}", config.path.display());
    println!("═════════════════════════════════");
    println!();

    let store = match TiffStore::open(&config.path, OpenMode::Read) {
        Ok(store) => {
            println!("✓ Header: {} variant", store.offset_width().name());
            store
        }
        Err(e) => {
            println!("✗ Header: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (file_size, frame_ids) = match (store.file_len(), store.frame_ids()) {
        (Ok(size), Ok(ids)) => (size, ids),
        (Err(e), _) | (_, Err(e)) => {
            println!("✗ Directory chain: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!("✓ Directory chain: {} frame(s)", frame_ids.len());

    // Decode with the cache disabled so every block is read once
    let service = TileService::with_cache_capacity(store, 0);
    let mut failures = 0usize;

    for id in frame_ids {
        println!();
        let frame = match service.store().frame(id) {
            Ok(frame) => frame,
            Err(e) => {
                println!("✗ Frame {}: {}", id.index(), e);
                failures += 1;
                continue;
            }
        };

        let validation = validate_frame(&frame, file_size);
        if validation.is_valid {
            println!("✓ Frame {}: directory valid", id.index());
        } else {
            for err in &validation.errors {
                println!("✗ Frame {}: {}", id.index(), err);
            }
            failures += validation.errors.len();
        }
        for warning in &validation.warnings {
            println!("  warning: {}", warning);
        }

        if config.skip_decode || !validation.is_valid {
            continue;
        }

        let descriptor = *frame.descriptor();
        if !descriptor.compression.is_supported() {
            println!(
                "  skipped decode: {} compression",
                descriptor.compression.name()
            );
            continue;
        }

        let mut decoded = 0u32;
        let mut bad = 0u32;
        for (block, &length) in frame.lengths().iter().enumerate() {
            if length == 0 {
                continue;
            }
            match service.get_one_block(id, &descriptor, block as u32) {
                Ok(_) => decoded += 1,
                Err(e) => {
                    debug!(frame = id.index(), block, error = %e, "Block failed to decode");
                    println!("✗ Frame {} block {}: {}", id.index(), block, e);
                    bad += 1;
                }
            }
        }

        if bad == 0 {
            println!("✓ Frame {}: {} block(s) decoded", id.index(), decoded);
        }
        failures += bad as usize;
    }

    println!();
    println!("═════════════════════════════════");
    if failures == 0 {
        println!("✓ All checks passed!");
        ExitCode::SUCCESS
    } else {
        println!("✗ {} problem(s) found", failures);
        ExitCode::FAILURE
    }
}

// =============================================================================
// Extract Command
// =============================================================================

fn run_extract(config: ExtractConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let store = match open_read(&config.path) {
        Ok(store) => store,
        Err(code) => return code,
    };
    let service = TileService::with_cache_capacity(store, config.cache_bytes);

    match extract(&service, &config) {
        Ok(len) => {
            info!(
                output = %config.output.display(),
                bytes = len,
                "Extracted rectangle"
            );
            println!(
                "Wrote {}x{} pixels ({} bytes) from frame {} to {}",
                config.width,
                config.height,
                len,
                config.frame,
                config.output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn extract(service: &TileService, config: &ExtractConfig) -> Result<usize, String> {
    let frame = service
        .store()
        .frame_id(config.frame)
        .map_err(|e| e.to_string())?;
    let descriptor = service.store().descriptor(frame).map_err(|e| e.to_string())?;

    let rect = Rect::new(config.x, config.y, config.width, config.height);
    let len = rect.width as usize * rect.height as usize * descriptor.bytes_per_pixel() as usize;
    let mut out = vec![0u8; len];

    service
        .load_rect(frame, rect.size(), rect, &mut out, 0)
        .map_err(|e| e.to_string())?;
    debug!(
        cached_tiles = service.cache().len(),
        "Rectangle loaded"
    );

    std::fs::write(&config.output, &out)
        .map_err(|e| format!("cannot write {}: {}", config.output.display(), e))?;
    Ok(len)
}
