//! Codec integration tests.
//!
//! Tests verify:
//! - LZW decode inverts encode across code-width thresholds
//! - The predictor inverts itself for every element width and channel count
//! - Partial encodes can be resumed by the caller
//! - The predictor improves LZW on smooth data

use tilestore::codec::lzw::{decode, encode, output_budget};
use tilestore::codec::{horizontal_accumulate, horizontal_differencing, SampleLayout};
use tilestore::CodecError;

use super::test_utils::{gradient_pixels, random_pixels};

fn round_trip(input: &[u8]) {
    let encoded = encode(input, output_budget(input.len()));
    assert!(encoded.complete, "encode of {} bytes incomplete", input.len());
    assert_eq!(encoded.consumed, input.len());
    let decoded = decode(&encoded.output, input.len()).unwrap();
    assert_eq!(decoded, input, "round trip of {} bytes", input.len());
}

// =============================================================================
// LZW
// =============================================================================

#[test]
fn test_lzw_inverse_at_width_thresholds() {
    for &len in &[256usize, 511, 512, 513, 4095, 4096] {
        let structured: Vec<u8> = (0..len).map(|i| ((i * 3) % 17) as u8).collect();
        round_trip(&structured);
        round_trip(&random_pixels(len, len as u64));
    }
}

#[test]
fn test_lzw_inverse_on_images() {
    round_trip(&gradient_pixels(512, 256, 3));
    round_trip(&random_pixels(256 * 256, 42));
    round_trip(&[]);
}

#[test]
fn test_lzw_partial_encode_resumes() {
    let input = random_pixels(20_000, 7);
    let mut pieces = Vec::new();
    let mut rest: &[u8] = &input;

    // Each call is an independent stream covering a prefix of the rest
    while !rest.is_empty() {
        let outcome = encode(rest, 4096);
        assert!(outcome.consumed > 0);
        assert!(outcome.output.len() <= 4096);
        let decoded = decode(&outcome.output, outcome.consumed).unwrap();
        assert_eq!(decoded, rest[..outcome.consumed]);
        pieces.push(decoded);
        rest = &rest[outcome.consumed..];
    }

    assert!(pieces.len() > 1);
    assert_eq!(pieces.concat(), input);
}

#[test]
fn test_lzw_rejects_garbage() {
    let result = decode(&[0x12, 0x34, 0x56, 0x78, 0x9A], 1024);
    assert!(matches!(result, Err(CodecError::CorruptTable(_))));
}

// =============================================================================
// Predictor
// =============================================================================

#[test]
fn test_predictor_inverse_law() {
    let width = 37;
    let rows = 5;
    for bytes_per_sample in [1usize, 2, 4] {
        for samples in [1usize, 3, 4] {
            for big_endian in [false, true] {
                let layout = SampleLayout::new(width, rows, bytes_per_sample, samples)
                    .with_big_endian(big_endian);
                let original = random_pixels(layout.row_bytes * rows, bytes_per_sample as u64);
                let mut data = original.clone();

                horizontal_differencing(&mut data, &layout).unwrap();
                horizontal_accumulate(&mut data, &layout).unwrap();
                assert_eq!(
                    data, original,
                    "bps={} spp={} big_endian={}",
                    bytes_per_sample, samples, big_endian
                );
            }
        }
    }
}

#[test]
fn test_predictor_rejects_three_byte_samples() {
    let layout = SampleLayout::new(4, 1, 3, 1);
    let mut data = vec![0u8; 12];
    assert!(matches!(
        horizontal_differencing(&mut data, &layout),
        Err(CodecError::UnsupportedElementWidth(3))
    ));
}

#[test]
fn test_predictor_helps_smooth_data() {
    let (width, rows) = (256usize, 64usize);
    // 16-bit ramps that differ by a constant along each row
    let mut pixels = Vec::with_capacity(width * rows * 2);
    for y in 0..rows {
        for x in 0..width {
            pixels.extend_from_slice(&((x * 97 + y * 5) as u16).to_le_bytes());
        }
    }

    let plain = encode(&pixels, output_budget(pixels.len()));
    let layout = SampleLayout::new(width, rows, 2, 1);
    let mut predicted = pixels.clone();
    horizontal_differencing(&mut predicted, &layout).unwrap();
    let with_predictor = encode(&predicted, output_budget(predicted.len()));

    assert!(with_predictor.complete);
    assert!(with_predictor.output.len() < plain.output.len());

    let mut decoded = decode(&with_predictor.output, pixels.len()).unwrap();
    horizontal_accumulate(&mut decoded, &layout).unwrap();
    assert_eq!(decoded, pixels);
}
