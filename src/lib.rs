// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/himg-core

//! # himg-core
//!
//! Pure-Rust codec for HIMG, a lossy still-image format built on the
//! Walsh-Hadamard transform. An image is split into a bilinearly
//! upsampled low-resolution base (predictive-coded) and per-block
//! transformed residuals (quantized through a non-linear 8-bit mapping),
//! both entropy-coded with a run-length-extended Huffman coder and
//! framed in a RIFF-style chunked container.
//!
//! The crate works on raw in-memory pixel buffers; reading and writing
//! host image formats is up to the caller. Decoding the full-resolution
//! stage is parallel by block row.
//!
//! # Quick start
//!
//! ```rust
//! use himg_core::{encode, decode};
//!
//! let pixels = vec![128u8; 32 * 32 * 3];
//! let packed = encode(&pixels, 32, 32, 3, 3, 75, true).unwrap();
//! let image = decode(&packed).unwrap();
//! assert_eq!(image.pixels.len(), 32 * 32 * 3);
//! ```

pub mod bitio;
pub mod common;
pub mod container;
pub mod decoder;
pub mod downsampled;
pub mod encoder;
pub mod error;
pub mod hadamard;
pub mod huffman;
pub mod interleave;
pub mod mapper;
pub mod quantize;
pub mod ycbcr;

pub use decoder::DecodedImage;
pub use error::{HimgError, Result};

/// Compress a raw pixel buffer into a HIMG byte stream.
///
/// `pixels` is row-major with `pixel_stride` bytes between horizontally
/// adjacent pixels (`pixel_stride >= num_channels`, allowing reads from a
/// padded buffer) and contiguous rows. `quality` ranges 0..=100;
/// `use_ycbcr` enables the color transform and is silently ignored for
/// images with fewer than three channels.
pub fn encode(
    pixels: &[u8],
    width: usize,
    height: usize,
    pixel_stride: usize,
    num_channels: usize,
    quality: u8,
    use_ycbcr: bool,
) -> Result<Vec<u8>> {
    encoder::encode(
        pixels,
        width,
        height,
        pixel_stride,
        num_channels,
        quality,
        use_ycbcr,
    )
}

/// Decompress a HIMG byte stream, picking the degree of parallelism
/// automatically.
pub fn decode(packed: &[u8]) -> Result<DecodedImage> {
    decoder::decode(packed, 0)
}

/// Decompress a HIMG byte stream with at most `max_threads` worker
/// threads in the full-resolution stage. Zero means automatic.
pub fn decode_with_threads(packed: &[u8], max_threads: usize) -> Result<DecodedImage> {
    decoder::decode(packed, max_threads)
}
