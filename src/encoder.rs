// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/himg-core

//! Encoder orchestration.
//!
//! Chunk order on the wire: `FRMT`, `LMAP`, `LRES`, `QCFG`, `FMAP`,
//! `FRES`. The low-res planes are coded first because their lossy
//! reconstruction is what the full-res residuals are taken against.

use crate::container;
use crate::downsampled::Downsampled;
use crate::error::{HimgError, Result};
use crate::hadamard;
use crate::huffman;
use crate::interleave::INDEX_LUT;
use crate::mapper::Mapper;
use crate::quantize::Quantize;
use crate::ycbcr;

/// Copy one channel of an 8×8 pixel region into a coefficient block,
/// replicating the last in-range sample over any right/bottom padding.
fn extract_channel_block(
    out: &mut [i16; 64],
    data: &[u8],
    channel: usize,
    pixel_stride: usize,
    width: usize,
    x0: usize,
    y0: usize,
    block_width: usize,
    block_height: usize,
) {
    let mut last = 0i16;
    for by in 0..block_height {
        for bx in 0..block_width {
            last = data[((y0 + by) * width + x0 + bx) * pixel_stride + channel] as i16;
            out[by * 8 + bx] = last;
        }
        for bx in block_width..8 {
            out[by * 8 + bx] = last;
        }
    }
    for by in block_height..8 {
        for bx in 0..8 {
            out[by * 8 + bx] = last;
        }
    }
}

fn write_format_chunk(
    out: &mut Vec<u8>,
    width: usize,
    height: usize,
    num_channels: usize,
    use_ycbcr: bool,
) {
    container::write_chunk_header(out, &container::FOURCC_FRMT, 11);
    out.push(1); // Version.
    out.extend_from_slice(&(width as u32).to_le_bytes());
    out.extend_from_slice(&(height as u32).to_le_bytes());
    out.push(num_channels as u8);
    out.push(u8::from(use_ycbcr)); // Color space (RGB / YCbCr).
}

/// Compress an image into a HIMG byte stream.
///
/// `pixel_stride` is the byte distance between horizontally adjacent
/// pixels (at least `num_channels`); rows are contiguous, so the row
/// pitch is `width * pixel_stride`. `use_ycbcr` is silently ignored for
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
    if width == 0 || height == 0 {
        return Err(HimgError::InvalidParam("image dimensions must be positive"));
    }
    if width > u32::MAX as usize || height > u32::MAX as usize {
        return Err(HimgError::InvalidParam("image dimensions exceed 32 bits"));
    }
    if num_channels == 0 || num_channels > 4 {
        return Err(HimgError::InvalidParam("channel count out of range"));
    }
    if pixel_stride < num_channels {
        return Err(HimgError::InvalidParam("pixel stride smaller than pixel"));
    }
    if quality > 100 {
        return Err(HimgError::InvalidParam("quality out of range"));
    }
    let buffer_size = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(pixel_stride))
        .ok_or(HimgError::InvalidParam("image dimensions overflow"))?;
    if pixels.len() < buffer_size {
        return Err(HimgError::InvalidParam("pixel buffer too small"));
    }

    let use_ycbcr = use_ycbcr && num_channels >= 3;

    let mut packed = Vec::new();
    container::write_riff_header(&mut packed);
    write_format_chunk(&mut packed, width, height, num_channels, use_ycbcr);

    // Low-res mapping table.
    let low_res_mapper = Mapper::new_low_res(quality);
    let mut lmap = Vec::new();
    low_res_mapper.write_mapping_function(&mut lmap);
    container::write_chunk(&mut packed, &container::FOURCC_LMAP, &lmap);

    // Optionally convert to YCbCr.
    let mut ycbcr_data = Vec::new();
    let color_space_data: &[u8] = if use_ycbcr {
        ycbcr_data.resize(buffer_size, 0);
        ycbcr::rgb_to_ycbcr(&mut ycbcr_data, pixels, width, height, pixel_stride, num_channels);
        &ycbcr_data
    } else {
        pixels
    };

    // Construct the low-res (divided by 8x8) planes for all channels and
    // delta-encode them back to back into one buffer. Coding replaces
    // each plane with its reconstruction.
    let mut downsampled: Vec<Downsampled> = (0..num_channels)
        .map(|chan| Downsampled::sample_image(color_space_data, chan, pixel_stride, width, height))
        .collect();

    let mut low_res_data = Vec::new();
    for plane in &mut downsampled {
        plane.encode_block_data(&mut low_res_data, &low_res_mapper);
    }
    let lres = huffman::compress(&low_res_data, 0)?;
    container::write_chunk(&mut packed, &container::FOURCC_LRES, &lres);

    // Quantization configuration.
    let quantize = Quantize::new_for_quality(quality, use_ycbcr);
    let mut qcfg = Vec::new();
    quantize.write_configuration(&mut qcfg);
    container::write_chunk(&mut packed, &container::FOURCC_QCFG, &qcfg);

    // Full-res mapping table.
    let full_res_mapper = Mapper::new_full_res();
    let mut fmap = Vec::new();
    full_res_mapper.write_mapping_function(&mut fmap);
    container::write_chunk(&mut packed, &container::FOURCC_FMAP, &fmap);

    // Full resolution data: residual → Hadamard → quantize, with the
    // coefficients of each block-row interleaved column-major so zero
    // runs line up for the entropy coder.
    let rows = (height + 7) >> 3;
    let columns = (width + 7) >> 3;
    let mut unpacked = vec![0u8; rows * columns * 64 * num_channels];
    let mut unpacked_idx = 0;

    for y in (0..height).step_by(8) {
        let v = y >> 3;
        let block_height = 8.min(height - y);

        // All channels are interleaved per block row.
        for (chan, plane) in downsampled.iter().enumerate() {
            let is_chroma_channel = use_ycbcr && (chan == 1 || chan == 2);

            for x in (0..width).step_by(8) {
                let u = x >> 3;
                let block_width = 8.min(width - x);

                let mut block = [0i16; 64];
                extract_channel_block(
                    &mut block,
                    color_space_data,
                    chan,
                    pixel_stride,
                    width,
                    x,
                    y,
                    block_width,
                    block_height,
                );

                // Remove the low-res component.
                let mut lowres = [0i16; 64];
                plane.lowres_block(&mut lowres, u, v);
                for i in 0..64 {
                    block[i] -= lowres[i];
                }

                hadamard::forward(&mut block);

                let mut quantized = [0u8; 64];
                quantize.pack(&mut quantized, &block, is_chroma_channel, &full_res_mapper);

                for i in 0..64 {
                    unpacked[unpacked_idx + u + i * columns] = quantized[INDEX_LUT[i]];
                }
            }

            unpacked_idx += columns * 64;
        }
    }

    // One Huffman frame per block row, so the decoder can fan rows out
    // across threads.
    let fres = huffman::compress(&unpacked, columns * 64 * num_channels)?;
    container::write_chunk(&mut packed, &container::FOURCC_FRES, &fres);

    container::patch_riff_size(&mut packed);
    Ok(packed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_parameters() {
        let pixels = [0u8; 64 * 3];
        assert!(matches!(
            encode(&pixels, 0, 8, 3, 3, 50, false),
            Err(HimgError::InvalidParam(_))
        ));
        assert!(matches!(
            encode(&pixels, 8, 0, 3, 3, 50, false),
            Err(HimgError::InvalidParam(_))
        ));
        assert!(matches!(
            encode(&pixels, 8, 8, 3, 0, 50, false),
            Err(HimgError::InvalidParam(_))
        ));
        assert!(matches!(
            encode(&pixels, 8, 8, 3, 5, 50, false),
            Err(HimgError::InvalidParam(_))
        ));
        assert!(matches!(
            encode(&pixels, 8, 8, 2, 3, 50, false),
            Err(HimgError::InvalidParam(_))
        ));
        assert!(matches!(
            encode(&pixels, 8, 8, 3, 3, 101, false),
            Err(HimgError::InvalidParam(_))
        ));
        assert!(matches!(
            encode(&pixels, 16, 16, 3, 3, 50, false),
            Err(HimgError::InvalidParam(_))
        ));
    }

    #[test]
    fn stream_has_riff_frame() {
        let pixels = [128u8; 64 * 3];
        let packed = encode(&pixels, 8, 8, 3, 3, 50, true).unwrap();
        assert_eq!(&packed[0..4], b"RIFF");
        assert_eq!(&packed[8..12], b"HIMG");
        let size = u32::from_le_bytes([packed[4], packed[5], packed[6], packed[7]]) as usize;
        assert_eq!(size + 8, packed.len());
        assert_eq!(&packed[12..16], b"FRMT");
        // Version 1, 8x8, 3 channels, YCbCr.
        assert_eq!(&packed[20..31], &[1, 8, 0, 0, 0, 8, 0, 0, 0, 3, 1]);
    }

    #[test]
    fn ycbcr_degrades_for_few_channels() {
        let pixels = [77u8; 64];
        let packed = encode(&pixels, 8, 8, 1, 1, 50, true).unwrap();
        // The color space flag in FRMT must be off.
        assert_eq!(packed[30], 0);
    }

    #[test]
    fn block_padding_replicates_last_sample() {
        let data: Vec<u8> = (0..30u8).collect();
        let mut block = [0i16; 64];
        // 5x6 region of a 5-wide single-channel image.
        extract_channel_block(&mut block, &data, 0, 1, 5, 0, 0, 5, 6);
        assert_eq!(block[0], 0);
        assert_eq!(block[4], 4);
        // Right padding repeats the row's last sample.
        assert_eq!(block[5], 4);
        assert_eq!(block[7], 4);
        // Bottom padding repeats the last sample seen.
        assert_eq!(block[6 * 8], 29);
        assert_eq!(block[63], 29);
    }
}
