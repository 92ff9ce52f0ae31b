// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/himg-core

//! Decoder orchestration.
//!
//! The serial preamble validates the container, restores the mapping and
//! quantization tables, and materializes the low-res planes. The full-res
//! stage then decodes one Huffman frame per block row; rows have no data
//! dependency on each other (the low-res planes are read-only by then and
//! every row writes a disjoint slice of the output), so they fan out
//! across a bounded thread pool. The first row that fails wins; remaining
//! rows are abandoned and the whole decode reports that error.

use rayon::prelude::*;

use crate::common::clamp_to_8bit;
use crate::container::{self, ChunkReader};
use crate::downsampled::Downsampled;
use crate::error::{HimgError, Result};
use crate::hadamard;
use crate::huffman::HuffmanDec;
use crate::interleave::INDEX_LUT;
use crate::mapper::Mapper;
use crate::quantize::Quantize;
use crate::ycbcr;

/// A decoded image in packed row-major form (row pitch is
/// `width * num_channels`).
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub num_channels: usize,
}

struct Format {
    width: usize,
    height: usize,
    num_channels: usize,
    use_ycbcr: bool,
}

fn parse_format_chunk(chunk: &[u8]) -> Result<Format> {
    if chunk.len() < 11 {
        return Err(HimgError::MalformedContainer("format chunk too short"));
    }
    if chunk[0] != 1 {
        return Err(HimgError::MalformedContainer("unsupported version"));
    }
    let width = u32::from_le_bytes([chunk[1], chunk[2], chunk[3], chunk[4]]) as usize;
    let height = u32::from_le_bytes([chunk[5], chunk[6], chunk[7], chunk[8]]) as usize;
    let num_channels = chunk[9] as usize;
    let use_ycbcr = chunk[10] != 0;

    if width == 0 || height == 0 {
        return Err(HimgError::MalformedContainer("zero image dimension"));
    }
    if num_channels == 0 {
        return Err(HimgError::MalformedContainer("zero channel count"));
    }

    Ok(Format {
        width,
        height,
        num_channels,
        use_ycbcr,
    })
}

/// Scatter one decoded channel block into the interleaved output band,
/// clamping to 8 bits and honouring partial edge blocks.
fn restore_channel_block(
    band: &mut [u8],
    block: &[i16; 64],
    channel: usize,
    num_channels: usize,
    width: usize,
    x0: usize,
    block_width: usize,
    block_height: usize,
) {
    for by in 0..block_height {
        for bx in 0..block_width {
            band[(by * width + x0 + bx) * num_channels + channel] =
                clamp_to_8bit(block[by * 8 + bx]);
        }
    }
}

/// Everything a block-row worker needs, shared immutably across threads.
struct RowDecoder<'a> {
    format: &'a Format,
    columns: usize,
    huffman: &'a HuffmanDec<'a>,
    quantize: &'a Quantize,
    full_res_mapper: &'a Mapper,
    downsampled: &'a [Downsampled],
    has_chroma: bool,
}

impl RowDecoder<'_> {
    /// Decode block row `v` into its 8-pixel-high output band.
    fn decode_block_row(&self, v: usize, band: &mut [u8]) -> Result<()> {
        let width = self.format.width;
        let num_channels = self.format.num_channels;
        let block_height = 8.min(self.format.height - v * 8);

        // Huffman-decompress this row's frame.
        let mut full_res_data = vec![0u8; self.columns * num_channels * 64];
        self.huffman.uncompress_block(&mut full_res_data, v)?;

        // Inverse index LUT for reading back the interleaved elements.
        let mut deinterleave = [0usize; 64];
        for i in 0..64 {
            deinterleave[INDEX_LUT[i]] = i * self.columns;
        }

        let mut unpacked_idx = 0;
        for chan in 0..num_channels {
            let plane = &self.downsampled[chan];
            let is_chroma_channel = self.format.use_ycbcr && (chan == 1 || chan == 2);

            for x in (0..width).step_by(8) {
                let u = x >> 3;
                let block_width = 8.min(width - x);

                // Gather the quantized block out of the row buffer.
                let mut quantized = [0u8; 64];
                let src = &full_res_data[unpacked_idx + u..];
                for i in 0..64 {
                    quantized[i] = src[deinterleave[i]];
                }

                let mut block = [0i16; 64];
                self.quantize
                    .unpack(&mut block, &quantized, is_chroma_channel, self.full_res_mapper);

                hadamard::inverse(&mut block);

                // Add the low-res component back.
                let mut lowres = [0i16; 64];
                plane.lowres_block(&mut lowres, u, v);
                for i in 0..64 {
                    block[i] = block[i].wrapping_add(lowres[i]);
                }

                restore_channel_block(
                    band,
                    &block,
                    chan,
                    num_channels,
                    width,
                    x,
                    block_width,
                    block_height,
                );
            }

            unpacked_idx += self.columns * 64;
        }

        if self.has_chroma {
            ycbcr::ycbcr_to_rgb(band, width, block_height, num_channels);
        }

        Ok(())
    }
}

/// Decompress a HIMG byte stream.
///
/// `max_threads` bounds the full-res stage's parallelism; zero picks the
/// hardware parallelism. The decoded buffer is byte-identical regardless
/// of the thread count.
pub fn decode(packed: &[u8], max_threads: usize) -> Result<DecodedImage> {
    let mut reader = ChunkReader::new(packed)?;

    let format = parse_format_chunk(reader.find(&container::FOURCC_FRMT)?)?;
    let has_chroma = format.use_ycbcr && format.num_channels >= 3;

    let rows = (format.height + 7) >> 3;
    let columns = (format.width + 7) >> 3;
    let output_size = format
        .width
        .checked_mul(format.height)
        .and_then(|n| n.checked_mul(format.num_channels))
        .ok_or(HimgError::MalformedContainer("image dimensions overflow"))?;

    // Low resolution mapping table.
    let low_res_mapper = Mapper::from_mapping_function(reader.find(&container::FOURCC_LMAP)?)?;

    // Low resolution planes, all channels in one monolithic stream.
    let channel_size = Downsampled::block_data_size_per_channel(rows, columns);
    let lres_chunk = reader.find(&container::FOURCC_LRES)?;
    let mut low_res_data = vec![0u8; channel_size * format.num_channels];
    HuffmanDec::new(lres_chunk, 0, low_res_data.len())?.uncompress(&mut low_res_data)?;

    let downsampled = low_res_data
        .chunks(channel_size)
        .map(|chunk| Downsampled::from_block_data(chunk, rows, columns, &low_res_mapper))
        .collect::<Result<Vec<_>>>()?;

    // Quantization configuration and full-res mapping table.
    let quantize = Quantize::from_configuration(reader.find(&container::FOURCC_QCFG)?, has_chroma)?;
    let full_res_mapper = Mapper::from_mapping_function(reader.find(&container::FOURCC_FMAP)?)?;

    // Full resolution data: one Huffman frame per block row.
    let fres_chunk = reader.find(&container::FOURCC_FRES)?;
    let block_size = columns * 64 * format.num_channels;
    let huffman = HuffmanDec::new(fres_chunk, block_size, block_size.saturating_mul(rows))?;

    let mut pixels = vec![0u8; output_size];
    let row_decoder = RowDecoder {
        format: &format,
        columns,
        huffman: &huffman,
        quantize: &quantize,
        full_res_mapper: &full_res_mapper,
        downsampled: &downsampled,
        has_chroma,
    };

    let band_size = format.width * format.num_channels * 8;
    let requested = if max_threads == 0 {
        std::thread::available_parallelism().map_or(1, |n| n.get())
    } else {
        max_threads
    };
    let threads = requested.min(rows);

    if threads <= 1 {
        for (v, band) in pixels.chunks_mut(band_size).enumerate() {
            row_decoder.decode_block_row(v, band)?;
        }
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|_| HimgError::InvalidParam("failed to build thread pool"))?;
        pool.install(|| {
            pixels
                .par_chunks_mut(band_size)
                .enumerate()
                .try_for_each(|(v, band)| row_decoder.decode_block_row(v, band))
        })?;
    }

    Ok(DecodedImage {
        pixels,
        width: format.width,
        height: format.height,
        num_channels: format.num_channels,
    })
}
