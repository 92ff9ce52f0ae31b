// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/himg-core

//! Quality-parameterized scalar quantization.
//!
//! Each of the 64 coefficient positions gets a power-of-two shift derived
//! once per image from the JPEG-standard bases scaled by a quality curve.
//! Packing shifts the magnitude (with rounding) and routes the result
//! through a [`Mapper`]; unpacking is the mapper lookup followed by the
//! shift. The shift tables travel in-stream, nibble-packed.

use crate::error::{HimgError, Result};
use crate::mapper::{quality_to_scale, Mapper};

/// Note: Shamelessly borrowed from libjpeg 6a (needs tuning).
const SHIFT_TABLE_BASE: [u8; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61,
    12, 12, 14, 19, 26, 58, 60, 55,
    14, 13, 16, 24, 40, 57, 69, 56,
    14, 17, 22, 29, 51, 87, 80, 62,
    18, 22, 37, 56, 68, 109, 103, 77,
    24, 35, 55, 64, 81, 104, 113, 92,
    49, 64, 78, 87, 103, 121, 120, 101,
    72, 92, 95, 98, 112, 100, 103, 99,
];

/// Note: Inspired by libjpeg 6a.
const CHROMA_SHIFT_TABLE_BASE: [u8; 64] = [
    17, 18, 24, 47, 100, 110, 115, 120,
    18, 21, 26, 66, 100, 110, 118, 121,
    24, 26, 56, 100, 100, 110, 120, 122,
    47, 66, 100, 100, 100, 110, 120, 123,
    100, 100, 100, 100, 100, 110, 120, 124,
    110, 110, 110, 110, 110, 110, 110, 123,
    120, 120, 120, 120, 120, 110, 100, 122,
    124, 124, 126, 126, 125, 123, 122, 105,
];

/// This table has been tuned so that there is a relatively continuous
/// increase in the resulting compressed image size based on the quality
/// setting. For most images, the following quality regions apply:
///   0 - 20: Ugly and mostly pretty useless.
///  20 - 40: Useful for quick looks / previews.
///  40 - 60: Decent quality.
///  60 - 90: Nice quality.
///  90 - 100: Crazy size growth (generally not worth it).
const QUALITY_TO_SCALE_TABLE: [(i32, i32); 9] = [
    (0, 65535),
    (10, 32512),
    (20, 13568),
    (30, 5120),
    (40, 2560),
    (50, 1024),
    (60, 768),
    (80, 256),
    (100, 0),
];

/// Integer k such that 2^k is closest to `x`, midpoints rounding up.
///
/// The discarded low bit of the final halving is the rounding adjustment.
fn nearest_log2(mut x: u32) -> u8 {
    let mut y = 0u8;
    let mut rounding = 0u8;
    while x > 1 {
        y += 1;
        rounding = (x & 1) as u8;
        x >>= 1;
    }
    y + rounding
}

fn make_shift_table(base: &[u8; 64], quality: u8) -> [u8; 64] {
    let table_scale = quality_to_scale(quality as i32, &QUALITY_TO_SCALE_TABLE);
    let mut table = [0u8; 64];
    for (i, slot) in table.iter_mut().enumerate() {
        let coeff_scale = ((base[i] as i32 * table_scale + 512) >> 10) as u32;
        *slot = nearest_log2(coeff_scale).min(15);
    }
    table
}

/// Per-coefficient shift tables for the full-res coefficient stream.
#[derive(Clone)]
pub struct Quantize {
    has_chroma: bool,
    shift_table: [u8; 64],
    chroma_shift_table: [u8; 64],
}

impl Quantize {
    /// Derive the shift tables for a quality level (0-100).
    pub fn new_for_quality(quality: u8, has_chroma: bool) -> Self {
        Self {
            has_chroma,
            shift_table: make_shift_table(&SHIFT_TABLE_BASE, quality),
            chroma_shift_table: if has_chroma {
                make_shift_table(&CHROMA_SHIFT_TABLE_BASE, quality)
            } else {
                [0u8; 64]
            },
        }
    }

    /// Pack transformed coefficients to signed-magnitude codes.
    pub fn pack(&self, out: &mut [u8; 64], input: &[i16; 64], chroma_channel: bool, mapper: &Mapper) {
        let shift_table = if chroma_channel {
            &self.chroma_shift_table
        } else {
            &self.shift_table
        };

        for i in 0..64 {
            let shift = shift_table[i];
            let round = if shift != 0 { 1i32 << (shift - 1) } else { 0 };

            let x = input[i] as i32;

            // We can not just shift negative numbers, since that will
            // never produce zero (e.g. -5 >> 7 == -1), so we shift the
            // absolute value and keep track of the sign.
            let shifted = if x < 0 {
                -((-x + round) >> shift)
            } else {
                (x + round) >> shift
            };

            out[i] = mapper.map_to_8bit(shifted as i16);
        }
    }

    /// Unpack signed-magnitude codes to 16-bit twos complement.
    pub fn unpack(&self, out: &mut [i16; 64], input: &[u8; 64], chroma_channel: bool, mapper: &Mapper) {
        let shift_table = if chroma_channel {
            &self.chroma_shift_table
        } else {
            &self.shift_table
        };

        for i in 0..64 {
            out[i] = ((mapper.unmap_from_8bit(input[i]) as i32) << shift_table[i]) as i16;
        }
    }

    /// Size of the serialized configuration in bytes.
    ///
    /// Four bits per entry, 64 entries per table.
    pub fn configuration_size(&self) -> usize {
        if self.has_chroma {
            64
        } else {
            32
        }
    }

    /// Append the nibble-packed shift tables to `out`.
    pub fn write_configuration(&self, out: &mut Vec<u8>) {
        for i in 0..32 {
            out.push((self.shift_table[i * 2] << 4) | self.shift_table[i * 2 + 1]);
        }
        if self.has_chroma {
            for i in 0..32 {
                out.push((self.chroma_shift_table[i * 2] << 4) | self.chroma_shift_table[i * 2 + 1]);
            }
        }
    }

    /// Restore the shift tables from their serialized configuration.
    pub fn from_configuration(data: &[u8], has_chroma: bool) -> Result<Self> {
        let expected_size = if has_chroma { 64 } else { 32 };
        if data.len() != expected_size {
            return Err(HimgError::InvalidConfig("quantize configuration size mismatch"));
        }

        let mut shift_table = [0u8; 64];
        for i in 0..32 {
            shift_table[i * 2] = data[i] >> 4;
            shift_table[i * 2 + 1] = data[i] & 15;
        }

        let mut chroma_shift_table = [0u8; 64];
        if has_chroma {
            for i in 0..32 {
                chroma_shift_table[i * 2] = data[32 + i] >> 4;
                chroma_shift_table[i * 2 + 1] = data[32 + i] & 15;
            }
        }

        Ok(Self {
            has_chroma,
            shift_table,
            chroma_shift_table,
        })
    }
}
