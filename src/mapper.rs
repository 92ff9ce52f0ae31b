// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/himg-core

//! Non-linear 16-bit magnitude ↔ 8-bit code mapping.
//!
//! A [`Mapper`] holds 127 monotone magnitudes indexed 1..=127 (index 0 is
//! zero). Codes are signed-magnitude bytes: reinterpreting the byte as a
//! signed 8-bit integer gives ±index into the table. Code `0x80` is never
//! produced but must decode to a finite value.
//!
//! Two table families exist. The low-res table covers prediction residuals
//! of the downsampled plane and is the only one that scales with the
//! quality setting. The full-res table covers shifted Hadamard
//! coefficients and is fixed. Both are persisted in-stream, so a decoder
//! never depends on the compiled-in constants.

use crate::error::{HimgError, Result};

/// Hand-tuned mapping table for low-res prediction residuals.
const LOW_RES_MAPPING_TABLE: [i16; 128] = [
    0, 1, 2, 3, 4, 5, 6, 7,
    8, 9, 10, 11, 12, 13, 14, 15,
    16, 17, 18, 19, 20, 21, 22, 23,
    24, 25, 26, 27, 28, 29, 30, 31,
    32, 33, 34, 35, 36, 37, 38, 39,
    40, 41, 42, 43, 44, 45, 46, 47,
    48, 49, 50, 51, 52, 53, 54, 55,
    56, 57, 58, 59, 60, 61, 62, 63,
    64, 65, 67, 68, 70, 71, 73, 74,
    76, 78, 79, 81, 83, 85, 87, 89,
    91, 93, 95, 97, 99, 102, 104, 106,
    109, 111, 114, 117, 119, 122, 125, 128,
    131, 134, 137, 140, 143, 146, 150, 153,
    156, 160, 164, 167, 171, 175, 178, 182,
    186, 190, 195, 199, 203, 207, 212, 216,
    221, 226, 230, 235, 240, 245, 250, 255,
];

/// Quality → low-res index scale, in 1/16ths.
const LOW_RES_MAP_SCALE_TABLE: [(i32, i32); 8] = [
    (0, 120),
    (5, 90),
    (10, 70),
    (20, 40),
    (30, 32),
    (40, 26),
    (50, 20),
    (100, 16),
];

/// Mapping table for full-res coefficients, based on histogram studies.
/// It is designed to give five bits of precision (i.e. full precision) in
/// the range 0-50, where almost all coefficients can be represented, and
/// above that it gives about four bits of precision (this makes slightly
/// better use of the eight bits compared to a corresponding floating
/// point representation, for instance).
const FULL_RES_MAPPING_TABLE: [i16; 128] = [
    0, 1, 2, 3, 4, 5, 6, 7,
    8, 9, 10, 11, 12, 13, 14, 15,
    16, 17, 18, 19, 20, 21, 22, 23,
    24, 25, 26, 27, 28, 29, 30, 31,
    32, 33, 34, 35, 36, 37, 38, 39,
    40, 41, 42, 43, 44, 45, 46, 47,
    48, 49, 51, 52, 54, 57, 59, 62,
    65, 68, 72, 76, 81, 86, 92, 98,
    105, 113, 121, 130, 140, 151, 163, 176,
    190, 205, 221, 239, 259, 280, 303, 327,
    354, 382, 413, 446, 482, 520, 561, 605,
    653, 703, 757, 815, 876, 942, 1013, 1087,
    1167, 1252, 1342, 1438, 1540, 1649, 1764, 1885,
    2015, 2151, 2296, 2450, 2612, 2783, 2965, 3156,
    3358, 3571, 3796, 4032, 4282, 4545, 4821, 5112,
    5418, 5740, 6078, 6433, 6806, 7198, 7608, 8039,
];

/// Interpolate a scaling factor for `quality` (0..=100) from a
/// piecewise-linear `(quality, scale)` table.
pub(crate) fn quality_to_scale(quality: i32, table: &[(i32, i32)]) -> i32 {
    let mut idx = 0;
    while idx < table.len() - 1 {
        if table[idx + 1].0 > quality {
            break;
        }
        idx += 1;
    }
    if idx >= table.len() - 1 {
        return table[table.len() - 1].1;
    }

    let (q1, s1) = table[idx];
    let (q2, s2) = table[idx + 1];
    let denom = q2 - q1;
    s1 + ((s2 - s1) * (quality - q1) + (denom >> 1)) / denom
}

/// Magnitude ↔ signed-magnitude-code mapping table.
///
/// Internally the table spans the whole signed byte range: slot
/// `code.wrapping_add(128)` holds the signed magnitude for `code`
/// reinterpreted as `i8`, which makes [`Mapper::unmap_from_8bit`] a single
/// indexed load.
#[derive(Clone)]
pub struct Mapper {
    table: [i16; 256],
}

impl Mapper {
    /// Build the low-res mapper for a quality setting.
    ///
    /// The ramp factor is in 1/16ths: at quality 100 the base table is
    /// used as-is, and lower qualities step through it faster, saturating
    /// at the last (255) slot instead of running off the end.
    pub fn new_low_res(quality: u8) -> Self {
        let index_scale = quality_to_scale(quality as i32, &LOW_RES_MAP_SCALE_TABLE);

        let mut positive = [0i16; 128];
        for (i, slot) in positive.iter_mut().enumerate() {
            let index = ((i as i32 * index_scale + 8) >> 4).min(127) as usize;
            *slot = LOW_RES_MAPPING_TABLE[index];
        }
        Self::from_positive_half(&positive)
    }

    /// Build the full-res mapper. The table is fixed across qualities.
    pub fn new_full_res() -> Self {
        Self::from_positive_half(&FULL_RES_MAPPING_TABLE)
    }

    /// Restore a mapper from its serialized mapping function.
    pub fn from_mapping_function(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(HimgError::InvalidConfig("empty mapping function"));
        }

        let single_byte_items = data[0] as usize;
        if single_byte_items > 127 {
            return Err(HimgError::InvalidConfig("mapping function count out of range"));
        }
        let actual_size = 1 + single_byte_items + 2 * (127 - single_byte_items);
        if actual_size != data.len() {
            return Err(HimgError::InvalidConfig("mapping function size mismatch"));
        }

        let mut positive = [0i16; 128];
        let mut pos = 1;
        for slot in positive.iter_mut().skip(1).take(single_byte_items) {
            *slot = data[pos] as i16;
            pos += 1;
        }
        for slot in positive.iter_mut().skip(1 + single_byte_items) {
            *slot = u16::from_le_bytes([data[pos], data[pos + 1]]) as i16;
            pos += 2;
        }

        Ok(Self::from_positive_half(&positive))
    }

    /// Size of the serialized mapping function in bytes.
    ///
    /// One byte for the count of single-byte items, then the single- and
    /// double-byte items themselves.
    pub fn mapping_function_size(&self) -> usize {
        let single_byte_items = self.single_byte_items();
        1 + single_byte_items + 2 * (127 - single_byte_items)
    }

    /// Append the serialized mapping function to `out`.
    pub fn write_mapping_function(&self, out: &mut Vec<u8>) {
        let single_byte_items = self.single_byte_items();
        out.push(single_byte_items as u8);
        for i in 1..=single_byte_items {
            out.push(self.magnitude(i) as u8);
        }
        for i in single_byte_items + 1..=127 {
            out.extend_from_slice(&(self.magnitude(i) as u16).to_le_bytes());
        }
    }

    /// Map a 16-bit value to its signed-magnitude 8-bit code.
    pub fn map_to_8bit(&self, x: i16) -> u8 {
        if x == 0 {
            return 0;
        }

        let abs_x = (x as i32).abs();

        // Find the best matching table index.
        let mut mapped = 1usize;
        while mapped < 127 {
            let upper = self.magnitude(mapped + 1) as i32;
            if abs_x < upper {
                if abs_x - (self.magnitude(mapped) as i32) < upper - abs_x {
                    mapped -= 1;
                }
                break;
            }
            mapped += 1;
        }

        // Encode the table index as a packed 8-bit code.
        if mapped < 127 {
            mapped += 1;
        }
        if x >= 0 {
            mapped as u8
        } else {
            (mapped as u8).wrapping_neg()
        }
    }

    /// Unmap an 8-bit code to its 16-bit value.
    #[inline]
    pub fn unmap_from_8bit(&self, x: u8) -> i16 {
        self.table[x.wrapping_add(128) as usize]
    }

    /// Positive-half magnitude for index 0..=127.
    #[inline]
    fn magnitude(&self, index: usize) -> i16 {
        self.table[128 + index]
    }

    /// Number of leading table entries that fit in a single byte.
    fn single_byte_items(&self) -> usize {
        let mut first_two_byte_idx = 1;
        while first_two_byte_idx < 128 {
            if (self.magnitude(first_two_byte_idx) as u16) >= 256 {
                break;
            }
            first_two_byte_idx += 1;
        }
        first_two_byte_idx - 1
    }

    fn from_positive_half(positive: &[i16; 128]) -> Self {
        let mut table = [0i16; 256];
        table[128] = 0;
        for k in 1..=127 {
            table[128 + k] = positive[k];
            table[128 - k] = -positive[k];
        }
        // The -128 slot can never be described by the mapping function
        // data in the file; mirror -127 so byte 0x80 decodes finitely.
        table[0] = table[1];
        Self { table }
    }
}
