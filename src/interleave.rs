// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/himg-core

//! Coefficient interleaving order for the full-resolution stream.
//!
//! The fast Hadamard butterflies emit coefficients in sequency order along
//! each axis, so a zig-zag walk over the 8×8 block visits coefficients in
//! roughly increasing 2-D sequency. The encoder uses this order to spread
//! each block's coefficients across a block-row buffer: coefficient stream
//! `i` of block `u` lands at `base + u + i * columns`, which places the
//! near-always-zero high-sequency coefficients of a whole row back to back
//! and feeds the zero-run tokens of the entropy coder.

/// Maps stream position (0–63) to the block coefficient index (0–63)
/// that is transmitted at that position.
pub const INDEX_LUT: [usize; 64] = [
     0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

/// Maps a block coefficient index (0–63) to its stream position (0–63).
///
/// Inverse of [`INDEX_LUT`]. The decoder scales this by the number of
/// block columns to gather one block out of an interleaved row buffer.
pub const INVERSE_INDEX_LUT: [usize; 64] = {
    let mut table = [0usize; 64];
    let mut i = 0;
    while i < 64 {
        table[INDEX_LUT[i]] = i;
        i += 1;
    }
    table
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for i in 0..64 {
            assert_eq!(INVERSE_INDEX_LUT[INDEX_LUT[i]], i);
            assert_eq!(INDEX_LUT[INVERSE_INDEX_LUT[i]], i);
        }
    }

    #[test]
    fn known_positions() {
        // The lowest-sequency coefficient is transmitted first.
        assert_eq!(INDEX_LUT[0], 0);
        // Position 1 → row 0, column 1; position 2 → row 1, column 0.
        assert_eq!(INDEX_LUT[1], 1);
        assert_eq!(INDEX_LUT[2], 8);
        // The highest-sequency coefficient is transmitted last.
        assert_eq!(INDEX_LUT[63], 63);
    }

    #[test]
    fn is_a_permutation() {
        let mut seen = [false; 64];
        for &idx in &INDEX_LUT {
            assert!(!seen[idx], "duplicate coefficient index {idx}");
            seen[idx] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}
