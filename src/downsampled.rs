// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/himg-core

//! Per-channel low-resolution plane.
//!
//! Every 8×8 block contributes one sample: the rounded average of a
//! window around the block, phase-shifted 1/16 of a block up and to the
//! left so that bilinear upsampling reconstructs a block whose top-left
//! corner lines up with the source block. The full-res stage codes only
//! the difference against the upsampled plane.
//!
//! On the wire the plane is predictive-coded: 16×16 clusters of samples
//! (macro-blocks) share one of five predictors, chosen per cluster by
//! least squared prediction error, and each sample stores its mapped
//! prediction delta. The mapping is lossy, so the encoder reconstructs
//! every sample exactly as the decoder will and predicts from the
//! reconstruction; after coding, the plane holds the decoder's view of
//! the data.

use crate::common::clamp_to_8bit;
use crate::error::{HimgError, Result};
use crate::mapper::Mapper;

/// Samples per macro-block edge in the low-res grid.
const MACRO_BLOCK_SIZE: usize = 16;

/// Predict one sample from its already-decoded neighbours.
///
/// `s1` is up-left, `s2` up, `s3` left. On the plane edges the predictor
/// choice is moot: the top row predicts from the left, the left column
/// from above, and the origin from mid-gray.
fn predicted(buf: &[u8], columns: usize, v: usize, u: usize, predictor: u8) -> u8 {
    if v == 0 && u == 0 {
        return 128;
    }
    if v == 0 {
        return buf[u - 1];
    }
    if u == 0 {
        return buf[(v - 1) * columns];
    }

    let s1 = buf[(v - 1) * columns + u - 1] as i32;
    let s2 = buf[(v - 1) * columns + u] as i32;
    let s3 = buf[v * columns + u - 1] as i32;
    match predictor {
        0 => clamp_to_8bit(((3 * (s2 + s3) - 2 * s1 + 2) >> 2) as i16),
        1 => s2 as u8,
        2 => s3 as u8,
        3 => ((s2 + s3 + 1) >> 1) as u8,
        _ => clamp_to_8bit((s2 + s3 - s1) as i16),
    }
}

/// Downsampled image plane for one channel.
pub struct Downsampled {
    rows: usize,
    columns: usize,
    data: Vec<u8>,
}

impl Downsampled {
    /// Build the plane from one channel of an interleaved pixel buffer.
    /// Rows are contiguous: row pitch is `width * pixel_stride`.
    pub fn sample_image(
        pixels: &[u8],
        channel: usize,
        pixel_stride: usize,
        width: usize,
        height: usize,
    ) -> Self {
        // Divide by 8x8, rounding up.
        let rows = (height + 7) >> 3;
        let columns = (width + 7) >> 3;

        // Calculate the average color for each 8x8 block. The window is
        // offset so its center matches the phase-shifted sampling grid.
        let mut average = Vec::with_capacity(rows * columns);
        for v in 0..rows {
            let y_min = (v * 8).saturating_sub(3);
            let y_max = (v * 8 + 4).min(height - 1);
            for u in 0..columns {
                let x_min = (u * 8).saturating_sub(3);
                let x_max = (u * 8 + 4).min(width - 1);
                let mut sum = 0u32;
                for y in y_min..=y_max {
                    for x in x_min..=x_max {
                        sum += pixels[(y * width + x) * pixel_stride + channel] as u32;
                    }
                }
                let total_count = ((x_max - x_min + 1) * (y_max - y_min + 1)) as u32;
                average.push(((sum + (total_count >> 1)) / total_count) as u8);
            }
        }

        // Compensate blocks for linear interpolation (phase shift 1/16
        // pixels up & to the left), replicating the edge row/column.
        let mut data = Vec::with_capacity(rows * columns);
        for v in 0..rows {
            let row1 = v.saturating_sub(1);
            let row2 = v;
            for u in 0..columns {
                let col1 = u.saturating_sub(1);
                let col2 = u;
                let x11 = average[row1 * columns + col1] as u16;
                let x12 = average[row1 * columns + col2] as u16;
                let x21 = average[row2 * columns + col1] as u16;
                let x22 = average[row2 * columns + col2] as u16;
                let a1 = (x11 + 15 * x12 + 8) >> 4;
                let a2 = (x21 + 15 * x22 + 8) >> 4;
                data.push(((a1 + 15 * a2 + 8) >> 4) as u8);
            }
        }

        Self {
            rows,
            columns,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Bilinearly upsample the plane into the 8×8 block at (u, v).
    pub fn lowres_block(&self, out: &mut [i16; 64], u: usize, v: usize) {
        // Pick out the four values in the corners of the block.
        let row1 = v;
        let row2 = (v + 1).min(self.rows - 1);
        let col1 = u;
        let col2 = (u + 1).min(self.columns - 1);
        let x11 = self.data[row1 * self.columns + col1] as i16;
        let x12 = self.data[row1 * self.columns + col2] as i16;
        let x21 = self.data[row2 * self.columns + col1] as i16;
        let x22 = self.data[row2 * self.columns + col2] as i16;

        // Repeated midpoint interpolation gives the left and right
        // columns of the block...
        let mut left = [0i16; 9];
        let mut right = [0i16; 9];
        left[0] = x11;
        left[8] = x21;
        right[0] = x12;
        right[8] = x22;
        for edge in [&mut left, &mut right] {
            edge[4] = (edge[0] + edge[8] + 1) >> 1;
            edge[2] = (edge[0] + edge[4] + 1) >> 1;
            edge[6] = (edge[4] + edge[8] + 1) >> 1;
            edge[1] = (edge[0] + edge[2] + 1) >> 1;
            edge[3] = (edge[2] + edge[4] + 1) >> 1;
            edge[5] = (edge[4] + edge[6] + 1) >> 1;
            edge[7] = (edge[6] + edge[8] + 1) >> 1;
        }

        // ...and then each of the eight rows.
        for y in 0..8 {
            let a0 = left[y];
            let a8 = right[y];
            let a4 = (a0 + a8 + 1) >> 1;
            let a2 = (a0 + a4 + 1) >> 1;
            let a6 = (a4 + a8 + 1) >> 1;
            let row = &mut out[y * 8..y * 8 + 8];
            row[0] = a0;
            row[1] = (a0 + a2 + 1) >> 1;
            row[2] = a2;
            row[3] = (a2 + a4 + 1) >> 1;
            row[4] = a4;
            row[5] = (a4 + a6 + 1) >> 1;
            row[6] = a6;
            row[7] = (a6 + a8 + 1) >> 1;
        }
    }

    /// Serialized size of one channel's plane: one selector byte per
    /// macro-block plus one delta byte per sample.
    pub fn block_data_size_per_channel(rows: usize, columns: usize) -> usize {
        let macro_rows = (rows + MACRO_BLOCK_SIZE - 1) / MACRO_BLOCK_SIZE;
        let macro_cols = (columns + MACRO_BLOCK_SIZE - 1) / MACRO_BLOCK_SIZE;
        macro_rows * macro_cols + rows * columns
    }

    /// Least-squared-error predictor for one macro-block, evaluated
    /// against the source samples. The lowest index wins ties.
    fn select_predictor(&self, mv: usize, mu: usize) -> u8 {
        let v_end = ((mv + 1) * MACRO_BLOCK_SIZE).min(self.rows);
        let u_end = ((mu + 1) * MACRO_BLOCK_SIZE).min(self.columns);

        let mut best = 0u8;
        let mut best_err = u64::MAX;
        for predictor in 0..5u8 {
            let mut err = 0u64;
            for v in mv * MACRO_BLOCK_SIZE..v_end {
                for u in mu * MACRO_BLOCK_SIZE..u_end {
                    let p = predicted(&self.data, self.columns, v, u, predictor) as i64;
                    let d = self.data[v * self.columns + u] as i64 - p;
                    err += (d * d) as u64;
                }
            }
            if err < best_err {
                best_err = err;
                best = predictor;
            }
        }
        best
    }

    /// Append the predictive-coded plane to `out`: macro-block selector
    /// bytes (predictor index + 2), then the mapped per-sample deltas.
    ///
    /// Afterwards the plane holds the reconstruction the decoder will
    /// see, which is what the full-res residuals must be taken against.
    pub fn encode_block_data(&mut self, out: &mut Vec<u8>, mapper: &Mapper) {
        let macro_rows = (self.rows + MACRO_BLOCK_SIZE - 1) / MACRO_BLOCK_SIZE;
        let macro_cols = (self.columns + MACRO_BLOCK_SIZE - 1) / MACRO_BLOCK_SIZE;

        let mut selectors = Vec::with_capacity(macro_rows * macro_cols);
        for mv in 0..macro_rows {
            for mu in 0..macro_cols {
                selectors.push(self.select_predictor(mv, mu));
            }
        }
        for &predictor in &selectors {
            out.push(predictor + 2);
        }

        let mut recon = vec![0u8; self.data.len()];
        for v in 0..self.rows {
            for u in 0..self.columns {
                let predictor =
                    selectors[(v / MACRO_BLOCK_SIZE) * macro_cols + u / MACRO_BLOCK_SIZE];
                let p = predicted(&recon, self.columns, v, u, predictor) as i16;
                let actual = self.data[v * self.columns + u] as i16;
                let code = mapper.map_to_8bit(actual - p);
                out.push(code);
                recon[v * self.columns + u] = clamp_to_8bit(p + mapper.unmap_from_8bit(code));
            }
        }

        self.data = recon;
    }

    /// Reconstruct a plane from its predictive-coded form.
    pub fn from_block_data(
        input: &[u8],
        rows: usize,
        columns: usize,
        mapper: &Mapper,
    ) -> Result<Self> {
        let macro_rows = (rows + MACRO_BLOCK_SIZE - 1) / MACRO_BLOCK_SIZE;
        let macro_cols = (columns + MACRO_BLOCK_SIZE - 1) / MACRO_BLOCK_SIZE;
        if input.len() != macro_rows * macro_cols + rows * columns {
            return Err(HimgError::InvalidConfig("low-res plane size mismatch"));
        }

        let (selector_bytes, deltas) = input.split_at(macro_rows * macro_cols);
        let mut selectors = Vec::with_capacity(selector_bytes.len());
        for &byte in selector_bytes {
            if !(2..=6).contains(&byte) {
                return Err(HimgError::InvalidConfig("predictor selector out of range"));
            }
            selectors.push(byte - 2);
        }

        let mut data = vec![0u8; rows * columns];
        let mut idx = 0;
        for v in 0..rows {
            for u in 0..columns {
                let predictor =
                    selectors[(v / MACRO_BLOCK_SIZE) * macro_cols + u / MACRO_BLOCK_SIZE];
                let p = predicted(&data, columns, v, u, predictor) as i16;
                data[v * columns + u] = clamp_to_8bit(p + mapper.unmap_from_8bit(deltas[idx]));
                idx += 1;
            }
        }

        Ok(Self {
            rows,
            columns,
            data,
        })
    }

    #[cfg(test)]
    fn samples(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    fn gradient_plane(width: usize, height: usize) -> Vec<u8> {
        (0..width * height)
            .map(|i| (100 + (i % width) / 2 + (i / width) / 2) as u8)
            .collect()
    }

    #[test]
    fn constant_image_samples_constant() {
        let pixels = vec![93u8; 24 * 17];
        let d = Downsampled::sample_image(&pixels, 0, 1, 24, 17);
        assert_eq!(d.columns(), 3);
        assert_eq!(d.rows(), 3);
        assert!(d.samples().iter().all(|&s| s == 93));

        let mut block = [0i16; 64];
        d.lowres_block(&mut block, 1, 1);
        assert!(block.iter().all(|&s| s == 93));
    }

    #[test]
    fn averaging_window_is_offset() {
        // 16x8 image, black left half, white right half. The first
        // sample's window [0,4]x[0,7] is all black; the second sample's
        // window [5,12]x[0,7] straddles the edge at x=8.
        let mut pixels = vec![0u8; 16 * 8];
        for y in 0..8 {
            for x in 8..16 {
                pixels[y * 16 + x] = 255;
            }
        }
        let d = Downsampled::sample_image(&pixels, 0, 1, 16, 8);
        assert_eq!(d.rows(), 1);
        assert_eq!(d.columns(), 2);
        assert_eq!(d.samples()[0], 0);
        // 3 of 8 window columns are black: average = 255 * 5 / 8 = 159,
        // then the phase shift mixes 1/16 of the left sample in twice.
        assert!(d.samples()[1] > 120 && d.samples()[1] < 160);
    }

    #[test]
    fn upsampled_block_interpolates_between_corners() {
        let d = Downsampled {
            rows: 2,
            columns: 2,
            data: vec![0, 80, 160, 240],
        };
        let mut block = [0i16; 64];
        d.lowres_block(&mut block, 0, 0);

        // Corners anchor the interpolation.
        assert_eq!(block[0], 0);
        assert!(block[7] > 60 && block[7] <= 80);
        assert!(block[56] > 130 && block[56] <= 160);
        // Monotone along the top row and left column.
        for x in 1..8 {
            assert!(block[x] >= block[x - 1]);
            assert!(block[x * 8] >= block[(x - 1) * 8]);
        }
    }

    #[test]
    fn edge_blocks_clamp_corner_lookup() {
        let d = Downsampled {
            rows: 1,
            columns: 1,
            data: vec![200],
        };
        let mut block = [0i16; 64];
        d.lowres_block(&mut block, 0, 0);
        assert!(block.iter().all(|&s| s == 200));
    }

    #[test]
    fn block_data_size() {
        assert_eq!(Downsampled::block_data_size_per_channel(1, 1), 2);
        assert_eq!(Downsampled::block_data_size_per_channel(16, 16), 257);
        assert_eq!(Downsampled::block_data_size_per_channel(17, 16), 2 + 17 * 16);
        assert_eq!(
            Downsampled::block_data_size_per_channel(33, 40),
            3 * 3 + 33 * 40
        );
    }

    #[test]
    fn coded_plane_round_trips_to_the_reconstruction() {
        // The decoder must land on exactly the plane the encoder kept.
        let mut rng = ChaCha20Rng::seed_from_u64(21);
        let mapper = Mapper::new_low_res(80);
        for (w, h) in [(8usize, 8usize), (40, 24), (300, 200), (257, 129)] {
            let pixels: Vec<u8> = (0..w * h).map(|_| rng.gen()).collect();
            let mut d = Downsampled::sample_image(&pixels, 0, 1, w, h);

            let mut wire = Vec::new();
            d.encode_block_data(&mut wire, &mapper);
            assert_eq!(
                wire.len(),
                Downsampled::block_data_size_per_channel(d.rows(), d.columns())
            );

            let restored =
                Downsampled::from_block_data(&wire, d.rows(), d.columns(), &mapper).unwrap();
            assert_eq!(restored.samples(), d.samples(), "{w}x{h}");
        }
    }

    #[test]
    fn smooth_plane_codes_losslessly_at_quality_100() {
        // Neighbouring low-res samples of a gentle gradient differ by
        // small deltas that the identity region of the q100 table
        // represents exactly.
        let pixels = gradient_plane(64, 64);
        let mapper = Mapper::new_low_res(100);
        let mut d = Downsampled::sample_image(&pixels, 0, 1, 64, 64);
        let original = d.samples().to_vec();

        let mut wire = Vec::new();
        d.encode_block_data(&mut wire, &mapper);
        assert_eq!(d.samples(), &original[..]);
    }

    #[test]
    fn selector_out_of_range_rejected() {
        let mapper = Mapper::new_low_res(50);
        for bad in [0u8, 1, 7, 255] {
            let mut wire = vec![bad];
            wire.extend_from_slice(&[0u8; 4]);
            let err = Downsampled::from_block_data(&wire, 2, 2, &mapper);
            assert!(matches!(err, Err(HimgError::InvalidConfig(_))), "{bad}");
        }
    }

    #[test]
    fn size_mismatch_rejected() {
        let mapper = Mapper::new_low_res(50);
        assert!(Downsampled::from_block_data(&[2u8; 4], 2, 2, &mapper).is_err());
        assert!(Downsampled::from_block_data(&[2u8; 6], 2, 2, &mapper).is_err());
    }
}
