// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/himg-core

//! Separable fast 8×8 Walsh-Hadamard transform.
//!
//! The forward pass applies the 8-point butterfly to rows then columns
//! with no scaling, so a round trip gains a factor of 64. The inverse
//! applies the same butterflies with a `>> 3` after each pass (3 + 3 bits
//! = the full divide by 64) and computes in 32-bit precision: inverse
//! inputs can span the whole 16-bit range, and an 8-way sum of those does
//! not fit in 16 bits.
//!
//! The butterfly emits coefficients in sequency order (output 0 is the
//! all-plus basis vector, output 7 alternates every sample). The inverse
//! relies on that exact output permutation; both passes must stay in sync.

/// Forward 8-point butterfly over `buf[offset + k * stride]`, k = 0..8.
#[inline]
fn forward8(buf: &mut [i16; 64], offset: usize, stride: usize) {
    let x = |k: usize| buf[offset + k * stride];
    let a0 = x(0).wrapping_add(x(4));
    let a1 = x(1).wrapping_add(x(5));
    let a2 = x(2).wrapping_add(x(6));
    let a3 = x(3).wrapping_add(x(7));
    let a4 = x(0).wrapping_sub(x(4));
    let a5 = x(1).wrapping_sub(x(5));
    let a6 = x(2).wrapping_sub(x(6));
    let a7 = x(3).wrapping_sub(x(7));
    let b0 = a0.wrapping_add(a2);
    let b1 = a1.wrapping_add(a3);
    let b2 = a0.wrapping_sub(a2);
    let b3 = a1.wrapping_sub(a3);
    let b4 = a4.wrapping_add(a6);
    let b5 = a5.wrapping_add(a7);
    let b6 = a4.wrapping_sub(a6);
    let b7 = a5.wrapping_sub(a7);
    buf[offset] = b0.wrapping_add(b1);
    buf[offset + stride] = b4.wrapping_add(b5);
    buf[offset + 2 * stride] = b6.wrapping_add(b7);
    buf[offset + 3 * stride] = b2.wrapping_add(b3);
    buf[offset + 4 * stride] = b2.wrapping_sub(b3);
    buf[offset + 5 * stride] = b6.wrapping_sub(b7);
    buf[offset + 6 * stride] = b4.wrapping_sub(b5);
    buf[offset + 7 * stride] = b0.wrapping_sub(b1);
}

/// Inverse 8-point butterfly with a `>> 3` on output, in 32-bit precision.
#[inline]
fn inverse8(buf: &mut [i16; 64], offset: usize, stride: usize) {
    let x = |k: usize| buf[offset + k * stride] as i32;
    let a0 = x(0) + x(4);
    let a1 = x(1) + x(5);
    let a2 = x(2) + x(6);
    let a3 = x(3) + x(7);
    let a4 = x(0) - x(4);
    let a5 = x(1) - x(5);
    let a6 = x(2) - x(6);
    let a7 = x(3) - x(7);
    let b0 = a0 + a2;
    let b1 = a1 + a3;
    let b2 = a0 - a2;
    let b3 = a1 - a3;
    let b4 = a4 + a6;
    let b5 = a5 + a7;
    let b6 = a4 - a6;
    let b7 = a5 - a7;
    buf[offset] = ((b0 + b1) >> 3) as i16;
    buf[offset + stride] = ((b4 + b5) >> 3) as i16;
    buf[offset + 2 * stride] = ((b6 + b7) >> 3) as i16;
    buf[offset + 3 * stride] = ((b2 + b3) >> 3) as i16;
    buf[offset + 4 * stride] = ((b2 - b3) >> 3) as i16;
    buf[offset + 5 * stride] = ((b6 - b7) >> 3) as i16;
    buf[offset + 6 * stride] = ((b4 - b5) >> 3) as i16;
    buf[offset + 7 * stride] = ((b0 - b1) >> 3) as i16;
}

/// Forward Hadamard transform of an 8×8 block, in place (no scaling).
pub fn forward(block: &mut [i16; 64]) {
    for i in 0..8 {
        forward8(block, i * 8, 1);
    }
    for i in 0..8 {
        forward8(block, i, 8);
    }
}

/// Inverse Hadamard transform of an 8×8 block, in place (divides by 64).
pub fn inverse(block: &mut [i16; 64]) {
    for i in 0..8 {
        inverse8(block, i * 8, 1);
    }
    for i in 0..8 {
        inverse8(block, i, 8);
    }
}
