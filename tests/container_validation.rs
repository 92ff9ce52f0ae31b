// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/himg-core

//! Container robustness: truncation, corruption, and unknown chunks.

use himg_core::{decode, encode, HimgError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

fn sample_stream() -> Vec<u8> {
    let mut rng = ChaCha20Rng::seed_from_u64(50);
    let (w, h) = (24usize, 16usize);
    let pixels: Vec<u8> = (0..w * h * 3).map(|_| rng.gen()).collect();
    encode(&pixels, w, h, 3, 3, 60, true).unwrap()
}

/// Byte ranges of every chunk payload in a RIFF stream.
fn chunk_payloads(stream: &[u8]) -> Vec<([u8; 4], std::ops::Range<usize>)> {
    let mut chunks = Vec::new();
    let mut pos = 12;
    while pos + 8 <= stream.len() {
        let fourcc = [stream[pos], stream[pos + 1], stream[pos + 2], stream[pos + 3]];
        let size = u32::from_le_bytes([
            stream[pos + 4],
            stream[pos + 5],
            stream[pos + 6],
            stream[pos + 7],
        ]) as usize;
        chunks.push((fourcc, pos + 8..pos + 8 + size));
        pos += 8 + size;
    }
    chunks
}

#[test]
fn truncation_anywhere_is_malformed() {
    let stream = sample_stream();
    // Cut the stream inside every chunk's payload; the RIFF size check
    // must catch each one before any payload is interpreted.
    for (fourcc, range) in chunk_payloads(&stream) {
        let cut = range.end - 1;
        let truncated = &stream[..cut];
        match decode(truncated) {
            Err(HimgError::MalformedContainer(_)) => {}
            other => panic!(
                "truncation inside {:?} gave {:?}",
                std::str::from_utf8(&fourcc).unwrap(),
                other.map(|i| i.pixels.len())
            ),
        }
    }

    assert!(matches!(
        decode(&stream[..5]),
        Err(HimgError::MalformedContainer(_))
    ));
}

#[test]
fn missing_required_chunk_is_malformed() {
    let stream = sample_stream();
    let chunks = chunk_payloads(&stream);

    // Drop the QCFG chunk and re-patch the total size.
    let (_, qcfg_range) = chunks
        .iter()
        .find(|(fourcc, _)| fourcc == b"QCFG")
        .unwrap()
        .clone();
    let mut without = Vec::new();
    without.extend_from_slice(&stream[..qcfg_range.start - 8]);
    without.extend_from_slice(&stream[qcfg_range.end..]);
    let total = (without.len() - 8) as u32;
    without[4..8].copy_from_slice(&total.to_le_bytes());

    assert!(matches!(
        decode(&without),
        Err(HimgError::MalformedContainer(_))
    ));
}

#[test]
fn bit_flips_in_fres_never_break_the_length_contract() {
    let stream = sample_stream();
    let chunks = chunk_payloads(&stream);
    let (_, fres_range) = chunks
        .iter()
        .find(|(fourcc, _)| fourcc == b"FRES")
        .unwrap()
        .clone();

    let mut rng = ChaCha20Rng::seed_from_u64(51);
    for _ in 0..100 {
        let mut corrupted = stream.clone();
        let byte = rng.gen_range(fres_range.clone());
        let bit = rng.gen_range(0..8);
        corrupted[byte] ^= 1 << bit;

        // Either a Huffman error, or a full-size buffer of garbage.
        match decode(&corrupted) {
            Ok(image) => assert_eq!(image.pixels.len(), 24 * 16 * 3),
            Err(HimgError::Huffman(_)) => {}
            Err(other) => panic!("unexpected error kind: {other}"),
        }
    }
}

#[test]
fn unknown_chunks_are_skipped() {
    let stream = sample_stream();
    let chunks = chunk_payloads(&stream);
    let (_, qcfg_range) = chunks
        .iter()
        .find(|(fourcc, _)| fourcc == b"QCFG")
        .unwrap()
        .clone();

    // Splice an unrelated chunk in front of QCFG.
    let mut spliced = Vec::new();
    spliced.extend_from_slice(&stream[..qcfg_range.start - 8]);
    spliced.extend_from_slice(b"XTRA");
    spliced.extend_from_slice(&7u32.to_le_bytes());
    spliced.extend_from_slice(&[0xEE; 7]);
    spliced.extend_from_slice(&stream[qcfg_range.start - 8..]);
    let total = (spliced.len() - 8) as u32;
    spliced[4..8].copy_from_slice(&total.to_le_bytes());

    let reference = decode(&stream).unwrap();
    let with_extra = decode(&spliced).unwrap();
    assert_eq!(reference.pixels, with_extra.pixels);
}

#[test]
fn oversized_dimensions_are_rejected() {
    // A tiny hand-built stream claiming a huge image must fail cleanly
    // on the dimension product, not attempt the allocation.
    let mut stream = Vec::new();
    stream.extend_from_slice(b"RIFF");
    stream.extend_from_slice(&[0u8; 4]);
    stream.extend_from_slice(b"HIMG");
    stream.extend_from_slice(b"FRMT");
    stream.extend_from_slice(&11u32.to_le_bytes());
    stream.push(1);
    stream.extend_from_slice(&u32::MAX.to_le_bytes());
    stream.extend_from_slice(&u32::MAX.to_le_bytes());
    stream.push(255);
    stream.push(0);
    let total = (stream.len() - 8) as u32;
    stream[4..8].copy_from_slice(&total.to_le_bytes());

    assert!(matches!(
        decode(&stream),
        Err(HimgError::MalformedContainer(_))
    ));
}

#[test]
fn corrupted_config_chunks_are_invalid_config() {
    let stream = sample_stream();
    let chunks = chunk_payloads(&stream);

    // Shrink LMAP's declared size by one while keeping the container
    // consistent: the mapping function length check must fire.
    let (_, lmap_range) = chunks
        .iter()
        .find(|(fourcc, _)| fourcc == b"LMAP")
        .unwrap()
        .clone();
    let mut shrunk = Vec::new();
    shrunk.extend_from_slice(&stream[..lmap_range.start - 4]);
    let new_size = (lmap_range.len() - 1) as u32;
    shrunk.extend_from_slice(&new_size.to_le_bytes());
    shrunk.extend_from_slice(&stream[lmap_range.start..lmap_range.end - 1]);
    shrunk.extend_from_slice(&stream[lmap_range.end..]);
    let total = (shrunk.len() - 8) as u32;
    shrunk[4..8].copy_from_slice(&total.to_le_bytes());

    assert!(matches!(
        decode(&shrunk),
        Err(HimgError::InvalidConfig(_))
    ));
}
