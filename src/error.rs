// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/himg-core

//! Error types for HIMG encoding and decoding.

use std::fmt;

/// Errors that can occur while encoding or decoding a HIMG stream.
///
/// Every failure is permanent for the given input: the codec is
/// deterministic and never retries. On decode, no partial output is
/// returned alongside an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HimgError {
    /// The container is structurally broken: bad magic, truncated or
    /// missing chunk, payload size mismatch, unsupported version.
    MalformedContainer(&'static str),
    /// A configuration chunk (mapping function or quantization config)
    /// is inconsistent with its encoded length, or carries an
    /// out-of-range value such as an unknown predictor selector.
    InvalidConfig(&'static str),
    /// The Huffman layer failed: read past the end of the bit stream,
    /// write past the end of the output, an undefined RLE branch, or a
    /// block frame overrunning its parent chunk.
    Huffman(&'static str),
    /// Bad caller arguments to `encode` or `decode`.
    InvalidParam(&'static str),
}

impl fmt::Display for HimgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedContainer(msg) => write!(f, "malformed container: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Huffman(msg) => write!(f, "Huffman error: {msg}"),
            Self::InvalidParam(msg) => write!(f, "invalid parameter: {msg}"),
        }
    }
}

impl std::error::Error for HimgError {}

pub type Result<T> = std::result::Result<T, HimgError>;
