// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/himg-core

//! RIFF-style chunked container framing.
//!
//! A stream is `"RIFF"`, a little-endian 32-bit payload size (everything
//! after the size field), the form type `"HIMG"`, and then a sequence of
//! chunks: 4-byte FourCC, little-endian 32-bit size, payload. Readers
//! search forward by FourCC and skip chunks they do not recognize.

use crate::error::{HimgError, Result};

pub const FOURCC_FRMT: [u8; 4] = *b"FRMT";
pub const FOURCC_LMAP: [u8; 4] = *b"LMAP";
pub const FOURCC_LRES: [u8; 4] = *b"LRES";
pub const FOURCC_QCFG: [u8; 4] = *b"QCFG";
pub const FOURCC_FMAP: [u8; 4] = *b"FMAP";
pub const FOURCC_FRES: [u8; 4] = *b"FRES";

const FOURCC_RIFF: [u8; 4] = *b"RIFF";
const FOURCC_HIMG: [u8; 4] = *b"HIMG";

/// Start a RIFF stream with a placeholder total size.
pub fn write_riff_header(out: &mut Vec<u8>) {
    out.extend_from_slice(&FOURCC_RIFF);
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&FOURCC_HIMG);
}

/// Patch the RIFF size field once the stream is complete.
pub fn patch_riff_size(out: &mut [u8]) {
    let file_size = (out.len() - 8) as u32;
    out[4..8].copy_from_slice(&file_size.to_le_bytes());
}

/// Append a chunk header (FourCC + size).
pub fn write_chunk_header(out: &mut Vec<u8>, fourcc: &[u8; 4], size: usize) {
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&(size as u32).to_le_bytes());
}

/// Append a whole chunk.
pub fn write_chunk(out: &mut Vec<u8>, fourcc: &[u8; 4], payload: &[u8]) {
    write_chunk_header(out, fourcc, payload.len());
    out.extend_from_slice(payload);
}

/// Forward-scanning chunk reader over a validated RIFF HIMG stream.
#[derive(Debug, PartialEq)]
pub struct ChunkReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ChunkReader<'a> {
    /// Validate the RIFF header and position the cursor at the first
    /// chunk.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(HimgError::MalformedContainer("stream shorter than RIFF header"));
        }
        if data[0..4] != FOURCC_RIFF {
            return Err(HimgError::MalformedContainer("missing RIFF magic"));
        }
        let file_size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
        if file_size.checked_add(8) != Some(data.len()) {
            return Err(HimgError::MalformedContainer("payload size mismatch"));
        }
        if data[8..12] != FOURCC_HIMG {
            return Err(HimgError::MalformedContainer("not a HIMG stream"));
        }

        Ok(Self { data, pos: 12 })
    }

    /// Advance to the payload of the next chunk with the given FourCC,
    /// skipping unrecognized chunks on the way.
    pub fn find(&mut self, fourcc: &[u8; 4]) -> Result<&'a [u8]> {
        loop {
            if self.pos + 8 > self.data.len() {
                return Err(HimgError::MalformedContainer("required chunk missing"));
            }
            let chunk_fourcc = &self.data[self.pos..self.pos + 4];
            let chunk_size = u32::from_le_bytes([
                self.data[self.pos + 4],
                self.data[self.pos + 5],
                self.data[self.pos + 6],
                self.data[self.pos + 7],
            ]) as usize;
            self.pos += 8;

            if self.pos.checked_add(chunk_size).map_or(true, |end| end > self.data.len()) {
                return Err(HimgError::MalformedContainer("truncated chunk payload"));
            }

            let payload = &self.data[self.pos..self.pos + chunk_size];
            self.pos += chunk_size;

            if chunk_fourcc == fourcc {
                return Ok(payload);
            }
            // Unrecognized chunk: skip to the next one.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stream() -> Vec<u8> {
        let mut out = Vec::new();
        write_riff_header(&mut out);
        write_chunk(&mut out, &FOURCC_FRMT, &[1, 2, 3]);
        write_chunk(&mut out, b"JUNK", &[0xFF; 5]);
        write_chunk(&mut out, &FOURCC_LMAP, &[9, 9]);
        patch_riff_size(&mut out);
        out
    }

    #[test]
    fn finds_chunks_in_order() {
        let stream = sample_stream();
        let mut reader = ChunkReader::new(&stream).unwrap();
        assert_eq!(reader.find(&FOURCC_FRMT).unwrap(), &[1, 2, 3]);
        assert_eq!(reader.find(&FOURCC_LMAP).unwrap(), &[9, 9]);
    }

    #[test]
    fn skips_unknown_chunks() {
        let stream = sample_stream();
        let mut reader = ChunkReader::new(&stream).unwrap();
        // Jump straight past FRMT and JUNK.
        assert_eq!(reader.find(&FOURCC_LMAP).unwrap(), &[9, 9]);
    }

    #[test]
    fn missing_chunk_is_malformed() {
        let stream = sample_stream();
        let mut reader = ChunkReader::new(&stream).unwrap();
        assert_eq!(
            reader.find(&FOURCC_FRES),
            Err(HimgError::MalformedContainer("required chunk missing"))
        );
    }

    #[test]
    fn search_cannot_rewind() {
        let stream = sample_stream();
        let mut reader = ChunkReader::new(&stream).unwrap();
        reader.find(&FOURCC_LMAP).unwrap();
        assert!(reader.find(&FOURCC_FRMT).is_err());
    }

    #[test]
    fn bad_magic_rejected() {
        let mut stream = sample_stream();
        stream[0] = b'X';
        assert_eq!(
            ChunkReader::new(&stream),
            Err(HimgError::MalformedContainer("missing RIFF magic"))
        );

        let mut stream = sample_stream();
        stream[8] = b'X';
        assert_eq!(
            ChunkReader::new(&stream),
            Err(HimgError::MalformedContainer("not a HIMG stream"))
        );
    }

    #[test]
    fn size_mismatch_rejected() {
        let mut stream = sample_stream();
        stream.push(0);
        assert!(ChunkReader::new(&stream).is_err());

        let mut stream = sample_stream();
        stream.truncate(stream.len() - 1);
        assert!(ChunkReader::new(&stream).is_err());
    }

    #[test]
    fn truncated_chunk_payload_rejected() {
        // Inflate the declared size of the last chunk past the buffer.
        let mut stream = sample_stream();
        let len = stream.len();
        stream[len - 2 - 4] = 200;
        patch_riff_size(&mut stream);
        // The total size matches again, but the chunk payload overruns.
        let mut reader = ChunkReader::new(&stream[..len]).unwrap();
        assert_eq!(
            reader.find(&FOURCC_LMAP),
            Err(HimgError::MalformedContainer("truncated chunk payload"))
        );
    }

    #[test]
    fn empty_stream_rejected() {
        assert!(ChunkReader::new(&[]).is_err());
        assert!(ChunkReader::new(b"RIFF").is_err());
    }
}
