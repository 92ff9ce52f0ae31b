// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/himg-core

//! Run-length-extended Huffman entropy codec.
//!
//! The alphabet has 261 symbols: the 256 byte values plus five tokens for
//! runs of zero bytes. Each token covers a length range and is followed by
//! a fixed number of extra bits giving the exact length (LSB-first):
//!
//! | symbol | runs     | extra bits |
//! |--------|----------|------------|
//! | 256    | 2        | 0          |
//! | 257    | 3-6      | 2          |
//! | 258    | 7-22     | 4          |
//! | 259    | 23-278   | 8          |
//! | 260    | 279-16662| 14         |
//!
//! The Huffman tree is serialized pre-order (1-bit leaf flag, leaves
//! followed by the 9-bit symbol) and codes are assembled LSB-first: the
//! first branch bit taken from the root is bit 0 of the code. A stream is
//! either monolithic (tree, then symbols back to back) or block-framed
//! (tree, byte alignment, then length-prefixed frames sharing the tree;
//! each frame decodes independently, so frames can be decoded in
//! parallel). Decoding runs through a 256-entry lookup table covering all
//! codes of up to eight bits; longer codes resume with a bit-by-bit walk
//! from the node the table points at.

use crate::bitio::{BitReader, BitWriter};
use crate::error::{HimgError, Result};

/// A symbol is a 9-bit unsigned number.
const SYMBOL_SIZE: u8 = 9;
const NUM_SYMBOLS: usize = 261;

// Special symbols for RLE.
const SYM_TWO_ZEROS: usize = 256; //        2            (0 bits)
const SYM_UP_TO_6_ZEROS: usize = 257; //    3 - 6        (2 bits)
const SYM_UP_TO_22_ZEROS: usize = 258; //   7 - 22       (4 bits)
const SYM_UP_TO_278_ZEROS: usize = 259; //  23 - 278     (8 bits)
const SYM_UP_TO_16662_ZEROS: usize = 260; // 279 - 16662 (14 bits)

const MAX_ZERO_RUN: usize = 16662;

/// The maximum number of nodes in the Huffman tree (branch + leaf nodes).
const MAX_TREE_NODES: usize = NUM_SYMBOLS * 2 - 1;

// --------------------------------------------------------------------------
// Encoder
// --------------------------------------------------------------------------

#[derive(Clone, Copy, Default)]
struct SymbolInfo {
    count: u32,
    code: u64,
    bits: u8,
}

#[derive(Clone, Copy)]
struct EncodeNode {
    child_a: i32,
    child_b: i32,
    count: u32,
    symbol: i32,
}

/// Length of the zero run starting at `k` (`block[k]` must be zero).
fn count_zeros(block: &[u8], k: usize) -> usize {
    let mut zeros = 1;
    while zeros < MAX_ZERO_RUN && k + zeros < block.len() && block[k + zeros] == 0 {
        zeros += 1;
    }
    zeros
}

/// Token and extra bits for a zero run of the given length.
fn zero_run_symbol(zeros: usize) -> (usize, u32, u8) {
    match zeros {
        1 => (0, 0, 0),
        2 => (SYM_TWO_ZEROS, 0, 0),
        3..=6 => (SYM_UP_TO_6_ZEROS, (zeros - 3) as u32, 2),
        7..=22 => (SYM_UP_TO_22_ZEROS, (zeros - 7) as u32, 4),
        23..=278 => (SYM_UP_TO_278_ZEROS, (zeros - 23) as u32, 8),
        _ => (SYM_UP_TO_16662_ZEROS, (zeros - 279) as u32, 14),
    }
}

/// Histogram over all blocks, with zero runs counted as their tokens.
fn histogram(input: &[u8], block_size: usize) -> [SymbolInfo; NUM_SYMBOLS] {
    let mut symbols = [SymbolInfo::default(); NUM_SYMBOLS];

    for block in input.chunks(block_size) {
        let mut k = 0;
        while k < block.len() {
            if block[k] == 0 {
                let zeros = count_zeros(block, k);
                let (sym, _, _) = zero_run_symbol(zeros);
                symbols[sym].count += 1;
                k += zeros;
            } else {
                symbols[block[k] as usize].count += 1;
                k += 1;
            }
        }
    }

    symbols
}

fn write_code(stream: &mut BitWriter, code: u64, bits: u8) {
    if bits <= 32 {
        stream.write_bits(code as u32, bits);
    } else {
        stream.write_bits(code as u32, 32);
        stream.write_bits((code >> 32) as u32, bits - 32);
    }
}

/// Store the tree rooted at `idx` in the output stream, recording each
/// leaf's LSB-first code in the symbol array.
fn store_tree(
    nodes: &[EncodeNode],
    idx: usize,
    symbols: &mut [SymbolInfo; NUM_SYMBOLS],
    stream: &mut BitWriter,
    code: u64,
    bits: u8,
) {
    let node = nodes[idx];
    if node.symbol >= 0 {
        stream.write_bits(1, 1);
        stream.write_bits(node.symbol as u32, SYMBOL_SIZE);
        let info = &mut symbols[node.symbol as usize];
        info.code = code;
        info.bits = bits;
        return;
    }
    stream.write_bits(0, 1);

    store_tree(nodes, node.child_a as usize, symbols, stream, code, bits + 1);
    store_tree(
        nodes,
        node.child_b as usize,
        symbols,
        stream,
        code | (1u64 << bits),
        bits + 1,
    );
}

/// Build the Huffman tree for the histogram, emit its description, and
/// fill in the per-symbol codes.
fn make_tree(symbols: &mut [SymbolInfo; NUM_SYMBOLS], stream: &mut BitWriter) {
    // Initialize all leaf nodes.
    let mut nodes: Vec<EncodeNode> = Vec::with_capacity(MAX_TREE_NODES);
    for (sym, info) in symbols.iter().enumerate() {
        if info.count > 0 {
            nodes.push(EncodeNode {
                child_a: -1,
                child_b: -1,
                count: info.count,
                symbol: sym as i32,
            });
        }
    }
    let num_symbols = nodes.len();
    if num_symbols == 0 {
        return;
    }

    // Join the two lightest nodes until only the root is left. The scan
    // order of the tie-breaks is part of the wire contract: a later node
    // with an equal count displaces the current lightest.
    let mut nodes_left = num_symbols;
    let mut root = 0usize;
    while nodes_left > 1 {
        let mut node_1 = usize::MAX;
        let mut node_2 = usize::MAX;
        for k in 0..nodes.len() {
            if nodes[k].count > 0 {
                if node_1 == usize::MAX || nodes[k].count <= nodes[node_1].count {
                    node_2 = node_1;
                    node_1 = k;
                } else if node_2 == usize::MAX || nodes[k].count <= nodes[node_2].count {
                    node_2 = k;
                }
            }
        }

        let count = nodes[node_1].count + nodes[node_2].count;
        nodes[node_1].count = 0;
        nodes[node_2].count = 0;
        root = nodes.len();
        nodes.push(EncodeNode {
            child_a: node_1 as i32,
            child_b: node_2 as i32,
            count,
            symbol: -1,
        });
        nodes_left -= 1;
    }

    if num_symbols == 1 {
        // Special case: only one symbol => no binary tree. It still gets
        // a one-bit code so the stream advances.
        store_tree(&nodes, 0, symbols, stream, 0, 1);
    } else {
        store_tree(&nodes, root, symbols, stream, 0, 0);
    }
}

/// Encode one block of bytes against the prepared symbol codes.
fn encode_block(block: &[u8], symbols: &[SymbolInfo; NUM_SYMBOLS], stream: &mut BitWriter) {
    let mut k = 0;
    while k < block.len() {
        if block[k] == 0 {
            let zeros = count_zeros(block, k);
            let (sym, extra, extra_bits) = zero_run_symbol(zeros);
            let info = &symbols[sym];
            write_code(stream, info.code, info.bits);
            if extra_bits > 0 {
                stream.write_bits(extra, extra_bits);
            }
            k += zeros;
        } else {
            let info = &symbols[block[k] as usize];
            write_code(stream, info.code, info.bits);
            k += 1;
        }
    }
}

/// Compress `input`.
///
/// A `block_size` of zero, or one not smaller than the input, produces
/// the monolithic layout. Otherwise `block_size` must divide the input
/// length; every `block_size` bytes become an independently decodable
/// frame prefixed with its compressed size (15-bit, or 15+16-bit when the
/// first word's top bit is set). All frames share one tree.
pub fn compress(input: &[u8], block_size: usize) -> Result<Vec<u8>> {
    if input.is_empty() {
        return Ok(Vec::new());
    }

    let block_size = if block_size == 0 || block_size > input.len() {
        input.len()
    } else {
        block_size
    };
    let use_blocks = block_size < input.len();
    if input.len() % block_size != 0 {
        return Err(HimgError::Huffman("block size does not divide input"));
    }

    let mut symbols = histogram(input, block_size);
    let mut stream = BitWriter::new();
    make_tree(&mut symbols, &mut stream);
    if use_blocks {
        stream.align_to_byte();
    }

    for block in input.chunks(block_size) {
        if use_blocks {
            let mut block_stream = BitWriter::new();
            encode_block(block, &symbols, &mut block_stream);
            let packed = block_stream.finish();

            // Two- or four-byte frame size, depending on magnitude.
            if packed.len() <= 0x7fff {
                stream.write_bits(packed.len() as u32, 16);
            } else {
                stream.write_bits(((packed.len() & 0x7fff) | 0x8000) as u32, 16);
                stream.write_bits((packed.len() >> 15) as u32, 16);
            }
            stream.extend_from_slice(&packed);
        } else {
            encode_block(block, &symbols, &mut stream);
        }
    }

    Ok(stream.finish())
}

// --------------------------------------------------------------------------
// Decoder
// --------------------------------------------------------------------------

#[derive(Clone, Copy)]
struct DecodeNode {
    /// Symbol for leaves, -1 for branch nodes.
    symbol: i32,
    child_a: i32,
    child_b: i32,
}

#[derive(Clone, Copy)]
struct LutEntry {
    /// Branch node to resume from for codes longer than 8 bits, or -1
    /// when `symbol` is fully resolved.
    node: i32,
    bits: u8,
    symbol: u16,
}

/// Recover one tree node from the stream. Leaves with codes of up to
/// eight bits fill their share of the lookup table (all permutations of
/// the unused upper bits); the branch node sitting exactly at depth eight
/// leaves a resume entry instead.
fn recover_tree(
    nodes: &mut Vec<DecodeNode>,
    lut: &mut [LutEntry; 256],
    stream: &mut BitReader,
    code: u32,
    bits: u16,
) -> Option<i32> {
    if nodes.len() >= MAX_TREE_NODES {
        return None;
    }
    let this_node = nodes.len();
    nodes.push(DecodeNode {
        symbol: -1,
        child_a: -1,
        child_b: -1,
    });

    let is_leaf = stream.read_bit_checked() != 0;
    if stream.read_failed() {
        return None;
    }

    if is_leaf {
        let symbol = stream.read_bits_checked(SYMBOL_SIZE) as i32;
        if stream.read_failed() {
            return None;
        }
        nodes[this_node].symbol = symbol;

        if bits <= 8 {
            let dups = 256usize >> bits;
            for i in 0..dups {
                lut[(i << bits) | code as usize] = LutEntry {
                    node: -1,
                    bits: bits as u8,
                    symbol: symbol as u16,
                };
            }
        }
        return Some(this_node as i32);
    }

    if bits == 8 {
        lut[code as usize] = LutEntry {
            node: this_node as i32,
            bits: 8,
            symbol: 0,
        };
    }

    // The code is only meaningful up to the LUT depth; freeze it below
    // that so deep degenerate trees cannot overflow it.
    let code_b = if bits < 8 { code | (1 << bits) } else { code };
    let child_a = recover_tree(nodes, lut, stream, code, bits + 1)?;
    let child_b = recover_tree(nodes, lut, stream, code_b, bits + 1)?;
    nodes[this_node].child_a = child_a;
    nodes[this_node].child_b = child_b;
    Some(this_node as i32)
}

/// Prepared decoder state: the recovered tree, its lookup table, and the
/// frame directory for block-framed streams. Immutable once built, so one
/// instance can serve several decoding threads.
pub struct HuffmanDec<'a> {
    data: &'a [u8],
    nodes: Vec<DecodeNode>,
    lut: [LutEntry; 256],
    root: usize,
    /// Cursor positioned just past the tree description.
    body: BitReader<'a>,
    use_blocks: bool,
    /// Frame directory: byte offset and length within `data`.
    blocks: Vec<(usize, usize)>,
}

impl<'a> HuffmanDec<'a> {
    /// Recover the tree and, for block-framed streams, the frame
    /// directory. `block_size` is the uncompressed size of one frame and
    /// `uncompressed_size` the total; framing is in effect exactly when
    /// more than one frame's worth of data is present, mirroring the
    /// encoder's layout choice.
    pub fn new(data: &'a [u8], block_size: usize, uncompressed_size: usize) -> Result<Self> {
        let use_blocks = block_size > 0 && block_size < uncompressed_size;

        let mut nodes = Vec::new();
        let mut lut = [LutEntry {
            node: -1,
            bits: 0,
            symbol: 0,
        }; 256];
        let mut stream = BitReader::new(data);

        let root = recover_tree(&mut nodes, &mut lut, &mut stream, 0, 0)
            .ok_or(HimgError::Huffman("invalid tree description"))? as usize;

        if nodes[root].symbol >= 0 {
            // A lone leaf still carries a one-bit code on the wire; patch
            // the table so the decoder consumes it.
            let symbol = nodes[root].symbol as u16;
            lut = [LutEntry {
                node: -1,
                bits: 1,
                symbol,
            }; 256];
        }

        if use_blocks {
            stream.align_to_byte();
        }

        // Recover the individual frames.
        let mut blocks = Vec::new();
        if use_blocks {
            let mut scan = stream.clone();
            while !scan.at_the_end() {
                let word = scan.read_u16_aligned_checked();
                if scan.read_failed() {
                    return Err(HimgError::Huffman("truncated block frame header"));
                }
                let packed_size = if word & 0x8000 != 0 {
                    let high = scan.read_u16_aligned_checked();
                    if scan.read_failed() {
                        return Err(HimgError::Huffman("truncated block frame header"));
                    }
                    ((word & 0x7fff) as usize) | ((high as usize) << 15)
                } else {
                    word as usize
                };

                let offset = scan.byte_position();
                if offset + packed_size > data.len() {
                    return Err(HimgError::Huffman("block frame overruns chunk"));
                }
                blocks.push((offset, packed_size));
                scan.advance_bytes(packed_size);
            }
        }

        Ok(Self {
            data,
            nodes,
            lut,
            root,
            body: stream,
            use_blocks,
            blocks,
        })
    }

    /// Number of frames in a block-framed stream (1 for monolithic).
    pub fn num_blocks(&self) -> usize {
        if self.use_blocks {
            self.blocks.len()
        } else {
            1
        }
    }

    /// Decode a monolithic stream, filling `out` exactly.
    pub fn uncompress(&self, out: &mut [u8]) -> Result<()> {
        if self.use_blocks {
            return Err(HimgError::Huffman("stream is block-framed"));
        }
        self.uncompress_stream(out, self.body.clone())
    }

    /// Decode one frame of a block-framed stream, filling `out` exactly.
    pub fn uncompress_block(&self, out: &mut [u8], block_no: usize) -> Result<()> {
        if !self.use_blocks {
            // A stream holding a single frame is written monolithically.
            if block_no == 0 {
                return self.uncompress_stream(out, self.body.clone());
            }
            return Err(HimgError::Huffman("block index out of range"));
        }

        let &(offset, len) = self
            .blocks
            .get(block_no)
            .ok_or(HimgError::Huffman("block index out of range"))?;
        self.uncompress_stream(out, BitReader::new(&self.data[offset..offset + len]))
    }

    fn uncompress_stream(&self, out: &mut [u8], mut stream: BitReader) -> Result<()> {
        if out.is_empty() {
            return Ok(());
        }

        let out_len = out.len();
        let mut pos = 0usize;

        // The majority of the decoding runs in a fast loop with
        // unchecked bit reads. The longest supported code plus RLE extra
        // bits is about six bytes, so the loop is safe as long as the
        // output cursor stays at least six bytes from the end.
        let fast_end = out_len.saturating_sub(6);
        while pos < fast_end {
            // Peek 8 bits and look up a potential symbol in the LUT
            // (codes of eight bits or shorter are very common, so the
            // hit rate is high).
            let lut_entry = self.lut[stream.peek_8bits() as usize];
            stream.advance(lut_entry.bits);
            let symbol = if lut_entry.node < 0 {
                lut_entry.symbol as usize
            } else {
                // Traverse the tree from eight bits of code length until
                // we find a leaf.
                let mut node = lut_entry.node as usize;
                while self.nodes[node].symbol < 0 {
                    node = if stream.read_bit() != 0 {
                        self.nodes[node].child_b as usize
                    } else {
                        self.nodes[node].child_a as usize
                    };
                }
                self.nodes[node].symbol as usize
            };

            if symbol <= 255 {
                out[pos] = symbol as u8;
                pos += 1;
            } else {
                let zero_count = match symbol {
                    SYM_TWO_ZEROS => 2,
                    SYM_UP_TO_6_ZEROS => stream.read_bits(2) as usize + 3,
                    SYM_UP_TO_22_ZEROS => stream.read_bits(4) as usize + 7,
                    SYM_UP_TO_278_ZEROS => stream.read_bits(8) as usize + 23,
                    SYM_UP_TO_16662_ZEROS => stream.read_bits(14) as usize + 279,
                    _ => return Err(HimgError::Huffman("undefined RLE symbol")),
                };
                if pos + zero_count > out_len {
                    return Err(HimgError::Huffman("zero run overruns output"));
                }
                out[pos..pos + zero_count].fill(0);
                pos += zero_count;
            }
        }

        // ...and the tail runs in a slower loop with checked reads.
        while pos < out_len {
            let symbol = if self.nodes[self.root].symbol >= 0 {
                stream.read_bit_checked();
                self.nodes[self.root].symbol as usize
            } else {
                let mut node = self.root;
                while self.nodes[node].symbol < 0 {
                    node = if stream.read_bit_checked() != 0 {
                        self.nodes[node].child_b as usize
                    } else {
                        self.nodes[node].child_a as usize
                    };
                    if stream.read_failed() {
                        return Err(HimgError::Huffman("bit stream exhausted"));
                    }
                }
                self.nodes[node].symbol as usize
            };
            if stream.read_failed() {
                return Err(HimgError::Huffman("bit stream exhausted"));
            }

            if symbol <= 255 {
                out[pos] = symbol as u8;
                pos += 1;
            } else {
                let zero_count = match symbol {
                    SYM_TWO_ZEROS => 2,
                    SYM_UP_TO_6_ZEROS => stream.read_bits_checked(2) as usize + 3,
                    SYM_UP_TO_22_ZEROS => stream.read_bits_checked(4) as usize + 7,
                    SYM_UP_TO_278_ZEROS => stream.read_bits_checked(8) as usize + 23,
                    SYM_UP_TO_16662_ZEROS => stream.read_bits_checked(14) as usize + 279,
                    _ => return Err(HimgError::Huffman("undefined RLE symbol")),
                };
                if stream.read_failed() || pos + zero_count > out_len {
                    return Err(HimgError::Huffman("zero run overruns output"));
                }
                out[pos..pos + zero_count].fill(0);
                pos += zero_count;
            }
        }

        if stream.at_the_end() {
            Ok(())
        } else {
            Err(HimgError::Huffman("trailing data after stream"))
        }
    }
}
