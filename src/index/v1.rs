// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! CompactIndex V1 (§4.4): a write-once inverted file with a block dictionary.
//!
//! ```text
//! [index block 0][index block 1]...[index block N-1]
//! [descriptor table (32B/entry)]
//! [header]
//! ```
//!
//! Each block is a concatenation of `(term\0, i32 segmentCount, segHeaders[],
//! segBytes[])` records in increasing lexicographic term order. The
//! descriptor table holds, per block, the first 16 bytes of its first term
//! (enough to binary-search a starting block; exact matches are resolved by
//! a linear scan within the block) plus the block's byte range. A sentinel
//! guardian term, sorted after any real token, terminates the dictionary so
//! lookups never have to special-case "ran off the end".

use std::cmp::Ordering;
use std::io::Write;

use crate::binary;
use crate::error::{Result, WumpusError};
use crate::index::split_into_segments;
use crate::types::{CompressionMode, Posting, SegmentHeader};

use super::{glob_match, literal_prefix};

const DESCRIPTOR_PREFIX_LEN: usize = 16;
const DESCRIPTOR_SIZE: usize = DESCRIPTOR_PREFIX_LEN + 8 + 8;
const HEADER_SIZE: usize = 8 * 4;
const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// A guardian codepoint no real MAX_TOKEN_LENGTH-bounded token will contain,
/// guaranteed to sort after any of them.
const SENTINEL_CHAR: char = '\u{10FFFF}';

fn sentinel_term() -> String {
    std::iter::repeat(SENTINEL_CHAR).take(4).collect()
}

fn term_prefix(term: &str) -> [u8; DESCRIPTOR_PREFIX_LEN] {
    let mut buf = [0u8; DESCRIPTOR_PREFIX_LEN];
    let bytes = term.as_bytes();
    let n = bytes.len().min(DESCRIPTOR_PREFIX_LEN);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

#[derive(Debug, Clone)]
struct Descriptor {
    prefix: [u8; DESCRIPTOR_PREFIX_LEN],
    block_start: u64,
    block_end: u64,
}

impl Descriptor {
    fn to_bytes(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut out = [0u8; DESCRIPTOR_SIZE];
        out[..DESCRIPTOR_PREFIX_LEN].copy_from_slice(&self.prefix);
        out[DESCRIPTOR_PREFIX_LEN..DESCRIPTOR_PREFIX_LEN + 8]
            .copy_from_slice(&self.block_start.to_le_bytes());
        out[DESCRIPTOR_PREFIX_LEN + 8..].copy_from_slice(&self.block_end.to_le_bytes());
        out
    }

    fn from_bytes(b: &[u8]) -> Self {
        let mut prefix = [0u8; DESCRIPTOR_PREFIX_LEN];
        prefix.copy_from_slice(&b[..DESCRIPTOR_PREFIX_LEN]);
        let block_start = u64::from_le_bytes(b[16..24].try_into().unwrap());
        let block_end = u64::from_le_bytes(b[24..32].try_into().unwrap());
        Descriptor {
            prefix,
            block_start,
            block_end,
        }
    }
}

/// Writes a V1 partition, one term at a time, in strictly increasing
/// lexicographic order.
pub struct Writer<W: Write> {
    out: W,
    compression_mode: CompressionMode,
    block_size: usize,
    block_buf: Vec<u8>,
    block_first_term: Option<String>,
    bytes_written: u64,
    descriptors: Vec<Descriptor>,
    last_term: Option<String>,
    term_count: u64,
    posting_count: u64,
}

impl<W: Write> Writer<W> {
    pub fn new(out: W, compression_mode: CompressionMode) -> Self {
        Self::with_block_size(out, compression_mode, DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(out: W, compression_mode: CompressionMode, block_size: usize) -> Self {
        Writer {
            out,
            compression_mode,
            block_size,
            block_buf: Vec::with_capacity(block_size),
            block_first_term: None,
            bytes_written: 0,
            descriptors: Vec::new(),
            last_term: None,
            term_count: 0,
            posting_count: 0,
        }
    }

    /// Append one term's full, already-sorted posting list.
    pub fn add_term(&mut self, term: &str, postings: &[Posting]) -> Result<()> {
        if let Some(prev) = &self.last_term {
            if term <= prev.as_str() {
                return Err(WumpusError::InternalError(format!(
                    "terms must be written in strictly increasing order: {term:?} after {prev:?}"
                )));
            }
        }
        self.write_record(term, postings)?;
        self.last_term = Some(term.to_string());
        self.term_count += 1;
        self.posting_count += postings.len() as u64;
        Ok(())
    }

    fn encode_record(&self, term: &str, postings: &[Posting]) -> Vec<u8> {
        let mut record = Vec::new();
        record.extend_from_slice(term.as_bytes());
        record.push(0);

        let segments = split_into_segments(postings);
        record.extend_from_slice(&(segments.len() as i32).to_le_bytes());

        let mut reference = 0u64;
        for seg in &segments {
            let mut body = Vec::new();
            binary::compress(seg, self.compression_mode, &mut body);
            let header = SegmentHeader {
                posting_count: seg.len() as u32,
                byte_length: body.len() as u32,
                first_element: seg[0],
                last_element: *seg.last().unwrap(),
            };
            binary::plsh::encode(&header, reference, &mut record);
            record.extend_from_slice(&body);
            reference = header.last_element;
        }
        record
    }

    fn write_record(&mut self, term: &str, postings: &[Posting]) -> Result<()> {
        let record = self.encode_record(term, postings);
        if !self.block_buf.is_empty() && self.block_buf.len() + record.len() > self.block_size {
            self.flush_block()?;
        }
        if self.block_buf.is_empty() {
            self.block_first_term = Some(term.to_string());
        }
        self.block_buf.extend_from_slice(&record);
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.block_buf.is_empty() {
            return Ok(());
        }
        let start = self.bytes_written;
        self.out.write_all(&self.block_buf)?;
        self.bytes_written += self.block_buf.len() as u64;
        let first_term = self.block_first_term.take().unwrap();
        self.descriptors.push(Descriptor {
            prefix: term_prefix(&first_term),
            block_start: start,
            block_end: self.bytes_written,
        });
        self.block_buf.clear();
        Ok(())
    }

    /// Write the sentinel, descriptor table, and trailing header; returns
    /// the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.write_record(&sentinel_term(), &[])?;
        self.flush_block()?;

        let descriptor_count = self.descriptors.len() as u64;
        for d in &self.descriptors {
            self.out.write_all(&d.to_bytes())?;
        }

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&self.term_count.to_le_bytes());
        header.extend_from_slice(&1u64.to_le_bytes()); // list_count: one list per term in this core
        header.extend_from_slice(&descriptor_count.to_le_bytes());
        header.extend_from_slice(&self.posting_count.to_le_bytes());
        self.out.write_all(&header)?;

        Ok(self.out)
    }
}

/// Reads a fully-buffered V1 partition. Readers keep the whole file resident
/// (`ALL_INDICES_IN_MEMORY`-style) rather than doing positioned reads on a
/// shared handle — acceptable for a partition capped at a few
/// `MAX_UPDATE_SPACE`-multiples, the scale this core actually produces.
pub struct Reader {
    data: Vec<u8>,
    descriptors: Vec<Descriptor>,
    pub term_count: u64,
    pub posting_count: u64,
    blocks_end: usize,
}

impl Reader {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(WumpusError::Codec("V1 file shorter than its header".into()));
        }
        let header_start = data.len() - HEADER_SIZE;
        let header = &data[header_start..];
        let term_count = u64::from_le_bytes(header[0..8].try_into().unwrap());
        let _list_count = u64::from_le_bytes(header[8..16].try_into().unwrap());
        let descriptor_count = u64::from_le_bytes(header[16..24].try_into().unwrap());
        let posting_count = u64::from_le_bytes(header[24..32].try_into().unwrap());

        let descriptor_bytes = descriptor_count as usize * DESCRIPTOR_SIZE;
        if descriptor_bytes > header_start {
            return Err(WumpusError::Codec("V1 descriptor table overruns file".into()));
        }
        let descriptor_start = header_start - descriptor_bytes;
        let mut descriptors = Vec::with_capacity(descriptor_count as usize);
        for i in 0..descriptor_count as usize {
            let off = descriptor_start + i * DESCRIPTOR_SIZE;
            descriptors.push(Descriptor::from_bytes(&data[off..off + DESCRIPTOR_SIZE]));
        }

        Ok(Reader {
            data,
            descriptors,
            term_count,
            posting_count,
            blocks_end: descriptor_start,
        })
    }

    fn starting_block(&self, target_prefix: &[u8; DESCRIPTOR_PREFIX_LEN]) -> Option<usize> {
        if self.descriptors.is_empty() {
            return None;
        }
        let idx = self.descriptors.partition_point(|d| &d.prefix <= target_prefix);
        Some(idx.saturating_sub(1))
    }

    fn block_bytes(&self, block_idx: usize) -> &[u8] {
        let d = &self.descriptors[block_idx];
        &self.data[d.block_start as usize..d.block_end as usize]
    }

    pub fn get_postings(&self, term: &str) -> Result<Option<Vec<Posting>>> {
        let target = term_prefix(term);
        let Some(start_block) = self.starting_block(&target) else {
            return Ok(None);
        };
        for (t, postings) in iter_block_records(self.block_bytes(start_block))? {
            match t.as_str().cmp(term) {
                Ordering::Equal => return Ok(Some(postings)),
                Ordering::Greater => return Ok(None),
                Ordering::Less => continue,
            }
        }
        Ok(None)
    }

    /// `getPostingsForWildcard` (§4.4, `SPEC_FULL.md` C.3): `pattern` must
    /// contain a `*`/`?` and its literal prefix (the part before the first
    /// wildcard character) must be at least two bytes (five for
    /// `<!>`-prefixed document-level shadow terms).
    pub fn get_postings_for_wildcard(&self, pattern: &str) -> Result<Vec<(String, Vec<Posting>)>> {
        let prefix = literal_prefix(pattern);
        let min_len = if pattern.starts_with(crate::types::structural::ANNOTATION_PREFIX) {
            5
        } else {
            2
        };
        if prefix.len() < min_len {
            return Err(WumpusError::SyntaxError(format!(
                "wildcard pattern {pattern:?} needs a literal prefix of at least {min_len} bytes"
            )));
        }

        let target = term_prefix(prefix);
        let Some(mut block_idx) = self.starting_block(&target) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        'blocks: while block_idx < self.descriptors.len() {
            for (t, postings) in iter_block_records(self.block_bytes(block_idx))? {
                if glob_match(pattern, &t) {
                    out.push((t, postings));
                } else if t.as_str() > prefix && !t.starts_with(prefix) {
                    break 'blocks;
                }
            }
            block_idx += 1;
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.blocks_end
    }

    /// The raw partition bytes this reader was built from, for callers that
    /// persist partitions to disk under the `index.short.NNN` naming
    /// convention (§6) rather than keep them in the process that built
    /// them.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Every real term in dictionary order, skipping the sentinel record
    /// each block ends with. Used to build a `MultipleIndexIterator` over
    /// on-disk partitions (C6).
    pub fn iter_all(&self) -> Result<Vec<(String, Vec<Posting>)>> {
        let sentinel = sentinel_term();
        let mut out = Vec::new();
        for block_idx in 0..self.descriptors.len() {
            for (t, postings) in iter_block_records(self.block_bytes(block_idx))? {
                if t != sentinel {
                    out.push((t, postings));
                }
            }
        }
        Ok(out)
    }
}

fn iter_block_records(block: &[u8]) -> Result<Vec<(String, Vec<Posting>)>> {
    let mut out = Vec::new();
    let mut cursor = 0usize;
    while cursor < block.len() {
        let term_end = block[cursor..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| WumpusError::Codec("unterminated term in V1 block".into()))?;
        let term = String::from_utf8_lossy(&block[cursor..cursor + term_end]).into_owned();
        cursor += term_end + 1;

        let segment_count = i32::from_le_bytes(block[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;

        let mut postings = Vec::new();
        let mut reference = 0u64;
        for _ in 0..segment_count {
            let (header, consumed) = binary::plsh::decode(&block[cursor..], reference)?;
            cursor += consumed;
            let body = &block[cursor..cursor + header.byte_length as usize];
            cursor += header.byte_length as usize;
            postings.extend(binary::decompress(body, None, header.posting_count as usize)?);
            reference = header.last_element;
        }
        out.push((term, postings));
    }
    Ok(out)
}
