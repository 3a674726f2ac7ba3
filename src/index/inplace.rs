// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! `InPlaceIndex` (C5, §4.5): the mutable, block-allocated store for long
//! posting lists.
//!
//! The backing store is divided into fixed-size blocks; a free-block bitmap
//! tracks allocation. Each long-list term owns a contiguous run of blocks,
//! possibly extended by an overflow chain of further runs when relocation
//! isn't an option. Segment headers for a term stay resident in RAM
//! (`MyInPlaceTermDescriptor`, §4.5) while the compressed postings payload
//! itself lives in the block store; `get_postings` reconstitutes a full
//! posting list by walking the descriptor's runs in order.
//!
//! Updates to the term currently being written are buffered in RAM
//! (`PendingUpdate`, bounded by `MAX_PENDING_SEGMENT_COUNT`/
//! `MAX_PENDING_DATA`) so a relocation decision can be made before any of
//! those bytes touch the block store — `finish_update` is what actually
//! commits them.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::binary;
use crate::binary::plsh;
use crate::error::{Result, WumpusError};
use crate::index::split_into_segments;
use crate::types::{CompressionMode, PartitionId, Posting, SegmentHeader};

pub const BLOCK_SIZE: usize = 16 * 1024;
pub const INITIAL_BLOCKS: usize = 1;
pub const MAX_PENDING_SEGMENT_COUNT: usize = 64;
pub const MAX_PENDING_DATA: usize = 256 * 1024;

/// How a term's run grows once its current allocation is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthPolicy {
    /// Allocate a bigger contiguous run and copy everything over.
    Relocate,
    /// Allocate a new run elsewhere and chain to it.
    Chain,
}

#[derive(Debug, Clone, Copy)]
struct Run {
    block_start: usize,
    block_count: usize,
    used: usize,
}

impl Run {
    fn capacity(&self) -> usize {
        self.block_count * BLOCK_SIZE
    }

    fn free(&self) -> usize {
        self.capacity() - self.used
    }
}

/// `MyInPlaceTermDescriptor` (§4.5): per-term metadata kept in RAM.
struct TermDescriptor {
    segment_headers: Vec<SegmentHeader>,
    runs: Vec<Run>,
    posting_count: u64,
    /// Bitmask over partition ids that also hold segments of this term,
    /// used by the hybrid manager to preserve cross-store monotonicity.
    appears_in_index: u64,
}

impl TermDescriptor {
    fn new() -> Self {
        TermDescriptor {
            segment_headers: Vec::new(),
            runs: Vec::new(),
            posting_count: 0,
            appears_in_index: 0,
        }
    }

    fn total_used(&self) -> usize {
        self.runs.iter().map(|r| r.used).sum()
    }

    fn last_element(&self) -> Posting {
        self.segment_headers.last().map(|h| h.last_element).unwrap_or(0)
    }
}

/// Segments buffered for the term currently being written, per §4.5.
struct PendingUpdate {
    term: String,
    segments: Vec<(SegmentHeader, Vec<u8>)>,
    bytes: usize,
}

pub struct InPlaceIndex {
    growth_policy: GrowthPolicy,
    compression_mode: CompressionMode,
    blocks: Vec<u8>,
    free: Vec<bool>,
    terms: HashMap<String, TermDescriptor>,
    pending: Option<PendingUpdate>,
}

impl InPlaceIndex {
    pub fn new(compression_mode: CompressionMode, growth_policy: GrowthPolicy) -> Self {
        InPlaceIndex {
            growth_policy,
            compression_mode,
            blocks: Vec::new(),
            free: Vec::new(),
            terms: HashMap::new(),
            pending: None,
        }
    }

    fn alloc_run(&mut self, min_blocks: usize) -> Run {
        let block_count = min_blocks.max(INITIAL_BLOCKS);
        // First-fit over the free bitmap; append fresh blocks if nothing fits.
        let mut start = None;
        let mut run_len = 0usize;
        for (i, &is_free) in self.free.iter().enumerate() {
            if is_free {
                if run_len == 0 {
                    start = Some(i);
                }
                run_len += 1;
                if run_len == block_count {
                    break;
                }
            } else {
                run_len = 0;
                start = None;
            }
        }
        let block_start = match start {
            Some(s) if run_len == block_count => {
                for b in self.free[s..s + block_count].iter_mut() {
                    *b = false;
                }
                s
            }
            _ => {
                let s = self.free.len();
                self.free.resize(s + block_count, false);
                self.blocks.resize((s + block_count) * BLOCK_SIZE, 0);
                s
            }
        };
        Run {
            block_start,
            block_count,
            used: 0,
        }
    }

    fn free_run(&mut self, run: &Run) {
        for b in self.free[run.block_start..run.block_start + run.block_count].iter_mut() {
            *b = true;
        }
    }

    fn run_bytes_mut(&mut self, run: &Run) -> &mut [u8] {
        let start = run.block_start * BLOCK_SIZE;
        &mut self.blocks[start..start + run.capacity()]
    }

    /// Append one segment's worth of postings for `term` (§4.5
    /// `addPostings`). Buffers into the pending update for the term
    /// currently being written; switching terms or exceeding the pending
    /// bounds flushes automatically.
    pub fn add_postings(&mut self, term: &str, postings: &[Posting]) -> Result<()> {
        if postings.is_empty() {
            return Ok(());
        }

        let switching_term = self.pending.as_ref().map(|p| p.term != term).unwrap_or(false);
        if switching_term {
            self.finish_update()?;
        }

        if self.pending.is_none() {
            self.pending = Some(PendingUpdate {
                term: term.to_string(),
                segments: Vec::new(),
                bytes: 0,
            });
        }

        let reference = {
            let existing = self.terms.get(term);
            let pending_last = self
                .pending
                .as_ref()
                .and_then(|p| p.segments.last())
                .map(|(h, _)| h.last_element);
            pending_last
                .or_else(|| existing.map(TermDescriptor::last_element))
                .unwrap_or(0)
        };
        if reference != 0 && postings[0] <= reference {
            return Err(WumpusError::InternalError(format!(
                "in-place postings for {term:?} must start after the existing last element \
                 {reference}, got {}",
                postings[0]
            )));
        }

        for seg in split_into_segments(postings) {
            let mut body = Vec::new();
            binary::compress(seg, self.compression_mode, &mut body);
            let header = SegmentHeader {
                posting_count: seg.len() as u32,
                byte_length: body.len() as u32,
                first_element: seg[0],
                last_element: *seg.last().unwrap(),
            };
            let pending = self.pending.as_mut().unwrap();
            pending.bytes += body.len();
            pending.segments.push((header, body));
        }

        let pending = self.pending.as_ref().unwrap();
        if pending.segments.len() >= MAX_PENDING_SEGMENT_COUNT || pending.bytes >= MAX_PENDING_DATA {
            self.finish_update()?;
        }
        Ok(())
    }

    /// Commit the pending update for whichever term is currently buffered
    /// (§4.5 `finishUpdate`). A no-op if nothing is pending.
    pub fn finish_update(&mut self) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let needed: usize = pending.segments.iter().map(|(h, b)| h_record_len(h) + b.len()).sum();

        self.terms.entry(pending.term.clone()).or_insert_with(TermDescriptor::new);

        let runs_empty = self.terms.get(&pending.term).unwrap().runs.is_empty();
        let last_run_free = self
            .terms
            .get(&pending.term)
            .unwrap()
            .runs
            .last()
            .map(Run::free)
            .unwrap_or(0);

        if runs_empty {
            let blocks_needed = needed.div_ceil(BLOCK_SIZE);
            let run = self.alloc_run(blocks_needed);
            self.terms.get_mut(&pending.term).unwrap().runs.push(run);
        } else if last_run_free < needed {
            match self.growth_policy {
                GrowthPolicy::Relocate => self.relocate(&pending.term, needed)?,
                GrowthPolicy::Chain => {
                    let blocks_needed = needed.div_ceil(BLOCK_SIZE);
                    let run = self.alloc_run(blocks_needed);
                    self.terms.get_mut(&pending.term).unwrap().runs.push(run);
                }
            }
        }

        let run_idx = self.terms.get(&pending.term).unwrap().runs.len() - 1;
        let mut run = self.terms.get(&pending.term).unwrap().runs[run_idx];
        let mut cursor = run.used;
        for (header, body) in &pending.segments {
            let mut record = Vec::new();
            let reference = self
                .terms
                .get(&pending.term)
                .unwrap()
                .segment_headers
                .last()
                .map(|h| h.last_element)
                .unwrap_or(0);
            plsh::encode(header, reference, &mut record);
            record.extend_from_slice(body);
            self.run_bytes_mut(&run)[cursor..cursor + record.len()].copy_from_slice(&record);
            cursor += record.len();

            let descriptor = self.terms.get_mut(&pending.term).unwrap();
            descriptor.segment_headers.push(*header);
            descriptor.posting_count += header.posting_count as u64;
        }
        run.used = cursor;
        self.terms.get_mut(&pending.term).unwrap().runs[run_idx] = run;

        debug!(term = %pending.term, segments = pending.segments.len(), "in-place finish_update");
        Ok(())
    }

    fn relocate(&mut self, term: &str, extra_needed: usize) -> Result<()> {
        let descriptor = self.terms.get(term).unwrap();
        let current_used = descriptor.total_used();
        let new_block_count = (current_used + extra_needed).div_ceil(BLOCK_SIZE).max(1) * 2;

        let old_runs = descriptor.runs.clone();
        let new_run = self.alloc_run(new_block_count);

        let mut copied = 0usize;
        for old in &old_runs {
            let bytes = self.blocks[old.block_start * BLOCK_SIZE..old.block_start * BLOCK_SIZE + old.used].to_vec();
            self.blocks[new_run.block_start * BLOCK_SIZE + copied..new_run.block_start * BLOCK_SIZE + copied + bytes.len()]
                .copy_from_slice(&bytes);
            copied += bytes.len();
        }
        for old in &old_runs {
            self.free_run(old);
        }

        let descriptor = self.terms.get_mut(term).unwrap();
        descriptor.runs = vec![Run {
            block_start: new_run.block_start,
            block_count: new_run.block_count,
            used: copied,
        }];
        Ok(())
    }

    /// Reconstruct a term's full posting list from its descriptor's runs.
    pub fn get_postings(&self, term: &str) -> Result<Option<Vec<Posting>>> {
        let Some(descriptor) = self.terms.get(term) else {
            return Ok(None);
        };
        let mut bytes = Vec::with_capacity(descriptor.total_used());
        for run in &descriptor.runs {
            let start = run.block_start * BLOCK_SIZE;
            bytes.extend_from_slice(&self.blocks[start..start + run.used]);
        }

        let mut out = Vec::with_capacity(descriptor.posting_count as usize);
        let mut cursor = 0usize;
        let mut reference = 0u64;
        for _ in 0..descriptor.segment_headers.len() {
            let (header, consumed) = plsh::decode(&bytes[cursor..], reference)?;
            cursor += consumed;
            let body = &bytes[cursor..cursor + header.byte_length as usize];
            cursor += header.byte_length as usize;
            out.extend(binary::decompress(body, None, header.posting_count as usize)?);
            reference = header.last_element;
        }
        Ok(Some(out))
    }

    pub fn appears_in_index(&self, term: &str) -> u64 {
        self.terms.get(term).map(|d| d.appears_in_index).unwrap_or(0)
    }

    pub fn set_appears_in_index(&mut self, term: &str, mask: u64) {
        if let Some(d) = self.terms.get_mut(term) {
            d.appears_in_index = mask;
        }
    }

    pub fn mark_appears_in(&mut self, term: &str, partition: PartitionId) {
        if let Some(d) = self.terms.get_mut(term) {
            d.appears_in_index |= 1u64 << (partition.0 as u64 % 64);
        }
    }

    pub fn contains_term(&self, term: &str) -> bool {
        self.terms.contains_key(term)
    }

    /// Snapshot of every term currently resident, for callers (e.g. the
    /// hybrid manager's merge routing) that need to check membership
    /// without holding a live borrow of `self` across other mutations.
    pub fn term_names(&self) -> std::collections::HashSet<String> {
        self.terms.keys().cloned().collect()
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Persist the term map as `{term appearsInIndexMask}` text lines
    /// (§6 `index.long.list`).
    pub fn save_term_map(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut f = std::fs::File::create(path)?;
        for (term, descriptor) in &self.terms {
            writeln!(f, "{term} {}", descriptor.appears_in_index)?;
        }
        Ok(())
    }

    /// Reload just the `appearsInIndex` masks keyed by term; callers merge
    /// this with the terms actually present in the block store.
    pub fn load_term_map(path: impl AsRef<Path>) -> Result<HashMap<String, u64>> {
        let text = std::fs::read_to_string(path)?;
        let mut out = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((term, mask)) = line.rsplit_once(' ') else {
                return Err(WumpusError::Codec(format!("malformed index.long.list line: {line:?}")));
            };
            let mask: u64 = mask
                .parse()
                .map_err(|_| WumpusError::Codec(format!("non-numeric appearsInIndex mask: {mask:?}")))?;
            out.insert(term.to_string(), mask);
        }
        Ok(out)
    }
}

fn h_record_len(header: &SegmentHeader) -> usize {
    // Upper bound on the PLSH's encoded size (5 varints worst case at 10
    // bytes each would be generous; the real header has four fields).
    let mut buf = Vec::new();
    plsh::encode(header, 0, &mut buf);
    buf.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> InPlaceIndex {
        InPlaceIndex::new(CompressionMode::VByte, GrowthPolicy::Relocate)
    }

    #[test]
    fn single_term_roundtrip() {
        let mut idx = index();
        idx.add_postings("term", &[1, 2, 3, 1000]).unwrap();
        idx.finish_update().unwrap();
        assert_eq!(idx.get_postings("term").unwrap(), Some(vec![1, 2, 3, 1000]));
        assert!(idx.get_postings("missing").unwrap().is_none());
    }

    #[test]
    fn incremental_appends_extend_the_list() {
        let mut idx = index();
        idx.add_postings("term", &[1, 2, 3]).unwrap();
        idx.add_postings("term", &[10, 20]).unwrap();
        idx.finish_update().unwrap();
        assert_eq!(idx.get_postings("term").unwrap(), Some(vec![1, 2, 3, 10, 20]));
    }

    #[test]
    fn relocation_preserves_postings_across_many_appends() {
        let mut idx = index();
        let mut expected = Vec::new();
        for batch in 0..200u64 {
            let postings: Vec<Posting> = (0..50).map(|i| batch * 1000 + i).collect();
            idx.add_postings("growing", &postings).unwrap();
            expected.extend(postings);
        }
        idx.finish_update().unwrap();
        assert_eq!(idx.get_postings("growing").unwrap(), Some(expected));
    }

    #[test]
    fn chain_growth_policy_also_preserves_postings() {
        let mut idx = InPlaceIndex::new(CompressionMode::VByte, GrowthPolicy::Chain);
        let mut expected = Vec::new();
        for batch in 0..50u64 {
            let postings: Vec<Posting> = (0..200).map(|i| batch * 10_000 + i).collect();
            idx.add_postings("chained", &postings).unwrap();
            expected.extend(postings);
        }
        idx.finish_update().unwrap();
        assert_eq!(idx.get_postings("chained").unwrap(), Some(expected));
    }

    #[test]
    fn switching_terms_flushes_the_previous_pending_update() {
        let mut idx = index();
        idx.add_postings("a", &[1, 2]).unwrap();
        idx.add_postings("b", &[5, 6]).unwrap();
        idx.finish_update().unwrap();
        assert_eq!(idx.get_postings("a").unwrap(), Some(vec![1, 2]));
        assert_eq!(idx.get_postings("b").unwrap(), Some(vec![5, 6]));
    }

    #[test]
    fn term_map_roundtrips_through_a_file() {
        let mut idx = index();
        idx.add_postings("term", &[1, 2]).unwrap();
        idx.finish_update().unwrap();
        idx.mark_appears_in("term", PartitionId(2));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.long.list");
        idx.save_term_map(&path).unwrap();
        let reloaded = InPlaceIndex::load_term_map(&path).unwrap();
        assert_eq!(reloaded.get("term"), Some(&idx.appears_in_index("term")));
    }
}
