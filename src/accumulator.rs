// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The in-RAM accumulator (C3, §4.3): absorbs postings at ingest rate and
//! defers sorting/compression until flush.
//!
//! Terms live in a fixed-size hash table with move-to-front chaining. Each
//! term's postings are delta-encoded (vbyte) into a singly-linked chain of
//! small chunks carved out of fixed-size container arenas — never a `Vec`
//! per term, since a term can see anywhere from one posting to millions
//! before the next flush and per-term `Vec` growth would thrash the
//! allocator at that scale.
//!
//! `recompact()` is the two-phase in-place defragmenter described in §4.3 and
//! `SPEC_FULL.md` §9: phase one walks every live term's chunk chain and
//! clobbers each chunk header's forward pointer with the owning term's id;
//! phase two sweeps the arena once, front to back, relocating every
//! owner-tagged chunk into a fresh arena and re-linking it via that term's
//! `current_chunk` breadcrumb. No auxiliary per-chunk map is needed: a
//! term's own chunks are always encountered by the sweep in allocation
//! order, because the arena is append-only between compactions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tracing::debug;

use crate::binary::vbyte::{decode_varint, encode_varint};
use crate::config::Config;
use crate::error::{Result, WumpusError};
use crate::types::{structural, DocLevelPolicy, Posting, StemmingLevel, DOC_LEVEL_MAX_TF};

/// Number of buckets in the term hash table.
pub const HASHTABLE_SIZE: usize = 65_536;

/// Size of one container arena; chunks are bump-allocated from it and never
/// individually freed outside of `recompact`.
const CONTAINER_SIZE: usize = 1 << 16;

/// A chunk never exceeds this many payload bytes, keeping the geometric
/// growth bounded and chunk headers addressable with a single byte length.
const MAX_CHUNK_PAYLOAD: usize = 250;
const INITIAL_CHUNK_PAYLOAD: usize = 8;

/// `{nextChunkIndex: i64, chunkSize: u8}`. The pointer is 64 bits (wider
/// than the container/offset pair strictly needs) so that it always stays
/// non-negative regardless of container count — `recompact`'s owner tags
/// rely on negative values being exclusively theirs (see `encode_owner`).
const CHUNK_HEADER_SIZE: usize = 9;

/// Sentinel meaning "end of chain" — never a valid packed chunk pointer,
/// since packed pointers are always non-negative.
const NO_CHUNK: i64 = -1;

/// Bits of offset packed into a chunk pointer; the remainder addresses the
/// container. `CONTAINER_SIZE` must be exactly `1 << OFFSET_BITS`.
const OFFSET_BITS: u32 = 16;

fn pack_chunk_ptr(container: u32, offset: u32) -> i64 {
    debug_assert!(offset < (1 << OFFSET_BITS));
    ((container as i64) << OFFSET_BITS) | offset as i64
}

fn unpack_chunk_ptr(ptr: i64) -> (usize, usize) {
    debug_assert_ne!(ptr, NO_CHUNK);
    debug_assert!(ptr >= 0);
    ((ptr >> OFFSET_BITS) as usize, (ptr & ((1 << OFFSET_BITS) - 1)) as usize)
}

/// Owner-tag encoding used transiently during `recompact`'s phase one. Always
/// `<= -2`, so it can never be confused with `NO_CHUNK` (`-1`) or a real,
/// non-negative chunk pointer.
fn encode_owner(entry_id: usize) -> i64 {
    -((entry_id as i64) + 2)
}

fn decode_owner(v: i64) -> Option<usize> {
    if v <= -2 {
        Some((-v - 2) as usize)
    } else {
        None
    }
}

struct Container {
    bytes: Vec<u8>,
    used: usize,
}

impl Container {
    fn new() -> Self {
        Container {
            bytes: vec![0u8; CONTAINER_SIZE],
            used: 0,
        }
    }

    fn try_alloc(&mut self, len: usize) -> Option<usize> {
        if self.used + len > self.bytes.len() {
            return None;
        }
        let offset = self.used;
        self.used += len;
        Some(offset)
    }
}

fn read_header(containers: &[Container], ptr: i64) -> (i64, u8) {
    let (c, o) = unpack_chunk_ptr(ptr);
    let b = &containers[c].bytes;
    let next = i64::from_le_bytes(b[o..o + 8].try_into().unwrap());
    (next, b[o + 8])
}

fn write_next(containers: &mut [Container], ptr: i64, next: i64) {
    let (c, o) = unpack_chunk_ptr(ptr);
    containers[c].bytes[o..o + 8].copy_from_slice(&next.to_le_bytes());
}

fn write_size(containers: &mut [Container], ptr: i64, size: u8) {
    let (c, o) = unpack_chunk_ptr(ptr);
    containers[c].bytes[o + 8] = size;
}

fn payload_mut(containers: &mut [Container], ptr: i64) -> &mut [u8] {
    let (c, o) = unpack_chunk_ptr(ptr);
    &mut containers[c].bytes[o + CHUNK_HEADER_SIZE..]
}

fn payload(containers: &[Container], ptr: i64, len: usize) -> &[u8] {
    let (c, o) = unpack_chunk_ptr(ptr);
    &containers[c].bytes[o + CHUNK_HEADER_SIZE..o + CHUNK_HEADER_SIZE + len]
}

/// Maps terms to their stemmed equivalents; an external collaborator
/// (`SPEC_FULL.md` C.2) — the real stemming algorithm lives outside this
/// crate's scope.
pub trait Stemmer: Send + Sync {
    fn stem(&self, term: &str) -> String;
}

/// Stems nothing; used when `StemmingLevel::Off` or no stemmer is wired up.
#[derive(Default)]
pub struct NoopStemmer;

impl Stemmer for NoopStemmer {
    fn stem(&self, term: &str) -> String {
        term.to_string()
    }
}

struct TermEntry {
    term: String,
    first_chunk: i64,
    current_chunk: i64,
    /// Bytes used in `current_chunk`'s payload so far; mirrors the chunk
    /// header's size byte for the chunk currently being written.
    size_of_current_chunk: u8,
    /// Soft cap on `current_chunk`'s payload before a new chunk is grown;
    /// not persisted in the arena, only tracked here.
    capacity_of_current_chunk: u8,
    postings_in_current_chunk: u32,
    memory_consumed: u64,
    last_posting: Posting,
    number_of_postings: u64,
    postings_in_current_document: u32,
    /// Index of this term's `$`-suffixed stemmed counterpart, if stemming is
    /// enabled and this isn't itself a stemmed entry.
    stemmed_form: Option<usize>,
    chain_next: Option<usize>,
}

impl TermEntry {
    fn new(term: String) -> Self {
        TermEntry {
            term,
            first_chunk: NO_CHUNK,
            current_chunk: NO_CHUNK,
            size_of_current_chunk: 0,
            capacity_of_current_chunk: 0,
            postings_in_current_chunk: 0,
            memory_consumed: 0,
            last_posting: 0,
            number_of_postings: 0,
            postings_in_current_document: 0,
            stemmed_form: None,
            chain_next: None,
        }
    }
}

/// Snapshot of one term's resident posting list, used by flush/merge code
/// and by `IndexIterator` implementations over the accumulator.
#[derive(Debug, Clone)]
pub struct AccumulatedTerm {
    pub term: String,
    pub postings: Vec<Posting>,
}

pub struct Accumulator {
    stemming_level: StemmingLevel,
    doc_level_policy: DocLevelPolicy,
    append_reset: bool,
    stemmer: Box<dyn Stemmer>,

    buckets: Vec<Option<usize>>,
    entries: Vec<Option<TermEntry>>,
    free_entry_slots: Vec<usize>,
    containers: Vec<Container>,

    total_memory: u64,

    // Document-level indexing window (§4.3).
    doc_open: bool,
    doc_start_posting: Posting,
    doc_seen_terms: Vec<usize>,
}

impl Accumulator {
    pub fn new(config: &Config) -> Self {
        Accumulator::with_stemmer(config, Box::new(NoopStemmer))
    }

    pub fn with_stemmer(config: &Config, stemmer: Box<dyn Stemmer>) -> Self {
        if config.append_reset {
            assert_eq!(
                config.doc_level_policy,
                DocLevelPolicy::Off,
                "append-reset mode's interaction with document-level TF encoding is \
                 unspecified upstream; the two must not be enabled together (SPEC_FULL.md D)"
            );
        }
        Accumulator {
            stemming_level: config.stemming_level,
            doc_level_policy: config.doc_level_policy,
            append_reset: config.append_reset,
            stemmer,
            buckets: vec![None; HASHTABLE_SIZE],
            entries: Vec::new(),
            free_entry_slots: Vec::new(),
            containers: vec![Container::new()],
            total_memory: 0,
            doc_open: false,
            doc_start_posting: 0,
            doc_seen_terms: Vec::new(),
        }
    }

    pub fn total_memory(&self) -> u64 {
        self.total_memory
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }

    fn hash_bucket(term: &str) -> usize {
        let mut h = DefaultHasher::new();
        term.hash(&mut h);
        (h.finish() as usize) % HASHTABLE_SIZE
    }

    /// Look a term up, moving it to the front of its bucket chain; create it
    /// if absent.
    fn find_or_create(&mut self, term: &str) -> usize {
        let bucket = Self::hash_bucket(term);
        let mut prev: Option<usize> = None;
        let mut cur = self.buckets[bucket];
        while let Some(idx) = cur {
            let matches = self.entries[idx].as_ref().unwrap().term == term;
            if matches {
                if prev.is_some() {
                    // Unlink and move to front.
                    let next = self.entries[idx].as_ref().unwrap().chain_next;
                    self.entries[prev.unwrap()].as_mut().unwrap().chain_next = next;
                    self.entries[idx].as_mut().unwrap().chain_next = self.buckets[bucket];
                    self.buckets[bucket] = Some(idx);
                }
                return idx;
            }
            prev = cur;
            cur = self.entries[idx].as_ref().unwrap().chain_next;
        }

        let mut entry = TermEntry::new(term.to_string());
        entry.chain_next = self.buckets[bucket];
        let idx = if let Some(slot) = self.free_entry_slots.pop() {
            self.entries[slot] = Some(entry);
            slot
        } else {
            self.entries.push(Some(entry));
            self.entries.len() - 1
        };
        self.buckets[bucket] = Some(idx);
        idx
    }

    fn alloc_chunk(&mut self, capacity: u8) -> i64 {
        let needed = CHUNK_HEADER_SIZE + capacity as usize;
        let container_idx = self.containers.len() - 1;
        let offset = match self.containers[container_idx].try_alloc(needed) {
            Some(o) => o,
            None => {
                self.containers.push(Container::new());
                self.containers.last_mut().unwrap().try_alloc(needed).expect(
                    "a chunk never exceeds MAX_CHUNK_PAYLOAD bytes, far smaller than CONTAINER_SIZE",
                )
            }
        };
        let container_idx = self.containers.len() - 1;
        let ptr = pack_chunk_ptr(container_idx as u32, offset as u32);
        write_next(&mut self.containers, ptr, NO_CHUNK);
        write_size(&mut self.containers, ptr, 0);
        ptr
    }

    /// Append a vbyte-encoded delta to `entry`'s current chunk, growing or
    /// allocating a new chunk as needed.
    fn append_delta(&mut self, idx: usize, delta: u64) {
        let mut encoded = Vec::with_capacity(10);
        encode_varint(delta, &mut encoded);

        let needs_new_chunk = {
            let entry = self.entries[idx].as_ref().unwrap();
            entry.current_chunk == NO_CHUNK
                || entry.size_of_current_chunk as usize + encoded.len()
                    > entry.capacity_of_current_chunk as usize
        };

        if needs_new_chunk {
            let next_capacity = {
                let entry = self.entries[idx].as_ref().unwrap();
                if entry.current_chunk == NO_CHUNK {
                    INITIAL_CHUNK_PAYLOAD
                } else {
                    (entry.capacity_of_current_chunk as usize * 2).min(MAX_CHUNK_PAYLOAD)
                }
            }
            .max(encoded.len())
            .min(MAX_CHUNK_PAYLOAD) as u8;

            let new_ptr = self.alloc_chunk(next_capacity);
            let entry = self.entries[idx].as_mut().unwrap();
            if entry.first_chunk == NO_CHUNK {
                entry.first_chunk = new_ptr;
            } else {
                let prev_ptr = entry.current_chunk;
                write_next(&mut self.containers, prev_ptr, new_ptr);
            }
            entry.current_chunk = new_ptr;
            entry.size_of_current_chunk = 0;
            entry.capacity_of_current_chunk = next_capacity;
        }

        let entry = self.entries[idx].as_mut().unwrap();
        let ptr = entry.current_chunk;
        let offset = entry.size_of_current_chunk as usize;
        payload_mut(&mut self.containers, ptr)[offset..offset + encoded.len()]
            .copy_from_slice(&encoded);
        entry.size_of_current_chunk += encoded.len() as u8;
        entry.postings_in_current_chunk += 1;
        entry.memory_consumed += encoded.len() as u64;
        self.total_memory += encoded.len() as u64;
        write_size(&mut self.containers, ptr, entry.size_of_current_chunk);
    }

    /// Ingest one posting for `term` (§4.3 `addPosting`). Constant expected
    /// time: one hash table lookup plus an amortized-constant chunk append.
    pub fn add_posting(&mut self, term: &str, posting: Posting) -> Result<()> {
        if term.len() > crate::types::MAX_TOKEN_LENGTH {
            return Err(WumpusError::SyntaxError(format!(
                "term exceeds MAX_TOKEN_LENGTH: {term:?}"
            )));
        }

        let structural_term = is_structural(term);
        let already_stemmed = term.ends_with('$');
        // `StemmedOnly` drops the surface form entirely, storing just the
        // `$`-suffixed stem; structural markers and already-stemmed terms
        // (the recursive call below) are exempt from that — the window
        // markers always need their own postings, and a stem has no further
        // stem to fall back to.
        let index_surface_form = structural_term
            || already_stemmed
            || self.stemming_level != StemmingLevel::StemmedOnly;

        let idx = self.find_or_create(term);
        if index_surface_form {
            self.add_posting_raw(idx, posting)?;
        }

        if self.doc_level_policy != DocLevelPolicy::Off {
            self.track_document_level(term, idx, posting);
        }

        if self.stemming_level != StemmingLevel::Off && !structural_term && !already_stemmed {
            let stemmed_idx = {
                let entry = self.entries[idx].as_ref().unwrap();
                entry.stemmed_form
            };
            let stemmed_idx = match stemmed_idx {
                Some(i) => i,
                None => {
                    let stem = format!("{}$", self.stemmer.stem(term));
                    let i = self.find_or_create(&stem);
                    self.entries[idx].as_mut().unwrap().stemmed_form = Some(i);
                    i
                }
            };
            self.add_posting_raw(stemmed_idx, posting)?;
        }

        Ok(())
    }

    fn add_posting_raw(&mut self, idx: usize, posting: Posting) -> Result<()> {
        let (last, has_any) = {
            let e = self.entries[idx].as_ref().unwrap();
            (e.last_posting, e.number_of_postings > 0)
        };

        if has_any && posting < last {
            if !self.append_reset {
                return Err(WumpusError::InternalError(format!(
                    "posting {posting} is less than the last posting {last} for term {:?}; \
                     enable append-reset mode to allow this",
                    self.entries[idx].as_ref().unwrap().term
                )));
            }
            // Write the reset marker as a literal, then restart the delta
            // baseline at zero.
            self.append_delta(idx, crate::types::RESET_MARKER);
            self.entries[idx].as_mut().unwrap().last_posting = 0;
        }

        let base = self.entries[idx].as_ref().unwrap().last_posting;
        let delta = if has_any { posting - base } else { posting };
        self.append_delta(idx, delta);

        let entry = self.entries[idx].as_mut().unwrap();
        entry.last_posting = posting;
        entry.number_of_postings += 1;
        Ok(())
    }

    fn track_document_level(&mut self, term: &str, idx: usize, posting: Posting) {
        match term {
            structural::DOC_OPEN => {
                self.doc_open = true;
                self.doc_start_posting = posting;
                self.doc_seen_terms.clear();
            }
            structural::DOC_CLOSE => {
                if self.doc_open {
                    self.flush_document_window();
                }
                self.doc_open = false;
            }
            _ if is_structural(term) => {}
            _ => {
                if self.doc_open {
                    let entry = self.entries[idx].as_mut().unwrap();
                    if entry.postings_in_current_document == 0 {
                        self.doc_seen_terms.push(idx);
                    }
                    let cap = match self.doc_level_policy {
                        DocLevelPolicy::Saturating => DOC_LEVEL_MAX_TF,
                        _ => u32::MAX,
                    };
                    let entry = self.entries[idx].as_mut().unwrap();
                    entry.postings_in_current_document =
                        (entry.postings_in_current_document + 1).min(cap);
                }
            }
        }
    }

    fn flush_document_window(&mut self) {
        let doc_start = self.doc_start_posting;
        let seen = std::mem::take(&mut self.doc_seen_terms);
        for idx in seen {
            let tf = {
                let entry = self.entries[idx].as_mut().unwrap();
                let raw = entry.postings_in_current_document;
                let tf = match self.doc_level_policy {
                    DocLevelPolicy::Saturating => raw.min(DOC_LEVEL_MAX_TF),
                    _ => raw,
                };
                entry.postings_in_current_document = 0;
                tf
            };
            let tf_mask: Posting = (1u64 << crate::types::DOC_LEVEL_MAX_TF_BITS) - 1;
            let doc_level_posting = (doc_start & !tf_mask) | (tf as Posting);
            // Document-start postings are synthetic and recorded under a
            // `<!>`-prefixed shadow term so they never collide with the
            // term's ordinary positional postings.
            let doc_level_term = format!("{}{}", structural::ANNOTATION_PREFIX, self.entries[idx].as_ref().unwrap().term);
            let doc_idx = self.find_or_create(&doc_level_term);
            // Ignore monotonicity violations here: document-level postings
            // for distinct terms interleave by document order, which is
            // already monotonic, so this should never trigger outside a bug.
            let _ = self.add_posting_raw(doc_idx, doc_level_posting);
        }
    }

    /// Materialize the full (decompressed) posting list for `term`, or
    /// `None` if it has never been seen.
    pub fn postings_of(&self, term: &str) -> Option<Vec<Posting>> {
        let bucket = Self::hash_bucket(term);
        let mut cur = self.buckets[bucket];
        while let Some(idx) = cur {
            let entry = self.entries[idx].as_ref().unwrap();
            if entry.term == term {
                return Some(self.decode_chain(entry.first_chunk, entry.number_of_postings as usize));
            }
            cur = entry.chain_next;
        }
        None
    }

    fn decode_chain(&self, first_chunk: i64, count: usize) -> Vec<Posting> {
        let mut out = Vec::with_capacity(count);
        let mut last: Posting = 0;
        let mut ptr = first_chunk;
        while ptr != NO_CHUNK {
            let (next, size) = read_header(&self.containers, ptr);
            let bytes = payload(&self.containers, ptr, size as usize);
            let mut pos = 0usize;
            while pos < bytes.len() && out.len() < count {
                let (delta, consumed) = decode_varint(&bytes[pos..]).expect("accumulator chunk is well-formed");
                pos += consumed;
                if self.append_reset && delta == crate::types::RESET_MARKER {
                    last = 0;
                    continue;
                }
                last += delta;
                out.push(last);
            }
            ptr = next;
        }
        out
    }

    /// Number of distinct live terms.
    pub fn term_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// `hybridBucketSort` (§4.3): bucket terms by their first two bytes,
    /// then merge-sort within each bucket. With at most 65536 buckets over a
    /// flush-sized term set, most buckets hold a handful of terms, so the
    /// per-bucket sort is effectively linear overall.
    pub fn sorted_terms(&self) -> Vec<AccumulatedTerm> {
        const BUCKET_COUNT: usize = 65_536;
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); BUCKET_COUNT];
        for (idx, entry) in self.entries.iter().enumerate() {
            let Some(entry) = entry else { continue };
            let b = first_two_bytes_bucket(&entry.term);
            buckets[b].push(idx);
        }

        let mut out = Vec::with_capacity(self.term_count());
        for mut bucket in buckets {
            bucket.sort_by(|&a, &b| {
                self.entries[a].as_ref().unwrap().term.cmp(&self.entries[b].as_ref().unwrap().term)
            });
            for idx in bucket {
                let entry = self.entries[idx].as_ref().unwrap();
                out.push(AccumulatedTerm {
                    term: entry.term.clone(),
                    postings: self.decode_chain(entry.first_chunk, entry.number_of_postings as usize),
                });
            }
        }
        out
    }

    /// Release every term whose posting count is at least `threshold`
    /// (§4.3 `clear`), then reclaim the dead chunk bytes via `recompact`.
    pub fn clear(&mut self, threshold: u64) {
        let mut released = 0u64;
        for bucket in 0..HASHTABLE_SIZE {
            let mut prev: Option<usize> = None;
            let mut cur = self.buckets[bucket];
            while let Some(idx) = cur {
                let next = self.entries[idx].as_ref().unwrap().chain_next;
                if self.entries[idx].as_ref().unwrap().number_of_postings >= threshold {
                    released += self.entries[idx].as_ref().unwrap().memory_consumed;
                    match prev {
                        Some(p) => self.entries[p].as_mut().unwrap().chain_next = next,
                        None => self.buckets[bucket] = next,
                    }
                    self.entries[idx] = None;
                    self.free_entry_slots.push(idx);
                } else {
                    prev = Some(idx);
                }
                cur = next;
            }
        }
        self.total_memory = self.total_memory.saturating_sub(released);
        debug!(released, threshold, "accumulator clear");
        self.recompact();
    }

    /// The two-phase in-place defragmenter described in §4.3/§9.
    pub fn recompact(&mut self) {
        // Phase 1: clobber every live chunk's forward pointer with its
        // owning term's id.
        for (idx, entry) in self.entries.iter().enumerate() {
            let Some(entry) = entry else { continue };
            let mut ptr = entry.first_chunk;
            while ptr != NO_CHUNK {
                let (next, _) = read_header(&self.containers, ptr);
                write_next(&mut self.containers, ptr, encode_owner(idx));
                ptr = next;
            }
        }

        // Phase 2: sweep the arena front to back, relocating every
        // owner-tagged chunk and re-linking via each term's breadcrumb.
        for entry in self.entries.iter_mut().flatten() {
            entry.first_chunk = NO_CHUNK;
            entry.current_chunk = NO_CHUNK;
        }

        let mut new_containers = vec![Container::new()];
        for container_idx in 0..self.containers.len() {
            let used = self.containers[container_idx].used;
            let mut offset = 0usize;
            while offset < used {
                let ptr = pack_chunk_ptr(container_idx as u32, offset as u32);
                let (next_raw, size) = read_header(&self.containers, ptr);
                let total_len = CHUNK_HEADER_SIZE + size as usize;
                if let Some(owner) = decode_owner(next_raw) {
                    let new_ptr = {
                        let needed = total_len;
                        let last = new_containers.len() - 1;
                        let off = match new_containers[last].try_alloc(needed) {
                            Some(o) => o,
                            None => {
                                new_containers.push(Container::new());
                                new_containers.last_mut().unwrap().try_alloc(needed).unwrap()
                            }
                        };
                        let idx = new_containers.len() - 1;
                        pack_chunk_ptr(idx as u32, off as u32)
                    };
                    {
                        write_next(&mut new_containers, new_ptr, NO_CHUNK);
                        write_size(&mut new_containers, new_ptr, size);
                        let src = payload(&self.containers, ptr, size as usize).to_vec();
                        payload_mut(&mut new_containers, new_ptr)[..size as usize].copy_from_slice(&src);
                    }

                    let entry = self.entries[owner].as_mut().unwrap();
                    if entry.first_chunk == NO_CHUNK {
                        entry.first_chunk = new_ptr;
                    } else {
                        let prev_ptr = entry.current_chunk;
                        write_next(&mut new_containers, prev_ptr, new_ptr);
                    }
                    entry.current_chunk = new_ptr;
                    entry.size_of_current_chunk = size;
                    entry.capacity_of_current_chunk = size;
                }
                offset += total_len;
            }
        }

        self.containers = new_containers;
    }
}

fn first_two_bytes_bucket(term: &str) -> usize {
    let bytes = term.as_bytes();
    let b0 = bytes.first().copied().unwrap_or(0) as usize;
    let b1 = bytes.get(1).copied().unwrap_or(0) as usize;
    (b0 << 8) | b1
}

fn is_structural(term: &str) -> bool {
    term == structural::DOC_OPEN
        || term == structural::DOC_CLOSE
        || term == structural::FILE_MARKER
        || term.starts_with(structural::ANNOTATION_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulator() -> Accumulator {
        Accumulator::new(&Config::default())
    }

    #[test]
    fn single_term_roundtrip() {
        let mut acc = accumulator();
        for p in [10u64, 20, 30, 1000] {
            acc.add_posting("hello", p).unwrap();
        }
        assert_eq!(acc.postings_of("hello").unwrap(), vec![10, 20, 30, 1000]);
        assert!(acc.postings_of("missing").is_none());
    }

    #[test]
    fn many_terms_survive_chunk_growth() {
        let mut acc = accumulator();
        let postings: Vec<u64> = (0..5000).map(|i| i * 3).collect();
        for &p in &postings {
            acc.add_posting("frequent", p).unwrap();
        }
        assert_eq!(acc.postings_of("frequent").unwrap(), postings);
    }

    #[test]
    fn non_monotonic_posting_is_rejected_by_default() {
        let mut acc = accumulator();
        acc.add_posting("term", 10).unwrap();
        let err = acc.add_posting("term", 5).unwrap_err();
        assert!(matches!(err, WumpusError::InternalError(_)));
    }

    #[test]
    fn append_reset_allows_decreasing_postings() {
        let mut cfg = Config::default();
        cfg.append_reset = true;
        let mut acc = Accumulator::new(&cfg);
        acc.add_posting("term", 100).unwrap();
        acc.add_posting("term", 50).unwrap();
        acc.add_posting("term", 60).unwrap();
        assert_eq!(acc.postings_of("term").unwrap(), vec![100, 50, 60]);
    }

    #[test]
    fn recompact_preserves_all_live_postings() {
        let mut acc = accumulator();
        for t in 0..200 {
            let term = format!("term{t}");
            for p in 0..50 {
                acc.add_posting(&term, (t * 1000 + p) as u64).unwrap();
            }
        }
        acc.recompact();
        for t in 0..200 {
            let term = format!("term{t}");
            let expected: Vec<u64> = (0..50).map(|p| (t * 1000 + p) as u64).collect();
            assert_eq!(acc.postings_of(&term).unwrap(), expected);
        }
    }

    #[test]
    fn clear_releases_terms_past_threshold_and_keeps_the_rest() {
        let mut acc = accumulator();
        for p in 0..10 {
            acc.add_posting("big", p).unwrap();
        }
        for p in 0..3 {
            acc.add_posting("small", p).unwrap();
        }
        acc.clear(5);
        assert!(acc.postings_of("big").is_none());
        assert_eq!(acc.postings_of("small").unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn sorted_terms_are_in_lexicographic_order() {
        let mut acc = accumulator();
        for t in ["zebra", "apple", "mango", "apple_pie"] {
            acc.add_posting(t, 1).unwrap();
        }
        let sorted: Vec<String> = acc.sorted_terms().into_iter().map(|t| t.term).collect();
        let mut expected = sorted.clone();
        expected.sort();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn stemming_dual_indexes_both_surface_and_stem_forms() {
        let mut cfg = Config::default();
        cfg.stemming_level = StemmingLevel::Dual;
        let mut acc = Accumulator::new(&cfg);
        acc.add_posting("running", 1).unwrap();
        assert_eq!(acc.postings_of("running").unwrap(), vec![1]);
        assert_eq!(acc.postings_of("running$").unwrap(), vec![1]);
    }

    #[test]
    fn document_level_postings_encode_term_frequency() {
        let mut cfg = Config::default();
        cfg.doc_level_policy = DocLevelPolicy::Basic;
        let mut acc = Accumulator::new(&cfg);
        // A document-start offset large enough that its high bits survive
        // masking off the low DOC_LEVEL_MAX_TF_BITS bits used for TF.
        let doc_start: u64 = 1_000_000;
        acc.add_posting(structural::DOC_OPEN, doc_start).unwrap();
        acc.add_posting("a", doc_start + 1).unwrap();
        acc.add_posting("b", doc_start + 2).unwrap();
        acc.add_posting("a", doc_start + 3).unwrap();
        acc.add_posting(structural::DOC_CLOSE, doc_start + 4).unwrap();

        let doc_level_a = format!("{}a", structural::ANNOTATION_PREFIX);
        let postings = acc.postings_of(&doc_level_a).unwrap();
        assert_eq!(postings.len(), 1);
        let mask = (DOC_LEVEL_MAX_TF) as u64;
        assert_eq!(postings[0] & mask, 2);
        assert_eq!(postings[0] & !mask, doc_start & !mask);
    }
}
