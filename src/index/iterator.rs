// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! `IndexIterator` and the merger (C6, §4.6): the unified sorted stream over
//! any index source, and the machinery that folds several of them back into
//! one.
//!
//! Every concrete source this core has (the accumulator's `sorted_terms`,
//! `v1`/`v2` readers dumped in dictionary order, `InPlaceIndex`) already
//! materializes a term's full posting list rather than streaming it
//! segment-by-segment, so `IndexIterator` here is the same contract
//! simplified to that shape: `next_term` returns a term's complete,
//! decompressed posting list instead of separate
//! header/compressed-bytes/uncompressed-bytes accessors. `skip_next` is a
//! `next_term` whose result is dropped.
//!
//! `MultipleIndexIterator` is the tournament merge: at each step it picks
//! the lexicographically smallest term among its sources and concatenates
//! every source that currently holds it, in the order the sources were
//! given. Callers must supply sources oldest-partition-first — invariant 4
//! of §3 (global monotonicity across partitions) depends on that order,
//! since this core never reorders postings within a term, only
//! concatenates.

use crate::error::Result;
use crate::types::{Extent, Posting};

/// One term's complete posting list, as yielded by `IndexIterator::next_term`.
#[derive(Debug, Clone)]
pub struct TermPostings {
    pub term: String,
    pub postings: Vec<Posting>,
}

pub trait IndexIterator {
    fn has_next(&self) -> bool;
    fn peek_term(&self) -> Option<&str>;
    fn next_term(&mut self) -> Option<TermPostings>;

    fn skip_next(&mut self) {
        self.next_term();
    }
}

/// Adapts any already-sorted `Vec<(term, postings)>` (the shape every
/// concrete source in this core produces) into an `IndexIterator`.
pub struct VecIndexIterator {
    rest: std::vec::IntoIter<(String, Vec<Posting>)>,
    peeked: Option<(String, Vec<Posting>)>,
}

impl VecIndexIterator {
    pub fn new(terms: Vec<(String, Vec<Posting>)>) -> Self {
        let mut rest = terms.into_iter();
        let peeked = rest.next();
        VecIndexIterator { rest, peeked }
    }
}

impl IndexIterator for VecIndexIterator {
    fn has_next(&self) -> bool {
        self.peeked.is_some()
    }

    fn peek_term(&self) -> Option<&str> {
        self.peeked.as_ref().map(|(t, _)| t.as_str())
    }

    fn next_term(&mut self) -> Option<TermPostings> {
        let (term, postings) = self.peeked.take()?;
        self.peeked = self.rest.next();
        Some(TermPostings { term, postings })
    }
}

/// Tournament-merge over N sources, oldest partition first (see module
/// docs for why the order matters).
pub struct MultipleIndexIterator {
    sources: Vec<Box<dyn IndexIterator>>,
}

impl MultipleIndexIterator {
    pub fn new(sources: Vec<Box<dyn IndexIterator>>) -> Self {
        MultipleIndexIterator { sources }
    }
}

impl IndexIterator for MultipleIndexIterator {
    fn has_next(&self) -> bool {
        self.sources.iter().any(|s| s.has_next())
    }

    fn peek_term(&self) -> Option<&str> {
        self.sources.iter().filter_map(|s| s.peek_term()).min()
    }

    fn next_term(&mut self) -> Option<TermPostings> {
        let min_term = self.peek_term()?.to_string();
        let mut combined = Vec::new();
        for src in self.sources.iter_mut() {
            if src.peek_term() == Some(min_term.as_str()) {
                if let Some(tp) = src.next_term() {
                    combined.extend(tp.postings);
                }
            }
        }
        Some(TermPostings {
            term: min_term,
            postings: combined,
        })
    }
}

/// `Merger` (§4.6): drains an `IndexIterator` into a sink, optionally
/// filtering against a GC visibility set, optionally routing long lists to
/// a separate target, and optionally yielding cooperatively for
/// low-priority background merges.
pub struct Merger;

impl Merger {
    /// Preferred (non-GC) path: everything the iterator yields goes to
    /// `sink` untouched.
    pub fn merge_indices(
        mut iterator: impl IndexIterator,
        mut sink: impl FnMut(&str, &[Posting]) -> Result<()>,
    ) -> Result<()> {
        while let Some(tp) = iterator.next_term() {
            sink(&tp.term, &tp.postings)?;
        }
        Ok(())
    }

    /// GC path: `mergeIndicesWithGarbageCollection`. `visible` is the set of
    /// extents still reachable after a `@removefile`; every posting outside
    /// all of them is dropped. Terms that end up empty are skipped
    /// entirely rather than written with zero postings.
    pub fn merge_indices_with_gc(
        mut iterator: impl IndexIterator,
        visible: &[Extent],
        mut sink: impl FnMut(&str, &[Posting]) -> Result<()>,
    ) -> Result<()> {
        let interval_start: Vec<Posting> = visible.iter().map(|e| e.start).collect();
        let interval_end: Vec<Posting> = visible.iter().map(|e| e.end).collect();
        while let Some(tp) = iterator.next_term() {
            let filtered = filter_postings_against_intervals(&tp.postings, &interval_start, &interval_end);
            if !filtered.is_empty() {
                sink(&tp.term, &filtered)?;
            }
        }
        Ok(())
    }

    /// Routes each term to `long_sink` (destined for the in-place store) or
    /// `short_sink` (destined for a compact partition) per §4.6
    /// `mergeWithLongTarget`: a term goes long if its merged byte footprint
    /// crosses `long_list_threshold`, or if it already lives in the
    /// in-place store (`already_long`).
    pub fn merge_with_long_target(
        mut iterator: impl IndexIterator,
        long_list_threshold: u64,
        already_long: impl Fn(&str) -> bool,
        mut long_sink: impl FnMut(&str, &[Posting]) -> Result<()>,
        mut short_sink: impl FnMut(&str, &[Posting]) -> Result<()>,
    ) -> Result<()> {
        while let Some(tp) = iterator.next_term() {
            // Rough on-disk footprint estimate: vbyte deltas rarely exceed
            // 2 bytes/posting in practice, but the threshold only needs to
            // be a stable, monotonic proxy for list size, not an exact
            // byte count.
            let estimated_bytes = tp.postings.len() as u64 * 2;
            if estimated_bytes >= long_list_threshold || already_long(&tp.term) {
                long_sink(&tp.term, &tp.postings)?;
            } else {
                short_sink(&tp.term, &tp.postings)?;
            }
        }
        Ok(())
    }

    /// Low-priority mode (§4.6/§5): between terms, poll
    /// `yield_if_queries_active`; if it reports a foreign query is running,
    /// flush the target's partial write cache and sleep briefly before
    /// continuing, so a concurrent reader never sees a half-written
    /// in-flight buffer.
    pub fn low_priority_merge(
        mut iterator: impl IndexIterator,
        mut sink: impl FnMut(&str, &[Posting]) -> Result<()>,
        mut yield_if_queries_active: impl FnMut() -> bool,
        mut flush_partial_write_cache: impl FnMut(),
        sleep: impl Fn(std::time::Duration),
    ) -> Result<()> {
        while let Some(tp) = iterator.next_term() {
            sink(&tp.term, &tp.postings)?;
            if yield_if_queries_active() {
                flush_partial_write_cache();
                sleep(std::time::Duration::from_millis(10));
            }
        }
        Ok(())
    }
}

/// `filterPostingsAgainstIntervals` (§4.6, §9): the galloping/co-sequential
/// hybrid is the only live algorithm upstream, so it's the only one
/// implemented here (binary-search variant omitted per §9's "retain only
/// if benchmarks justify"). `starts`/`ends` are parallel, sorted,
/// non-overlapping interval bounds.
fn filter_postings_against_intervals(postings: &[Posting], starts: &[Posting], ends: &[Posting]) -> Vec<Posting> {
    let mut out = Vec::with_capacity(postings.len());
    let mut j = 0usize;
    for &p in postings {
        while j < starts.len() && ends[j] < p {
            j += 1;
        }
        if j < starts.len() && starts[j] <= p && p <= ends[j] {
            out.push(p);
        }
    }
    out
}
