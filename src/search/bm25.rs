// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! BM25 ranking (C8, §4.8).
//!
//! Inputs are a *container expression* — normally `("<doc>" .. "</doc>")`,
//! evaluated to one extent per document — and a weighted set of scoring
//! terms, each already resolved to its document-level posting list (TF
//! packed into the low `DOC_LEVEL_MAX_TF_BITS` bits per §4.3).
//!
//! A document-level posting's high bits identify which container it
//! belongs to, so matching postings to containers is a masked-equality
//! lookup rather than a containment scan: `posting & !mask == container.start
//! & !mask`. Aggregation keeps only the top `count` scores in a bounded
//! min-heap, so ranking a collection far larger than the requested result
//! count never holds more than `count` candidates in memory at once.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::types::{Extent, Posting, DOC_LEVEL_MAX_TF_BITS};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Bm25Params { k1: 1.2, b: 0.75 }
    }
}

/// One scoring term: its document-level postings (TF-encoded) and a query
/// weight (1.0 for an unweighted term).
pub struct ScoringTerm {
    pub term: String,
    pub postings: Vec<Posting>,
    pub weight: f64,
}

impl ScoringTerm {
    pub fn new(term: impl Into<String>, postings: Vec<Posting>) -> Self {
        ScoringTerm {
            term: term.into(),
            postings,
            weight: 1.0,
        }
    }

    pub fn weighted(term: impl Into<String>, postings: Vec<Posting>, weight: f64) -> Self {
        ScoringTerm {
            term: term.into(),
            postings,
            weight,
        }
    }

    /// Document frequency: the number of containers this term's
    /// document-level list touches. Document-level lists hold exactly one
    /// posting per document by construction (§4.3 `flush_document_window`),
    /// so this is simply the posting count.
    fn document_frequency(&self) -> u64 {
        self.postings.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Result {
    pub container: Extent,
    pub score: f64,
}

/// Order by score descending, then by container start ascending — the
/// "ties broken by document id order" rule of §4.8. `Bm25Result` doesn't
/// implement `Ord` directly since `f64` isn't `Ord`; this wrapper exists
/// only to drive the bounded min-heap below.
struct HeapEntry(Bm25Result);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.score == other.0.score && self.0.container.start == other.0.container.start
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    /// Reversed so `BinaryHeap` (a max-heap) pops the *worst* survivor
    /// first, which is what a bounded top-k min-heap needs.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .score
            .partial_cmp(&self.0.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.0.container.start.cmp(&other.0.container.start))
    }
}

/// Rank every container in `containers` against `terms`, keeping only the
/// top `count` by score (ties broken by ascending document/container id).
///
/// `total_documents` is `N` in the IDF formula; callers normally pass
/// `containers.len()` but may pass a larger corpus-wide count when
/// `containers` is itself a pre-filtered subset.
pub fn rank(
    containers: &[Extent],
    terms: &[ScoringTerm],
    total_documents: u64,
    params: Bm25Params,
    count: usize,
) -> Vec<Bm25Result> {
    if containers.is_empty() || terms.is_empty() || count == 0 {
        return Vec::new();
    }

    let mask: Posting = (1u64 << DOC_LEVEL_MAX_TF_BITS) - 1;
    let container_by_key: HashMap<Posting, Extent> = containers
        .iter()
        .map(|&c| (c.start & !mask, c))
        .collect();

    let total_len: u64 = containers.iter().map(|c| c.len()).sum();
    let avg_doc_len = if containers.is_empty() {
        1.0
    } else {
        (total_len as f64 / containers.len() as f64).max(1.0)
    };

    let idfs: Vec<f64> = terms
        .iter()
        .map(|t| idf(total_documents, t.document_frequency()))
        .collect();

    let mut scores: HashMap<Posting, f64> = HashMap::new();
    for (term, term_idf) in terms.iter().zip(idfs.iter()) {
        for &posting in &term.postings {
            let key = posting & !mask;
            let Some(&container) = container_by_key.get(&key) else {
                continue;
            };
            let tf = (posting & mask) as f64;
            if tf <= 0.0 {
                continue;
            }
            let doc_len = container.len() as f64;
            let denom = tf + params.k1 * (1.0 - params.b + params.b * doc_len / avg_doc_len);
            let contribution = term.weight * term_idf * (tf * (params.k1 + 1.0)) / denom;
            *scores.entry(key).or_insert(0.0) += contribution;
        }
    }

    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(count + 1);
    for (key, score) in scores {
        if score <= 0.0 {
            continue;
        }
        let container = container_by_key[&key];
        heap.push(HeapEntry(Bm25Result { container, score }));
        if heap.len() > count {
            heap.pop();
        }
    }

    let mut results: Vec<Bm25Result> = heap.into_iter().map(|e| e.0).collect();
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.container.start.cmp(&b.container.start))
    });
    results
}

/// `ln(1 + (N - df + 0.5) / (df + 0.5))`, the smoothed Robertson IDF: always
/// positive, unlike the raw Robertson-Sparck-Jones form which goes negative
/// for terms in more than half the collection.
fn idf(total_documents: u64, document_frequency: u64) -> f64 {
    let n = total_documents as f64;
    let df = document_frequency as f64;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

/// `queryID Q0 docid rank score runID`, the TREC-style result line of §4.8.
/// `docid` is the caller's resolved document identifier (this module only
/// knows about containers, not filenames), 1-based `rank`.
pub fn format_result_line(
    query_id: &str,
    docid: &str,
    rank: usize,
    score: f64,
    run_id: &str,
) -> String {
    format!("{query_id} Q0 {docid} {rank} {score:.4} {run_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(start: u64, end: u64) -> Extent {
        Extent::new(start, end)
    }

    fn doc_posting(doc_start: u64, tf: u64) -> Posting {
        let mask: Posting = (1u64 << DOC_LEVEL_MAX_TF_BITS) - 1;
        (doc_start & !mask) | tf
    }

    #[test]
    fn higher_tf_ranks_first() {
        // doc1: "a b c" (a:1); doc2: "a a c" (a:2). Query "a".
        let d1 = doc(1_000_000, 1_000_002);
        let d2 = doc(2_000_000, 2_000_002);
        let terms = vec![ScoringTerm::new(
            "a",
            vec![doc_posting(d1.start, 1), doc_posting(d2.start, 2)],
        )];
        let results = rank(&[d1, d2], &terms, 2, Bm25Params::default(), 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].container, d2);
        assert_eq!(results[1].container, d1);
        assert!(results[0].score > results[1].score);
        assert!(results[0].score > 0.0);
        assert!(results[1].score > 0.0);
    }

    #[test]
    fn count_bounds_the_result_set() {
        let containers: Vec<Extent> = (0..100)
            .map(|i| doc(i * 1_000_000, i * 1_000_000 + 2))
            .collect();
        let postings: Vec<Posting> = containers.iter().map(|c| doc_posting(c.start, 1)).collect();
        let terms = vec![ScoringTerm::new("x", postings)];
        let results = rank(&containers, &terms, 100, Bm25Params::default(), 5);
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn absent_term_yields_no_results() {
        let d1 = doc(0, 2);
        let terms = vec![ScoringTerm::new("nowhere", vec![])];
        let results = rank(&[d1], &terms, 1, Bm25Params::default(), 10);
        assert!(results.is_empty());
    }

    #[test]
    fn result_line_matches_trec_format() {
        let line = format_result_line("Q1", "doc42", 1, 3.14159, "run-a");
        assert_eq!(line, "Q1 Q0 doc42 1 3.1416 run-a");
    }

    #[test]
    fn idf_never_goes_negative_for_ubiquitous_terms() {
        assert!(idf(10, 10) > 0.0);
        assert!(idf(1_000_000, 1_000_000) > 0.0);
    }
}
