// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Extent lists: the algebra GCL queries (§4.2, C2) are built from.
//!
//! An extent list is a sequence of `(start, end)` intervals with `start`
//! strictly increasing. The operator set is closed: `empty`, `singleton`,
//! `postings` (lift a raw posting list into one-token extents), `and`
//! (co-sequential intersection), `or` (k-way merge, with a document-level
//! TF-coalescing fast path), `contained_in`/`contains` (containment
//! filters), `sequence` (adjacency).
//!
//! Malformed operands collapse to `empty` rather than panicking or
//! propagating an error — extent evaluation is a hot path and a
//! mis-constructed subtree shouldn't take the whole query down with it
//! (§4.2 "failure model").
//!
//! This implementation materializes each node's extents eagerly rather than
//! truly streaming them; the public contract (`first_start_geq`,
//! `last_end_leq`, positional access) is the same shape either way, and the
//! corpus this core targets keeps individual extent lists small enough
//! (bounded by a document's posting range) that the simplification doesn't
//! change the asymptotic behavior that matters for query latency.

use crate::types::{Extent, Posting};

#[derive(Debug, Clone)]
pub enum ExtentList {
    Empty,
    Singleton(Extent),
    Postings(Vec<Extent>),
    And(Box<ExtentList>, Box<ExtentList>),
    Or(Vec<ExtentList>),
    ContainedIn(Box<ExtentList>, Box<ExtentList>),
    Contains(Box<ExtentList>, Box<ExtentList>),
    Sequence(Box<ExtentList>, Box<ExtentList>),
}

impl ExtentList {
    pub fn empty() -> Self {
        ExtentList::Empty
    }

    pub fn singleton(constant: Posting) -> Self {
        ExtentList::Singleton(Extent::new(constant, constant))
    }

    /// Lift a raw, strictly-increasing posting list into single-token
    /// extents `(p, p)`.
    pub fn from_postings(postings: &[Posting]) -> Self {
        if postings.is_empty() {
            return ExtentList::Empty;
        }
        ExtentList::Postings(postings.iter().map(|&p| Extent::new(p, p)).collect())
    }

    pub fn and(a: ExtentList, b: ExtentList) -> Self {
        match (&a, &b) {
            (ExtentList::Empty, _) | (_, ExtentList::Empty) => ExtentList::Empty,
            _ => ExtentList::And(Box::new(a), Box::new(b)),
        }
    }

    /// `or` over a single child collapses to that child (§4.2 optimizer).
    pub fn or(mut children: Vec<ExtentList>) -> Self {
        children.retain(|c| !matches!(c, ExtentList::Empty));
        match children.len() {
            0 => ExtentList::Empty,
            1 => children.into_iter().next().unwrap(),
            _ => ExtentList::Or(children),
        }
    }

    pub fn contained_in(inner: ExtentList, outer: ExtentList) -> Self {
        match (&inner, &outer) {
            (ExtentList::Empty, _) | (_, ExtentList::Empty) => ExtentList::Empty,
            _ => ExtentList::ContainedIn(Box::new(inner), Box::new(outer)),
        }
    }

    pub fn contains(outer: ExtentList, inner: ExtentList) -> Self {
        match (&outer, &inner) {
            (ExtentList::Empty, _) | (_, ExtentList::Empty) => ExtentList::Empty,
            _ => ExtentList::Contains(Box::new(outer), Box::new(inner)),
        }
    }

    pub fn sequence(a: ExtentList, b: ExtentList) -> Self {
        match (&a, &b) {
            (ExtentList::Empty, _) | (_, ExtentList::Empty) => ExtentList::Empty,
            _ => ExtentList::Sequence(Box::new(a), Box::new(b)),
        }
    }

    /// Materialize the full extent sequence, evaluating operators bottom-up.
    pub fn to_vec(&self) -> Vec<Extent> {
        match self {
            ExtentList::Empty => Vec::new(),
            ExtentList::Singleton(e) => vec![*e],
            ExtentList::Postings(v) => v.clone(),
            ExtentList::And(a, b) => and_extents(&a.to_vec(), &b.to_vec()),
            ExtentList::Or(children) => {
                let materialized: Vec<Vec<Extent>> = children.iter().map(|c| c.to_vec()).collect();
                if is_document_level_union(&materialized) {
                    or_document_level(&materialized)
                } else {
                    or_merge(&materialized)
                }
            }
            ExtentList::ContainedIn(inner, outer) => {
                contained_in_extents(&inner.to_vec(), &outer.to_vec())
            }
            ExtentList::Contains(outer, inner) => {
                contains_extents(&outer.to_vec(), &inner.to_vec())
            }
            ExtentList::Sequence(a, b) => sequence_extents(&a.to_vec(), &b.to_vec()),
        }
    }

    pub fn length(&self) -> usize {
        self.to_vec().len()
    }

    pub fn total_size(&self) -> u64 {
        self.to_vec().iter().map(|e| e.len()).sum()
    }

    /// Smallest extent whose `start >= p`, or `None`.
    pub fn first_start_geq(&self, p: Posting) -> Option<Extent> {
        let v = self.to_vec();
        let idx = v.partition_point(|e| e.start < p);
        v.get(idx).copied()
    }

    /// Largest extent whose `end <= p`, or `None`.
    pub fn last_end_leq(&self, p: Posting) -> Option<Extent> {
        let v = self.to_vec();
        v.iter().rev().find(|e| e.end <= p).copied()
    }

    /// Rough selectivity estimate for the query optimizer's join ordering:
    /// smaller extent count first tends to prune an `and` faster.
    pub fn selectivity_hint(&self) -> usize {
        match self {
            ExtentList::Empty => 0,
            ExtentList::Singleton(_) => 1,
            ExtentList::Postings(v) => v.len(),
            ExtentList::And(a, b) => a.selectivity_hint().min(b.selectivity_hint()),
            ExtentList::Or(cs) => cs.iter().map(|c| c.selectivity_hint()).sum(),
            ExtentList::ContainedIn(inner, _) => inner.selectivity_hint(),
            ExtentList::Contains(outer, _) => outer.selectivity_hint(),
            ExtentList::Sequence(a, b) => a.selectivity_hint().min(b.selectivity_hint()),
        }
    }
}

/// Co-sequential intersection: an extent of `a` survives if some extent of
/// `b` starts at exactly the same position (used for e.g. `"a" && "b"` at
/// the same token position is never meaningful; this operator is really
/// used to intersect two extent lists describing the same underlying
/// region, such as a term restricted to a field).
fn and_extents(a: &[Extent], b: &[Extent]) -> Vec<Extent> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].start == b[j].start && a[i].end == b[j].end {
            out.push(a[i]);
            i += 1;
            j += 1;
        } else if a[i].start < b[j].start {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

/// k-way merge by `start`, de-duplicating identical extents.
fn or_merge(lists: &[Vec<Extent>]) -> Vec<Extent> {
    let mut indices = vec![0usize; lists.len()];
    let mut out = Vec::new();
    loop {
        let mut best: Option<(usize, Extent)> = None;
        for (li, list) in lists.iter().enumerate() {
            if let Some(&e) = list.get(indices[li]) {
                if best.is_none() || e < best.unwrap().1 {
                    best = Some((li, e));
                }
            }
        }
        match best {
            None => break,
            Some((li, e)) => {
                indices[li] += 1;
                if out.last() != Some(&e) {
                    out.push(e);
                }
            }
        }
    }
    out
}

/// Detects whether every child extent list looks like document-level
/// postings: single-token extents whose low `DOC_LEVEL_MAX_TF_BITS` bits
/// carry a TF rather than real structural width. We can't see the encoding
/// decision here, so the heuristic is: every extent in every child is a
/// singleton (`start == end`) — the shape document-level postings always
/// take. A pure extent-width check; callers that need exact semantics
/// should route through `crate::search::bm25` instead, which has access to
/// the original postings and doesn't need to guess.
fn is_document_level_union(lists: &[Vec<Extent>]) -> bool {
    lists.len() > 1 && lists.iter().all(|l| l.iter().all(|e| e.start == e.end))
}

/// Specialized doc-level merge: a document-level posting packs the
/// document's identity into its high bits and a term frequency into its low
/// `DOC_LEVEL_MAX_TF_BITS` bits (§4.3), so two terms appearing in the same
/// document produce postings that agree on the high bits and differ only in
/// the TF field. Coalesce those into one posting per document, combining the
/// TF fields with a logical OR, instead of emitting one row per contributing
/// term.
fn or_document_level(lists: &[Vec<Extent>]) -> Vec<Extent> {
    use crate::types::DOC_LEVEL_MAX_TF_BITS;
    use std::collections::BTreeMap;
    let mask: Posting = (1u64 << DOC_LEVEL_MAX_TF_BITS) - 1;
    let mut merged: BTreeMap<Posting, Posting> = BTreeMap::new();
    for list in lists {
        for e in list {
            let doc_key = e.start & !mask;
            let tf = e.start & mask;
            merged.entry(doc_key).and_modify(|acc| *acc |= tf).or_insert(tf);
        }
    }
    merged
        .into_iter()
        .map(|(doc_key, tf)| {
            let p = doc_key | tf;
            Extent::new(p, p)
        })
        .collect()
}

/// `containedIn(inner, outer)`: inner extents fully inside an outer extent.
fn contained_in_extents(inner: &[Extent], outer: &[Extent]) -> Vec<Extent> {
    let mut out = Vec::new();
    let mut oi = 0usize;
    for &e in inner {
        while oi < outer.len() && outer[oi].end < e.start {
            oi += 1;
        }
        if oi < outer.len() && outer[oi].contains(&e) {
            out.push(e);
        }
    }
    out
}

/// `contains(outer, inner)`: outer extents that contain at least one inner
/// extent.
fn contains_extents(outer: &[Extent], inner: &[Extent]) -> Vec<Extent> {
    let mut out = Vec::new();
    let mut ii = 0usize;
    for &o in outer {
        while ii < inner.len() && inner[ii].start < o.start {
            ii += 1;
        }
        if ii < inner.len() && inner[ii].end <= o.end && inner[ii].start >= o.start {
            out.push(o);
        }
    }
    out
}

/// `sequence(a, b)`: extents of `a` immediately followed by an extent of
/// `b` (`b.start == a.end + 1`), producing the merged span.
fn sequence_extents(a: &[Extent], b: &[Extent]) -> Vec<Extent> {
    let mut out = Vec::new();
    let mut bi = 0usize;
    for &ea in a {
        while bi < b.len() && b[bi].start <= ea.end {
            bi += 1;
        }
        if bi < b.len() && b[bi].start == ea.end + 1 {
            out.push(Extent::new(ea.start, b[bi].end));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn or_single_child_collapses() {
        let single = ExtentList::from_postings(&[1, 2, 3]);
        let wrapped = ExtentList::or(vec![single.clone()]);
        assert_eq!(wrapped.to_vec(), single.to_vec());
        assert!(!matches!(wrapped, ExtentList::Or(_)));
    }

    #[test]
    fn or_merges_and_dedups() {
        let a = ExtentList::from_postings(&[1, 3, 5]);
        let b = ExtentList::from_postings(&[3, 4]);
        let merged = ExtentList::or(vec![a, b]).to_vec();
        assert_eq!(
            merged,
            vec![
                Extent::new(1, 1),
                Extent::new(3, 3),
                Extent::new(4, 4),
                Extent::new(5, 5),
            ]
        );
    }

    #[test]
    fn contained_in_filters_to_inner_extents() {
        let inner = ExtentList::from_postings(&[5, 15, 25]);
        let outer = ExtentList::Postings(vec![Extent::new(0, 10), Extent::new(20, 30)]);
        let result = ExtentList::contained_in(inner, outer).to_vec();
        assert_eq!(result, vec![Extent::new(5, 5), Extent::new(25, 25)]);
    }

    #[test]
    fn sequence_requires_immediate_adjacency() {
        let a = ExtentList::Postings(vec![Extent::new(10, 10)]);
        let b = ExtentList::Postings(vec![Extent::new(11, 11)]);
        let result = ExtentList::sequence(a, b).to_vec();
        assert_eq!(result, vec![Extent::new(10, 11)]);

        let a = ExtentList::Postings(vec![Extent::new(10, 10)]);
        let b = ExtentList::Postings(vec![Extent::new(12, 12)]);
        let result = ExtentList::sequence(a, b).to_vec();
        assert!(result.is_empty());
    }

    #[test]
    fn malformed_operands_yield_empty() {
        let e = ExtentList::and(ExtentList::Empty, ExtentList::from_postings(&[1, 2]));
        assert!(e.to_vec().is_empty());
    }

    #[test]
    fn doc_level_or_coalesces_tf_fields() {
        use crate::types::DOC_LEVEL_MAX_TF_BITS;
        // Two terms both appearing in document 100, with TF bits 0b01 and 0b10.
        let doc = 100u64 << DOC_LEVEL_MAX_TF_BITS;
        let a = ExtentList::Postings(vec![Extent::new(doc | 0b01, doc | 0b01)]);
        let b = ExtentList::Postings(vec![Extent::new(doc | 0b10, doc | 0b10)]);
        let merged = ExtentList::or(vec![a, b]).to_vec();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].start, doc | 0b11);
    }
}
