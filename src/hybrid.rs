// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! `HybridManager` (C7, §4.7): the partition manager sitting on top of the
//! accumulator, the short-lived compact partitions, and the long-list
//! in-place store.
//!
//! Every update lands in the accumulator first. Once its footprint crosses
//! `MAX_UPDATE_SPACE`, a flush decision runs: either a full flush (new
//! terms become a fresh V1/V2 partition, long terms route straight into
//! the in-place store) or, when `PARTIAL_FLUSH=auto` and a recent merge
//! duration is on record, a partial flush that evicts only the
//! accumulator's heaviest terms into the in-place store and postpones the
//! full merge if that freed enough memory.
//!
//! Reads fan out across all three tiers via `get_updates`, honoring the
//! contiguous-update invariant (§4.7): once a term has been promoted to the
//! in-place store, every later update for it goes there too, so a
//! non-empty in-place hit means the short partitions have nothing left to
//! contribute for that term.

use std::time::Duration;

use tracing::{debug, info};

use crate::accumulator::Accumulator;
use crate::config::{Config, PartialFlush, UpdateStrategy};
use crate::error::Result;
use crate::index::inplace::{GrowthPolicy, InPlaceIndex};
use crate::index::iterator::{IndexIterator, Merger, VecIndexIterator};
use crate::index::{v1, v2};
use crate::types::{PartitionId, Posting};

/// Upper bound on the number of short compact partitions this manager keeps
/// before a full merge is forced regardless of `UpdateStrategy` (§4.7).
pub const MAX_COMPACTINDEX_COUNT: usize = 20;

/// Crude average bytes/posting used to translate the partial-flush memory
/// threshold into a posting-count cutoff the accumulator's `clear` already
/// understands — vbyte deltas average well under this in practice, so the
/// estimate only ever flushes fewer terms than the ideal byte-exact policy,
/// never more.
const AVG_BYTES_PER_POSTING: u64 = 4;

/// Budget, in wall-clock time, that a partial flush is allowed to spend
/// before the next full merge would have been due anyway (§4.7).
const PARTIAL_FLUSH_BUDGET: Duration = Duration::from_millis(30);

/// Fraction of accumulator memory a partial flush must free to count as a
/// success and postpone the heavy merge.
const PARTIAL_FLUSH_SUCCESS_FRACTION: f64 = 0.15;

enum PartitionReader {
    V1(v1::Reader),
    V2(v2::Reader),
}

impl PartitionReader {
    fn get_postings(&self, term: &str) -> Result<Option<Vec<Posting>>> {
        match self {
            PartitionReader::V1(r) => r.get_postings(term),
            PartitionReader::V2(r) => r.get_postings(term),
        }
    }

    fn get_postings_for_wildcard(&self, pattern: &str) -> Result<Vec<(String, Vec<Posting>)>> {
        match self {
            PartitionReader::V1(r) => r.get_postings_for_wildcard(pattern),
            PartitionReader::V2(r) => r.get_postings_for_wildcard(pattern),
        }
    }

    fn iter_all(&self) -> Result<Vec<(String, Vec<Posting>)>> {
        match self {
            PartitionReader::V1(r) => r.iter_all(),
            PartitionReader::V2(r) => r.iter_all(),
        }
    }

    fn term_count(&self) -> u64 {
        match self {
            PartitionReader::V1(r) => r.term_count,
            PartitionReader::V2(r) => r.term_count,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        match self {
            PartitionReader::V1(r) => r.as_bytes(),
            PartitionReader::V2(r) => r.as_bytes(),
        }
    }
}

/// One short partition, oldest partitions sorted first in
/// `HybridManager::partitions`.
struct Partition {
    id: PartitionId,
    reader: PartitionReader,
}

/// On-disk format a full flush writes new partitions in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionFormat {
    V1,
    V2,
}

pub struct HybridManager {
    config: Config,
    accumulator: Accumulator,
    in_place: InPlaceIndex,
    partitions: Vec<Partition>,
    next_partition_id: u32,
    partition_format: PartitionFormat,
    /// Duration of the last full merge, used by the partial-flush heuristic.
    /// `None` until the first full flush has happened.
    last_merge_duration: Option<Duration>,
}

impl HybridManager {
    pub fn new(config: Config, partition_format: PartitionFormat) -> Self {
        let growth_policy = GrowthPolicy::Relocate;
        let compression_mode = config.compression_mode;
        HybridManager {
            accumulator: Accumulator::new(&config),
            in_place: InPlaceIndex::new(compression_mode, growth_policy),
            partitions: Vec::new(),
            next_partition_id: 0,
            partition_format,
            last_merge_duration: None,
            config,
        }
    }

    pub fn add_posting(&mut self, term: &str, posting: Posting) -> Result<()> {
        self.accumulator.add_posting(term, posting)?;
        if self.accumulator.total_memory() >= self.config.max_update_space {
            self.flush_decision()?;
        }
        Ok(())
    }

    /// §4.7's flush decision: try a partial flush first (if configured and a
    /// prior merge duration is on record); fall back to a full flush when
    /// the partial flush doesn't free enough memory, or isn't applicable.
    pub fn flush_decision(&mut self) -> Result<()> {
        if self.config.partial_flush == PartialFlush::Auto {
            if self.try_partial_flush()? {
                return Ok(());
            }
        }
        self.full_flush()
    }

    /// Evicts the accumulator's heaviest terms directly into the in-place
    /// store. Returns `true` if it freed at least
    /// `PARTIAL_FLUSH_SUCCESS_FRACTION` of the accumulator's memory, in
    /// which case the caller should postpone the full merge.
    fn try_partial_flush(&mut self) -> Result<bool> {
        let Some(last_merge) = self.last_merge_duration else {
            return Ok(false);
        };
        if last_merge.is_zero() {
            return Ok(false);
        }

        let real_mem = self.accumulator.total_memory();
        let pf_threshold_bytes =
            (real_mem as f64 * PARTIAL_FLUSH_BUDGET.as_secs_f64() / last_merge.as_secs_f64()) as u64;
        let pf_threshold_postings = (pf_threshold_bytes / AVG_BYTES_PER_POSTING).max(1);

        let before = real_mem;
        let mut flushed_any = false;
        for term in self.accumulator.sorted_terms() {
            if term.postings.len() as u64 >= pf_threshold_postings {
                self.in_place.add_postings(&term.term, &term.postings)?;
                flushed_any = true;
            }
        }
        if !flushed_any {
            return Ok(false);
        }
        self.in_place.finish_update()?;
        self.accumulator.clear(pf_threshold_postings);

        let after = self.accumulator.total_memory();
        let freed = before.saturating_sub(after);
        let success = before > 0 && (freed as f64 / before as f64) >= PARTIAL_FLUSH_SUCCESS_FRACTION;
        debug!(before, after, freed, success, "partial flush");
        Ok(success)
    }

    /// Routes every accumulator term to either the in-place store (long
    /// lists, per `LONG_LIST_THRESHOLD`) or a brand-new short partition,
    /// then resets the accumulator. Triggers a partition merge first if
    /// `UPDATE_STRATEGY`/`MAX_COMPACTINDEX_COUNT` calls for one.
    pub fn full_flush(&mut self) -> Result<()> {
        let started = std::time::Instant::now();

        let terms = self.accumulator.sorted_terms();
        let iterator = VecIndexIterator::new(terms.into_iter().map(|t| (t.term, t.postings)).collect());

        let mut short_terms: Vec<(String, Vec<Posting>)> = Vec::new();
        // Snapshotted up front: `long_sink` below needs `&mut self.in_place`,
        // which would otherwise conflict with a live `&self.in_place` borrow
        // inside this closure for the whole call.
        let already_long_terms = self.in_place.term_names();
        let already_long = |term: &str| already_long_terms.contains(term);
        Merger::merge_with_long_target(
            iterator,
            self.config.long_list_threshold,
            already_long,
            |term, postings| self.in_place.add_postings(term, postings),
            |term, postings| {
                short_terms.push((term.to_string(), postings.to_vec()));
                Ok(())
            },
        )?;
        self.in_place.finish_update()?;

        if !short_terms.is_empty() {
            self.write_partition(short_terms)?;
        }

        self.accumulator = Accumulator::new(&self.config);
        self.last_merge_duration = Some(started.elapsed());

        if self.should_merge_partitions() {
            self.merge_partitions()?;
        }
        Ok(())
    }

    fn write_partition(&mut self, terms: Vec<(String, Vec<Posting>)>) -> Result<()> {
        let id = PartitionId(self.next_partition_id);
        self.next_partition_id += 1;

        let reader = match self.partition_format {
            PartitionFormat::V1 => {
                let mut writer = v1::Writer::new(Vec::new(), self.config.compression_mode);
                for (term, postings) in &terms {
                    writer.add_term(term, postings)?;
                }
                let bytes = writer.finish()?;
                PartitionReader::V1(v1::Reader::from_bytes(bytes)?)
            }
            PartitionFormat::V2 => {
                let mut writer = v2::Writer::new(Vec::new(), self.config.compression_mode);
                for (term, postings) in &terms {
                    writer.add_term(term, postings)?;
                }
                let bytes = writer.finish()?;
                PartitionReader::V2(v2::Reader::from_bytes(bytes)?)
            }
        };
        info!(partition = id.0, terms = terms.len(), "published new partition");
        self.partitions.push(Partition { id, reader });
        Ok(())
    }

    /// `UPDATE_STRATEGY` policies (§4.7):
    /// - `Immediate`: merge on every flush.
    /// - `Log`: merge once partition count reaches the next power of two.
    /// - `Sqrt`: merge once partition count reaches its own square root
    ///   (amortizes merges over roughly `sqrt(n)` flushes).
    /// Either way, `MAX_COMPACTINDEX_COUNT` is a hard ceiling.
    fn should_merge_partitions(&self) -> bool {
        let n = self.partitions.len();
        if n >= MAX_COMPACTINDEX_COUNT {
            return true;
        }
        if n < 2 {
            return false;
        }
        match self.config.update_strategy {
            UpdateStrategy::Immediate => true,
            UpdateStrategy::Log => n.is_power_of_two(),
            UpdateStrategy::Sqrt => (n as f64).sqrt().fract() < f64::EPSILON,
        }
    }

    /// Folds every short partition into one, oldest-first so postings stay
    /// monotonic, then replaces `self.partitions` with the single result.
    fn merge_partitions(&mut self) -> Result<()> {
        if self.partitions.len() < 2 {
            return Ok(());
        }
        let mut sources = Vec::with_capacity(self.partitions.len());
        for partition in &self.partitions {
            let all = partition.reader.iter_all()?;
            sources.push(Box::new(VecIndexIterator::new(all)) as Box<dyn IndexIterator>);
        }
        let merged_iter = crate::index::iterator::MultipleIndexIterator::new(sources);
        let mut merged_terms = Vec::new();
        Merger::merge_indices(merged_iter, |term, postings| {
            merged_terms.push((term.to_string(), postings.to_vec()));
            Ok(())
        })?;

        self.partitions.clear();
        if !merged_terms.is_empty() {
            self.write_partition(merged_terms)?;
        }
        Ok(())
    }

    /// Query fan-out (§4.7 `getUpdates`). Honors the contiguous-update
    /// invariant: once the in-place store holds anything for `term`, the
    /// short partitions are skipped entirely.
    pub fn get_updates(&self, term: &str) -> Result<Option<Vec<Posting>>> {
        let mut combined = Vec::new();

        let in_place = self.in_place.get_postings(term)?;
        if let Some(postings) = in_place.filter(|p| !p.is_empty()) {
            combined.extend(postings);
        } else {
            for partition in &self.partitions {
                if let Some(postings) = partition.reader.get_postings(term)? {
                    combined.extend(postings);
                }
            }
        }

        if let Some(postings) = self.accumulator.postings_of(term) {
            combined.extend(postings);
        }

        if combined.is_empty() {
            Ok(None)
        } else {
            Ok(Some(combined))
        }
    }

    /// Wildcard fan-out: unions every matching term across all three tiers,
    /// concatenating each term's postings oldest-source-first.
    pub fn get_updates_wildcard(&self, pattern: &str) -> Result<Vec<(String, Vec<Posting>)>> {
        use std::collections::BTreeMap;
        let mut combined: BTreeMap<String, Vec<Posting>> = BTreeMap::new();

        for partition in &self.partitions {
            for (term, postings) in partition.reader.get_postings_for_wildcard(pattern)? {
                combined.entry(term).or_default().extend(postings);
            }
        }
        for term in self.accumulator.sorted_terms() {
            if crate::index::glob_match(pattern, &term.term) {
                combined.entry(term.term).or_default().extend(term.postings);
            }
        }
        Ok(combined.into_iter().collect())
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn accumulator_memory(&self) -> u64 {
        self.accumulator.total_memory()
    }

    pub fn total_term_count(&self) -> u64 {
        self.partitions.iter().map(|p| p.reader.term_count()).sum::<u64>() + self.accumulator.term_count() as u64
    }

    pub fn partition_format(&self) -> PartitionFormat {
        self.partition_format
    }

    /// Raw bytes of every published short partition, oldest first, for
    /// callers that persist them under the `index.short.NNN` naming
    /// convention (§6). Does not include the in-place store or anything
    /// still buffered in the accumulator — see `save_long_list` for the
    /// former.
    pub fn partition_snapshots(&self) -> Vec<(PartitionId, &[u8])> {
        self.partitions.iter().map(|p| (p.id, p.reader.as_bytes())).collect()
    }

    /// Persists the in-place store's `appearsInIndex` term map (`index.long.list`,
    /// §6). The block store's posting payloads themselves aren't serialized.
    pub fn save_long_list(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        self.in_place.save_term_map(path)
    }
}

impl crate::search::gcl::TermSource for HybridManager {
    /// Resolves a bare GCL term literal by fanning out across all three
    /// storage tiers (§4.7 `getUpdates`) and lifting the result into
    /// single-token extents. An unseen term yields `ExtentList::Empty`
    /// rather than an error — the same "malformed operand" fallback §4.2
    /// uses for any other empty subtree.
    fn extents_for(&self, term: &str) -> Result<crate::extent::ExtentList> {
        match self.get_updates(term)? {
            Some(postings) => Ok(crate::extent::ExtentList::from_postings(&postings)),
            None => Ok(crate::extent::ExtentList::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> HybridManager {
        let mut config = Config::default();
        config.max_update_space = u64::MAX;
        config.long_list_threshold = u64::MAX;
        HybridManager::new(config, PartitionFormat::V2)
    }

    #[test]
    fn postings_survive_a_full_flush() {
        let mut mgr = manager();
        mgr.add_posting("cat", 1).unwrap();
        mgr.add_posting("cat", 2).unwrap();
        mgr.add_posting("dog", 5).unwrap();
        mgr.full_flush().unwrap();

        assert_eq!(mgr.get_updates("cat").unwrap(), Some(vec![1, 2]));
        assert_eq!(mgr.get_updates("dog").unwrap(), Some(vec![5]));
        assert_eq!(mgr.get_updates("missing").unwrap(), None);
    }

    #[test]
    fn updates_after_a_flush_append_in_a_new_partition() {
        let mut config = Config::default();
        config.max_update_space = u64::MAX;
        config.long_list_threshold = u64::MAX;
        // Sqrt strategy doesn't call for a merge at partition count 2,
        // so this test can observe the pre-merge, two-partition state.
        config.update_strategy = UpdateStrategy::Sqrt;
        let mut mgr = HybridManager::new(config, PartitionFormat::V2);

        mgr.add_posting("cat", 1).unwrap();
        mgr.full_flush().unwrap();
        mgr.add_posting("cat", 100).unwrap();
        mgr.full_flush().unwrap();

        assert_eq!(mgr.get_updates("cat").unwrap(), Some(vec![1, 100]));
        assert_eq!(mgr.partition_count(), 2);
    }

    #[test]
    fn long_lists_route_to_the_in_place_store() {
        let mut config = Config::default();
        config.max_update_space = u64::MAX;
        config.long_list_threshold = 4; // ~2 postings at the 2-bytes/posting estimate
        let mut mgr = HybridManager::new(config, PartitionFormat::V2);

        mgr.add_posting("heavy", 1).unwrap();
        mgr.add_posting("heavy", 2).unwrap();
        mgr.add_posting("heavy", 3).unwrap();
        mgr.add_posting("light", 10).unwrap();
        mgr.full_flush().unwrap();

        assert!(mgr.in_place.contains_term("heavy"));
        assert!(!mgr.in_place.contains_term("light"));
        assert_eq!(mgr.get_updates("heavy").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(mgr.get_updates("light").unwrap(), Some(vec![10]));
    }

    #[test]
    fn contiguous_update_invariant_keeps_promoted_terms_in_the_long_store() {
        let mut config = Config::default();
        config.max_update_space = u64::MAX;
        // High enough that a fresh term would stay short, but "promoted"
        // already lives in the in-place store below, so it routes there
        // again regardless of threshold.
        config.long_list_threshold = u64::MAX;
        let mut mgr = HybridManager::new(config, PartitionFormat::V2);

        mgr.in_place.add_postings("promoted", &[1, 2]).unwrap();
        mgr.in_place.finish_update().unwrap();
        mgr.add_posting("promoted", 3).unwrap();
        mgr.full_flush().unwrap();

        assert_eq!(mgr.get_updates("promoted").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(mgr.partition_count(), 0);
    }

    #[test]
    fn wildcard_fan_out_merges_across_tiers() {
        let mut mgr = manager();
        mgr.add_posting("catalog", 1).unwrap();
        mgr.full_flush().unwrap();
        mgr.add_posting("category", 2).unwrap();

        let hits = mgr.get_updates_wildcard("cat*").unwrap();
        let terms: Vec<&str> = hits.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(terms, vec!["catalog", "category"]);
    }

    #[test]
    fn partition_merge_keeps_postings_sorted_and_collapses_partitions() {
        let mut config = Config::default();
        config.max_update_space = u64::MAX;
        config.long_list_threshold = u64::MAX;
        config.update_strategy = UpdateStrategy::Immediate;
        let mut mgr = HybridManager::new(config, PartitionFormat::V2);

        mgr.add_posting("term", 1).unwrap();
        mgr.full_flush().unwrap();
        mgr.add_posting("term", 2).unwrap();
        mgr.full_flush().unwrap();

        assert_eq!(mgr.partition_count(), 1);
        assert_eq!(mgr.get_updates("term").unwrap(), Some(vec![1, 2]));
    }

    #[test]
    fn hybrid_manager_is_a_gcl_term_source() {
        use crate::search::gcl;

        let mut mgr = manager();
        mgr.add_posting("a", 1).unwrap();
        mgr.add_posting("a", 3).unwrap();
        mgr.add_posting("b", 3).unwrap();
        mgr.full_flush().unwrap();

        let node = gcl::parse("(\"a\" & \"b\")").unwrap();
        let extents = node.evaluate(&mgr).unwrap().to_vec();
        assert_eq!(extents, vec![crate::types::Extent::new(3, 3)]);

        let node = gcl::parse("\"missing\"").unwrap();
        assert!(node.evaluate(&mgr).unwrap().to_vec().is_empty());
    }

    #[test]
    fn partition_snapshots_round_trip_through_the_matching_reader() {
        let mut mgr = manager();
        mgr.add_posting("cat", 1).unwrap();
        mgr.full_flush().unwrap();

        let snapshots = mgr.partition_snapshots();
        assert_eq!(snapshots.len(), 1);
        let (_, bytes) = snapshots[0];
        let reader = v2::Reader::from_bytes(bytes.to_vec()).unwrap();
        assert_eq!(reader.get_postings("cat").unwrap(), Some(vec![1]));
    }

    #[test]
    fn save_long_list_persists_promoted_terms() {
        let mut config = Config::default();
        config.max_update_space = u64::MAX;
        config.long_list_threshold = 1;
        let mut mgr = HybridManager::new(config, PartitionFormat::V2);
        mgr.add_posting("heavy", 1).unwrap();
        mgr.add_posting("heavy", 2).unwrap();
        mgr.full_flush().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.long.list");
        mgr.save_long_list(&path).unwrap();
        let map = crate::index::inplace::InPlaceIndex::load_term_map(&path).unwrap();
        assert!(map.contains_key("heavy"));
    }
}
