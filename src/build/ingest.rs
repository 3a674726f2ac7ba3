// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Document sources and the ingest loop that feeds a `HybridManager`.
//!
//! A `DocumentSource` yields raw `(id, text)` pairs; the caller supplies a
//! tokenizer (a real one would do stemming-aware, Unicode-aware
//! segmentation — out of scope here per §1). `ingest_documents` wraps each
//! document in `<doc>`/`</doc>` structural postings (§3, §4.3) so the
//! accumulator's document-level TF window and BM25's container expression
//! both have something to key off, and assigns token positions from a
//! single monotonically increasing counter across the whole run, matching
//! the "append-only global token stream" data model of §3.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::Result;
use crate::hybrid::HybridManager;
use crate::types::{structural, Posting};

#[derive(Debug, Clone)]
pub struct RawDocument {
    pub id: String,
    pub text: String,
}

/// External collaborator seam (§1): yields one document at a time. Real
/// deployments drive this from the filesystem-change daemon's event queue;
/// `PlainFileSource` and `TrecSource` below are minimal in-crate
/// implementations for tests and the CLI's `ingest` subcommand.
pub trait DocumentSource {
    fn next_document(&mut self) -> Result<Option<RawDocument>>;
}

/// One document per file, identified by its path relative to nothing in
/// particular (the id is just `path.display().to_string()`).
pub struct PlainFileSource {
    paths: VecDeque<PathBuf>,
}

impl PlainFileSource {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        PlainFileSource {
            paths: paths.into_iter().collect(),
        }
    }

    /// Every regular file directly inside `dir` (non-recursive), sorted for
    /// deterministic ingestion order.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir.as_ref())?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        paths.sort();
        Ok(PlainFileSource::new(paths))
    }
}

impl DocumentSource for PlainFileSource {
    fn next_document(&mut self) -> Result<Option<RawDocument>> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        let text = fs::read_to_string(&path)?;
        Ok(Some(RawDocument {
            id: path.display().to_string(),
            text,
        }))
    }
}

/// Splits a TREC-formatted blob (`<DOC><DOCNO>id</DOCNO>...text...</DOC>`
/// repeated) into one `RawDocument` per `<DOC>...</DOC>` record. The whole
/// record (including the `<DOCNO>` tag) is indexed as text; a real
/// tokenizer would strip SGML tags, which is exactly the kind of
/// file-format-specific work §1 scopes out of this core.
pub struct TrecSource {
    remaining: String,
}

impl TrecSource {
    pub fn new(text: impl Into<String>) -> Self {
        TrecSource {
            remaining: text.into(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(TrecSource::new(fs::read_to_string(path)?))
    }
}

impl DocumentSource for TrecSource {
    fn next_document(&mut self) -> Result<Option<RawDocument>> {
        let Some(open) = self.remaining.find("<DOC>") else {
            return Ok(None);
        };
        let Some(close_rel) = self.remaining[open..].find("</DOC>") else {
            return Ok(None);
        };
        let close = open + close_rel + "</DOC>".len();
        let record = self.remaining[open..close].to_string();
        self.remaining = self.remaining[close..].to_string();

        let id = extract_tag(&record, "DOCNO")
            .unwrap_or_else(|| format!("doc{}", record.len()))
            .trim()
            .to_string();

        Ok(Some(RawDocument { id, text: record }))
    }
}

fn extract_tag(text: &str, tag: &str) -> Option<String> {
    let open_tag = format!("<{tag}>");
    let close_tag = format!("</{tag}>");
    let start = text.find(&open_tag)? + open_tag.len();
    let end = text[start..].find(&close_tag)? + start;
    Some(text[start..end].to_string())
}

/// Lowercases and splits on non-alphanumeric runs. A stand-in for the
/// real tokenizer this core doesn't own (§1).
pub fn whitespace_tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestStats {
    pub documents: u64,
    pub tokens: u64,
}

/// Feeds every document `source` yields into `mgr`, token by token, with
/// `<doc>`/`</doc>` structural postings bracketing each one. Positions are
/// assigned from a single counter starting at `start_posting`, so
/// successive calls across multiple sources can continue the same global
/// token stream (§3) by passing the previous call's final position.
pub fn ingest_documents(
    mgr: &mut HybridManager,
    mut source: impl DocumentSource,
    tokenizer: impl Fn(&str) -> Vec<String>,
    start_posting: Posting,
) -> Result<(IngestStats, Posting)> {
    let mut stats = IngestStats::default();
    let mut posting = start_posting;

    while let Some(doc) = source.next_document()? {
        mgr.add_posting(structural::DOC_OPEN, posting)?;
        posting += 1;

        for token in tokenizer(&doc.text) {
            mgr.add_posting(&token, posting)?;
            posting += 1;
            stats.tokens += 1;
        }

        mgr.add_posting(structural::DOC_CLOSE, posting)?;
        posting += 1;
        stats.documents += 1;
        debug!(doc = %doc.id, "ingested document");
    }

    info!(
        documents = stats.documents,
        tokens = stats.tokens,
        "ingest run complete"
    );
    Ok((stats, posting))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::hybrid::PartitionFormat;

    fn manager() -> HybridManager {
        let mut config = Config::default();
        config.max_update_space = u64::MAX;
        config.long_list_threshold = u64::MAX;
        HybridManager::new(config, PartitionFormat::V2)
    }

    struct VecSource(VecDeque<RawDocument>);

    impl DocumentSource for VecSource {
        fn next_document(&mut self) -> Result<Option<RawDocument>> {
            Ok(self.0.pop_front())
        }
    }

    #[test]
    fn ingest_wraps_each_document_in_structural_markers() {
        let mut mgr = manager();
        let source = VecSource(VecDeque::from([RawDocument {
            id: "d1".into(),
            text: "a b a".into(),
        }]));

        let (stats, next) = ingest_documents(&mut mgr, source, whitespace_tokenize, 100).unwrap();
        mgr.full_flush().unwrap();

        assert_eq!(stats.documents, 1);
        assert_eq!(stats.tokens, 3);
        assert_eq!(next, 105);

        assert_eq!(mgr.get_updates(structural::DOC_OPEN).unwrap(), Some(vec![100]));
        assert_eq!(mgr.get_updates("a").unwrap(), Some(vec![101, 103]));
        assert_eq!(mgr.get_updates("b").unwrap(), Some(vec![102]));
        assert_eq!(mgr.get_updates(structural::DOC_CLOSE).unwrap(), Some(vec![104]));
    }

    #[test]
    fn successive_ingest_calls_continue_the_token_stream() {
        let mut mgr = manager();
        let s1 = VecSource(VecDeque::from([RawDocument {
            id: "d1".into(),
            text: "x".into(),
        }]));
        let (_, next) = ingest_documents(&mut mgr, s1, whitespace_tokenize, 0).unwrap();

        let s2 = VecSource(VecDeque::from([RawDocument {
            id: "d2".into(),
            text: "y".into(),
        }]));
        ingest_documents(&mut mgr, s2, whitespace_tokenize, next).unwrap();
        mgr.full_flush().unwrap();

        let x = mgr.get_updates("x").unwrap().unwrap();
        let y = mgr.get_updates("y").unwrap().unwrap();
        assert!(x[0] < y[0], "second ingest call must continue after the first");
    }

    #[test]
    fn trec_source_splits_records_and_extracts_docno() {
        let blob = "<DOC><DOCNO> WSJ001 </DOCNO><TEXT>hello world</TEXT></DOC>\
                    <DOC><DOCNO> WSJ002 </DOCNO><TEXT>goodbye</TEXT></DOC>";
        let mut source = TrecSource::new(blob);

        let d1 = source.next_document().unwrap().unwrap();
        assert_eq!(d1.id, "WSJ001");
        assert!(d1.text.contains("hello world"));

        let d2 = source.next_document().unwrap().unwrap();
        assert_eq!(d2.id, "WSJ002");

        assert!(source.next_document().unwrap().is_none());
    }

    #[test]
    fn whitespace_tokenize_lowercases_and_splits_on_punctuation() {
        assert_eq!(
            whitespace_tokenize("Hello, World!  Foo-bar."),
            vec!["hello", "world", "foo", "bar"]
        );
    }
}
