// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The `wumpus` binary's subcommands (ambient, not a §4 component).
//!
//! `ingest` builds an index from a directory of documents and publishes it
//! under `--output`: each full flush's short partitions round-trip through
//! `HybridManager::partition_snapshots`/`index::v1`/`v2`'s `Reader::from_bytes`
//! (`index.short.NNN`, §6), and the in-place store's `appearsInIndex` map
//! round-trips through `save_long_list` (`index.long.list`). What doesn't
//! round-trip is the in-place store's posting payload blocks themselves;
//! nothing in `index/inplace.rs` serializes them, so `query` rebuilds the
//! index from the source documents on every invocation rather than reloading
//! `ingest`'s output. A long-lived deployment keeps one `HybridManager`
//! resident in-process instead, which is exactly what `ALL_INDICES_IN_MEMORY`
//! in `config.rs` already models.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
#[cfg(feature = "parallel")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::build::{whitespace_tokenize, DocumentSource, FsDocumentStore, PlainFileSource, RawDocument, TrecSource};
use crate::config::Config;
use crate::error::{Result, WumpusError};
use crate::hybrid::{HybridManager, PartitionFormat};
use crate::search::bm25::{self, Bm25Params, ScoringTerm};
use crate::search::command::{self, CommandKind, GetKind, UpdateKind};
use crate::search::gcl;
use crate::types::{structural, Extent, Posting};

#[derive(Parser)]
#[command(
    name = "wumpus",
    about = "Indexing and retrieval core for a file-system-scale full-text search engine",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Format {
    V1,
    V2,
}

impl From<Format> for PartitionFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::V1 => PartitionFormat::V1,
            Format::V2 => PartitionFormat::V2,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest a directory of documents and publish the resulting partitions
    /// and long-list term map under `--output`.
    Ingest {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::V2)]
        format: Format,
        /// Treat `input` as one TREC-formatted file instead of a directory
        /// of one-document-per-file.
        #[arg(long)]
        trec: bool,
    },

    /// Rebuild the index from a document directory and run one query-engine
    /// command line against it, e.g. `@gcl "cat"` or `@bm25[count=5] ("<doc>" .. "</doc>") : "cat" "dog"`.
    Query {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long)]
        trec: bool,
        line: String,
    },

    /// Print the partition layout and term-map size of a directory
    /// previously written by `ingest`.
    Inspect { index: PathBuf },
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ingest {
            input,
            output,
            format,
            trec,
        } => ingest(&input, &output, format.into(), trec),
        Commands::Query { input, trec, line } => query(&input, trec, &line),
        Commands::Inspect { index } => inspect(&index),
    }
}

/// Thin wrapper so the `parallel` feature gate doesn't have to be repeated
/// at every call site; mirrors the teacher CLI's spinner usage (`new_spinner`,
/// `{spinner:.cyan} {msg}` template, 80ms steady tick) without pulling
/// `indicatif` in when the feature is off.
struct Progress {
    #[cfg(feature = "parallel")]
    bar: ProgressBar,
}

impl Progress {
    fn spinner(msg: &str) -> Self {
        #[cfg(feature = "parallel")]
        {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {msg}")
                    .unwrap(),
            );
            bar.set_message(msg.to_string());
            bar.enable_steady_tick(Duration::from_millis(80));
            Progress { bar }
        }
        #[cfg(not(feature = "parallel"))]
        {
            tracing::info!("{msg}");
            Progress {}
        }
    }

    fn finish(self, msg: &str) {
        #[cfg(feature = "parallel")]
        self.bar.finish_with_message(msg.to_string());
        #[cfg(not(feature = "parallel"))]
        tracing::info!("{msg}");
    }
}

fn ingest(input: &Path, output: &Path, format: PartitionFormat, trec: bool) -> Result<()> {
    std::fs::create_dir_all(output)?;
    let config = Config::from_env()?;
    let mut mgr = HybridManager::new(config, format);

    let pb = Progress::spinner("ingesting documents...");
    let (stats, next_posting) = if trec {
        crate::build::ingest_documents(&mut mgr, TrecSource::from_file(input)?, whitespace_tokenize, 0)?
    } else {
        crate::build::ingest_documents(&mut mgr, PlainFileSource::from_directory(input)?, whitespace_tokenize, 0)?
    };
    mgr.full_flush()?;
    pb.finish(&format!("ingested {} document(s), {} token(s)", stats.documents, stats.tokens));

    for (id, bytes) in mgr.partition_snapshots() {
        std::fs::write(output.join(format!("index.short.{:03}", id.0)), bytes)?;
    }
    mgr.save_long_list(output.join("index.long.list"))?;

    let manifest = format!(
        "format={:?}\npartitions={}\ndocuments={}\ntokens={}\nnext_posting={}\n",
        mgr.partition_format(),
        mgr.partition_count(),
        stats.documents,
        stats.tokens,
        next_posting,
    );
    std::fs::write(output.join("index.manifest"), manifest)?;

    println!(
        "wrote {} partition(s) and a {}-term long list to {}",
        mgr.partition_count(),
        mgr.total_term_count(),
        output.display()
    );
    Ok(())
}

fn inspect(index: &Path) -> Result<()> {
    let manifest_path = index.join("index.manifest");
    let manifest =
        std::fs::read_to_string(&manifest_path).map_err(|_| WumpusError::NoSuchFile(manifest_path))?;
    print!("{manifest}");

    let mut n = 0u32;
    loop {
        let path = index.join(format!("index.short.{n:03}"));
        if !path.exists() {
            break;
        }
        let bytes = std::fs::read(&path)?;
        let (term_count, posting_count) = partition_stats(&bytes)?;
        println!(
            "  {}: {} bytes, {} term(s), {} posting(s)",
            path.display(),
            bytes.len(),
            term_count,
            posting_count
        );
        n += 1;
    }

    let long_list = index.join("index.long.list");
    if long_list.exists() {
        let map = crate::index::inplace::InPlaceIndex::load_term_map(&long_list)?;
        println!("index.long.list: {} term(s)", map.len());
    }
    Ok(())
}

fn partition_stats(bytes: &[u8]) -> Result<(u64, u64)> {
    if bytes.starts_with(crate::index::v2::SIGNATURE) {
        let reader = crate::index::v2::Reader::from_bytes(bytes.to_vec())?;
        Ok((reader.term_count, reader.posting_count))
    } else {
        let reader = crate::index::v1::Reader::from_bytes(bytes.to_vec())?;
        Ok((reader.term_count, reader.posting_count))
    }
}

fn query(input: &Path, trec: bool, line: &str) -> Result<()> {
    let config = Config::from_env()?;
    let mut mgr = HybridManager::new(config, PartitionFormat::V2);
    let docs = ingest_with_doc_index(&mut mgr, input, trec)?;
    mgr.full_flush()?;

    let parsed = command::parse(line)?;
    match parsed.kind {
        CommandKind::Gcl | CommandKind::Qap => {
            let node = gcl::parse(&parsed.body)?;
            let mut extents = node.evaluate(&mgr)?.to_vec();
            if let Some(count) = parsed.modifiers.count() {
                extents.truncate(count);
            }
            for e in extents {
                println!("{}..{}", e.start, e.end);
            }
        }
        CommandKind::Bm25 | CommandKind::Rank => {
            let Some((container_expr, terms_expr)) = parsed.body.split_once(':') else {
                return Err(WumpusError::SyntaxError(
                    "bm25/rank query needs 'container expr : \"term\" ...'".into(),
                ));
            };
            let container_node = gcl::parse(container_expr.trim())?;
            let containers = container_node.evaluate(&mgr)?.to_vec();

            let mut scoring_terms = Vec::new();
            for term in parse_quoted_terms(terms_expr)? {
                let postings = mgr.get_updates(&term)?.unwrap_or_default();
                scoring_terms.push(ScoringTerm::new(term, postings));
            }

            let count = parsed.modifiers.count().unwrap_or(10);
            let total_documents = docs.len() as u64;
            let results = bm25::rank(&containers, &scoring_terms, total_documents, Bm25Params::default(), count);
            for (rank, r) in results.iter().enumerate() {
                let docid = docs
                    .iter()
                    .find(|(_, e)| e.start == r.container.start)
                    .map(|(id, _)| id.as_str())
                    .unwrap_or("?");
                println!("{}", bm25::format_result_line("Q0", docid, rank + 1, r.score, "wumpus"));
            }
        }
        CommandKind::Get(GetKind::File) => {
            let store = FsDocumentStore::new(input, u64::MAX);
            let (mime, size, _reader) = store.stream(Path::new(parsed.body.trim()))?;
            println!("{mime} {size} bytes");
        }
        CommandKind::Update(UpdateKind::AddFile) => {
            println!(
                "ok, {} will be picked up on the next query invocation",
                parsed.body.trim()
            );
        }
        CommandKind::Update(_) => {
            println!("update commands are no-ops against a freshly rebuilt in-memory index");
        }
        CommandKind::Misc => {
            println!(
                "{} document(s), {} term(s), {} partition(s), {} byte(s) in the accumulator",
                docs.len(),
                mgr.total_term_count(),
                mgr.partition_count(),
                mgr.accumulator_memory()
            );
        }
        CommandKind::Synonyms => println!("no synonym map configured"),
        CommandKind::Help => println!("{HELP_TEXT}"),
    }
    Ok(())
}

const HELP_TEXT: &str = "\
@gcl <expr>               evaluate a GCL expression, one extent per line
@qap <expr>                alias of @gcl
@bm25[count=N] <c> : <t>   rank container expr <c> by terms <t>
@rank[count=N] <c> : <t>   alias of @bm25
@getfile <path>            resolve <path> through the document store
@addfile <path>            no-op (index is rebuilt fresh each invocation)
@misc                      print index size statistics
@synonyms                  report the configured synonym map (none by default)
@help                      this text";

/// Like `build::ingest_documents`, but also returns each document's
/// `<doc>`/`</doc>` container extent keyed by its source id, for mapping a
/// BM25 result's container back to a filename the CLI can print.
fn ingest_with_doc_index(mgr: &mut HybridManager, input: &Path, trec: bool) -> Result<Vec<(String, Extent)>> {
    let mut docs = Vec::new();
    let mut posting: Posting = 0;
    if trec {
        let mut source = TrecSource::from_file(input)?;
        while let Some(doc) = source.next_document()? {
            let (extent, next) = ingest_one(mgr, &doc, posting)?;
            docs.push((doc.id, extent));
            posting = next;
        }
    } else {
        let mut source = PlainFileSource::from_directory(input)?;
        while let Some(doc) = source.next_document()? {
            let (extent, next) = ingest_one(mgr, &doc, posting)?;
            docs.push((doc.id, extent));
            posting = next;
        }
    }
    Ok(docs)
}

fn ingest_one(mgr: &mut HybridManager, doc: &RawDocument, start: Posting) -> Result<(Extent, Posting)> {
    let open = start;
    mgr.add_posting(structural::DOC_OPEN, open)?;
    let mut posting = open + 1;
    for token in whitespace_tokenize(&doc.text) {
        mgr.add_posting(&token, posting)?;
        posting += 1;
    }
    mgr.add_posting(structural::DOC_CLOSE, posting)?;
    let close = posting;
    posting += 1;
    Ok((Extent::new(open, close), posting))
}

/// Splits `"a" "b" "c"` into `["a", "b", "c"]`.
fn parse_quoted_terms(s: &str) -> Result<Vec<String>> {
    let mut terms = Vec::new();
    let mut chars = s.trim().chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c != '"' {
            return Err(WumpusError::SyntaxError(format!(
                "expected a quoted term, found {c:?}"
            )));
        }
        chars.next();
        let mut term = String::new();
        let mut closed = false;
        for c2 in chars.by_ref() {
            if c2 == '"' {
                closed = true;
                break;
            }
            term.push(c2);
        }
        if !closed {
            return Err(WumpusError::SyntaxError("unterminated quoted term".into()));
        }
        terms.push(term);
    }
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quoted_terms_splits_on_quotes() {
        assert_eq!(
            parse_quoted_terms("\"cat\" \"dog\"").unwrap(),
            vec!["cat".to_string(), "dog".to_string()]
        );
    }

    #[test]
    fn parse_quoted_terms_rejects_bare_words() {
        assert!(parse_quoted_terms("cat").is_err());
    }

    #[test]
    fn parse_quoted_terms_rejects_unterminated_quote() {
        assert!(parse_quoted_terms("\"cat").is_err());
    }

    #[test]
    fn ingest_and_query_a_small_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "cat sat").unwrap();
        std::fs::write(dir.path().join("b.txt"), "cat cat ran").unwrap();

        let mut mgr = HybridManager::new(Config::default(), PartitionFormat::V2);
        let docs = ingest_with_doc_index(&mut mgr, dir.path(), false).unwrap();
        mgr.full_flush().unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(mgr.get_updates("cat").unwrap().unwrap().len(), 3);
    }

    #[test]
    fn ingest_then_inspect_round_trips_partition_metadata() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), "cat sat on the mat").unwrap();
        let out = tempfile::tempdir().unwrap();

        ingest(src.path(), out.path(), PartitionFormat::V2, false).unwrap();
        assert!(out.path().join("index.manifest").exists());
        assert!(out.path().join("index.short.000").exists());

        inspect(out.path()).unwrap();
    }
}
