// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Ingestion glue: turns a stream of `(term, posting)` pairs from an
//! external tokenizer into accumulator calls, and drives the hybrid
//! manager's flush-decision loop as it goes (§2 "data flow (ingestion)").
//!
//! File-format tokenizers (HTML, PDF, real TREC field handling) are
//! explicitly out of this core's scope (§1) — only the seam is modeled,
//! via `DocumentSource`. `ingest::whitespace_tokenize` and `TrecSource`
//! exist to make the crate's own tests and examples runnable end to end
//! without a real tokenizer wired in, not as a production-grade parser.

pub mod document;
pub mod ingest;

pub use document::{DocumentStore, FsDocumentStore};
pub use ingest::{
    ingest_documents, whitespace_tokenize, DocumentSource, IngestStats, PlainFileSource, RawDocument, TrecSource,
};
