// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Wumpus: the indexing and retrieval core of a file-system-scale
//! full-text search engine.
//!
//! This crate is the index data path only (§1): it ingests a stream of
//! `(term, posting)` pairs and answers GCL extent queries and BM25-ranked
//! queries against the resulting index. Everything that decides *what*
//! those pairs are — the client/connection daemon, the filesystem-change
//! watcher, file-format tokenizers, authentication, the stemmer, the
//! stop-word list — is an external collaborator, modeled here only through
//! the narrow traits it's consumed through (`accumulator::Stemmer`,
//! `build::DocumentSource`, `build::DocumentStore`).
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐   ┌───────────┐
//! │ accumulator │──▶│   hybrid     │──▶│  index::v1/v2 │   │  search   │
//! │   (C3)      │   │   (C7)       │   │  inplace (C5) │──▶│ gcl/bm25  │
//! └─────────────┘   └──────┬───────┘   └───────┬───────┘   │   (C8)    │
//!                          │                   │           └───────────┘
//!                          ▼                   ▼
//!                    index::iterator (C6): IndexIterator + Merger
//! ```
//!
//! | Module | Component | §  |
//! |--------|-----------|----|
//! | `binary` | compressors (vbyte/γ/null, PLSH) | §4.1 |
//! | `extent` | extent-list algebra | §4.2 |
//! | `accumulator` | in-RAM posting accumulator | §4.3 |
//! | `index::v1`, `index::v2` | on-disk compact indexes | §4.4 |
//! | `index::inplace` | mutable long-list store | §4.5 |
//! | `index::iterator` | `IndexIterator` + `Merger` | §4.6 |
//! | `hybrid` | partition manager / update policy | §4.7 |
//! | `search` | GCL evaluator, BM25 ranker, command parsing | §4.8 |
//! | `build` | ingestion glue, document store | ambient |
//! | `cli` | the `wumpus` binary's subcommands | ambient |

pub mod accumulator;
pub mod binary;
pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod extent;
pub mod hybrid;
pub mod index;
pub mod lock;
pub mod search;
pub mod types;

pub use error::{Result, WumpusError};
