// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! `wumpus` CLI: ingest a document directory into a partitioned index, run
//! one query-engine command line against it, or inspect a previously
//! ingested directory's partition layout.
//!
//! ```bash
//! wumpus ingest --input ./docs --output ./index
//! wumpus query --input ./docs '@gcl "cat"'
//! wumpus inspect ./index
//! ```

use clap::Parser;

use wumpus::cli::{run, Cli};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("wumpus: {e}");
        std::process::exit(e.code() as i32);
    }
}
