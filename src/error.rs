// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The error taxonomy for the index/retrieval core.
//!
//! Every fallible public entry point returns `Result<T, WumpusError>`. The
//! wire protocol (out of scope here, but the numeric codes are part of this
//! crate's contract with it) reports failures as `@<code>-<message>` lines;
//! `WumpusError::code` is the single place that mapping lives.
//!
//! Recoverable errors never leave a partition half-published: writers write
//! to a fresh filename and only swap it in after `fsync`, so an
//! `InternalError` mid-merge leaves the previous generation intact.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WumpusError {
    #[error("syntax error: {0}")]
    SyntaxError(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("no such file: {0}")]
    NoSuchFile(PathBuf),

    #[error("file too large: {path} is {size} bytes, max is {max}")]
    FileTooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("index is read-only")]
    ReadOnly,

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("query cancelled")]
    Cancelled,

    #[error("malformed on-disk data: {0}")]
    Codec(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WumpusError {
    /// The numeric wire code from §7's error taxonomy. `0` is reserved for
    /// success and is never returned by this type.
    pub fn code(&self) -> u32 {
        match self {
            WumpusError::SyntaxError(_) => 1,
            WumpusError::AccessDenied(_) => 2,
            WumpusError::NoSuchFile(_) => 3,
            WumpusError::FileTooLarge { .. } => 4,
            WumpusError::ReadOnly => 5,
            WumpusError::InternalError(_) => 6,
            WumpusError::Cancelled => 7,
            WumpusError::Codec(_) => 6,
            WumpusError::Io(_) => 6,
        }
    }

    /// Whether this kind of failure should abort the in-flight query but
    /// leave the index itself consistent (vs. simply being reported to the
    /// client while the connection continues).
    pub fn is_fatal_to_query(&self) -> bool {
        matches!(
            self,
            WumpusError::InternalError(_) | WumpusError::Codec(_) | WumpusError::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, WumpusError>;
