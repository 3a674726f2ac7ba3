// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! `DocumentStore`: the narrow seam `@getfile`/`get_document` streams
//! through (§6, `SPEC_FULL.md` C.6).
//!
//! The wire protocol's `@getfile` response format — MIME type, semantic
//! type, size, then raw bytes padded to that size, then a terminator line
//! — belongs to the connection daemon (§1, out of scope). What this core
//! owns is resolving a path to its bytes and MIME type, subject to the
//! same `AccessDenied`/`NoSuchFile`/`FileTooLarge` taxonomy as every other
//! operation (§7).

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Result, WumpusError};

/// Resolves a path to a readable byte stream plus its size and a guessed
/// MIME type. `FsDocumentStore` is the only implementation this crate
/// ships; a real deployment might instead stream from a CAS or resolve
/// through the filesystem-change daemon's view of what's currently live.
pub trait DocumentStore {
    fn stream(&self, path: &Path) -> Result<(String, u64, Box<dyn Read + Send>)>;
}

/// Serves files from under a fixed root, rejecting anything that would
/// escape it (`AccessDenied`) or exceed `max_file_size` (`FileTooLarge`).
pub struct FsDocumentStore {
    root: PathBuf,
    max_file_size: u64,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>, max_file_size: u64) -> Self {
        FsDocumentStore {
            root: root.into(),
            max_file_size,
        }
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        if path.is_absolute() || path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(WumpusError::AccessDenied(format!(
                "{} escapes the document store root",
                path.display()
            )));
        }
        Ok(self.root.join(path))
    }
}

impl DocumentStore for FsDocumentStore {
    fn stream(&self, path: &Path) -> Result<(String, u64, Box<dyn Read + Send>)> {
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full).map_err(|_| WumpusError::NoSuchFile(full.clone()))?;
        if !meta.is_file() {
            return Err(WumpusError::NoSuchFile(full));
        }
        if meta.len() > self.max_file_size {
            return Err(WumpusError::FileTooLarge {
                path: full,
                size: meta.len(),
                max: self.max_file_size,
            });
        }
        let mime = guess_mime(&full);
        let file = fs::File::open(&full)?;
        Ok((mime, meta.len(), Box::new(file)))
    }
}

fn guess_mime(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        "xml" => "application/xml",
        "json" => "application/json",
        _ => "text/plain",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn streams_a_file_under_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("notes.txt");
        fs::File::create(&file_path).unwrap().write_all(b"hello").unwrap();

        let store = FsDocumentStore::new(dir.path(), 1024);
        let (mime, size, mut reader) = store.stream(Path::new("notes.txt")).unwrap();
        assert_eq!(mime, "text/plain");
        assert_eq!(size, 5);
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }

    #[test]
    fn rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path(), 1024);
        let err = store.stream(Path::new("../etc/passwd")).unwrap_err();
        assert!(matches!(err, WumpusError::AccessDenied(_)));
    }

    #[test]
    fn rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path(), 1024);
        let err = store.stream(Path::new("nope.txt")).unwrap_err();
        assert!(matches!(err, WumpusError::NoSuchFile(_)));
    }

    #[test]
    fn rejects_files_over_the_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("big.txt");
        fs::File::create(&file_path).unwrap().write_all(&[0u8; 100]).unwrap();

        let store = FsDocumentStore::new(dir.path(), 10);
        let err = store.stream(Path::new("big.txt")).unwrap_err();
        assert!(matches!(err, WumpusError::FileTooLarge { .. }));
    }

    #[test]
    fn guesses_mime_from_extension() {
        assert_eq!(guess_mime(Path::new("a.html")), "text/html");
        assert_eq!(guess_mime(Path::new("a.pdf")), "application/pdf");
        assert_eq!(guess_mime(Path::new("a.txt")), "text/plain");
        assert_eq!(guess_mime(Path::new("a")), "text/plain");
    }
}
