// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Concurrency primitives shared by every index component (§5).
//!
//! Every index component holds its mutable state behind a single
//! `parking_lot::RwLock` — multiple concurrent readers (queries), one
//! writer at a time (flush, merge, in-place update, partition swap).
//! `parking_lot` over `std::sync::RwLock` for the usual reasons: no
//! poisoning to thread through every call site, and a smaller/faster lock
//! for the read-heavy workload this core has.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Cooperative cancellation, checked at suspension points (§5, §7
/// `Cancelled`). Cheap to clone and share between the connection that owns
/// a query and the evaluator running it.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
