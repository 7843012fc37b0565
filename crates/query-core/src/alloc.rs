//! Shared byte-budget allocator (spec §3, §5).
//!
//! Every column buffer allocation debits a shared, atomic counter against
//! a hard `limit`. Exceeding the limit returns a `QueryError::Resource`
//! rather than panicking, and every debit has a matching credit on every
//! code path — callers are expected to pair `alloc`/`free` the way the
//! teacher pairs channel send/recv around task boundaries.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::{QueryError, Result};

/// Zero `limit` means unconstrained (tests and the CLI's default config
/// both rely on this).
#[derive(Debug)]
pub struct Allocator {
    limit: i64,
    in_use: AtomicI64,
}

impl Allocator {
    pub fn new(limit: i64) -> Self {
        Self {
            limit,
            in_use: AtomicI64::new(0),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn in_use(&self) -> i64 {
        self.in_use.load(Ordering::SeqCst)
    }

    /// Debits `bytes` from the budget. Fails without mutating state if the
    /// limit would be exceeded.
    pub fn alloc(&self, bytes: i64) -> Result<()> {
        if bytes <= 0 {
            return Ok(());
        }
        loop {
            let current = self.in_use.load(Ordering::SeqCst);
            let next = current + bytes;
            if self.limit > 0 && next > self.limit {
                return Err(QueryError::Resource(format!(
                    "allocator limit exceeded: {next} > {}",
                    self.limit
                )));
            }
            if self
                .in_use
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    /// Credits `bytes` back to the budget.
    pub fn free(&self, bytes: i64) {
        if bytes <= 0 {
            return;
        }
        self.in_use.fetch_sub(bytes, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_fails_over_limit_without_mutating() {
        let a = Allocator::new(16);
        assert!(a.alloc(10).is_ok());
        assert!(a.alloc(10).is_err());
        assert_eq!(a.in_use(), 10);
    }

    #[test]
    fn alloc_free_returns_to_zero() {
        let a = Allocator::new(0);
        a.alloc(100).unwrap();
        a.free(100);
        assert_eq!(a.in_use(), 0);
    }
}
