//! Concurrency primitives for the dataflow (spec §4.5, §5).
//!
//! Each node in the physical plan gets its own dedicated tokio task and
//! a bounded `mpsc` mailbox per incoming edge (so a node with two
//! parents has two mailboxes, never a shared one — preserving FIFO
//! order per edge without a hand-rolled scheduler). A single
//! `tokio::sync::Semaphore`, sized by the plan's `ResourceLimits`, caps
//! how many `Transformation::process` calls run concurrently across the
//! whole graph; a node's task acquires a permit before processing a
//! block and releases it before blocking on its next `recv`.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};

use query_core::Block;

pub const MAILBOX_CAPACITY: usize = 64;

/// One end of a node-to-node edge. Each downstream node owns one
/// `Mailbox` per parent.
pub type Mailbox = mpsc::Receiver<Block>;
pub type MailboxSender = mpsc::Sender<Block>;

pub fn edge_channel() -> (MailboxSender, Mailbox) {
    mpsc::channel(MAILBOX_CAPACITY)
}

/// Shared concurrency budget. `unbounded` picks a generous permit count
/// rather than an actual unbounded semaphore, since `Semaphore` has no
/// such mode and a very large bound behaves the same in practice.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyLimiter {
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(4096)
    }

    pub async fn acquire(&self) -> tokio::sync::OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_core::{Bounds, Time};

    #[tokio::test]
    async fn edge_channel_preserves_fifo_order() {
        let (tx, mut rx) = edge_channel();
        let block_of = |start: i64| crate::testutil::float_block(Bounds::new(Time(start), Time(start + 1)), "a", &[]);
        tx.send(block_of(0)).await.unwrap();
        tx.send(block_of(1)).await.unwrap();
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.bounds().start, Time(0));
        assert_eq!(second.bounds().start, Time(1));
    }

    #[tokio::test]
    async fn limiter_caps_concurrent_permits() {
        let limiter = ConcurrencyLimiter::new(1);
        let _first = limiter.acquire().await;
        let second = tokio::time::timeout(std::time::Duration::from_millis(20), limiter.acquire()).await;
        assert!(second.is_err(), "a second acquire should block while the only permit is held");
    }
}
