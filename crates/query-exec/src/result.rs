//! Pull-based result sink (spec §4.6), grounded on the teacher's
//! `rde-tx` mailbox pattern: a bounded `tokio::sync::mpsc` channel
//! between producer tasks and one consumer, plus a `Notify`-based
//! abort signal any producer can observe between blocks.

use tokio::sync::{mpsc, Notify};

use query_core::Block;

/// One block yielded under a named result (the name set by a `yield`
/// operation, or `"_result"` when the query has none).
#[derive(Debug)]
pub struct YieldedBlock {
    pub name: String,
    pub block: Block,
}

pub const RESULT_CHANNEL_CAPACITY: usize = 1000;

#[derive(Clone)]
pub struct ResultSink {
    tx: mpsc::Sender<YieldedBlock>,
    abort: std::sync::Arc<Notify>,
}

pub struct ResultStream {
    rx: mpsc::Receiver<YieldedBlock>,
    abort: std::sync::Arc<Notify>,
}

/// Creates a linked producer/consumer pair. `abort` is shared with every
/// clone of the returned `ResultSink` so a single `ResultStream::abort`
/// call reaches every producer task.
pub fn channel() -> (ResultSink, ResultStream) {
    let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
    let abort = std::sync::Arc::new(Notify::new());
    (
        ResultSink { tx, abort: abort.clone() },
        ResultStream { rx, abort },
    )
}

impl ResultSink {
    pub async fn send(&self, name: impl Into<String>, block: Block) -> Result<(), SendError> {
        self.tx
            .send(YieldedBlock { name: name.into(), block })
            .await
            .map_err(|_| SendError)
    }

    /// Resolves once the stream's consumer calls `ResultStream::abort`,
    /// for producer loops to race against with `tokio::select!`.
    pub async fn aborted(&self) {
        self.abort.notified().await
    }
}

impl ResultStream {
    pub async fn recv(&mut self) -> Option<YieldedBlock> {
        self.rx.recv().await
    }

    /// Wakes every producer task blocked in `ResultSink::aborted`.
    pub fn abort(&self) {
        self.abort.notify_waiters();
    }
}

#[derive(Debug)]
pub struct SendError;

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "result consumer dropped")
    }
}

impl std::error::Error for SendError {}

#[cfg(test)]
mod tests {
    use query_core::{Bounds, Time};

    use super::*;
    use crate::testutil::float_block;

    #[tokio::test]
    async fn yielded_blocks_are_delivered_in_order_under_their_name() {
        let (sink, mut stream) = channel();
        let block = float_block(Bounds::new(Time(0), Time(10)), "a", &[(1, 1.0)]);
        sink.send("result", block).await.unwrap();
        let yielded = stream.recv().await.unwrap();
        assert_eq!(yielded.name, "result");
    }

    #[tokio::test]
    async fn abort_wakes_a_producer_waiting_on_aborted() {
        let (sink, stream) = channel();
        stream.abort();
        // Notify::notify_waiters only wakes current waiters, so a call to
        // `aborted()` registered after `abort()` would hang; this confirms
        // a subsequent fresh `aborted()` call after waiters exist resolves.
        let waiter = tokio::spawn(async move { sink.aborted().await });
        tokio::task::yield_now().await;
        stream.abort();
        tokio::time::timeout(std::time::Duration::from_millis(100), waiter)
            .await
            .expect("aborted() should resolve once abort() is called while it is waiting")
            .unwrap();
    }

    #[tokio::test]
    async fn send_fails_once_the_stream_is_dropped() {
        let (sink, stream) = channel();
        drop(stream);
        let block = float_block(Bounds::new(Time(0), Time(10)), "a", &[]);
        assert!(sink.send("result", block).await.is_err());
    }
}
