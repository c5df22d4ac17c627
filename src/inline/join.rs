//! Fail-fast join over spawned tasks.
//!
//! Every task reports into one channel. [`FailFastJoin::join`] returns on the
//! first error it receives, or once every task has succeeded.
//!
//! The join does not cancel anything: tasks are detached tokio tasks, so
//! siblings of a failed task keep running to completion. Their results land
//! in a channel nobody reads any more and are dropped.

use std::future::Future;

use tokio::sync::mpsc;

/// A task stopped (panicked) before it reported a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

pub struct FailFastJoin<E> {
    tx: mpsc::UnboundedSender<Result<(), E>>,
    rx: mpsc::UnboundedReceiver<Result<(), E>>,
    pending: usize,
}

impl<E: Send + 'static> FailFastJoin<E> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx, pending: 0 }
    }

    /// Start `task` on the tokio runtime.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
    {
        let tx = self.tx.clone();
        self.pending += 1;
        tokio::spawn(async move {
            let _ = tx.send(task.await);
        });
    }

    /// Number of spawned tasks.
    #[cfg(test)]
    pub const fn len(&self) -> usize {
        self.pending
    }

    #[cfg(test)]
    pub const fn is_empty(&self) -> bool {
        self.pending == 0
    }

    /// Wait for all tasks, returning the first error.
    pub async fn join(self) -> Result<(), E>
    where
        E: From<Interrupted>,
    {
        let Self {
            tx,
            mut rx,
            mut pending,
        } = self;
        // Only the tasks hold senders now, so `recv` yields `None` once every
        // task has reported or died.
        drop(tx);

        while pending > 0 {
            match rx.recv().await {
                Some(Ok(())) => pending -= 1,
                Some(Err(err)) => return Err(err),
                None => return Err(Interrupted.into()),
            }
        }
        Ok(())
    }
}

impl<E: Send + 'static> Default for FailFastJoin<E> {
    fn default() -> Self {
        Self::new()
    }
}
