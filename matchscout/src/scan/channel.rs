//! Bounded conduit from the workers to the single consumer.
//!
//! Workers finish in any order; the channel turns their outcomes into one
//! sequential stream. When `capacity` outcomes are waiting unread, the next
//! worker to deliver blocks until the consumer catches up. Nothing is ever
//! dropped while the consumer is alive. Once the [`ResultStream`] is dropped,
//! deliveries fail instead of blocking, which is how a cancelled scan sheds
//! the outcomes of tasks that were already in flight.
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::num::NonZeroUsize;
use std::time::Duration;

use crate::results::FileOutcome;

/// Creates a result channel holding at most `capacity` unread outcomes
pub fn result_channel(capacity: NonZeroUsize) -> (ResultSender, ResultStream) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.get());
    (ResultSender { tx }, ResultStream { rx })
}

/// Producer half, cloned into every worker
#[derive(Debug, Clone)]
pub struct ResultSender {
    tx: Sender<FileOutcome>,
}

impl ResultSender {
    /// Delivers one outcome, blocking while the buffer is full.
    ///
    /// Returns `false` if the consumer has gone away.
    pub fn deliver(&self, outcome: FileOutcome) -> bool {
        self.tx.send(outcome).is_ok()
    }
}

/// Consumer half; yields each outcome exactly once
#[derive(Debug)]
pub struct ResultStream {
    rx: Receiver<FileOutcome>,
}

impl ResultStream {
    /// The underlying receiver, for use in `select!`
    pub fn receiver(&self) -> &Receiver<FileOutcome> {
        &self.rx
    }

    /// Waits up to `timeout` for the next outcome.
    ///
    /// `Ok(None)` means nothing arrived in time; `Err` means every sender is gone.
    pub fn next_timeout(&self, timeout: Duration) -> Result<Option<FileOutcome>, RecvTimeoutError> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Outcomes completed but not yet consumed
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.rx.capacity()
    }
}

impl Iterator for ResultStream {
    type Item = FileOutcome;

    fn next(&mut self) -> Option<FileOutcome> {
        self.rx.recv().ok()
    }
}
