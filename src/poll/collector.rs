//! FIFO merge-queue over producer streams.
//!
//! A [`Collector`] merges any number of attached producer streams into one
//! pollable queue:
//!
//! ```text
//! source 1 ─┐
//! source 2 ─┼─► pump (try_recv drain) ─► VecDeque ─► peek / pop
//! source N ─┘
//! ```
//!
//! Every read operation pumps first: each attached source is drained with
//! `try_recv` into the queue, so a poll observes everything delivered up to
//! that moment without ever awaiting. Order within one source is preserved
//! end to end; interleaving across sources follows drain order and is not
//! globally deterministic.

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Ordered, unbounded FIFO fed by one or more attached producer streams.
#[derive(Debug)]
pub struct Collector<T> {
    /// Attached sources, drained in attach order on every pump.
    sources: Vec<mpsc::UnboundedReceiver<T>>,
    /// Items pulled out of the sources, oldest first.
    queue: VecDeque<T>,
}

impl<T> Collector<T> {
    /// Create a collector with no sources and an empty queue.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    /// Attach another producer stream.
    ///
    /// May be called at any time, including after items from earlier sources
    /// are already queued.
    pub fn attach(&mut self, source: mpsc::UnboundedReceiver<T>) {
        self.sources.push(source);
    }

    /// Drain every source into the queue; drop sources whose producer is
    /// gone. Never blocks.
    fn pump(&mut self) {
        let queue = &mut self.queue;
        self.sources.retain_mut(|source| loop {
            match source.try_recv() {
                Ok(item) => queue.push_back(item),
                Err(TryRecvError::Empty) => break true,
                Err(TryRecvError::Disconnected) => break false,
            }
        });
    }

    /// True when no item is currently available.
    pub fn is_empty(&mut self) -> bool {
        self.pump();
        self.queue.is_empty()
    }

    /// Borrow the front item without removing it.
    pub fn peek(&mut self) -> Option<&T> {
        self.pump();
        self.queue.front()
    }

    /// Remove and return the front item. `None` when empty.
    pub fn pop(&mut self) -> Option<T> {
        self.pump();
        self.queue.pop_front()
    }

    /// Detach all sources and drop all queued items.
    pub fn discard(&mut self) {
        self.sources.clear();
        self.queue.clear();
    }
}

impl<T> Default for Collector<T> {
    fn default() -> Self {
        Self::new()
    }
}
