//! Single-assignment result cell.
//!
//! [`future_cell`] splits into a producer half ([`Completer`]) and a consumer
//! half ([`FutureCell`]). The producer completes the cell exactly once; the
//! consumer polls it without ever blocking. A destructive [`take`] leaves the
//! cell consumed, which is what gives pending-result tables their
//! exactly-once read semantics.
//!
//! [`take`]: FutureCell::take

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Create a connected producer/consumer pair.
pub fn future_cell<T>() -> (Completer<T>, FutureCell<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Completer { tx },
        FutureCell {
            rx,
            value: None,
        },
    )
}

/// Producer half: completes the cell exactly once.
///
/// Consuming `self` makes double-completion unrepresentable.
#[derive(Debug)]
pub struct Completer<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Completer<T> {
    /// Complete the cell with `value`.
    ///
    /// Returns `false` when the consumer half is already gone (its endpoint
    /// was removed); the value is dropped in that case.
    pub fn complete(self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }
}

/// Consumer half: a poll-only view of the eventual value.
///
/// States: *pending* → *completed* → *consumed*. `completed` and `result`
/// observe without consuming; `take` moves the value out once.
#[derive(Debug)]
pub struct FutureCell<T> {
    rx: oneshot::Receiver<T>,
    value: Option<T>,
}

impl<T> FutureCell<T> {
    /// Pull a delivered value out of the channel into the cell, if any.
    fn pump(&mut self) {
        if self.value.is_none() {
            match self.rx.try_recv() {
                Ok(value) => self.value = Some(value),
                // Empty: still pending. Closed: producer gone or value
                // already taken — either way there is nothing to hold.
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => {}
            }
        }
    }

    /// True once the producer has completed the cell and the value has not
    /// been taken yet.
    pub fn completed(&mut self) -> bool {
        self.pump();
        self.value.is_some()
    }

    /// Borrow the value. `None` while pending or after `take` — callers in
    /// this crate always check [`completed`](Self::completed) first.
    pub fn result(&mut self) -> Option<&T> {
        self.pump();
        self.value.as_ref()
    }

    /// Move the value out, leaving the cell consumed.
    pub fn take(&mut self) -> Option<T> {
        self.pump();
        self.value.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_until_completed() {
        let (completer, mut cell) = future_cell();

        assert!(!cell.completed());
        assert!(cell.result().is_none());

        assert!(completer.complete(7u32));
        assert!(cell.completed());
        assert_eq!(cell.result(), Some(&7));
    }

    #[test]
    fn test_take_consumes_exactly_once() {
        let (completer, mut cell) = future_cell();
        completer.complete("payload");

        assert_eq!(cell.take(), Some("payload"));
        assert_eq!(cell.take(), None);
        assert!(!cell.completed());
    }

    #[test]
    fn test_take_before_completion_is_none() {
        let (_completer, mut cell) = future_cell::<u8>();
        assert_eq!(cell.take(), None);
    }

    #[test]
    fn test_dropped_completer_never_completes() {
        let (completer, mut cell) = future_cell::<u8>();
        drop(completer);

        assert!(!cell.completed());
        assert_eq!(cell.take(), None);
    }

    #[test]
    fn test_complete_after_consumer_dropped() {
        let (completer, cell) = future_cell();
        drop(cell);

        assert!(!completer.complete(1u8));
    }

    #[tokio::test]
    async fn test_completion_from_background_task() {
        let (completer, mut cell) = future_cell();

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            completer.complete(42u64);
        });

        // Poll until the background producer delivers.
        while !cell.completed() {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        assert_eq!(cell.take(), Some(42));
    }
}
