//! Async-to-poll primitives.
//!
//! The engine pushes results on its own time; callers of this crate only ever
//! pull. These two building blocks absorb push-style traffic and re-expose it
//! as non-blocking, at-most-once-consumable state:
//!
//! - [`FutureCell`] — a single-assignment cell completed exactly once by its
//!   producer, polled with `completed`/`result`/`take`.
//! - [`Collector`] — an unbounded FIFO merge-queue fed by any number of
//!   attached producer streams, polled with `peek`/`pop`.
//!
//! Neither primitive blocks or awaits: presence of data is checked by
//! draining `tokio` channels with `try_recv`.

mod collector;
mod future;

pub use collector::Collector;
pub use future::{future_cell, Completer, FutureCell};
