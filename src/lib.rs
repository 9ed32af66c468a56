//! # pollbridge
//!
//! A handle-based bridge between synchronous, poll-driven callers and an
//! asynchronous publish/request RPC engine.
//!
//! Callers obtain integer handles for two endpoint kinds — **consumers**
//! issue calls and triggers and observe properties, **providers** receive
//! requests and serve properties — and drive everything through non-blocking
//! poll/fetch/clear operations. No callbacks, no blocking waits.
//!
//! ## Architecture
//!
//! ```text
//! caller ─► Bridge ─► HandleRegistry ─► endpoint ─► engine session
//!                                          ▲              │
//!                                          │   background delivery
//!                                          └── FutureCell / Collector
//! ```
//!
//! The engine pushes on its own schedule; [`poll::FutureCell`] and
//! [`poll::Collector`] absorb that traffic and re-expose it as pull-style,
//! at-most-once-consumable state. The [`engine`] module defines the session
//! traits a delivery backend implements; [`engine::loopback`] is an
//! in-process implementation used by the tests and demos.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use pollbridge::engine::loopback::LoopbackEngine;
//! use pollbridge::Bridge;
//!
//! let bridge = Bridge::new(Arc::new(LoopbackEngine::new()));
//! let descriptor = "function Echo(In string) (Out string)";
//!
//! let provider = bridge.create_provider(descriptor).unwrap();
//! let consumer = bridge.create_consumer(descriptor).unwrap();
//!
//! let request = bridge.call(consumer, "Echo", Bytes::from_static(b"ping")).unwrap();
//!
//! let incoming = bridge.take_next_request_id(provider).unwrap();
//! let parameter = bridge.request_parameter(provider, incoming).unwrap();
//! bridge.reply(provider, incoming, parameter).unwrap();
//!
//! assert!(bridge.result_ready(consumer, request).unwrap());
//! assert_eq!(
//!     bridge.result_parameter(consumer, request).unwrap(),
//!     Bytes::from_static(b"ping"),
//! );
//! ```

pub mod bridge;
pub mod consumer;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod poll;
pub mod provider;
pub mod registry;

pub use bridge::Bridge;
pub use consumer::ConsumerEndpoint;
pub use descriptor::{DescriptorError, ServiceDescriptor};
pub use engine::{CallKind, Engine, RequestId};
pub use error::{BridgeError, Result};
pub use provider::ProviderEndpoint;
pub use registry::{Handle, HandleRegistry};
