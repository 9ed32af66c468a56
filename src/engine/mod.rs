//! Engine session interface.
//!
//! The bridge does not move bytes itself — an *engine* does, on its own
//! concurrent schedule. This module pins down the capability surface the
//! bridge needs from it: non-blocking session objects plus the standing
//! streams their background delivery feeds. Everything network-shaped
//! (transport, wire format, discovery) lives behind these traits.
//!
//! Delivery hand-off is channel-based: sessions return [`FutureCell`]s and
//! `tokio` unbounded receivers at dispatch/creation time, and the engine's
//! background activity completes/feeds them later. The bridge never awaits —
//! it drains.

pub mod loopback;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::poll::FutureCell;

/// Dispatch mode for a consumer request.
///
/// One closed enum across all four request kinds; sessions take it through a
/// single [`dispatch`](ConsumerSession::dispatch) entry point instead of four
/// separate code paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Single target, exactly one reply.
    Call,
    /// Every target, zero or more replies over time.
    CallAll,
    /// Single target, fire-and-forget.
    Trigger,
    /// Every target, fire-and-forget.
    TriggerAll,
}

impl CallKind {
    /// True for the fire-and-forget kinds.
    pub fn fire_and_forget(self) -> bool {
        matches!(self, CallKind::Trigger | CallKind::TriggerAll)
    }
}

/// Opaque request identity, unique per dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A request as seen by a provider: identity, function, opaque parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    /// Request identity, referenced by later boundary calls.
    pub id: RequestId,
    /// Function named by the caller.
    pub function: String,
    /// Opaque request parameter.
    pub parameter: Bytes,
}

/// An overheard result: the originating request plus the reply parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenResult {
    /// The request this result answers.
    pub request: RequestRecord,
    /// Opaque result parameter.
    pub parameter: Bytes,
}

/// A property change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    /// Property that changed.
    pub property: String,
    /// New opaque value.
    pub value: Bytes,
}

/// Where replies to a dispatched request will arrive.
#[derive(Debug)]
pub enum ReplyRoute {
    /// Fire-and-forget: no replies are routed anywhere.
    None,
    /// Exactly one reply, delivered through the cell.
    Single(FutureCell<Bytes>),
    /// Zero or more replies over time.
    Stream(mpsc::UnboundedReceiver<Bytes>),
}

/// Outcome of a successful dispatch: the assigned id and the reply plumbing.
#[derive(Debug)]
pub struct DispatchTicket {
    /// Id assigned to this request by the engine.
    pub request: RequestId,
    /// Reply route matching the dispatch kind.
    pub route: ReplyRoute,
}

/// Error surfaced synchronously by a session operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The engine could not establish or use its delivery machinery.
    #[error("network failure: {0}")]
    Network(String),

    /// Function is not part of the session's service contract.
    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    /// Property is not declared by the session's service contract.
    #[error("unknown property `{0}`")]
    UnknownProperty(String),
}

impl From<SessionError> for crate::error::BridgeError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Network(_) => crate::error::BridgeError::Network,
            SessionError::UnknownFunction(_) => crate::error::BridgeError::InvalidFunction,
            SessionError::UnknownProperty(_) => crate::error::BridgeError::InvalidProperty,
        }
    }
}

/// Consumer-side engine session.
///
/// All methods are non-blocking; anything that takes time happens on the
/// engine's background schedule and surfaces through the returned cells and
/// the streams handed over in [`ConsumerParts`].
pub trait ConsumerSession: Send + Sync {
    /// True while at least one matching provider is reachable.
    fn connected(&self) -> bool;

    /// Canonical interface string of the service contract.
    fn interface(&self) -> String;

    /// Stable identity of this session.
    fn identity(&self) -> Uuid;

    /// Start background delivery. Called once, after the endpoint wiring is
    /// in place.
    fn run(&self);

    /// Stop background delivery and detach from the engine.
    fn shutdown(&self);

    /// Dispatch a request in the given mode.
    ///
    /// Contract-validation errors surface here, synchronously — never
    /// deferred into the reply route.
    fn dispatch(
        &self,
        kind: CallKind,
        function: &str,
        parameter: Bytes,
    ) -> Result<DispatchTicket, SessionError>;

    /// Start feeding overheard results for `function` into the listen stream.
    fn start_listen(&self, function: &str) -> Result<(), SessionError>;

    /// Stop feeding overheard results for `function`.
    fn stop_listen(&self, function: &str) -> Result<(), SessionError>;

    /// Synchronous read of the locally cached property value.
    fn property_value(&self, property: &str) -> Result<Bytes, SessionError>;

    /// Dispatch an asynchronous property fetch; the returned cell completes
    /// when the value arrives.
    fn fetch_property(&self, property: &str) -> Result<FutureCell<Bytes>, SessionError>;

    /// Start pushing change notifications for `property`.
    fn start_observe(&self, property: &str) -> Result<(), SessionError>;

    /// Stop pushing change notifications for `property`.
    fn stop_observe(&self, property: &str) -> Result<(), SessionError>;
}

/// Provider-side engine session.
pub trait ProviderSession: Send + Sync {
    /// True while at least one matching consumer is reachable.
    fn connected(&self) -> bool;

    /// Canonical interface string of the service contract.
    fn interface(&self) -> String;

    /// Stable identity of this session.
    fn identity(&self) -> Uuid;

    /// Start background delivery.
    fn run(&self);

    /// Stop background delivery and detach from the engine.
    fn shutdown(&self);

    /// Send the reply to a previously received request.
    fn reply(&self, request: &RequestRecord, parameter: Bytes) -> Result<(), SessionError>;

    /// Broadcast a provider-initiated request/result pair to listeners.
    fn emit(
        &self,
        function: &str,
        request_parameter: Bytes,
        result_parameter: Bytes,
    ) -> Result<(), SessionError>;

    /// Publish a new property value.
    fn set_property(&self, property: &str, value: Bytes) -> Result<(), SessionError>;
}

/// A consumer session plus the standing streams its delivery feeds.
pub struct ConsumerParts {
    /// The session itself.
    pub session: Arc<dyn ConsumerSession>,
    /// Standing stream of overheard results, one per session.
    pub listen: mpsc::UnboundedReceiver<ListenResult>,
    /// One change stream per declared property, in declaration order. Items
    /// carry the property name so the streams can be merged into one queue.
    pub changes: Vec<mpsc::UnboundedReceiver<PropertyChange>>,
}

/// A provider session plus its standing incoming-request stream.
pub struct ProviderParts {
    /// The session itself.
    pub session: Arc<dyn ProviderSession>,
    /// Standing stream of incoming requests.
    pub requests: mpsc::UnboundedReceiver<RequestRecord>,
}

/// Session factory — the entry point an engine implementation exposes.
pub trait Engine: Send + Sync {
    /// Open a consumer session for the given contract.
    fn consumer(
        &self,
        descriptor: &crate::descriptor::ServiceDescriptor,
    ) -> Result<ConsumerParts, SessionError>;

    /// Open a provider session for the given contract.
    fn provider(
        &self,
        descriptor: &crate::descriptor::ServiceDescriptor,
    ) -> Result<ProviderParts, SessionError>;
}
