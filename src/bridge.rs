//! Boundary facade.
//!
//! [`Bridge`] owns the engine and one handle registry per endpoint kind and
//! exposes the full poll/command surface as thin lookup-then-delegate
//! methods. It is an explicit object: construct one at startup and pass it
//! around — there is no ambient global registry.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use pollbridge::engine::loopback::LoopbackEngine;
//! use pollbridge::Bridge;
//!
//! let bridge = Bridge::new(std::sync::Arc::new(LoopbackEngine::new()));
//!
//! let descriptor = "function SayHello(Greeting string) (Answer string)";
//! let provider = bridge.create_provider(descriptor).unwrap();
//! let consumer = bridge.create_consumer(descriptor).unwrap();
//!
//! let request = bridge.call(consumer, "SayHello", Bytes::from_static(b"hi")).unwrap();
//!
//! // Provider side: poll, serve, reply.
//! let id = bridge.take_next_request_id(provider).unwrap();
//! bridge.reply(provider, id, Bytes::from_static(b"hello")).unwrap();
//!
//! // Consumer side: poll the result in.
//! assert!(bridge.result_ready(consumer, request).unwrap());
//! assert_eq!(
//!     bridge.result_parameter(consumer, request).unwrap(),
//!     Bytes::from_static(b"hello"),
//! );
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use crate::consumer::ConsumerEndpoint;
use crate::descriptor::ServiceDescriptor;
use crate::engine::{Engine, RequestId};
use crate::error::{BridgeError, Result};
use crate::provider::ProviderEndpoint;
use crate::registry::{Handle, HandleRegistry};

/// Handle-scoped poll/command facade over consumer and provider endpoints.
pub struct Bridge {
    engine: Arc<dyn Engine>,
    consumers: HandleRegistry<ConsumerEndpoint>,
    providers: HandleRegistry<ProviderEndpoint>,
}

impl Bridge {
    /// Create a bridge over the given engine.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            consumers: HandleRegistry::new(),
            providers: HandleRegistry::new(),
        }
    }

    /// Crate version string.
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Descriptor validity check: `None` for a valid descriptor, otherwise
    /// the parse error message.
    pub fn check_descriptor(text: &str) -> Option<String> {
        ServiceDescriptor::check(text)
    }

    // ------------------------------------------------------------------
    // Consumer lifecycle
    // ------------------------------------------------------------------

    /// Parse the descriptor, open a consumer session, start it, and publish
    /// a fresh handle. A failed creation consumes no handle value.
    pub fn create_consumer(&self, descriptor: &str) -> Result<Handle> {
        let descriptor =
            ServiceDescriptor::parse(descriptor).map_err(|err| {
                debug!(%err, "consumer descriptor rejected");
                BridgeError::InvalidDescriptor
            })?;
        let parts = self.engine.consumer(&descriptor).map_err(|err| {
            debug!(%err, "consumer session failed to open");
            BridgeError::Network
        })?;
        Ok(self.consumers.publish(ConsumerEndpoint::new(parts)))
    }

    /// Shut the consumer down and release its handle.
    pub fn remove_consumer(&self, consumer: Handle) -> Result<()> {
        self.consumers.remove(consumer)
    }

    // ------------------------------------------------------------------
    // Consumer introspection
    // ------------------------------------------------------------------

    /// True while at least one matching provider is reachable.
    pub fn consumer_connected(&self, consumer: Handle) -> Result<bool> {
        Ok(self.consumers.get(consumer)?.connected())
    }

    /// Canonical interface string of the consumer's contract.
    pub fn consumer_interface(&self, consumer: Handle) -> Result<String> {
        Ok(self.consumers.get(consumer)?.interface())
    }

    /// Stable identity of the consumer's session.
    pub fn consumer_identity(&self, consumer: Handle) -> Result<Uuid> {
        Ok(self.consumers.get(consumer)?.identity())
    }

    // ------------------------------------------------------------------
    // Calls and triggers
    // ------------------------------------------------------------------

    /// Single-target call expecting exactly one reply.
    pub fn call(&self, consumer: Handle, function: &str, parameter: Bytes) -> Result<RequestId> {
        self.consumers.get(consumer)?.call(function, parameter)
    }

    /// Broadcast call expecting zero or more replies over time.
    pub fn call_all(
        &self,
        consumer: Handle,
        function: &str,
        parameter: Bytes,
    ) -> Result<RequestId> {
        self.consumers.get(consumer)?.call_all(function, parameter)
    }

    /// Single-target fire-and-forget.
    pub fn trigger(&self, consumer: Handle, function: &str, parameter: Bytes) -> Result<()> {
        self.consumers.get(consumer)?.trigger(function, parameter)
    }

    /// Broadcast fire-and-forget.
    pub fn trigger_all(&self, consumer: Handle, function: &str, parameter: Bytes) -> Result<()> {
        self.consumers
            .get(consumer)?
            .trigger_all(function, parameter)
    }

    /// True once the call's reply has arrived.
    pub fn result_ready(&self, consumer: Handle, request: RequestId) -> Result<bool> {
        self.consumers.get(consumer)?.result_ready(request)
    }

    /// Destructive read of a call result — exactly once per request id.
    pub fn result_parameter(&self, consumer: Handle, request: RequestId) -> Result<Bytes> {
        self.consumers.get(consumer)?.result_parameter(request)
    }

    // ------------------------------------------------------------------
    // CallAll polling
    // ------------------------------------------------------------------

    /// True while a broadcast reply is waiting.
    pub fn call_all_available(&self, consumer: Handle, request: RequestId) -> Result<bool> {
        self.consumers.get(consumer)?.call_all_available(request)
    }

    /// Read the front broadcast reply without consuming it.
    pub fn call_all_peek_parameter(
        &self,
        consumer: Handle,
        request: RequestId,
    ) -> Result<Bytes> {
        self.consumers
            .get(consumer)?
            .call_all_peek_parameter(request)
    }

    /// Discard the front broadcast reply only.
    pub fn call_all_pop_one(&self, consumer: Handle, request: RequestId) -> Result<()> {
        self.consumers.get(consumer)?.call_all_pop_one(request)
    }

    /// Discard the whole reply collector and release the request id.
    pub fn call_all_teardown(&self, consumer: Handle, request: RequestId) -> Result<()> {
        self.consumers.get(consumer)?.call_all_teardown(request)
    }

    // ------------------------------------------------------------------
    // Listen
    // ------------------------------------------------------------------

    /// Subscribe to overheard results for `function`.
    pub fn start_listen(&self, consumer: Handle, function: &str) -> Result<()> {
        self.consumers.get(consumer)?.start_listen(function)
    }

    /// Unsubscribe from overheard results for `function`.
    pub fn stop_listen(&self, consumer: Handle, function: &str) -> Result<()> {
        self.consumers.get(consumer)?.stop_listen(function)
    }

    /// True while an overheard result is waiting.
    pub fn listen_available(&self, consumer: Handle) -> Result<bool> {
        Ok(self.consumers.get(consumer)?.listen_available())
    }

    /// Originating request id of the front overheard result.
    pub fn listen_peek_id(&self, consumer: Handle) -> Result<RequestId> {
        self.consumers.get(consumer)?.listen_peek_id()
    }

    /// Function name of the front overheard result.
    pub fn listen_peek_function(&self, consumer: Handle) -> Result<String> {
        self.consumers.get(consumer)?.listen_peek_function()
    }

    /// Originating request parameter of the front overheard result.
    pub fn listen_peek_request_parameter(&self, consumer: Handle) -> Result<Bytes> {
        self.consumers.get(consumer)?.listen_peek_request_parameter()
    }

    /// Result parameter of the front overheard result.
    pub fn listen_peek_result_parameter(&self, consumer: Handle) -> Result<Bytes> {
        self.consumers.get(consumer)?.listen_peek_result_parameter()
    }

    /// Pop the front overheard result.
    pub fn listen_clear(&self, consumer: Handle) -> Result<()> {
        self.consumers.get(consumer)?.listen_clear()
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Synchronous read of the locally cached property value.
    pub fn get_property(&self, consumer: Handle, property: &str) -> Result<Bytes> {
        self.consumers.get(consumer)?.property(property)
    }

    /// Request an asynchronous property refresh (idempotent while pending).
    pub fn request_property_update(&self, consumer: Handle, property: &str) -> Result<()> {
        self.consumers
            .get(consumer)?
            .request_property_update(property)
    }

    /// True once a requested property refresh has arrived.
    pub fn property_update_available(&self, consumer: Handle, property: &str) -> Result<bool> {
        Ok(self
            .consumers
            .get(consumer)?
            .property_update_available(property))
    }

    /// Destructive read of a property refresh.
    pub fn take_property_update(&self, consumer: Handle, property: &str) -> Result<Bytes> {
        self.consumers.get(consumer)?.take_property_update(property)
    }

    /// Subscribe to change notifications for `property`.
    pub fn start_observe(&self, consumer: Handle, property: &str) -> Result<()> {
        self.consumers.get(consumer)?.start_observe(property)
    }

    /// Unsubscribe from change notifications for `property`.
    pub fn stop_observe(&self, consumer: Handle, property: &str) -> Result<()> {
        self.consumers.get(consumer)?.stop_observe(property)
    }

    /// True while a change notification is waiting.
    pub fn change_available(&self, consumer: Handle) -> Result<bool> {
        Ok(self.consumers.get(consumer)?.change_available())
    }

    /// Property name of the front change notification.
    pub fn peek_change_name(&self, consumer: Handle) -> Result<String> {
        self.consumers.get(consumer)?.peek_change_name()
    }

    /// New value of the front change notification.
    pub fn peek_change_value(&self, consumer: Handle) -> Result<Bytes> {
        self.consumers.get(consumer)?.peek_change_value()
    }

    /// Pop the front change notification.
    pub fn clear_change(&self, consumer: Handle) -> Result<()> {
        self.consumers.get(consumer)?.clear_change()
    }

    // ------------------------------------------------------------------
    // Provider lifecycle
    // ------------------------------------------------------------------

    /// Parse the descriptor, open a provider session, start it, and publish
    /// a fresh handle. A failed creation consumes no handle value.
    pub fn create_provider(&self, descriptor: &str) -> Result<Handle> {
        let descriptor =
            ServiceDescriptor::parse(descriptor).map_err(|err| {
                debug!(%err, "provider descriptor rejected");
                BridgeError::InvalidDescriptor
            })?;
        let parts = self.engine.provider(&descriptor).map_err(|err| {
            debug!(%err, "provider session failed to open");
            BridgeError::Network
        })?;
        Ok(self.providers.publish(ProviderEndpoint::new(parts)))
    }

    /// Shut the provider down and release its handle.
    pub fn remove_provider(&self, provider: Handle) -> Result<()> {
        self.providers.remove(provider)
    }

    // ------------------------------------------------------------------
    // Provider operations
    // ------------------------------------------------------------------

    /// True while at least one matching consumer is reachable.
    pub fn provider_connected(&self, provider: Handle) -> Result<bool> {
        Ok(self.providers.get(provider)?.connected())
    }

    /// Canonical interface string of the provider's contract.
    pub fn provider_interface(&self, provider: Handle) -> Result<String> {
        Ok(self.providers.get(provider)?.interface())
    }

    /// Stable identity of the provider's session.
    pub fn provider_identity(&self, provider: Handle) -> Result<Uuid> {
        Ok(self.providers.get(provider)?.identity())
    }

    /// True while a request is waiting in the incoming queue.
    pub fn request_available(&self, provider: Handle) -> Result<bool> {
        Ok(self.providers.get(provider)?.request_available())
    }

    /// Pop the front request and cache its record under its id.
    pub fn take_next_request_id(&self, provider: Handle) -> Result<RequestId> {
        self.providers.get(provider)?.take_next_request_id()
    }

    /// Function name of a taken request.
    pub fn request_function(&self, provider: Handle, request: RequestId) -> Result<String> {
        self.providers.get(provider)?.request_function(request)
    }

    /// Parameter of a taken request.
    pub fn request_parameter(&self, provider: Handle, request: RequestId) -> Result<Bytes> {
        self.providers.get(provider)?.request_parameter(request)
    }

    /// Reply to a taken request and release its cached record.
    pub fn reply(&self, provider: Handle, request: RequestId, parameter: Bytes) -> Result<()> {
        self.providers.get(provider)?.reply(request, parameter)
    }

    /// Broadcast a provider-initiated request/result pair to listeners.
    pub fn emit(
        &self,
        provider: Handle,
        function: &str,
        request_parameter: Bytes,
        result_parameter: Bytes,
    ) -> Result<()> {
        self.providers
            .get(provider)?
            .emit(function, request_parameter, result_parameter)
    }

    /// Publish a new property value.
    pub fn set_property(&self, provider: Handle, property: &str, value: Bytes) -> Result<()> {
        self.providers.get(provider)?.set_property(property, value)
    }
}
