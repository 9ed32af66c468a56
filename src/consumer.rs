//! Consumer endpoint ("input" side).
//!
//! A [`ConsumerEndpoint`] wraps one engine consumer session and turns its
//! push-style traffic into pollable state:
//!
//! - per-call result futures (`call` → `result_ready`/`result_parameter`)
//! - per-broadcast reply collectors (`call_all` → peek/pop/teardown)
//! - the standing listen collector for overheard results
//! - per-property update futures and the shared change queue
//!
//! Dispatch into the session happens outside the endpoint state lock; only
//! the bookkeeping that files the returned future/collector under its id is
//! locked, so a caller issuing a new request never blocks pollers draining
//! results on the same endpoint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use crate::engine::{
    CallKind, ConsumerParts, ConsumerSession, ListenResult, PropertyChange, ReplyRoute,
    RequestId,
};
use crate::error::{BridgeError, Result};
use crate::poll::{Collector, FutureCell};
use crate::registry::Endpoint;

/// Consumer endpoint: one engine session plus its poll-side state tables.
pub struct ConsumerEndpoint {
    session: Arc<dyn ConsumerSession>,
    state: Mutex<ConsumerState>,
}

struct ConsumerState {
    /// One entry per outstanding single-target call, removed on first read.
    results: HashMap<RequestId, FutureCell<Bytes>>,
    /// One entry per outstanding broadcast call, removed only by teardown.
    call_all: HashMap<RequestId, Collector<Bytes>>,
    /// Overheard results; exists independent of listen subscriptions.
    listen: Collector<ListenResult>,
    /// At most one live (non-completed) entry per property.
    property_updates: HashMap<String, FutureCell<Bytes>>,
    /// Change notifications for all declared properties, merged.
    changes: Collector<PropertyChange>,
}

impl ConsumerEndpoint {
    /// Wire up the endpoint state from freshly opened session parts and
    /// start the session's background delivery.
    pub fn new(parts: ConsumerParts) -> Self {
        let ConsumerParts {
            session,
            listen,
            changes,
        } = parts;

        let mut listen_collector = Collector::new();
        listen_collector.attach(listen);

        let mut change_collector = Collector::new();
        for source in changes {
            change_collector.attach(source);
        }

        let endpoint = Self {
            session,
            state: Mutex::new(ConsumerState {
                results: HashMap::new(),
                call_all: HashMap::new(),
                listen: listen_collector,
                property_updates: HashMap::new(),
                changes: change_collector,
            }),
        };
        endpoint.session.run();
        endpoint
    }

    fn state(&self) -> MutexGuard<'_, ConsumerState> {
        self.state.lock().expect("consumer state poisoned")
    }

    /// True while at least one matching provider is reachable.
    pub fn connected(&self) -> bool {
        self.session.connected()
    }

    /// Canonical interface string of the service contract.
    pub fn interface(&self) -> String {
        self.session.interface()
    }

    /// Stable identity of the underlying session.
    pub fn identity(&self) -> Uuid {
        self.session.identity()
    }

    /// Dispatch a request and file its reply route. One path for all four
    /// kinds; the session validates the function synchronously.
    fn request(&self, kind: CallKind, function: &str, parameter: Bytes) -> Result<RequestId> {
        let ticket = self.session.dispatch(kind, function, parameter)?;

        let mut state = self.state();
        match ticket.route {
            ReplyRoute::None => {}
            ReplyRoute::Single(cell) => {
                state.results.insert(ticket.request, cell);
            }
            ReplyRoute::Stream(source) => {
                let mut collector = Collector::new();
                collector.attach(source);
                state.call_all.insert(ticket.request, collector);
            }
        }
        debug!(request = %ticket.request, ?kind, function, "request dispatched");
        Ok(ticket.request)
    }

    /// Single-target call expecting exactly one reply.
    pub fn call(&self, function: &str, parameter: Bytes) -> Result<RequestId> {
        self.request(CallKind::Call, function, parameter)
    }

    /// Broadcast call expecting zero or more replies over time.
    pub fn call_all(&self, function: &str, parameter: Bytes) -> Result<RequestId> {
        self.request(CallKind::CallAll, function, parameter)
    }

    /// Single-target fire-and-forget.
    pub fn trigger(&self, function: &str, parameter: Bytes) -> Result<()> {
        self.request(CallKind::Trigger, function, parameter)?;
        Ok(())
    }

    /// Broadcast fire-and-forget.
    pub fn trigger_all(&self, function: &str, parameter: Bytes) -> Result<()> {
        self.request(CallKind::TriggerAll, function, parameter)?;
        Ok(())
    }

    /// True once the call's reply has arrived.
    pub fn result_ready(&self, request: RequestId) -> Result<bool> {
        let mut state = self.state();
        let cell = state
            .results
            .get_mut(&request)
            .ok_or(BridgeError::InvalidResultId)?;
        Ok(cell.completed())
    }

    /// Destructive read of a call result — exactly once per request id.
    pub fn result_parameter(&self, request: RequestId) -> Result<Bytes> {
        let mut state = self.state();
        let cell = state
            .results
            .get_mut(&request)
            .ok_or(BridgeError::InvalidResultId)?;
        match cell.take() {
            Some(parameter) => {
                state.results.remove(&request);
                Ok(parameter)
            }
            None => Err(BridgeError::ResultNotArrived),
        }
    }

    /// True while a broadcast reply is waiting at the front of the queue.
    pub fn call_all_available(&self, request: RequestId) -> Result<bool> {
        let mut state = self.state();
        let collector = state
            .call_all
            .get_mut(&request)
            .ok_or(BridgeError::InvalidResultId)?;
        Ok(!collector.is_empty())
    }

    /// Read the front broadcast reply without consuming it.
    pub fn call_all_peek_parameter(&self, request: RequestId) -> Result<Bytes> {
        let mut state = self.state();
        let collector = state
            .call_all
            .get_mut(&request)
            .ok_or(BridgeError::InvalidResultId)?;
        collector
            .peek()
            .cloned()
            .ok_or(BridgeError::NoResultAvailable)
    }

    /// Discard the front broadcast reply only.
    pub fn call_all_pop_one(&self, request: RequestId) -> Result<()> {
        let mut state = self.state();
        let collector = state
            .call_all
            .get_mut(&request)
            .ok_or(BridgeError::InvalidResultId)?;
        collector.pop().ok_or(BridgeError::NoResultAvailable)?;
        Ok(())
    }

    /// Discard the whole reply collector and release the request id — the
    /// only way a broadcast call's resources are freed.
    pub fn call_all_teardown(&self, request: RequestId) -> Result<()> {
        let mut state = self.state();
        let mut collector = state
            .call_all
            .remove(&request)
            .ok_or(BridgeError::InvalidResultId)?;
        collector.discard();
        debug!(%request, "callAll torn down");
        Ok(())
    }

    /// Subscribe to overheard results for `function`.
    pub fn start_listen(&self, function: &str) -> Result<()> {
        self.session.start_listen(function)?;
        Ok(())
    }

    /// Unsubscribe from overheard results for `function`.
    pub fn stop_listen(&self, function: &str) -> Result<()> {
        self.session.stop_listen(function)?;
        Ok(())
    }

    /// True while an overheard result is waiting at the front of the queue.
    pub fn listen_available(&self) -> bool {
        !self.state().listen.is_empty()
    }

    /// Originating request id of the front overheard result.
    pub fn listen_peek_id(&self) -> Result<RequestId> {
        self.state()
            .listen
            .peek()
            .map(|r| r.request.id)
            .ok_or(BridgeError::NoResultAvailable)
    }

    /// Function name of the front overheard result.
    pub fn listen_peek_function(&self) -> Result<String> {
        self.state()
            .listen
            .peek()
            .map(|r| r.request.function.clone())
            .ok_or(BridgeError::NoResultAvailable)
    }

    /// Originating request parameter of the front overheard result.
    pub fn listen_peek_request_parameter(&self) -> Result<Bytes> {
        self.state()
            .listen
            .peek()
            .map(|r| r.request.parameter.clone())
            .ok_or(BridgeError::NoResultAvailable)
    }

    /// Result parameter of the front overheard result.
    pub fn listen_peek_result_parameter(&self) -> Result<Bytes> {
        self.state()
            .listen
            .peek()
            .map(|r| r.parameter.clone())
            .ok_or(BridgeError::NoResultAvailable)
    }

    /// Pop the front overheard result.
    pub fn listen_clear(&self) -> Result<()> {
        self.state()
            .listen
            .pop()
            .map(|_| ())
            .ok_or(BridgeError::NoResultAvailable)
    }

    /// Synchronous read of the locally cached property value.
    pub fn property(&self, property: &str) -> Result<Bytes> {
        Ok(self.session.property_value(property)?)
    }

    /// Request an asynchronous property refresh.
    ///
    /// A harmless no-op while a fetch for this property is already in
    /// flight, so polling callers can re-issue it freely.
    pub fn request_property_update(&self, property: &str) -> Result<()> {
        {
            let mut state = self.state();
            if let Some(cell) = state.property_updates.get_mut(property) {
                if !cell.completed() {
                    return Ok(());
                }
            }
        }

        // Dispatch outside the state lock.
        let cell = self.session.fetch_property(property)?;

        let mut state = self.state();
        // A racing caller installed a fresh pending fetch first; keep
        // theirs so at most one live future exists per property.
        let keep_existing = match state.property_updates.get_mut(property) {
            Some(existing) => !existing.completed(),
            None => false,
        };
        if !keep_existing {
            state.property_updates.insert(property.to_string(), cell);
        }
        Ok(())
    }

    /// True once a requested property refresh has arrived.
    pub fn property_update_available(&self, property: &str) -> bool {
        let mut state = self.state();
        state
            .property_updates
            .get_mut(property)
            .map(|cell| cell.completed())
            .unwrap_or(false)
    }

    /// Destructive read of a property refresh; re-arms
    /// [`request_property_update`](Self::request_property_update).
    pub fn take_property_update(&self, property: &str) -> Result<Bytes> {
        let mut state = self.state();
        let cell = state
            .property_updates
            .get_mut(property)
            .ok_or(BridgeError::NoUpdateAvailable)?;
        match cell.take() {
            Some(value) => {
                state.property_updates.remove(property);
                Ok(value)
            }
            None => Err(BridgeError::NoUpdateAvailable),
        }
    }

    /// Subscribe to change notifications for `property`.
    pub fn start_observe(&self, property: &str) -> Result<()> {
        self.session.start_observe(property)?;
        Ok(())
    }

    /// Unsubscribe from change notifications for `property`.
    pub fn stop_observe(&self, property: &str) -> Result<()> {
        self.session.stop_observe(property)?;
        Ok(())
    }

    /// True while a change notification is waiting at the front of the queue.
    pub fn change_available(&self) -> bool {
        !self.state().changes.is_empty()
    }

    /// Property name of the front change notification.
    pub fn peek_change_name(&self) -> Result<String> {
        self.state()
            .changes
            .peek()
            .map(|c| c.property.clone())
            .ok_or(BridgeError::NoUpdateAvailable)
    }

    /// New value of the front change notification.
    pub fn peek_change_value(&self) -> Result<Bytes> {
        self.state()
            .changes
            .peek()
            .map(|c| c.value.clone())
            .ok_or(BridgeError::NoUpdateAvailable)
    }

    /// Pop the front change notification.
    pub fn clear_change(&self) -> Result<()> {
        self.state()
            .changes
            .pop()
            .map(|_| ())
            .ok_or(BridgeError::NoUpdateAvailable)
    }
}

impl Endpoint for ConsumerEndpoint {
    fn shutdown(&self) {
        self.session.shutdown();
    }
}
