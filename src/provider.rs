//! Provider endpoint ("output" side).
//!
//! A [`ProviderEndpoint`] wraps one engine provider session. Incoming
//! requests arrive on the session's standing stream and queue up in a
//! collector; `take_next_request_id` pops one and caches its record, because
//! every later boundary call references the request by id alone. Replying is
//! the only way a cached request is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use crate::engine::{ProviderParts, ProviderSession, RequestId, RequestRecord};
use crate::error::{BridgeError, Result};
use crate::poll::Collector;
use crate::registry::Endpoint;

/// Provider endpoint: one engine session plus its poll-side request state.
pub struct ProviderEndpoint {
    session: Arc<dyn ProviderSession>,
    state: Mutex<ProviderState>,
}

struct ProviderState {
    /// Requests not yet taken by the caller.
    incoming: Collector<RequestRecord>,
    /// Requests taken but not yet replied to, by id.
    taken: HashMap<RequestId, RequestRecord>,
}

impl ProviderEndpoint {
    /// Wire up the endpoint state from freshly opened session parts and
    /// start the session's background delivery.
    pub fn new(parts: ProviderParts) -> Self {
        let ProviderParts { session, requests } = parts;

        let mut incoming = Collector::new();
        incoming.attach(requests);

        let endpoint = Self {
            session,
            state: Mutex::new(ProviderState {
                incoming,
                taken: HashMap::new(),
            }),
        };
        endpoint.session.run();
        endpoint
    }

    fn state(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().expect("provider state poisoned")
    }

    /// True while at least one matching consumer is reachable.
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

    /// True while a request is waiting in the incoming queue.
    pub fn request_available(&self) -> bool {
        !self.state().incoming.is_empty()
    }

    /// Pop the front request and cache its record under its id.
    pub fn take_next_request_id(&self) -> Result<RequestId> {
        let mut state = self.state();
        let record = state
            .incoming
            .pop()
            .ok_or(BridgeError::NoRequestAvailable)?;
        let request = record.id;
        state.taken.insert(request, record);
        debug!(%request, "request taken");
        Ok(request)
    }

    /// Function name of a taken request.
    pub fn request_function(&self, request: RequestId) -> Result<String> {
        self.state()
            .taken
            .get(&request)
            .map(|r| r.function.clone())
            .ok_or(BridgeError::InvalidRequestId)
    }

    /// Parameter of a taken request.
    pub fn request_parameter(&self, request: RequestId) -> Result<Bytes> {
        self.state()
            .taken
            .get(&request)
            .map(|r| r.parameter.clone())
            .ok_or(BridgeError::InvalidRequestId)
    }

    /// Reply to a taken request and release its cached record.
    ///
    /// The record is claimed atomically under the state lock before the
    /// session forwards the reply, so a concurrent duplicate reply loses and
    /// reports `InvalidRequestId`.
    pub fn reply(&self, request: RequestId, parameter: Bytes) -> Result<()> {
        let record = self
            .state()
            .taken
            .remove(&request)
            .ok_or(BridgeError::InvalidRequestId)?;
        self.session.reply(&record, parameter)?;
        debug!(%request, "request replied");
        Ok(())
    }

    /// Broadcast a provider-initiated request/result pair to listeners.
    pub fn emit(
        &self,
        function: &str,
        request_parameter: Bytes,
        result_parameter: Bytes,
    ) -> Result<()> {
        self.session
            .emit(function, request_parameter, result_parameter)?;
        Ok(())
    }

    /// Publish a new property value.
    pub fn set_property(&self, property: &str, value: Bytes) -> Result<()> {
        self.session.set_property(property, value)?;
        Ok(())
    }
}

impl Endpoint for ProviderEndpoint {
    fn shutdown(&self) {
        self.session.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::sync::mpsc;

    use crate::engine::SessionError;

    struct MockSession {
        functions: HashSet<String>,
        properties: HashSet<String>,
        replies: Mutex<Vec<(RequestId, Bytes)>>,
        emitted: Mutex<Vec<(String, Bytes, Bytes)>>,
        set_values: Mutex<Vec<(String, Bytes)>>,
        running: AtomicBool,
        shut_down: AtomicBool,
    }

    impl MockSession {
        fn new() -> Self {
            Self {
                functions: ["SayHello".to_string()].into(),
                properties: ["Mood".to_string()].into(),
                replies: Mutex::new(Vec::new()),
                emitted: Mutex::new(Vec::new()),
                set_values: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
            }
        }
    }

    impl ProviderSession for MockSession {
        fn connected(&self) -> bool {
            true
        }

        fn interface(&self) -> String {
            "mock".to_string()
        }

        fn identity(&self) -> Uuid {
            Uuid::nil()
        }

        fn run(&self) {
            self.running.store(true, Ordering::SeqCst);
        }

        fn shutdown(&self) {
            self.shut_down.store(true, Ordering::SeqCst);
        }

        fn reply(
            &self,
            request: &RequestRecord,
            parameter: Bytes,
        ) -> std::result::Result<(), SessionError> {
            self.replies.lock().unwrap().push((request.id, parameter));
            Ok(())
        }

        fn emit(
            &self,
            function: &str,
            request_parameter: Bytes,
            result_parameter: Bytes,
        ) -> std::result::Result<(), SessionError> {
            if !self.functions.contains(function) {
                return Err(SessionError::UnknownFunction(function.to_string()));
            }
            self.emitted.lock().unwrap().push((
                function.to_string(),
                request_parameter,
                result_parameter,
            ));
            Ok(())
        }

        fn set_property(
            &self,
            property: &str,
            value: Bytes,
        ) -> std::result::Result<(), SessionError> {
            if !self.properties.contains(property) {
                return Err(SessionError::UnknownProperty(property.to_string()));
            }
            self.set_values
                .lock()
                .unwrap()
                .push((property.to_string(), value));
            Ok(())
        }
    }

    struct Rig {
        session: Arc<MockSession>,
        endpoint: ProviderEndpoint,
        requests_tx: mpsc::UnboundedSender<RequestRecord>,
    }

    fn rig() -> Rig {
        let session = Arc::new(MockSession::new());
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let endpoint = ProviderEndpoint::new(ProviderParts {
            session: session.clone(),
            requests: requests_rx,
        });
        Rig {
            session,
            endpoint,
            requests_tx,
        }
    }

    fn record(function: &str, parameter: &'static [u8]) -> RequestRecord {
        RequestRecord {
            id: RequestId::generate(),
            function: function.to_string(),
            parameter: Bytes::from_static(parameter),
        }
    }

    #[test]
    fn test_construction_starts_session() {
        let rig = rig();
        assert!(rig.session.running.load(Ordering::SeqCst));
        assert!(rig.endpoint.connected());
    }

    #[test]
    fn test_take_reply_lifecycle() {
        let rig = rig();

        assert!(!rig.endpoint.request_available());
        assert_eq!(
            rig.endpoint.take_next_request_id(),
            Err(BridgeError::NoRequestAvailable)
        );

        let incoming = record("SayHello", b"hi");
        rig.requests_tx.send(incoming.clone()).unwrap();

        assert!(rig.endpoint.request_available());
        let request = rig.endpoint.take_next_request_id().unwrap();
        assert_eq!(request, incoming.id);

        // The record is served from the cache, not the queue.
        assert!(!rig.endpoint.request_available());
        assert_eq!(rig.endpoint.request_function(request).unwrap(), "SayHello");
        assert_eq!(
            rig.endpoint.request_parameter(request).unwrap(),
            Bytes::from_static(b"hi")
        );

        rig.endpoint
            .reply(request, Bytes::from_static(b"hello"))
            .unwrap();
        assert_eq!(
            *rig.session.replies.lock().unwrap(),
            vec![(request, Bytes::from_static(b"hello"))]
        );

        // Replying released the cache entry.
        assert_eq!(
            rig.endpoint.reply(request, Bytes::new()),
            Err(BridgeError::InvalidRequestId)
        );
        assert_eq!(
            rig.endpoint.request_function(request),
            Err(BridgeError::InvalidRequestId)
        );
    }

    #[test]
    fn test_requests_taken_in_arrival_order() {
        let rig = rig();
        let first = record("SayHello", b"1");
        let second = record("SayHello", b"2");
        rig.requests_tx.send(first.clone()).unwrap();
        rig.requests_tx.send(second.clone()).unwrap();

        assert_eq!(rig.endpoint.take_next_request_id().unwrap(), first.id);
        assert_eq!(rig.endpoint.take_next_request_id().unwrap(), second.id);
    }

    #[test]
    fn test_untaken_request_id_is_invalid() {
        let rig = rig();
        let queued = record("SayHello", b"x");
        rig.requests_tx.send(queued.clone()).unwrap();

        // Still queued, not taken: lookups by id fail until the record has
        // been popped into the cache.
        assert_eq!(
            rig.endpoint.request_function(queued.id),
            Err(BridgeError::InvalidRequestId)
        );
        assert_eq!(
            rig.endpoint.reply(queued.id, Bytes::new()),
            Err(BridgeError::InvalidRequestId)
        );
    }

    #[test]
    fn test_emit_passthrough_and_validation() {
        let rig = rig();
        rig.endpoint
            .emit(
                "SayHello",
                Bytes::from_static(b"in"),
                Bytes::from_static(b"out"),
            )
            .unwrap();
        assert_eq!(rig.session.emitted.lock().unwrap().len(), 1);

        assert_eq!(
            rig.endpoint.emit("Nope", Bytes::new(), Bytes::new()),
            Err(BridgeError::InvalidFunction)
        );
    }

    #[test]
    fn test_set_property_passthrough_and_validation() {
        let rig = rig();
        rig.endpoint
            .set_property("Mood", Bytes::from_static(b"calm"))
            .unwrap();
        assert_eq!(
            *rig.session.set_values.lock().unwrap(),
            vec![("Mood".to_string(), Bytes::from_static(b"calm"))]
        );

        assert_eq!(
            rig.endpoint.set_property("Nope", Bytes::new()),
            Err(BridgeError::InvalidProperty)
        );
    }

    #[test]
    fn test_shutdown_reaches_session() {
        let rig = rig();
        Endpoint::shutdown(&rig.endpoint);
        assert!(rig.session.shut_down.load(Ordering::SeqCst));
    }
}
