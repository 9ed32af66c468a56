//! In-process loopback engine.
//!
//! [`LoopbackEngine`] implements the [`Engine`] traits over a shared
//! in-memory bus instead of a network: every session opened from the same
//! engine value sees the others, matched by interface string. It stands in
//! for a real delivery backend in tests and demos, with the same observable
//! contract — requests fan out to providers, replies come back through the
//! pending-reply routes, listen results and property changes are pushed into
//! the standing streams.
//!
//! Delivery is immediate (an unbounded send), so anything dispatched here is
//! observable by the very next poll.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::descriptor::ServiceDescriptor;
use crate::poll::{future_cell, Completer, FutureCell};

use super::{
    CallKind, ConsumerParts, ConsumerSession, DispatchTicket, Engine, ListenResult,
    PropertyChange, ProviderParts, ProviderSession, ReplyRoute, RequestId, RequestRecord,
    SessionError,
};

/// In-memory engine connecting consumers and providers opened from the same
/// value.
#[derive(Clone, Default)]
pub struct LoopbackEngine {
    bus: Arc<Mutex<BusState>>,
}

impl LoopbackEngine {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for LoopbackEngine {
    fn consumer(&self, descriptor: &ServiceDescriptor) -> Result<ConsumerParts, SessionError> {
        let id = Uuid::new_v4();
        let interface = descriptor.canonical();

        let (listen_tx, listen_rx) = mpsc::unbounded_channel();
        let mut change_txs = HashMap::new();
        let mut changes = Vec::new();
        for property in descriptor.property_names() {
            let (tx, rx) = mpsc::unbounded_channel();
            change_txs.insert(property, tx);
            changes.push(rx);
        }

        let mut bus = self.bus.lock().expect("loopback bus poisoned");
        bus.consumers.insert(
            id,
            ConsumerPeer {
                interface: interface.clone(),
                listen_tx,
                listening: HashSet::new(),
                observing: HashSet::new(),
                change_txs,
            },
        );
        drop(bus);

        debug!(%id, "loopback consumer registered");
        Ok(ConsumerParts {
            session: Arc::new(LoopbackConsumer {
                id,
                descriptor: descriptor.clone(),
                interface,
                bus: self.bus.clone(),
            }),
            listen: listen_rx,
            changes,
        })
    }

    fn provider(&self, descriptor: &ServiceDescriptor) -> Result<ProviderParts, SessionError> {
        let id = Uuid::new_v4();
        let interface = descriptor.canonical();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();

        let mut bus = self.bus.lock().expect("loopback bus poisoned");
        bus.providers.insert(
            id,
            ProviderPeer {
                interface: interface.clone(),
                requests_tx,
            },
        );
        drop(bus);

        debug!(%id, "loopback provider registered");
        Ok(ProviderParts {
            session: Arc::new(LoopbackProvider {
                id,
                descriptor: descriptor.clone(),
                interface,
                bus: self.bus.clone(),
            }),
            requests: requests_rx,
        })
    }
}

#[derive(Default)]
struct BusState {
    consumers: HashMap<Uuid, ConsumerPeer>,
    providers: HashMap<Uuid, ProviderPeer>,
    /// Outstanding reply routes, keyed by request id.
    pending: HashMap<RequestId, PendingReply>,
    /// Current property values, keyed by (interface, property).
    properties: HashMap<(String, String), Bytes>,
}

struct ConsumerPeer {
    interface: String,
    listen_tx: mpsc::UnboundedSender<ListenResult>,
    listening: HashSet<String>,
    observing: HashSet<String>,
    change_txs: HashMap<String, mpsc::UnboundedSender<PropertyChange>>,
}

struct ProviderPeer {
    interface: String,
    requests_tx: mpsc::UnboundedSender<RequestRecord>,
}

struct PendingReply {
    consumer: Uuid,
    route: PendingRoute,
}

enum PendingRoute {
    Single(Completer<Bytes>),
    Stream(mpsc::UnboundedSender<Bytes>),
}

impl BusState {
    /// Providers serving `interface`, stably ordered by identity.
    fn providers_for(&self, interface: &str) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .providers
            .iter()
            .filter(|(_, p)| p.interface == interface)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Fan an overheard result out to every consumer listening on its
    /// function.
    fn spread_listen(&mut self, interface: &str, result: &ListenResult) {
        for peer in self.consumers.values() {
            if peer.interface == interface && peer.listening.contains(&result.request.function) {
                let _ = peer.listen_tx.send(result.clone());
            }
        }
    }
}

struct LoopbackConsumer {
    id: Uuid,
    descriptor: ServiceDescriptor,
    interface: String,
    bus: Arc<Mutex<BusState>>,
}

impl LoopbackConsumer {
    fn check_function(&self, function: &str) -> Result<(), SessionError> {
        if self.descriptor.has_function(function) {
            Ok(())
        } else {
            Err(SessionError::UnknownFunction(function.to_string()))
        }
    }

    fn check_property(&self, property: &str) -> Result<(), SessionError> {
        if self.descriptor.has_property(property) {
            Ok(())
        } else {
            Err(SessionError::UnknownProperty(property.to_string()))
        }
    }
}

impl ConsumerSession for LoopbackConsumer {
    fn connected(&self) -> bool {
        let bus = self.bus.lock().expect("loopback bus poisoned");
        !bus.providers_for(&self.interface).is_empty()
    }

    fn interface(&self) -> String {
        self.interface.clone()
    }

    fn identity(&self) -> Uuid {
        self.id
    }

    fn run(&self) {
        // Peers are routable from registration; nothing to start here.
        debug!(id = %self.id, "loopback consumer running");
    }

    fn shutdown(&self) {
        let mut bus = self.bus.lock().expect("loopback bus poisoned");
        bus.consumers.remove(&self.id);
        // Outstanding reply routes of this consumer die with it.
        bus.pending.retain(|_, p| p.consumer != self.id);
        debug!(id = %self.id, "loopback consumer shut down");
    }

    fn dispatch(
        &self,
        kind: CallKind,
        function: &str,
        parameter: Bytes,
    ) -> Result<DispatchTicket, SessionError> {
        self.check_function(function)?;

        let request = RequestId::generate();
        let record = RequestRecord {
            id: request,
            function: function.to_string(),
            parameter,
        };

        let mut bus = self.bus.lock().expect("loopback bus poisoned");
        let reachable = bus.providers_for(&self.interface);
        let targets: &[Uuid] = match kind {
            // Single-target kinds go to the lowest-identity provider.
            CallKind::Call | CallKind::Trigger => match reachable.first() {
                Some(first) => std::slice::from_ref(first),
                None => &[],
            },
            CallKind::CallAll | CallKind::TriggerAll => &reachable,
        };

        let route = match kind {
            CallKind::Call => {
                let (completer, cell) = future_cell();
                bus.pending.insert(
                    request,
                    PendingReply {
                        consumer: self.id,
                        route: PendingRoute::Single(completer),
                    },
                );
                ReplyRoute::Single(cell)
            }
            CallKind::CallAll => {
                let (tx, rx) = mpsc::unbounded_channel();
                bus.pending.insert(
                    request,
                    PendingReply {
                        consumer: self.id,
                        route: PendingRoute::Stream(tx),
                    },
                );
                ReplyRoute::Stream(rx)
            }
            CallKind::Trigger | CallKind::TriggerAll => ReplyRoute::None,
        };

        for target in targets {
            if let Some(provider) = bus.providers.get(target) {
                let _ = provider.requests_tx.send(record.clone());
            }
        }
        trace!(%request, ?kind, function, targets = targets.len(), "dispatched");

        Ok(DispatchTicket { request, route })
    }

    fn start_listen(&self, function: &str) -> Result<(), SessionError> {
        self.check_function(function)?;
        let mut bus = self.bus.lock().expect("loopback bus poisoned");
        if let Some(peer) = bus.consumers.get_mut(&self.id) {
            peer.listening.insert(function.to_string());
        }
        Ok(())
    }

    fn stop_listen(&self, function: &str) -> Result<(), SessionError> {
        self.check_function(function)?;
        let mut bus = self.bus.lock().expect("loopback bus poisoned");
        if let Some(peer) = bus.consumers.get_mut(&self.id) {
            peer.listening.remove(function);
        }
        Ok(())
    }

    fn property_value(&self, property: &str) -> Result<Bytes, SessionError> {
        self.check_property(property)?;
        let bus = self.bus.lock().expect("loopback bus poisoned");
        Ok(bus
            .properties
            .get(&(self.interface.clone(), property.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn fetch_property(&self, property: &str) -> Result<FutureCell<Bytes>, SessionError> {
        let value = self.property_value(property)?;
        // A real engine resolves this on its own schedule; the loopback bus
        // already has the value at hand.
        let (completer, cell) = future_cell();
        completer.complete(value);
        Ok(cell)
    }

    fn start_observe(&self, property: &str) -> Result<(), SessionError> {
        self.check_property(property)?;
        let mut bus = self.bus.lock().expect("loopback bus poisoned");
        if let Some(peer) = bus.consumers.get_mut(&self.id) {
            peer.observing.insert(property.to_string());
        }
        Ok(())
    }

    fn stop_observe(&self, property: &str) -> Result<(), SessionError> {
        self.check_property(property)?;
        let mut bus = self.bus.lock().expect("loopback bus poisoned");
        if let Some(peer) = bus.consumers.get_mut(&self.id) {
            peer.observing.remove(property);
        }
        Ok(())
    }
}

struct LoopbackProvider {
    id: Uuid,
    descriptor: ServiceDescriptor,
    interface: String,
    bus: Arc<Mutex<BusState>>,
}

impl ProviderSession for LoopbackProvider {
    fn connected(&self) -> bool {
        let bus = self.bus.lock().expect("loopback bus poisoned");
        bus.consumers.values().any(|c| c.interface == self.interface)
    }

    fn interface(&self) -> String {
        self.interface.clone()
    }

    fn identity(&self) -> Uuid {
        self.id
    }

    fn run(&self) {
        debug!(id = %self.id, "loopback provider running");
    }

    fn shutdown(&self) {
        let mut bus = self.bus.lock().expect("loopback bus poisoned");
        bus.providers.remove(&self.id);
        debug!(id = %self.id, "loopback provider shut down");
    }

    fn reply(&self, request: &RequestRecord, parameter: Bytes) -> Result<(), SessionError> {
        enum Settled {
            /// Single route: consume the entry and complete the cell.
            Complete,
            /// Stream route whose collector is gone: drop the entry.
            Prune,
            /// Stream delivered, or nothing pending (triggered request).
            Done,
        }

        let mut bus = self.bus.lock().expect("loopback bus poisoned");

        let settled = match bus.pending.get(&request.id) {
            Some(p) => match &p.route {
                PendingRoute::Single(_) => Settled::Complete,
                PendingRoute::Stream(tx) => {
                    if tx.send(parameter.clone()).is_ok() {
                        Settled::Done
                    } else {
                        Settled::Prune
                    }
                }
            },
            None => Settled::Done,
        };
        match settled {
            Settled::Complete => {
                // Exactly one reply: the route is consumed with the entry.
                if let Some(PendingReply {
                    route: PendingRoute::Single(completer),
                    ..
                }) = bus.pending.remove(&request.id)
                {
                    completer.complete(parameter.clone());
                }
            }
            Settled::Prune => {
                bus.pending.remove(&request.id);
            }
            Settled::Done => {}
        }

        let result = ListenResult {
            request: request.clone(),
            parameter,
        };
        bus.spread_listen(&self.interface, &result);
        trace!(request = %request.id, function = %request.function, "reply routed");
        Ok(())
    }

    fn emit(
        &self,
        function: &str,
        request_parameter: Bytes,
        result_parameter: Bytes,
    ) -> Result<(), SessionError> {
        if !self.descriptor.has_function(function) {
            return Err(SessionError::UnknownFunction(function.to_string()));
        }

        let result = ListenResult {
            request: RequestRecord {
                id: RequestId::generate(),
                function: function.to_string(),
                parameter: request_parameter,
            },
            parameter: result_parameter,
        };

        let mut bus = self.bus.lock().expect("loopback bus poisoned");
        bus.spread_listen(&self.interface, &result);
        Ok(())
    }

    fn set_property(&self, property: &str, value: Bytes) -> Result<(), SessionError> {
        if !self.descriptor.has_property(property) {
            return Err(SessionError::UnknownProperty(property.to_string()));
        }

        let mut bus = self.bus.lock().expect("loopback bus poisoned");
        bus.properties.insert(
            (self.interface.clone(), property.to_string()),
            value.clone(),
        );
        for peer in bus.consumers.values() {
            if peer.interface == self.interface && peer.observing.contains(property) {
                if let Some(tx) = peer.change_txs.get(property) {
                    let _ = tx.send(PropertyChange {
                        property: property.to_string(),
                        value: value.clone(),
                    });
                }
            }
        }
        trace!(property, "property set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = "\
function SayHello(Greeting string) (Answer string)
property Mood: State string";

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::parse(DESCRIPTOR).unwrap()
    }

    #[test]
    fn test_connectivity_tracks_peers() {
        let engine = LoopbackEngine::new();
        let consumer = engine.consumer(&descriptor()).unwrap();
        assert!(!consumer.session.connected());

        let provider = engine.provider(&descriptor()).unwrap();
        assert!(consumer.session.connected());
        assert!(provider.session.connected());

        provider.session.shutdown();
        assert!(!consumer.session.connected());
    }

    #[test]
    fn test_call_round_trip() {
        let engine = LoopbackEngine::new();
        let consumer = engine.consumer(&descriptor()).unwrap();
        let mut provider = engine.provider(&descriptor()).unwrap();

        let ticket = consumer
            .session
            .dispatch(CallKind::Call, "SayHello", Bytes::from_static(b"hi"))
            .unwrap();
        let mut cell = match ticket.route {
            ReplyRoute::Single(cell) => cell,
            other => panic!("expected single route, got {other:?}"),
        };
        assert!(!cell.completed());

        let record = provider.requests.try_recv().unwrap();
        assert_eq!(record.id, ticket.request);
        assert_eq!(record.function, "SayHello");
        assert_eq!(record.parameter, Bytes::from_static(b"hi"));

        provider
            .session
            .reply(&record, Bytes::from_static(b"hello"))
            .unwrap();
        assert_eq!(cell.take(), Some(Bytes::from_static(b"hello")));
    }

    #[test]
    fn test_call_all_reaches_every_provider() {
        let engine = LoopbackEngine::new();
        let consumer = engine.consumer(&descriptor()).unwrap();
        let mut provider_a = engine.provider(&descriptor()).unwrap();
        let mut provider_b = engine.provider(&descriptor()).unwrap();

        let ticket = consumer
            .session
            .dispatch(CallKind::CallAll, "SayHello", Bytes::new())
            .unwrap();
        let mut replies = match ticket.route {
            ReplyRoute::Stream(rx) => rx,
            other => panic!("expected stream route, got {other:?}"),
        };

        let record_a = provider_a.requests.try_recv().unwrap();
        let record_b = provider_b.requests.try_recv().unwrap();
        provider_a
            .session
            .reply(&record_a, Bytes::from_static(b"a"))
            .unwrap();
        provider_b
            .session
            .reply(&record_b, Bytes::from_static(b"b"))
            .unwrap();

        let mut got = vec![
            replies.try_recv().unwrap(),
            replies.try_recv().unwrap(),
        ];
        got.sort();
        assert_eq!(got, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
    }

    #[test]
    fn test_trigger_routes_no_reply() {
        let engine = LoopbackEngine::new();
        let consumer = engine.consumer(&descriptor()).unwrap();
        let mut provider = engine.provider(&descriptor()).unwrap();

        let ticket = consumer
            .session
            .dispatch(CallKind::Trigger, "SayHello", Bytes::new())
            .unwrap();
        assert!(matches!(ticket.route, ReplyRoute::None));

        // The provider still sees the request and may reply into the void.
        let record = provider.requests.try_recv().unwrap();
        provider.session.reply(&record, Bytes::new()).unwrap();
    }

    #[test]
    fn test_unknown_function_rejected_synchronously() {
        let engine = LoopbackEngine::new();
        let consumer = engine.consumer(&descriptor()).unwrap();

        let err = consumer
            .session
            .dispatch(CallKind::Call, "Nope", Bytes::new())
            .unwrap_err();
        assert_eq!(err, SessionError::UnknownFunction("Nope".to_string()));
    }

    #[test]
    fn test_listen_fan_out_requires_subscription() {
        let engine = LoopbackEngine::new();
        let mut consumer = engine.consumer(&descriptor()).unwrap();
        let mut provider = engine.provider(&descriptor()).unwrap();

        // Not listening yet: a reply is not overheard.
        let ticket = consumer
            .session
            .dispatch(CallKind::Call, "SayHello", Bytes::new())
            .unwrap();
        drop(ticket);
        let record = provider.requests.try_recv().unwrap();
        provider.session.reply(&record, Bytes::new()).unwrap();
        assert!(consumer.listen.try_recv().is_err());

        consumer.session.start_listen("SayHello").unwrap();
        provider
            .session
            .emit(
                "SayHello",
                Bytes::from_static(b"in"),
                Bytes::from_static(b"out"),
            )
            .unwrap();
        let heard = consumer.listen.try_recv().unwrap();
        assert_eq!(heard.request.function, "SayHello");
        assert_eq!(heard.request.parameter, Bytes::from_static(b"in"));
        assert_eq!(heard.parameter, Bytes::from_static(b"out"));

        consumer.session.stop_listen("SayHello").unwrap();
        provider
            .session
            .emit("SayHello", Bytes::new(), Bytes::new())
            .unwrap();
        assert!(consumer.listen.try_recv().is_err());
    }

    #[test]
    fn test_property_set_observe_fetch() {
        let engine = LoopbackEngine::new();
        let mut consumer = engine.consumer(&descriptor()).unwrap();
        let provider = engine.provider(&descriptor()).unwrap();

        // Unset property reads as empty.
        assert_eq!(
            consumer.session.property_value("Mood").unwrap(),
            Bytes::new()
        );

        consumer.session.start_observe("Mood").unwrap();
        provider
            .session
            .set_property("Mood", Bytes::from_static(b"sunny"))
            .unwrap();

        assert_eq!(
            consumer.session.property_value("Mood").unwrap(),
            Bytes::from_static(b"sunny")
        );
        let change = consumer.changes[0].try_recv().unwrap();
        assert_eq!(change.property, "Mood");
        assert_eq!(change.value, Bytes::from_static(b"sunny"));

        let mut fetched = consumer.session.fetch_property("Mood").unwrap();
        assert_eq!(fetched.take(), Some(Bytes::from_static(b"sunny")));

        let err = provider
            .session
            .set_property("Nope", Bytes::new())
            .unwrap_err();
        assert_eq!(err, SessionError::UnknownProperty("Nope".to_string()));
    }

    #[test]
    fn test_shutdown_sweeps_pending_routes() {
        let engine = LoopbackEngine::new();
        let consumer = engine.consumer(&descriptor()).unwrap();
        let mut provider = engine.provider(&descriptor()).unwrap();

        let ticket = consumer
            .session
            .dispatch(CallKind::Call, "SayHello", Bytes::new())
            .unwrap();
        let record = provider.requests.try_recv().unwrap();

        consumer.session.shutdown();
        // Replying after the consumer is gone routes nowhere and is fine.
        provider.session.reply(&record, Bytes::new()).unwrap();
        drop(ticket);
    }
}
