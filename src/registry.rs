//! Handle registry for endpoint lifecycles.
//!
//! A [`HandleRegistry`] maps opaque integer [`Handle`]s to live endpoint
//! objects. Handles come from a monotonically increasing counter and are
//! never reused, so a stale handle can always be told apart from a live one.
//!
//! Lock discipline: lookups take the read lock just long enough to clone the
//! endpoint `Arc`; creation and removal take the write lock. The endpoint is
//! fully built *before* the write lock is taken, so a failed creation never
//! consumes a handle value and slow session setup never blocks lookups.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::{BridgeError, Result};

/// Opaque identity of a live endpoint within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Raw integer value, for display and marshaling.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// An entry that knows how to tear down the engine session it owns.
pub trait Endpoint {
    /// Shut down the owned session. Called under the registry write lock
    /// during removal, before the handle is released.
    fn shutdown(&self);
}

/// Concurrency-safe handle-to-endpoint table.
pub struct HandleRegistry<E> {
    inner: RwLock<Inner<E>>,
}

struct Inner<E> {
    /// Next handle value; only ever incremented.
    next: u64,
    entries: HashMap<u64, Arc<E>>,
}

impl<E: Endpoint> HandleRegistry<E> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next: 0,
                entries: HashMap::new(),
            }),
        }
    }

    /// Publish a fully built endpoint under a fresh handle.
    ///
    /// The caller builds (and starts) the endpoint first; only a successful
    /// build reaches this point and consumes a handle value.
    pub fn publish(&self, endpoint: E) -> Handle {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let handle = Handle(inner.next);
        inner.next += 1;
        inner.entries.insert(handle.0, Arc::new(endpoint));
        debug!(%handle, "endpoint published");
        handle
    }

    /// Resolve a handle to its endpoint.
    ///
    /// The read lock is released before returning, so endpoint-level work
    /// never blocks other lookups.
    pub fn get(&self, handle: Handle) -> Result<Arc<E>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .entries
            .get(&handle.0)
            .cloned()
            .ok_or(BridgeError::InvalidEndpoint)
    }

    /// Shut the endpoint down and release its handle.
    ///
    /// Shutdown happens under the write lock, so operations racing a removal
    /// observe either the live endpoint or `InvalidEndpoint` — never a
    /// half-torn-down entry. The handle value is never reassigned.
    pub fn remove(&self, handle: Handle) -> Result<()> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let endpoint = inner
            .entries
            .remove(&handle.0)
            .ok_or(BridgeError::InvalidEndpoint)?;
        endpoint.shutdown();
        debug!(%handle, "endpoint removed");
        Ok(())
    }

    /// Number of live endpoints.
    pub fn len(&self) -> usize {
        self.inner.read().expect("registry lock poisoned").entries.len()
    }

    /// True when no endpoint is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Endpoint> Default for HandleRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct TestEndpoint {
        shutdowns: Arc<AtomicUsize>,
    }

    impl Endpoint for TestEndpoint {
        fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn endpoint() -> (TestEndpoint, Arc<AtomicUsize>) {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        (
            TestEndpoint {
                shutdowns: shutdowns.clone(),
            },
            shutdowns,
        )
    }

    #[test]
    fn test_handles_strictly_increase() {
        let registry = HandleRegistry::new();
        let handles: Vec<Handle> = (0..4).map(|_| registry.publish(endpoint().0)).collect();

        for pair in handles.windows(2) {
            assert!(pair[1].value() > pair[0].value());
        }
    }

    #[test]
    fn test_removed_handle_never_reused() {
        let registry = HandleRegistry::new();
        let first = registry.publish(endpoint().0);
        registry.remove(first).unwrap();

        for _ in 0..8 {
            let fresh = registry.publish(endpoint().0);
            assert_ne!(fresh, first);
        }
    }

    #[test]
    fn test_get_unknown_handle() {
        let registry = HandleRegistry::<TestEndpoint>::new();
        let handle = registry.publish(endpoint().0);
        registry.remove(handle).unwrap();

        assert_eq!(registry.get(handle).unwrap_err(), BridgeError::InvalidEndpoint);
    }

    #[test]
    fn test_remove_shuts_down_exactly_once() {
        let registry = HandleRegistry::new();
        let (ep, shutdowns) = endpoint();
        let handle = registry.publish(ep);

        registry.remove(handle).unwrap();
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);

        assert_eq!(
            registry.remove(handle).unwrap_err(),
            BridgeError::InvalidEndpoint
        );
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_len_tracks_live_entries() {
        let registry = HandleRegistry::new();
        assert!(registry.is_empty());

        let a = registry.publish(endpoint().0);
        let _b = registry.publish(endpoint().0);
        assert_eq!(registry.len(), 2);

        registry.remove(a).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_returns_shared_endpoint() {
        let registry = HandleRegistry::new();
        let handle = registry.publish(endpoint().0);

        let first = registry.get(handle).unwrap();
        let second = registry.get(handle).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
