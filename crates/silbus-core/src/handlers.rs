//! Handler tables that stay stable under reentrant modification.
//!
//! User callbacks may add or remove other callbacks from inside a callback
//! invocation. The table therefore snapshots its entries before invoking
//! them: removal during iteration merely detaches the slot, additions become
//! visible on the next invocation round.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Identifier of a registered handler, unique per handler table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(u64);

struct HandlerTable<T: ?Sized> {
    entries: BTreeMap<HandlerId, Arc<T>>,
    next_id: u64,
}

impl<T: ?Sized> Default for HandlerTable<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 0,
        }
    }
}

/// Thread-safe handler table with reentrancy-tolerant iteration.
///
/// This is the required container for all user-facing handler slots (frame
/// handlers, transmit acknowledgements, state change notifications, ...).
pub struct SynchronizedHandlers<T: ?Sized> {
    inner: Mutex<HandlerTable<T>>,
}

impl<T: ?Sized> Default for SynchronizedHandlers<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HandlerTable::default()),
        }
    }
}

impl<T: ?Sized> SynchronizedHandlers<T> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler and return its id.
    pub fn add(&self, handler: Arc<T>) -> HandlerId {
        let mut table = self.inner.lock();
        let id = HandlerId(table.next_id);
        table.next_id += 1;
        table.entries.insert(id, handler);
        id
    }

    /// Remove a handler.
    ///
    /// Removing an unknown id is harmless; the outcome is observable only
    /// through the returned flag.
    pub fn remove(&self, id: HandlerId) -> bool {
        self.inner.lock().entries.remove(&id).is_some()
    }

    /// Invoke `call` for every registered handler. Returns whether any
    /// handler was registered at the time of the call.
    pub fn invoke_all(&self, mut call: impl FnMut(&T)) -> bool {
        let snapshot: Vec<Arc<T>> = self.inner.lock().entries.values().cloned().collect();
        for handler in &snapshot {
            call(handler);
        }
        !snapshot.is_empty()
    }

    /// Drop all handlers.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True when no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
