//! Listener registry
//!
//! Synchronous fan-out shared by the session manager, the quote orchestrator,
//! the swap executor and the realtime channel. Listeners run on the emitting
//! task in registration order. A listener may unregister itself, or any
//! other listener, from inside its own callback.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Handle returned by `register`, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Entry<E> {
    id: ListenerId,
    active: Arc<AtomicBool>,
    callback: Listener<E>,
}

impl<E> Clone for Entry<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            active: Arc::clone(&self.active),
            callback: Arc::clone(&self.callback),
        }
    }
}

pub struct ListenerRegistry<E> {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry<E>>>,
}

impl<E> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<E> ListenerRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, callback: Listener<E>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push(Entry {
            id,
            active: Arc::new(AtomicBool::new(true)),
            callback,
        });
        id
    }

    /// Returns false if `id` was not registered
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter().position(|e| e.id == id) {
            Some(index) => {
                let entry = entries.remove(index);
                entry.active.store(false, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Deliver `event` to every listener registered at call time.
    ///
    /// The registry lock is not held while callbacks run. Listeners removed
    /// during this emission are skipped once removed.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Entry<E>> = self.entries.lock().clone();
        for entry in snapshot {
            if entry.active.load(Ordering::SeqCst) {
                (entry.callback)(event);
            }
        }
    }
}

impl<E: Clone + Send + 'static> ListenerRegistry<E> {
    /// Register a listener that forwards into a channel, for async consumers.
    /// The listener unregisters itself lazily once the receiver is dropped.
    pub fn channel(self: &Arc<Self>) -> (ListenerId, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Arc::downgrade(self);
        let own_id: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let own_id_inner = Arc::clone(&own_id);

        let id = self.register(Arc::new(move |event: &E| {
            if tx.send(event.clone()).is_err() {
                if let (Some(registry), Some(id)) = (registry.upgrade(), *own_id_inner.lock()) {
                    registry.unregister(id);
                }
            }
        }));
        *own_id.lock() = Some(id);
        (id, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_in_registration_order() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b"] {
            let seen = Arc::clone(&seen);
            registry.register(Arc::new(move |n: &u32| seen.lock().push(format!("{}{}", tag, n))));
        }

        registry.emit(&1);
        registry.emit(&2);
        assert_eq!(*seen.lock(), vec!["a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn test_unregister_stops_delivery() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = registry.register(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        registry.emit(&1);
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        registry.emit(&2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_from_inside_callback() {
        let registry: Arc<ListenerRegistry<u32>> = Arc::new(ListenerRegistry::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let second_id = Arc::new(Mutex::new(None));

        // First listener removes the second before it runs
        {
            let registry_ref = Arc::downgrade(&registry);
            let second_id = Arc::clone(&second_id);
            let seen = Arc::clone(&seen);
            registry.register(Arc::new(move |n: &u32| {
                seen.lock().push(format!("first{}", n));
                if let (Some(reg), Some(id)) = (registry_ref.upgrade(), *second_id.lock()) {
                    reg.unregister(id);
                }
            }));
        }
        {
            let seen = Arc::clone(&seen);
            let id = registry.register(Arc::new(move |n: &u32| seen.lock().push(format!("second{}", n))));
            *second_id.lock() = Some(id);
        }

        registry.emit(&1);
        registry.emit(&2);
        assert_eq!(*seen.lock(), vec!["first1", "first2"]);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_channel_forwarding_and_cleanup() {
        let registry: Arc<ListenerRegistry<String>> = Arc::new(ListenerRegistry::new());
        let (_, mut rx) = registry.channel();

        registry.emit(&"hello".to_string());
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));

        drop(rx);
        registry.emit(&"gone".to_string());
        assert!(registry.is_empty());
    }
}
