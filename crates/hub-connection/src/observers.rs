//! Weakly held listeners of the connection manager.

use std::sync::{Arc, Mutex, Weak};

use crate::error::ConnectionError;
use crate::types::ConnectionManagerState;

/// Receives connection manager notifications.
///
/// Callbacks run on the manager's dispatcher task, one at a time and in
/// the order the manager produced them. They may call back into the
/// manager.
pub trait ConnectionObserver: Send + Sync {
    fn on_state_changed(&self, _state: &ConnectionManagerState) {}

    /// A connect attempt settled; `None` means it succeeded.
    fn on_connect_completed(&self, _error: Option<&ConnectionError>) {}
}

/// Handle returned by [`ObserverRegistry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Registry of observers held by weak reference.
///
/// Dropping the last strong reference to an observer unregisters it.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    entries: Mutex<Entries>,
}

#[derive(Default)]
struct Entries {
    next_id: u64,
    observers: Vec<(ObserverId, Weak<dyn ConnectionObserver>)>,
}

impl ObserverRegistry {
    pub(crate) fn add(&self, observer: &Arc<dyn ConnectionObserver>) -> ObserverId {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.next_id += 1;
        let id = ObserverId(entries.next_id);
        entries.observers.push((id, Arc::downgrade(observer)));
        id
    }

    pub(crate) fn remove(&self, id: ObserverId) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .observers
            .retain(|(entry, _)| *entry != id);
    }

    /// Live observers at this moment. Dead entries are pruned.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn ConnectionObserver>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .observers
            .retain(|(_, observer)| observer.strong_count() > 0);
        entries
            .observers
            .iter()
            .filter_map(|(_, observer)| observer.upgrade())
            .collect()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .observers
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        states: AtomicUsize,
    }

    impl ConnectionObserver for Counter {
        fn on_state_changed(&self, _state: &ConnectionManagerState) {
            self.states.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn dropped_observers_are_pruned() {
        let registry = ObserverRegistry::default();
        let kept: Arc<dyn ConnectionObserver> = Arc::new(Counter::default());
        registry.add(&kept);
        {
            let dropped: Arc<dyn ConnectionObserver> = Arc::new(Counter::default());
            registry.add(&dropped);
        }

        assert_eq!(registry.snapshot().len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_by_id() {
        let registry = ObserverRegistry::default();
        let a: Arc<dyn ConnectionObserver> = Arc::new(Counter::default());
        let b: Arc<dyn ConnectionObserver> = Arc::new(Counter::default());
        let id_a = registry.add(&a);
        let id_b = registry.add(&b);
        assert_ne!(id_a, id_b);

        registry.remove(id_a);
        let live = registry.snapshot();
        assert_eq!(live.len(), 1);
        assert!(Arc::ptr_eq(&live[0], &b));
    }

    #[test]
    fn default_callbacks_are_noops() {
        struct Silent;
        impl ConnectionObserver for Silent {}
        let observer = Silent;
        observer.on_state_changed(&ConnectionManagerState::Connected);
        observer.on_connect_completed(None);
    }
}
