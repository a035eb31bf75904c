//! Append-only map of lazily resolved values.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;

/// Each key is resolved at most once. Callers racing on the same key block
/// until the first resolver finishes and then observe its value; callers on
/// different keys do not wait on each other.
pub struct OnceMap<K, V> {
    slots: RwLock<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> OnceMap<K, V> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// The value for `key`, running `resolve` if no caller has yet.
    pub fn get_or_resolve(&self, key: &K, resolve: impl FnOnce() -> V) -> V {
        let slot = self.slot(key);
        slot.get_or_init(resolve).clone()
    }

    /// The value for `key` if it has been resolved.
    pub fn get(&self, key: &K) -> Option<V> {
        self.slots.read().get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of resolved keys.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|cell| cell.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &K) -> Arc<OnceCell<V>> {
        if let Some(slot) = self.slots.read().get(key) {
            return slot.clone();
        }
        self.slots.write().entry(key.clone()).or_default().clone()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for OnceMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn resolves_once() {
        let map = OnceMap::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v = map.get_or_resolve(&"k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                7
            });
            assert_eq!(v, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(map.get(&"k"), Some(7));
        assert_eq!(map.get(&"other"), None);
    }

    #[test]
    fn concurrent_callers_share_one_resolution() {
        let map: Arc<OnceMap<String, usize>> = Arc::new(OnceMap::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let map = map.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    map.get_or_resolve(&"EKObject".to_string(), || {
                        thread::sleep(Duration::from_millis(20));
                        calls.fetch_add(1, Ordering::SeqCst) + 100
                    })
                })
            })
            .collect();

        let results: Vec<usize> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|&r| r == 100));
    }
}
