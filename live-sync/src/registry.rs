//! Active-poll registry.
//!
//! Process-wide bookkeeping of channels whose refresh is currently in flight.
//! One registry is created at startup and handed to every channel set by
//! handle; clones share the same underlying set.
//!
//! Entries are reference-counted per channel id, so two services polling a
//! channel with the same name each hold their own entry.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::trace;

/// Thread-safe set of channel ids with an outstanding fetch.
#[derive(Clone)]
pub struct ActivePollRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    entries: Mutex<HashMap<String, usize>>,
    /// Number of distinct ids, published on every change.
    count: watch::Sender<usize>,
}

impl ActivePollRegistry {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                count,
            }),
        }
    }

    /// Mark `id` as fetching.
    pub fn add(&self, id: &str) {
        let mut entries = self.inner.entries.lock();
        *entries.entry(id.to_string()).or_insert(0) += 1;
        self.publish(entries.len());
        trace!(channel = %id, active = entries.len(), "Registered active poll");
    }

    /// Drop one entry for `id`. Removing an absent id is a no-op.
    pub fn remove(&self, id: &str) {
        let mut entries = self.inner.entries.lock();
        let Some(refs) = entries.get_mut(id) else {
            return;
        };
        *refs -= 1;
        if *refs == 0 {
            entries.remove(id);
        }
        self.publish(entries.len());
        trace!(channel = %id, active = entries.len(), "Unregistered active poll");
    }

    /// Register `id` until the returned guard is dropped.
    pub fn register(&self, id: &str) -> ActivePollGuard {
        self.add(id);
        ActivePollGuard {
            registry: self.clone(),
            id: id.to_string(),
        }
    }

    /// Consistent copy of the ids currently fetching.
    pub fn snapshot(&self) -> BTreeSet<String> {
        self.inner.entries.lock().keys().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.entries.lock().contains_key(id)
    }

    /// Number of distinct channels currently fetching.
    pub fn count(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Aggregate "something is updating" indicator.
    pub fn is_active(&self) -> bool {
        self.count() > 0
    }

    /// Watch the distinct-id count.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.inner.count.subscribe()
    }

    // Called with the entries lock held so published counts never go backwards
    // relative to the set they describe.
    fn publish(&self, len: usize) {
        self.inner.count.send_if_modified(|current| {
            if *current == len {
                return false;
            }
            *current = len;
            true
        });
    }
}

impl Default for ActivePollRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ActivePollRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivePollRegistry")
            .field("active", &self.snapshot())
            .finish()
    }
}

/// Keeps one registry entry alive. The entry is removed on drop, including
/// when the owning task is aborted or unwinds.
#[must_use = "the registry entry is removed as soon as the guard is dropped"]
pub struct ActivePollGuard {
    registry: ActivePollRegistry,
    id: String,
}

impl ActivePollGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for ActivePollGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove() {
        let registry = ActivePollRegistry::new();
        assert!(!registry.is_active());

        registry.add("foo");
        registry.add("bar");
        assert_eq!(registry.count(), 2);
        assert!(registry.contains("foo"));

        registry.remove("foo");
        assert_eq!(
            registry.snapshot(),
            BTreeSet::from(["bar".to_string()])
        );

        registry.remove("bar");
        assert!(!registry.is_active());
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let registry = ActivePollRegistry::new();
        registry.remove("ghost");
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_entries_are_refcounted() {
        let registry = ActivePollRegistry::new();
        registry.add("foo");
        registry.add("foo");
        assert_eq!(registry.count(), 1);

        registry.remove("foo");
        assert!(registry.contains("foo"));

        registry.remove("foo");
        assert!(!registry.contains("foo"));
    }

    #[test]
    fn test_guard_removes_on_drop() {
        let registry = ActivePollRegistry::new();
        {
            let guard = registry.register("foo");
            assert_eq!(guard.id(), "foo");
            assert!(registry.contains("foo"));
        }
        assert!(!registry.contains("foo"));
    }

    #[test]
    fn test_clones_share_state() {
        let registry = ActivePollRegistry::new();
        let other = registry.clone();
        other.add("foo");
        assert!(registry.contains("foo"));
    }

    #[tokio::test]
    async fn test_subscribe_tracks_count() {
        let registry = ActivePollRegistry::new();
        let mut count = registry.subscribe();
        assert_eq!(*count.borrow(), 0);

        let _guard = registry.register("foo");
        count.changed().await.unwrap();
        assert_eq!(*count.borrow_and_update(), 1);

        drop(_guard);
        count.changed().await.unwrap();
        assert_eq!(*count.borrow_and_update(), 0);
    }

    #[test]
    fn test_concurrent_add_remove_settles_empty() {
        let registry = ActivePollRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let id = format!("channel-{}", i % 3);
                    for _ in 0..500 {
                        let _guard = registry.register(&id);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.count(), 0);
        assert_eq!(*registry.subscribe().borrow(), 0);
    }
}
