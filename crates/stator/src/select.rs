//! Selector subscriptions: memoized projections of the state tree
//!
//! A selector is a pure projection from the full state to a derived value.
//! Each selector is identity-keyed by its `Arc` pointer; the cache keeps the
//! last computed value per selector plus the listeners registered against it.
//! After every commit the cache recomputes each selector and notifies only
//! the listeners whose value changed by pointer identity.

use std::sync::Arc;

use crate::state::{Slice, State};

/// Pure projection from the state tree to a derived value.
pub type SelectorFn = Arc<dyn Fn(&State) -> Slice + Send + Sync>;

/// Listener attached to a selector subscription.
pub type OnChangeFn = Arc<dyn Fn(&Slice) + Send + Sync>;

/// Identity key for a selector: the `Arc` data pointer. Two clones of the
/// same `Arc` share one cache entry; structurally identical closures do not.
pub(crate) type SelectorKey = usize;

pub(crate) fn selector_key(selector: &SelectorFn) -> SelectorKey {
    Arc::as_ptr(selector) as *const () as usize
}

/// Build a selector projecting one slice by key, with a stable "missing"
/// sentinel so an absent slice does not renotify on every commit.
pub fn slice_selector(key: impl Into<String>) -> SelectorFn {
    let key = key.into();
    let missing: Slice = Arc::new(());
    Arc::new(move |state: &State| {
        state
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&missing))
    })
}

struct SelectorEntry {
    selector: SelectorFn,
    cached: Slice,
    listeners: Vec<(u64, OnChangeFn)>,
}

/// Per-selector memoized values and listener sets, diffed after each commit.
///
/// Kept as an association list: the population is small and identity lookups
/// stay trivial.
#[derive(Default)]
pub(crate) struct SubscriptionCache {
    entries: Vec<SelectorEntry>,
}

impl SubscriptionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Creates the cache entry on first use of this
    /// selector; returns the entry key and the current value so the caller
    /// can deliver the initial notification outside the lock.
    pub fn subscribe(
        &mut self,
        selector: SelectorFn,
        listener_id: u64,
        on_change: OnChangeFn,
        state: &State,
    ) -> (SelectorKey, Slice) {
        let key = selector_key(&selector);
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| selector_key(&e.selector) == key)
        {
            entry.listeners.push((listener_id, on_change));
            return (key, Arc::clone(&entry.cached));
        }

        let cached = (selector)(state);
        self.entries.push(SelectorEntry {
            selector,
            cached: Arc::clone(&cached),
            listeners: vec![(listener_id, on_change)],
        });
        (key, cached)
    }

    /// Drop one listener; the entry itself goes away with its last listener.
    pub fn unsubscribe(&mut self, key: SelectorKey, listener_id: u64) {
        if let Some(index) = self
            .entries
            .iter()
            .position(|e| selector_key(&e.selector) == key)
        {
            let entry = &mut self.entries[index];
            entry.listeners.retain(|(id, _)| *id != listener_id);
            if entry.listeners.is_empty() {
                self.entries.remove(index);
            }
        }
    }

    /// Recompute every selector against the committed state and collect the
    /// listeners to notify. Callbacks are returned, not invoked, so the
    /// caller can run them without holding the cache lock.
    pub fn diff(&mut self, state: &State) -> Vec<(Slice, Vec<OnChangeFn>)> {
        let mut pending = Vec::new();
        for entry in &mut self.entries {
            let value = (entry.selector)(state);
            if !Arc::ptr_eq(&value, &entry.cached) {
                entry.cached = Arc::clone(&value);
                let listeners = entry
                    .listeners
                    .iter()
                    .map(|(_, l)| Arc::clone(l))
                    .collect();
                pending.push((value, listeners));
            }
        }
        pending
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
