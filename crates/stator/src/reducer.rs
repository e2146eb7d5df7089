//! Reducers and the reducer registry
//!
//! A reducer is a pure function from `(slice, action)` to the next slice.
//! Returning a slice pointer-equal to the input means "unchanged"; the commit
//! only rebuilds the state tree when at least one reducer produced a new
//! value.

use std::collections::HashMap;
use std::sync::Arc;

use crate::action::Action;
use crate::state::{Slice, State};

/// Pure slice transformer. `None` input means the slice key is not present
/// in the current state yet.
pub type ReducerFn = Arc<dyn Fn(Option<&Slice>, &Action) -> Slice + Send + Sync>;

/// Slice type produced by [`combine_reducers`]: a nested key -> slice map.
pub type SliceMap = HashMap<String, Slice>;

/// Maps slice keys to reducers. Owned by the store engine; registration
/// order is preserved so commits are deterministic.
#[derive(Default)]
pub struct ReducerRegistry {
    entries: Vec<(String, ReducerFn)>,
}

impl ReducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a reducer with a slice key. The last registration for a key
    /// wins; the key is not validated against the initial state.
    pub fn register(&mut self, key: impl Into<String>, reducer: ReducerFn) {
        let key = key.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            log::debug!("replacing reducer for slice `{key}`");
            entry.1 = reducer;
        } else {
            self.entries.push((key, reducer));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every registered reducer against its current slice and build the
    /// next state. Returns `None` when no reducer produced a new value, so
    /// the caller can skip the whole commit/notify cycle.
    pub fn apply(&self, state: &State, action: &Action) -> Option<State> {
        let mut next = state.clone();
        let mut changed = false;

        for (key, reducer) in &self.entries {
            let current = state.get(key);
            let produced = reducer(current, action);
            let unchanged = current.is_some_and(|c| Arc::ptr_eq(c, &produced));
            if !unchanged {
                next.insert(key.clone(), produced);
                changed = true;
            }
        }

        changed.then_some(next)
    }
}

/// Adapt a typed reducer `(state, action) -> Option<state>` into a
/// [`ReducerFn`].
///
/// Returning `None` reuses the existing slice pointer, which is what keeps
/// the no-op invariant intact. A missing slice is seeded from `T::default()`.
pub fn slice_reducer<T, F>(f: F) -> ReducerFn
where
    T: Default + Send + Sync + 'static,
    F: Fn(&T, &Action) -> Option<T> + Send + Sync + 'static,
{
    Arc::new(move |slice, action| {
        if let Some(existing) = slice {
            return match existing.downcast_ref::<T>() {
                Some(current) => match f(current, action) {
                    Some(updated) => Arc::new(updated) as Slice,
                    None => Arc::clone(existing),
                },
                None => {
                    log::warn!("typed reducer saw a slice of a different type, leaving it alone");
                    Arc::clone(existing)
                }
            };
        }
        let seed = T::default();
        match f(&seed, action) {
            Some(updated) => Arc::new(updated) as Slice,
            None => Arc::new(seed) as Slice,
        }
    })
}

/// Compose child reducers into one reducer over a [`SliceMap`] slice.
///
/// When every child returns its input unchanged, the combined reducer returns
/// the input slice itself (pointer-equal), so nested composition preserves
/// the no-op invariant.
pub fn combine_reducers(children: Vec<(String, ReducerFn)>) -> ReducerFn {
    Arc::new(move |slice, action| {
        let current = slice.and_then(|s| s.downcast_ref::<SliceMap>());
        let mut next: SliceMap = current.cloned().unwrap_or_default();
        let mut changed = current.is_none();

        for (key, child) in &children {
            let prev = current.and_then(|map| map.get(key));
            let produced = child(prev, action);
            let unchanged = prev.is_some_and(|p| Arc::ptr_eq(p, &produced));
            if !unchanged {
                next.insert(key.clone(), produced);
                changed = true;
            }
        }

        match (changed, slice) {
            (false, Some(existing)) => Arc::clone(existing),
            _ => Arc::new(next) as Slice,
        }
    })
}
