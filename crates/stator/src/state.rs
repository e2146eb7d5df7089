//! The state tree: named slices behind shared pointers
//!
//! The store holds exactly one [`State`] at a time and replaces the whole
//! value on every commit. Slices are `Arc`-shared, so a snapshot taken with
//! `get_state` stays a valid picture of a past state forever. Pointer
//! identity of a slice changes if and only if its reducer produced a new
//! value — selector memoization relies on that.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// One named subtree of the state, type-erased and shared.
pub type Slice = Arc<dyn Any + Send + Sync>;

/// Typed slice access failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SliceError {
    #[error("no slice registered under key `{0}`")]
    Missing(String),
    #[error("slice `{0}` holds a different type")]
    TypeMismatch(String),
}

/// The full state tree: a mapping from slice key to slice value.
///
/// Treat published states as read-only; mutation happens only inside the
/// store's commit, which builds a fresh `State` and swaps it in.
#[derive(Clone, Default)]
pub struct State {
    slices: HashMap<String, Slice>,
}

impl State {
    /// An empty state tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an initial slice (builder style, for store construction).
    pub fn with_slice<T: Send + Sync + 'static>(
        mut self,
        key: impl Into<String>,
        value: T,
    ) -> Self {
        self.slices.insert(key.into(), Arc::new(value));
        self
    }

    /// Raw slice lookup.
    pub fn get(&self, key: &str) -> Option<&Slice> {
        self.slices.get(key)
    }

    /// Typed slice lookup.
    pub fn slice<T: 'static>(&self, key: &str) -> Result<&T, SliceError> {
        let slice = self
            .slices
            .get(key)
            .ok_or_else(|| SliceError::Missing(key.to_string()))?;
        slice
            .downcast_ref::<T>()
            .ok_or_else(|| SliceError::TypeMismatch(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub(crate) fn insert(&mut self, key: String, slice: Slice) {
        self.slices.insert(key, slice);
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Slice values are type-erased; keys are the useful part.
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("State").field("slices", &keys).finish()
    }
}
