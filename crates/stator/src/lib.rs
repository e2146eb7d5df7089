//! # Stator
//!
//! An in-process, observable state container: one state tree, updated only
//! through pure reducers, observed through subscriptions and memoized
//! selectors.
//!
//! ## Architecture
//!
//! ```text
//! caller ──► dispatch ──► batch queue ──► flush
//!                                           │
//!                                           ▼
//!                                   middleware chain
//!                                           │
//!                                           ▼
//!                                   reducer registry
//!                                           │
//!                                           ▼
//!                                     state commit
//!                                           │
//!                              ┌────────────┴────────────┐
//!                              ▼                         ▼
//!                      selector diff/notify      listener notify
//! ```
//!
//! Thunks (async actions) bypass batching and reducers: `dispatch` invokes
//! them immediately with a [`StoreHandle`] and they drive further dispatches
//! themselves. The [`CancellationRegistry`] gives in-flight async work a
//! shared place to coordinate advisory cancellation.
//!
//! ## Example
//!
//! ```
//! use stator::{Action, State, Store, slice_reducer, slice_selector};
//!
//! let store = Store::new(State::new().with_slice("counter", 0_i64));
//! store.register_reducer(
//!     "counter",
//!     slice_reducer(|count: &i64, action: &Action| match action.kind.as_str() {
//!         "INCREMENT" => Some(count + 1),
//!         _ => None,
//!     }),
//! );
//!
//! let sub = store.select(slice_selector("counter"), |value| {
//!     if let Some(count) = value.downcast_ref::<i64>() {
//!         println!("counter is now {count}");
//!     }
//! });
//!
//! store.dispatch(Action::new("INCREMENT"));
//! # sub.unsubscribe();
//! ```

pub mod action;
pub mod batch;
pub mod cancel;
pub mod middleware;
pub mod reducer;
pub mod select;
pub mod state;
pub mod store;

pub use action::{Action, Dispatchable, Thunk, CANCEL_REQUEST_KIND, DEBOUNCE_META};
pub use batch::{ManualScheduler, Scheduler, TimerScheduler};
pub use cancel::{CancellationRegistry, CancellationState};
pub use middleware::Middleware;
pub use reducer::{combine_reducers, slice_reducer, ReducerFn, SliceMap};
pub use select::{slice_selector, OnChangeFn, SelectorFn};
pub use state::{Slice, SliceError, State};
pub use store::{Store, StoreHandle, Subscription};
