//! Middleware: composable interceptors in the dispatch pipeline
//!
//! ```text
//! Action -> Middleware Chain -> Reducers -> State commit -> Notify
//! ```
//!
//! Each middleware receives the action, a handle back into the store, and
//! the `next` continuation. Calling `next(action)` propagates down the
//! chain; not calling it consumes the action. Side effects before or after
//! `next` are both fine. The chain is walked in caller-supplied order and
//! the innermost `next` is the store's commit function, so an empty chain
//! degenerates to the commit function itself.

use crate::action::Action;
use crate::store::StoreHandle;

/// An interceptor between dispatch and the reducers.
///
/// Middleware may inspect the action, read state through `store`, dispatch
/// further actions (those re-enter through the batch queue, never the chain
/// directly), and decide whether to call `next`.
pub trait Middleware: Send {
    fn handle(&mut self, action: Action, store: &StoreHandle, next: &mut dyn FnMut(Action));
}

/// Fold the chain over the middleware list: the head runs with a `next`
/// that recurses into the rest, and the empty tail is the commit function.
pub(crate) fn run_chain(
    chain: &mut [Box<dyn Middleware>],
    store: &StoreHandle,
    action: Action,
    commit: &mut dyn FnMut(Action),
) {
    match chain.split_first_mut() {
        None => commit(action),
        Some((head, rest)) => {
            head.handle(action, store, &mut |next_action| {
                run_chain(rest, store, next_action, commit)
            });
        }
    }
}
