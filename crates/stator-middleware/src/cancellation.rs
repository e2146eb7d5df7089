//! Turns the reserved `@@cancelRequest` action into a registry cancellation.
//!
//! Cancellation stays a side effect of normal dispatch: the action continues
//! down the chain afterwards, so reducers and other middleware may still
//! observe it.

use stator::{Action, Middleware, StoreHandle, CANCEL_REQUEST_KIND};

/// Recognizes `{ type: "@@cancelRequest", payload: { requestId } }` and
/// flips the canceled flag for that request.
#[derive(Default)]
pub struct CancelRequestMiddleware;

impl CancelRequestMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for CancelRequestMiddleware {
    fn handle(&mut self, action: Action, store: &StoreHandle, next: &mut dyn FnMut(Action)) {
        if action.kind == CANCEL_REQUEST_KIND {
            match action.request_id() {
                Some(id) => {
                    let canceled = store.cancel_request(id);
                    log::debug!("cancel request `{id}`: {canceled}");
                }
                None => log::warn!("@@cancelRequest action without a requestId"),
            }
        }
        next(action);
    }
}
