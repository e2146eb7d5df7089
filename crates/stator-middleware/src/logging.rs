//! Logs every action passing through the dispatch pipeline.

use stator::{Action, Middleware, StoreHandle};

/// LoggingMiddleware - logs all actions, always continues the chain.
///
/// Install it first so it sees actions before anything rewrites or consumes
/// them.
#[derive(Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for LoggingMiddleware {
    fn handle(&mut self, action: Action, _store: &StoreHandle, next: &mut dyn FnMut(Action)) {
        log::debug!("action: {:?}", action);
        next(action);
    }
}
