//! # Stator middleware
//!
//! Convenience collaborators for the [`stator`] store engine, built entirely
//! on its public API:
//!
//! - [`LoggingMiddleware`] — logs every dispatched action
//! - [`CancelRequestMiddleware`] — handles the reserved `@@cancelRequest`
//!   action
//! - [`DebounceMiddleware`] — delays/coalesces actions carrying
//!   `meta.debounce`
//! - [`cancelable_request`] — wraps async work with cancellation tracking
//!
//! ## Example
//!
//! ```no_run
//! use stator::{State, Store};
//! use stator_middleware::{CancelRequestMiddleware, DebounceMiddleware, LoggingMiddleware};
//!
//! let store = Store::new(State::new());
//! store.add_middleware(LoggingMiddleware::new());
//! store.add_middleware(CancelRequestMiddleware::new());
//! store.add_middleware(DebounceMiddleware::new());
//! ```

mod cancellation;
mod debounce;
mod logging;
mod request;

pub use cancellation::CancelRequestMiddleware;
pub use debounce::DebounceMiddleware;
pub use logging::LoggingMiddleware;
pub use request::{cancelable_request, RequestHandle};
