//! Delays and coalesces actions carrying the `meta.debounce` marker.
//!
//! An action with `meta.debounce = N` is consumed by this middleware and
//! re-dispatched (marker stripped) once N milliseconds pass without a newer
//! action of the same kind. Bursts of same-kind actions therefore collapse
//! to the last one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use stator::{Action, Middleware, StoreHandle, DEBOUNCE_META};

/// Per-action-kind debouncing keyed on the reserved `meta.debounce` field.
#[derive(Default)]
pub struct DebounceMiddleware {
    // Generation per action kind; a timer only fires if its generation is
    // still the latest when the delay elapses.
    generations: Arc<Mutex<HashMap<String, u64>>>,
}

impl DebounceMiddleware {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Middleware for DebounceMiddleware {
    fn handle(&mut self, mut action: Action, store: &StoreHandle, next: &mut dyn FnMut(Action)) {
        let Some(delay_ms) = action.meta_millis(DEBOUNCE_META) else {
            next(action);
            return;
        };

        // Strip the marker so the trailing dispatch passes straight through.
        action.meta.remove(DEBOUNCE_META);

        let generation = {
            let mut generations = self.generations.lock().unwrap();
            let entry = generations.entry(action.kind.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        log::trace!(
            "debouncing `{}` for {delay_ms}ms (generation {generation})",
            action.kind
        );

        let generations = Arc::clone(&self.generations);
        let store = store.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(delay_ms));
            let still_latest = {
                let mut generations = generations.lock().unwrap();
                if generations.get(&action.kind) == Some(&generation) {
                    generations.remove(&action.kind);
                    true
                } else {
                    false
                }
            };
            if still_latest {
                store.dispatch(action);
            }
        });
        // Consumed: the trailing dispatch re-enters the pipeline later.
    }
}
