//! Cancellation registry for in-flight async requests
//!
//! Cancellation here is advisory, never preemptive: canceling a request only
//! flips a flag that the async wrapper checks before reporting its result.
//! The underlying work still runs to completion; its result is silently
//! dropped. Completed entries linger for a short grace window so a cancel
//! racing a completion remains observable by the in-flight handler.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How long a completed entry stays observable before it is swept.
pub const COMPLETED_RETENTION: Duration = Duration::from_millis(100);

/// Snapshot of one tracked request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationState {
    pub is_canceled: bool,
    pub is_active: bool,
}

struct Entry {
    canceled: bool,
    active: bool,
    completed_at: Option<Instant>,
}

/// Passive bookkeeping of outstanding request identifiers. The registry
/// never dispatches anything; async wrappers consult it.
pub struct CancellationRegistry {
    entries: HashMap<String, Entry>,
    retention: Duration,
}

impl Default for CancellationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::with_retention(COMPLETED_RETENTION)
    }

    /// Override the grace window (tests).
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            retention,
        }
    }

    /// Start tracking a request: fresh `{canceled: false, active: true}`,
    /// overwriting any stale entry under the same identifier.
    pub fn track(&mut self, id: impl Into<String>) {
        self.sweep();
        let id = id.into();
        log::trace!("tracking request `{id}`");
        self.entries.insert(
            id,
            Entry {
                canceled: false,
                active: true,
                completed_at: None,
            },
        );
    }

    /// Flag a request as canceled. Only valid while the request is active;
    /// an unknown or already-inactive identifier is a silent no-op signaled
    /// by the `false` return.
    pub fn cancel(&mut self, id: &str) -> bool {
        self.sweep();
        match self.entries.get_mut(id) {
            Some(entry) if entry.active => {
                entry.canceled = true;
                log::debug!("request `{id}` canceled");
                true
            }
            _ => false,
        }
    }

    /// Mark a request complete. The entry stays observable (including its
    /// final canceled flag) for the grace window, then gets swept.
    pub fn complete(&mut self, id: &str) {
        self.sweep();
        if let Some(entry) = self.entries.get_mut(id) {
            entry.active = false;
            entry.completed_at = Some(Instant::now());
        }
    }

    /// Current view of a tracked request, if any.
    pub fn state(&self, id: &str) -> Option<CancellationState> {
        self.entries.get(id).map(|e| CancellationState {
            is_canceled: e.canceled,
            is_active: e.active,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Lazily drop entries whose grace window has elapsed.
    fn sweep(&mut self) {
        let retention = self.retention;
        self.entries.retain(|_, e| match e.completed_at {
            Some(at) => at.elapsed() < retention,
            None => true,
        });
    }
}
