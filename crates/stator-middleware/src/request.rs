//! Cancelable async requests built on the store's cancellation registry.
//!
//! The wrapper tracks a request identifier, spawns the async work on the
//! ambient tokio runtime, and on resolution checks the canceled flag before
//! forwarding the follow-up action. Cancellation is advisory: the work still
//! runs to completion, a canceled result is silently dropped. Whatever the
//! outcome, the request is marked complete exactly once, so failures never
//! leak tracked entries.

use std::future::Future;

use stator::{Action, StoreHandle, Thunk};

/// Identifier-based handle to a dispatched cancelable request.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    request_id: String,
}

impl RequestHandle {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Flag the request as canceled through the store's registry. Advisory:
    /// in-flight work still completes, its result is dropped.
    pub fn cancel(&self, store: &StoreHandle) -> bool {
        store.cancel_request(&self.request_id)
    }
}

/// Wrap async work as a dispatchable thunk tracked under `request_id`.
///
/// On success the work may hand back a follow-up action, dispatched only if
/// the request was not canceled while in flight. Must be dispatched from
/// within a tokio runtime.
///
/// If the store is already gone when the thunk runs, the work is executed
/// untracked (degraded mode) and a diagnostic is logged.
pub fn cancelable_request<F, Fut>(request_id: impl Into<String>, work: F) -> (Thunk, RequestHandle)
where
    F: FnOnce(StoreHandle) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<Option<Action>>> + Send + 'static,
{
    let request_id = request_id.into();
    let handle = RequestHandle {
        request_id: request_id.clone(),
    };

    let thunk: Thunk = Box::new(move |store: StoreHandle| {
        let tracked = store.track_request(request_id.clone());
        if !tracked {
            log::warn!("no cancellation tracking for `{request_id}`, running untracked");
        }

        let fut = work(store.clone());
        tokio::spawn(async move {
            let outcome = fut.await;

            // Read the flag before completing, then complete exactly once.
            let canceled = store
                .request_state(&request_id)
                .map(|s| s.is_canceled)
                .unwrap_or(false);
            if tracked {
                store.complete_request(&request_id);
            }

            match outcome {
                Ok(follow_up) => {
                    if canceled {
                        log::debug!("request `{request_id}` canceled, dropping its result");
                    } else if let Some(action) = follow_up {
                        store.dispatch(action);
                    }
                }
                Err(err) => {
                    log::error!("request `{request_id}` failed: {err:#}");
                }
            }
        });
    });

    (thunk, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use stator::{slice_reducer, ManualScheduler, Scheduler, State, Store};
    use tokio::sync::oneshot;

    fn result_store() -> (Store, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::new());
        let store = Store::with_scheduler(
            State::new().with_slice("results", 0_i64),
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
        );
        store.register_reducer(
            "results",
            slice_reducer(|n: &i64, action: &Action| (action.kind == "RESULT").then(|| n + 1)),
        );
        (store, scheduler)
    }

    async fn wait_until_inactive(store: &Store, id: &str) {
        for _ in 0..200 {
            match store.request_state(id) {
                Some(state) if state.is_active => {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                _ => return,
            }
        }
        panic!("request `{id}` never completed");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn success_forwards_the_follow_up_action() {
        let (store, scheduler) = result_store();

        let (thunk, _handle) = cancelable_request("load", |_store| async {
            Ok(Some(Action::new("RESULT")))
        });
        store.dispatch(thunk);

        wait_until_inactive(&store, "load").await;
        // The follow-up dispatch happens just after completion; poll for it.
        for _ in 0..200 {
            scheduler.run_pending();
            if store.get_state().slice::<i64>("results") == Ok(&1) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("follow-up action never applied");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_race_drops_the_result() {
        let (store, scheduler) = result_store();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let (thunk, handle) = cancelable_request("load", move |_store| async move {
            let _ = release_rx.await;
            Ok(Some(Action::new("RESULT")))
        });
        store.dispatch(thunk);

        // Cancel while the work is still suspended, then let it finish.
        assert!(handle.cancel(&store.handle()));
        release_tx.send(()).unwrap();

        wait_until_inactive(&store, "load").await;
        // Post-resolution, within the grace window: canceled and inactive.
        let state = store.request_state("load").expect("grace window");
        assert!(state.is_canceled);
        assert!(!state.is_active);

        // Give the spawned task time to (not) forward its result.
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.run_pending();
        assert_eq!(store.get_state().slice::<i64>("results"), Ok(&0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_still_completes_the_request() {
        let (store, _scheduler) = result_store();

        let (thunk, _handle) =
            cancelable_request("load", |_store| async { Err(anyhow::anyhow!("boom")) });
        store.dispatch(thunk);

        wait_until_inactive(&store, "load").await;
        let state = store.request_state("load").expect("grace window");
        assert!(!state.is_active);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dead_store_runs_untracked() {
        let dead = {
            let (store, _scheduler) = result_store();
            store.handle()
        };

        let (ran_tx, ran_rx) = oneshot::channel::<()>();
        let (thunk, _handle) = cancelable_request("load", move |_store| async move {
            let _ = ran_tx.send(());
            Ok(Some(Action::new("RESULT")))
        });
        // Degraded mode: work still runs, results go nowhere, no panic.
        thunk(dead);
        ran_rx.await.unwrap();
    }
}
