//! Reactive async request runner
//!
//! [`AsyncData`] keeps `{data, error, busy}` for one logical request whose
//! identity is a string key. A watcher effect re-dispatches whenever the key
//! changes while enabled, or when [`AsyncData::refresh`] is requested.
//!
//! Every dispatch takes a new ticket. A response is applied only if the state
//! still carries the ticket it was dispatched with; responses of superseded
//! requests are dropped. In-flight work is never aborted.

use futures::future::BoxFuture;

use crate::reactive::{ReactiveGraph, Signal};
use crate::runtime::WeakRuntime;

/// Future produced by a request thunk
pub type Request<T, E> = BoxFuture<'static, Result<T, E>>;

/// Snapshot of an async request
#[derive(Clone, Debug, PartialEq)]
pub struct AsyncState<T, E> {
    pub data: Option<T>,
    pub error: Option<E>,
    pub busy: bool,
    /// At least one response was applied to this request
    pub fetched: bool,
    /// Key of the request this state belongs to
    pub id: Option<String>,
    ticket: u64,
}

impl<T, E> Default for AsyncState<T, E> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            busy: false,
            fetched: false,
            id: None,
            ticket: 0,
        }
    }
}

/// What a watcher wants dispatched
pub struct Dispatch<T, E> {
    pub key: String,
    /// Invoked on the async side, never while the graph is locked
    pub request: Box<dyn FnOnce() -> Request<T, E> + Send>,
}

/// Handle to an async request living in the graph
#[derive(Debug)]
pub struct AsyncData<T, E> {
    state: Signal<AsyncState<T, E>>,
    refresh: Signal<u64>,
}

impl<T, E> Clone for AsyncData<T, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, E> Copy for AsyncData<T, E> {}

impl<T, E> AsyncData<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Allocate the state without watching anything yet
    pub fn new(graph: &mut ReactiveGraph) -> Self {
        Self {
            state: graph.create_signal(AsyncState::default()),
            refresh: graph.create_signal(0),
        }
    }

    /// Install the watcher effect.
    ///
    /// `build` runs inside the effect and returns `None` while the request is
    /// disabled; the signals it reads become the watcher's dependencies.
    pub fn watch<F>(&self, graph: &mut ReactiveGraph, runtime: WeakRuntime, build: F)
    where
        F: Fn(&mut ReactiveGraph) -> Option<Dispatch<T, E>> + Send + 'static,
    {
        let this = *self;
        let mut seen_refresh = 0u64;

        graph.create_effect(move |g| {
            // A refresh requested while disabled stays pending until a dispatch
            let requested = g.get(this.refresh).unwrap_or(0);
            let forced = requested != seen_refresh;

            let Some(dispatch) = build(g) else {
                return;
            };

            let current = g.get_untracked(this.state).unwrap_or_default();
            if !forced && current.id.as_deref() == Some(dispatch.key.as_str()) {
                return;
            }
            seen_refresh = requested;

            let ticket = current.ticket + 1;
            tracing::debug!(key = %dispatch.key, ticket, "dispatching request");
            g.set(
                this.state,
                AsyncState {
                    busy: true,
                    id: Some(dispatch.key),
                    ticket,
                    ..AsyncState::default()
                },
            );

            let request = dispatch.request;
            let completion = runtime.clone();
            runtime.spawn(async move {
                let outcome = request().await;
                completion.with(|g| this.settle(g, ticket, outcome));
            });
        });
    }

    fn settle(&self, graph: &mut ReactiveGraph, ticket: u64, outcome: Result<T, E>) {
        let Some(mut state) = graph.get_untracked(self.state) else {
            return;
        };
        if state.ticket != ticket {
            tracing::debug!(ticket, current = state.ticket, "discarding stale response");
            return;
        }
        match outcome {
            Ok(data) => state.data = Some(data),
            Err(error) => state.error = Some(error),
        }
        state.busy = false;
        state.fetched = true;
        graph.set(self.state, state);
    }

    /// Ask the watcher to dispatch again even if the key did not change
    pub fn refresh(&self, graph: &mut ReactiveGraph) {
        graph.update(self.refresh, |n| n + 1);
    }

    /// Current state (tracked)
    pub fn state(&self, graph: &ReactiveGraph) -> AsyncState<T, E> {
        graph.get(self.state).unwrap_or_default()
    }

    pub fn is_busy(&self, graph: &ReactiveGraph) -> bool {
        graph.with(self.state, |s| s.busy).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ReactiveRuntime;
    use futures::FutureExt;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    type Pending = Arc<Mutex<Vec<(String, oneshot::Sender<Result<String, String>>)>>>;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    /// Watches `key`/`enabled` and parks every started request on a oneshot channel
    fn install(
        runtime: &ReactiveRuntime,
        pending: Pending,
    ) -> (AsyncData<String, String>, Signal<String>, Signal<bool>) {
        let weak = runtime.downgrade();
        runtime.with(|g| {
            let key = g.create_signal(String::from("k1"));
            let enabled = g.create_signal(true);
            let data = AsyncData::new(g);
            data.watch(g, weak, move |g| {
                if !g.get(enabled).unwrap_or(false) {
                    return None;
                }
                let key = g.get(key).unwrap_or_default();
                let pending = pending.clone();
                let started = key.clone();
                Some(Dispatch {
                    key,
                    request: Box::new(move || {
                        let (tx, rx) = oneshot::channel();
                        pending.lock().unwrap().push((started, tx));
                        async move { rx.await.unwrap_or_else(|_| Err("dropped".into())) }.boxed()
                    }),
                })
            });
            (data, key, enabled)
        })
    }

    fn reply(pending: &Pending, key: &str, value: Result<String, String>) {
        let mut pending = pending.lock().unwrap();
        let position = pending.iter().position(|(k, _)| k == key).unwrap();
        let (_, tx) = pending.remove(position);
        let _ = tx.send(value);
    }

    #[tokio::test]
    async fn test_dispatch_and_apply() {
        let runtime = ReactiveRuntime::current().unwrap();
        let pending = Pending::default();
        let (data, _, _) = install(&runtime, pending.clone());

        // Busy is set synchronously, the request starts on the async side
        let state = runtime.with(|g| data.state(g));
        assert!(state.busy);
        assert_eq!(state.id.as_deref(), Some("k1"));
        assert!(pending.lock().unwrap().is_empty());

        settle().await;
        reply(&pending, "k1", Ok("one".into()));
        settle().await;

        let state = runtime.with(|g| data.state(g));
        assert!(!state.busy);
        assert!(state.fetched);
        assert_eq!(state.data.as_deref(), Some("one"));
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let runtime = ReactiveRuntime::current().unwrap();
        let pending = Pending::default();
        let (data, key, _) = install(&runtime, pending.clone());

        runtime.with(|g| g.set(key, "k2".to_string()));
        settle().await;

        // B resolves first, then the superseded A
        reply(&pending, "k2", Ok("two".into()));
        settle().await;
        reply(&pending, "k1", Ok("one".into()));
        settle().await;

        let state = runtime.with(|g| data.state(g));
        assert_eq!(state.data.as_deref(), Some("two"));
        assert_eq!(state.id.as_deref(), Some("k2"));
    }

    #[tokio::test]
    async fn test_stale_response_before_newer_keeps_busy() {
        let runtime = ReactiveRuntime::current().unwrap();
        let pending = Pending::default();
        let (data, key, _) = install(&runtime, pending.clone());

        runtime.with(|g| g.set(key, "k2".to_string()));
        settle().await;

        // A resolves while B is still in flight
        reply(&pending, "k1", Ok("one".into()));
        settle().await;
        let state = runtime.with(|g| data.state(g));
        assert!(state.busy);
        assert_eq!(state.data, None);

        reply(&pending, "k2", Err("boom".into()));
        settle().await;
        let state = runtime.with(|g| data.state(g));
        assert!(!state.busy);
        assert_eq!(state.data, None);
        assert_eq!(state.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_disabled_does_not_dispatch() {
        let runtime = ReactiveRuntime::current().unwrap();
        let pending = Pending::default();
        let (data, key, enabled) = install(&runtime, pending.clone());
        settle().await;
        reply(&pending, "k1", Ok("one".into()));
        settle().await;

        runtime.with(|g| {
            g.set(enabled, false);
            g.set(key, "k2".to_string());
        });
        settle().await;
        assert!(pending.lock().unwrap().is_empty());
        // Prior result is kept while disabled
        assert_eq!(runtime.with(|g| data.state(g)).data.as_deref(), Some("one"));

        runtime.with(|g| g.set(enabled, true));
        settle().await;
        assert_eq!(pending.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_key_requires_refresh() {
        let runtime = ReactiveRuntime::current().unwrap();
        let pending = Pending::default();
        let (data, _, enabled) = install(&runtime, pending.clone());
        settle().await;
        reply(&pending, "k1", Ok("one".into()));
        settle().await;

        // Re-enabling with an unchanged key keeps the result
        runtime.with(|g| {
            g.set(enabled, false);
            g.set(enabled, true);
        });
        settle().await;
        assert!(pending.lock().unwrap().is_empty());

        runtime.with(|g| data.refresh(g));
        assert!(runtime.with(|g| data.is_busy(g)));
        settle().await;
        assert_eq!(pending.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_while_disabled_waits_for_enable() {
        let runtime = ReactiveRuntime::current().unwrap();
        let pending = Pending::default();
        let (data, _, enabled) = install(&runtime, pending.clone());
        settle().await;
        reply(&pending, "k1", Ok("one".into()));
        settle().await;

        runtime.with(|g| {
            g.set(enabled, false);
            data.refresh(g);
        });
        settle().await;
        assert!(pending.lock().unwrap().is_empty());
        assert!(!runtime.with(|g| data.is_busy(g)));

        runtime.with(|g| g.set(enabled, true));
        assert!(runtime.with(|g| data.is_busy(g)));
        settle().await;
        assert_eq!(pending.lock().unwrap().len(), 1);

        // Consumed by that dispatch
        reply(&pending, "k1", Ok("two".into()));
        settle().await;
        runtime.with(|g| {
            g.set(enabled, false);
            g.set(enabled, true);
        });
        settle().await;
        assert!(pending.lock().unwrap().is_empty());
        assert_eq!(runtime.with(|g| data.state(g)).data.as_deref(), Some("two"));
    }
}
