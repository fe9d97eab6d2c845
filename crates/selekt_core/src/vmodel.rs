//! Two-way value binding with an optional external owner
//!
//! A [`VModel`] reads a value that may be owned outside the widget. When the
//! owner supplies an update handler, every write is forwarded to it as a
//! commit and the binding stays busy until the handler's future resolves; the
//! owner reflects the accepted value back with [`VModel::set_external`].
//! Without a handler the binding proxies the value itself and writes apply
//! immediately.
//!
//! At most one commit is outstanding per binding: writes issued while busy
//! are rejected.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::reactive::{ReactiveGraph, Signal};
use crate::runtime::WeakRuntime;

/// Owner-side update handler, called with the new value and a caller context
///
/// It is invoked from a spawned task, so it may read or write the graph.
pub type UpdateHandler<T, C> = Arc<dyn Fn(T, C) -> BoxFuture<'static, ()> + Send + Sync>;

/// Outcome of a write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Commit {
    /// Written to the proxied value
    Applied,
    /// Forwarded to the owner's handler, busy until it resolves
    Pending,
    /// Dropped because a previous commit is still in flight
    Rejected,
}

pub struct VModel<T, C> {
    value: Signal<T>,
    busy: Signal<bool>,
    handler: Signal<Option<UpdateHandler<T, C>>>,
}

impl<T, C> Clone for VModel<T, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, C> Copy for VModel<T, C> {}

impl<T, C> fmt::Debug for VModel<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VModel")
            .field("value", &self.value.id())
            .field("busy", &self.busy.id())
            .finish()
    }
}

impl<T, C> VModel<T, C>
where
    T: Clone + Send + 'static,
    C: Send + 'static,
{
    pub fn new(graph: &mut ReactiveGraph, initial: T, handler: Option<UpdateHandler<T, C>>) -> Self {
        Self {
            value: graph.create_signal(initial),
            busy: graph.create_signal(false),
            handler: graph.create_signal(handler),
        }
    }

    /// Current value (tracked)
    pub fn get(&self, graph: &ReactiveGraph) -> Option<T> {
        graph.get(self.value)
    }

    /// Borrow the current value (tracked)
    pub fn with<R>(&self, graph: &ReactiveGraph, f: impl FnOnce(&T) -> R) -> Option<R> {
        graph.with(self.value, f)
    }

    pub fn is_busy(&self, graph: &ReactiveGraph) -> bool {
        graph.get(self.busy).unwrap_or(false)
    }

    pub fn has_handler(&self, graph: &ReactiveGraph) -> bool {
        graph.with(self.handler, Option::is_some).unwrap_or(false)
    }

    /// Write a new value through the binding
    pub fn set(&self, graph: &mut ReactiveGraph, runtime: &WeakRuntime, value: T, context: C) -> Commit {
        if graph.get_untracked(self.busy).unwrap_or(false) {
            tracing::debug!("write rejected, previous commit still pending");
            return Commit::Rejected;
        }

        let Some(handler) = graph.get_untracked(self.handler).flatten() else {
            graph.set(self.value, value);
            return Commit::Applied;
        };

        // The handler runs on the runtime, outside the graph lock
        graph.set(self.busy, true);
        let busy = self.busy;
        let completion = runtime.clone();
        runtime.spawn(async move {
            handler(value, context).await;
            completion.with(|g| g.set(busy, false));
        });
        Commit::Pending
    }

    /// Reflect a value decided by the owner
    pub fn set_external(&self, graph: &mut ReactiveGraph, value: T) {
        graph.set(self.value, value);
    }

    pub fn set_handler(&self, graph: &mut ReactiveGraph, handler: Option<UpdateHandler<T, C>>) {
        graph.set(self.handler, handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ReactiveRuntime;
    use futures::FutureExt;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_proxy_applies_synchronously() {
        let runtime = ReactiveRuntime::current().unwrap();
        let weak = runtime.downgrade();

        let commit = runtime.with(|g| {
            let model = VModel::<String, ()>::new(g, String::new(), None);
            let commit = model.set(g, &weak, "abc".into(), ());
            assert_eq!(model.get(g).as_deref(), Some("abc"));
            assert!(!model.is_busy(g));
            commit
        });
        assert_eq!(commit, Commit::Applied);
    }

    #[tokio::test]
    async fn test_handler_holds_busy_until_resolved() {
        let runtime = ReactiveRuntime::current().unwrap();
        let weak = runtime.downgrade();
        let (tx, rx) = oneshot::channel::<()>();
        let rx = Arc::new(Mutex::new(Some(rx)));
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        let handler: UpdateHandler<i32, &'static str> = Arc::new(move |value, context| {
            received_clone.lock().unwrap().push((value, context));
            let rx = rx.lock().unwrap().take();
            async move {
                if let Some(rx) = rx {
                    let _ = rx.await;
                }
            }
            .boxed()
        });

        let model = runtime.with(|g| VModel::new(g, 0, Some(handler)));
        let first = runtime.with(|g| model.set(g, &weak, 1, "first"));
        let second = runtime.with(|g| model.set(g, &weak, 2, "second"));

        assert_eq!(first, Commit::Pending);
        assert_eq!(second, Commit::Rejected);
        assert!(runtime.with(|g| model.is_busy(g)));
        // The owner has not reflected anything yet
        assert_eq!(runtime.with(|g| model.get(g)), Some(0));

        tx.send(()).unwrap();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        assert!(!runtime.with(|g| model.is_busy(g)));
        assert_eq!(*received.lock().unwrap(), vec![(1, "first")]);

        runtime.with(|g| model.set_external(g, 1));
        assert_eq!(runtime.with(|g| model.get(g)), Some(1));
    }

    #[tokio::test]
    async fn test_handler_can_write_back_synchronously() {
        let runtime = ReactiveRuntime::current().unwrap();
        let weak = runtime.downgrade();
        let slot: Arc<Mutex<Option<VModel<String, ()>>>> = Arc::new(Mutex::new(None));

        let owner = weak.clone();
        let target = slot.clone();
        let handler: UpdateHandler<String, ()> = Arc::new(move |value: String, _: ()| {
            // Reflects the value before returning its future
            if let Some(model) = *target.lock().unwrap() {
                owner.with(|g| model.set_external(g, value.to_uppercase()));
            }
            async {}.boxed()
        });

        let model = runtime.with(|g| VModel::new(g, String::new(), Some(handler)));
        *slot.lock().unwrap() = Some(model);

        let commit = runtime.with(|g| model.set(g, &weak, "abc".into(), ()));
        assert_eq!(commit, Commit::Pending);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        assert_eq!(runtime.with(|g| model.get(g)).as_deref(), Some("ABC"));
        assert!(!runtime.with(|g| model.is_busy(g)));
    }
}
