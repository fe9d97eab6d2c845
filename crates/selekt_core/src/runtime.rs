//! Selekt Runtime
//!
//! Owns the reactive graph of one widget instance together with the tokio
//! handle used to run its asynchronous work (fetches, timers, commits).
//!
//! Effects living inside the graph must not keep the graph alive, so they
//! capture a [`WeakRuntime`] and upgrade it when an async task completes.

use std::future::Future;
use std::sync::{Arc, Mutex, Weak};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::reactive::{lock_graph, ReactiveGraph, ReactiveStats, SharedReactiveGraph};

/// The reactive runtime of a single widget instance
#[derive(Clone)]
pub struct ReactiveRuntime {
    graph: SharedReactiveGraph,
    tokio: Handle,
}

impl ReactiveRuntime {
    pub fn new(tokio: Handle) -> Self {
        Self {
            graph: Arc::new(Mutex::new(ReactiveGraph::new())),
            tokio,
        }
    }

    /// Build a runtime on the tokio runtime the caller is running on
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    /// Run a closure with exclusive access to the graph
    ///
    /// Effects scheduled by the closure are flushed before the lock is
    /// released (unless the closure batches).
    pub fn with<R>(&self, f: impl FnOnce(&mut ReactiveGraph) -> R) -> R {
        f(&mut lock_graph(&self.graph))
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            graph: Arc::downgrade(&self.graph),
            tokio: self.tokio.clone(),
        }
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tokio.spawn(future)
    }

    /// Get statistics about the runtime
    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            reactive: self.with(|g| g.stats()),
        }
    }
}

/// Non-owning handle captured by effects and async tasks
#[derive(Clone)]
pub struct WeakRuntime {
    graph: Weak<Mutex<ReactiveGraph>>,
    tokio: Handle,
}

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<ReactiveRuntime> {
        Some(ReactiveRuntime {
            graph: self.graph.upgrade()?,
            tokio: self.tokio.clone(),
        })
    }

    /// Run a closure against the graph if the runtime is still alive
    pub fn with<R>(&self, f: impl FnOnce(&mut ReactiveGraph) -> R) -> Option<R> {
        let graph = self.graph.upgrade()?;
        let result = f(&mut lock_graph(&graph));
        Some(result)
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tokio.spawn(future)
    }
}

/// Statistics about the runtime
#[derive(Debug, Clone)]
pub struct RuntimeStats {
    pub reactive: ReactiveStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runtime_integration() {
        let runtime = ReactiveRuntime::current().expect("inside tokio");

        let count = runtime.with(|g| g.create_signal(0i32));
        let weak = runtime.downgrade();

        runtime
            .spawn(async move {
                weak.with(|g| g.set(count, 42));
            })
            .await
            .unwrap();

        assert_eq!(runtime.with(|g| g.get(count)), Some(42));
        assert_eq!(runtime.stats().reactive.signal_count, 1);
    }

    #[tokio::test]
    async fn test_weak_runtime_outlived() {
        let runtime = ReactiveRuntime::current().expect("inside tokio");
        let weak = runtime.downgrade();
        drop(runtime);

        assert!(weak.upgrade().is_none());
        assert_eq!(weak.with(|g| g.stats().signal_count), None);
    }
}
