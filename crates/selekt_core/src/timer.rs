//! Debounce timer
//!
//! A single rescheduleable timer. Scheduling replaces (and aborts) whatever
//! was pending, so only the last scheduled commit can ever fire.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::reactive::ReactiveGraph;
use crate::runtime::WeakRuntime;

#[derive(Default)]
struct TimerState {
    generation: u64,
    task: Option<AbortHandle>,
}

/// Handle to a debounce timer, cheap to clone
#[derive(Clone, Default)]
pub struct Debouncer {
    state: Arc<Mutex<TimerState>>,
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `commit` against the graph after `delay`, superseding any pending
    /// commit
    pub fn schedule<F>(&self, runtime: &WeakRuntime, delay: Duration, commit: F)
    where
        F: FnOnce(&mut ReactiveGraph) + Send + 'static,
    {
        let mut state = self.lock();
        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.generation += 1;
        let generation = state.generation;
        tracing::trace!(generation, delay_ms = delay.as_millis() as u64, "debounce scheduled");

        let timer = self.state.clone();
        let completion = runtime.clone();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            completion.with(move |g| {
                {
                    let mut state = timer.lock().unwrap_or_else(PoisonError::into_inner);
                    if state.generation != generation {
                        return;
                    }
                    state.task = None;
                }
                commit(g);
            });
        });
        state.task = Some(handle.abort_handle());
    }

    /// Drop the pending commit, if any
    pub fn cancel(&self) {
        let mut state = self.lock();
        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.generation += 1;
    }

    pub fn is_pending(&self) -> bool {
        self.lock().task.is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ReactiveRuntime;

    #[tokio::test(start_paused = true)]
    async fn test_only_last_schedule_fires() {
        let runtime = ReactiveRuntime::current().unwrap();
        let weak = runtime.downgrade();
        let value = runtime.with(|g| g.create_signal(String::new()));
        let debouncer = Debouncer::new();

        debouncer.schedule(&weak, Duration::from_millis(500), move |g| g.set(value, "a".to_string()));
        tokio::time::sleep(Duration::from_millis(300)).await;
        debouncer.schedule(&weak, Duration::from_millis(500), move |g| g.set(value, "ab".to_string()));
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(debouncer.is_pending());
        assert_eq!(runtime.with(|g| g.get(value)).as_deref(), Some(""));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!debouncer.is_pending());
        assert_eq!(runtime.with(|g| g.get(value)).as_deref(), Some("ab"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_commit() {
        let runtime = ReactiveRuntime::current().unwrap();
        let weak = runtime.downgrade();
        let value = runtime.with(|g| g.create_signal(0i32));
        let debouncer = Debouncer::new();

        debouncer.schedule(&weak, Duration::from_millis(100), move |g| g.set(value, 1));
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!debouncer.is_pending());
        assert_eq!(runtime.with(|g| g.get(value)), Some(0));
    }
}
