//! Fine-grained reactive signal system
//!
//! A push-pull hybrid graph with automatic dependency tracking:
//! - Signals push invalidation notifications to subscribers
//! - Derived values pull (lazily compute) their values when accessed, and may
//!   read other derived values
//! - Effects are scheduled, batched and flushed in graph-depth order; an effect
//!   may write signals, which schedules further effects in the same flush
//!
//! ```
//! use selekt_core::reactive::ReactiveGraph;
//!
//! let mut graph = ReactiveGraph::new();
//! let count = graph.create_signal(2i32);
//! let doubled = graph.create_derived(move |g| g.get(count).unwrap_or(0) * 2);
//! let quadrupled = graph.create_derived(move |g| g.get_derived(doubled).unwrap_or(0) * 2);
//!
//! graph.set(count, 5);
//! assert_eq!(graph.get_derived(quadrupled), Some(20));
//! ```

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

new_key_type! {
    /// Unique identifier for a signal
    pub struct SignalId;
    /// Unique identifier for a derived/computed value
    pub struct DerivedId;
    /// Unique identifier for an effect
    pub struct EffectId;
}

/// Upper bound on effect flush rounds before the graph gives up on a
/// non-converging effect cycle.
const MAX_FLUSH_ROUNDS: usize = 64;

/// Nodes that can be read (and therefore depended upon)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceId {
    Signal(SignalId),
    Derived(DerivedId),
}

/// Subscriber types that can react to source changes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriberId {
    Derived(DerivedId),
    Effect(EffectId),
}

/// A reactive signal handle (cheap to copy)
pub struct Signal<T> {
    id: SignalId,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Signal<T> {}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Signal").field(&self.id).finish()
    }
}

impl<T> Signal<T> {
    /// Get the signal's internal ID
    pub fn id(&self) -> SignalId {
        self.id
    }
}

/// A derived/computed value handle
pub struct Derived<T> {
    id: DerivedId,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Derived<T> {}

impl<T> std::fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Derived").field(&self.id).finish()
    }
}

impl<T> Derived<T> {
    pub fn id(&self) -> DerivedId {
        self.id
    }
}

/// An effect handle
#[derive(Debug, Clone, Copy)]
pub struct Effect {
    id: EffectId,
}

impl Effect {
    pub fn id(&self) -> EffectId {
        self.id
    }
}

type ComputeFn = Box<dyn Fn(&mut ReactiveGraph) -> Box<dyn Any + Send> + Send>;
type EffectFn = Box<dyn FnMut(&mut ReactiveGraph) + Send>;
type Sources = SmallVec<[SourceId; 4]>;
type Subscribers = SmallVec<[SubscriberId; 4]>;

/// Internal signal node storage
struct SignalNode {
    /// The signal value (type-erased)
    value: Box<dyn Any + Send>,
    /// Version counter for change detection
    version: u64,
    /// Subscribers to notify on change
    subscribers: Subscribers,
}

/// Internal derived node storage
struct DerivedNode {
    /// Cached value (if computed)
    value: Option<Box<dyn Any + Send>>,
    /// The compute function; taken out while it runs
    compute: Option<ComputeFn>,
    /// Sources this derived read during its last computation
    dependencies: Sources,
    /// Subscribers to notify when this derived changes
    subscribers: Subscribers,
    /// Whether the cached value is stale
    dirty: bool,
    /// Depth in the dependency graph (for topological ordering)
    depth: u32,
}

/// Internal effect node storage
struct EffectNode {
    /// The effect function; taken out while it runs
    run: Option<EffectFn>,
    /// Sources this effect read during its last run
    dependencies: Sources,
    /// Whether the effect needs to run
    dirty: bool,
    /// Depth in the dependency graph
    depth: u32,
}

/// The reactive graph that manages all signals, derived values, and effects
pub struct ReactiveGraph {
    signals: SlotMap<SignalId, SignalNode>,
    derived: SlotMap<DerivedId, DerivedNode>,
    effects: SlotMap<EffectId, EffectNode>,
    /// Pending effects to run
    pending_effects: VecDeque<EffectId>,
    /// Current batch depth (> 0 means we're in a batch)
    batch_depth: u32,
    /// Set while effects are being flushed
    flushing: bool,
    /// Stack of dependency frames, one per running derived/effect
    tracking: RefCell<Vec<Sources>>,
    /// Global version counter
    global_version: u64,
}

impl ReactiveGraph {
    /// Create a new reactive graph
    pub fn new() -> Self {
        Self {
            signals: SlotMap::with_key(),
            derived: SlotMap::with_key(),
            effects: SlotMap::with_key(),
            pending_effects: VecDeque::new(),
            batch_depth: 0,
            flushing: false,
            tracking: RefCell::new(Vec::new()),
            global_version: 0,
        }
    }

    // =========================================================================
    // SIGNALS
    // =========================================================================

    /// Create a new signal with an initial value
    pub fn create_signal<T: Send + 'static>(&mut self, initial: T) -> Signal<T> {
        let id = self.signals.insert(SignalNode {
            value: Box::new(initial),
            version: 0,
            subscribers: SmallVec::new(),
        });
        Signal {
            id,
            _marker: std::marker::PhantomData,
        }
    }

    /// Get the current value of a signal
    ///
    /// If called within a tracking context (effect or derived), this signal
    /// will be recorded as a dependency.
    pub fn get<T: Clone + 'static>(&self, signal: Signal<T>) -> Option<T> {
        self.with(signal, T::clone)
    }

    /// Borrow the current value of a signal through a closure (tracked)
    pub fn with<T: 'static, R>(&self, signal: Signal<T>, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.track(SourceId::Signal(signal.id));
        self.with_untracked(signal, f)
    }

    /// Get the current value without tracking as a dependency
    pub fn get_untracked<T: Clone + 'static>(&self, signal: Signal<T>) -> Option<T> {
        self.with_untracked(signal, T::clone)
    }

    fn with_untracked<T: 'static, R>(&self, signal: Signal<T>, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.signals
            .get(signal.id)
            .and_then(|node| node.value.downcast_ref::<T>())
            .map(f)
    }

    /// Set the value of a signal, triggering reactive updates
    pub fn set<T: Send + 'static>(&mut self, signal: Signal<T>, value: T) {
        let Some(node) = self.signals.get_mut(signal.id) else {
            return;
        };
        node.value = Box::new(value);
        node.version += 1;
        self.global_version += 1;

        // Mark all subscribers as dirty
        let subscribers = node.subscribers.clone();
        for sub in subscribers {
            self.mark_dirty(sub);
        }

        // If not in a batch, flush effects immediately
        if self.batch_depth == 0 {
            self.flush_effects();
        }
    }

    /// Set the value only if it differs from the current one.
    ///
    /// Returns `true` when the signal was written.
    pub fn set_if_changed<T: PartialEq + Send + 'static>(
        &mut self,
        signal: Signal<T>,
        value: T,
    ) -> bool {
        if self.with_untracked(signal, |current| *current == value) == Some(true) {
            return false;
        }
        self.set(signal, value);
        true
    }

    /// Update a signal using a function
    pub fn update<T: Clone + Send + 'static, F: FnOnce(T) -> T>(
        &mut self,
        signal: Signal<T>,
        f: F,
    ) {
        if let Some(current) = self.get_untracked(signal) {
            self.set(signal, f(current));
        }
    }

    /// Get the version of a signal (for change detection)
    pub fn signal_version(&self, id: SignalId) -> Option<u64> {
        self.signals.get(id).map(|n| n.version)
    }

    // =========================================================================
    // DERIVED VALUES
    // =========================================================================

    /// Create a derived (computed) value
    pub fn create_derived<T, F>(&mut self, compute: F) -> Derived<T>
    where
        T: Clone + Send + 'static,
        F: Fn(&mut ReactiveGraph) -> T + Send + 'static,
    {
        let compute_boxed =
            move |graph: &mut ReactiveGraph| -> Box<dyn Any + Send> { Box::new(compute(graph)) };

        let id = self.derived.insert(DerivedNode {
            value: None,
            compute: Some(Box::new(compute_boxed)),
            dependencies: SmallVec::new(),
            subscribers: SmallVec::new(),
            dirty: true, // Start dirty to force initial computation
            depth: 1,
        });

        Derived {
            id,
            _marker: std::marker::PhantomData,
        }
    }

    /// Get the value of a derived, computing if necessary
    ///
    /// Reading a derived inside another derived or an effect records it as a
    /// dependency, so invalidation flows through chains of derived values.
    pub fn get_derived<T: Clone + 'static>(&mut self, derived: Derived<T>) -> Option<T> {
        self.track(SourceId::Derived(derived.id));

        let node = self.derived.get_mut(derived.id)?;
        if !node.dirty {
            if let Some(cached) = node.value.as_ref() {
                return cached.downcast_ref::<T>().cloned();
            }
        }

        // A derived that reads itself sees its previous value
        let Some(compute) = node.compute.take() else {
            return node.value.as_ref()?.downcast_ref::<T>().cloned();
        };
        node.dirty = false;

        self.tracking.borrow_mut().push(SmallVec::new());
        let value = compute(self);
        let deps = self.tracking.borrow_mut().pop().unwrap_or_default();

        let depth = self.depth_of(&deps) + 1;
        let old_deps = match self.derived.get_mut(derived.id) {
            Some(node) => {
                node.compute = Some(compute);
                node.depth = depth;
                std::mem::replace(&mut node.dependencies, deps.clone())
            }
            None => return value.downcast_ref::<T>().cloned(),
        };
        self.resubscribe(SubscriberId::Derived(derived.id), &old_deps, &deps);

        let node = self.derived.get_mut(derived.id)?;
        let result = value.downcast_ref::<T>().cloned();
        node.value = Some(value);
        result
    }

    // =========================================================================
    // EFFECTS
    // =========================================================================

    /// Create an effect that runs when its dependencies change
    pub fn create_effect<F>(&mut self, run: F) -> Effect
    where
        F: FnMut(&mut ReactiveGraph) + Send + 'static,
    {
        let id = self.effects.insert(EffectNode {
            run: Some(Box::new(run)),
            dependencies: SmallVec::new(),
            dirty: true, // Run immediately
            depth: 1,
        });

        // Schedule initial run
        self.pending_effects.push_back(id);

        if self.batch_depth == 0 {
            self.flush_effects();
        }

        Effect { id }
    }

    /// Dispose of an effect, removing it from the graph
    pub fn dispose_effect(&mut self, effect: Effect) {
        if let Some(node) = self.effects.remove(effect.id) {
            self.resubscribe(SubscriberId::Effect(effect.id), &node.dependencies, &[]);
        }
    }

    // =========================================================================
    // BATCHING
    // =========================================================================

    /// Start a batch - effects won't run until the batch ends
    pub fn batch_start(&mut self) {
        self.batch_depth += 1;
    }

    /// End a batch and flush pending effects
    pub fn batch_end(&mut self) {
        if self.batch_depth > 0 {
            self.batch_depth -= 1;
            if self.batch_depth == 0 {
                self.flush_effects();
            }
        }
    }

    /// Run a function in a batch context
    pub fn batch<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.batch_start();
        let result = f(self);
        self.batch_end();
        result
    }

    // =========================================================================
    // INTERNAL
    // =========================================================================

    /// Record a read in the innermost tracking frame
    fn track(&self, source: SourceId) {
        if let Some(frame) = self.tracking.borrow_mut().last_mut() {
            if !frame.contains(&source) {
                frame.push(source);
            }
        }
    }

    fn depth_of(&self, sources: &[SourceId]) -> u32 {
        sources
            .iter()
            .map(|source| match source {
                SourceId::Signal(_) => 0,
                SourceId::Derived(id) => self.derived.get(*id).map_or(0, |n| n.depth),
            })
            .max()
            .unwrap_or(0)
    }

    fn subscribers_mut(&mut self, source: SourceId) -> Option<&mut Subscribers> {
        match source {
            SourceId::Signal(id) => self.signals.get_mut(id).map(|n| &mut n.subscribers),
            SourceId::Derived(id) => self.derived.get_mut(id).map(|n| &mut n.subscribers),
        }
    }

    /// Move a subscriber from its old sources to its new ones
    fn resubscribe(&mut self, sub: SubscriberId, old: &[SourceId], new: &[SourceId]) {
        for &source in old {
            if let Some(subs) = self.subscribers_mut(source) {
                subs.retain(|s| *s != sub);
            }
        }
        for &source in new {
            if let Some(subs) = self.subscribers_mut(source) {
                if !subs.contains(&sub) {
                    subs.push(sub);
                }
            }
        }
    }

    /// Mark a subscriber as dirty
    fn mark_dirty(&mut self, sub: SubscriberId) {
        match sub {
            SubscriberId::Derived(id) => {
                let Some(node) = self.derived.get_mut(id) else {
                    return;
                };
                if node.dirty {
                    return;
                }
                node.dirty = true;
                // Propagate to derived's subscribers
                let subscribers = node.subscribers.clone();
                for sub in subscribers {
                    self.mark_dirty(sub);
                }
            }
            SubscriberId::Effect(id) => {
                if let Some(node) = self.effects.get_mut(id) {
                    if !node.dirty {
                        node.dirty = true;
                        self.pending_effects.push_back(id);
                    }
                }
            }
        }
    }

    /// Flush all pending effects, including the ones scheduled by effects
    fn flush_effects(&mut self) {
        if self.flushing {
            return;
        }
        self.flushing = true;

        for round in 0.. {
            if self.pending_effects.is_empty() {
                break;
            }
            if round == MAX_FLUSH_ROUNDS {
                tracing::warn!(
                    pending = self.pending_effects.len(),
                    "effects did not settle, dropping pending runs"
                );
                for id in self.pending_effects.drain(..) {
                    if let Some(node) = self.effects.get_mut(id) {
                        node.dirty = false;
                    }
                }
                break;
            }

            // Sort by depth for proper execution order
            let mut effects: Vec<EffectId> = self.pending_effects.drain(..).collect();
            effects.sort_by_key(|id| self.effects.get(*id).map_or(0, |n| n.depth));
            tracing::trace!(round, count = effects.len(), "flushing effects");

            for effect_id in effects {
                self.run_effect(effect_id);
            }
        }

        self.flushing = false;
    }

    /// Run a single effect
    fn run_effect(&mut self, effect_id: EffectId) {
        let Some(node) = self.effects.get_mut(effect_id) else {
            return;
        };
        // Check if still dirty (might have been run already this round)
        if !node.dirty {
            return;
        }
        let Some(mut run) = node.run.take() else {
            return;
        };
        node.dirty = false;

        self.tracking.borrow_mut().push(SmallVec::new());
        run(self);
        let deps = self.tracking.borrow_mut().pop().unwrap_or_default();

        let depth = self.depth_of(&deps) + 1;
        let old_deps = match self.effects.get_mut(effect_id) {
            Some(node) => {
                node.run = Some(run);
                node.depth = depth;
                std::mem::replace(&mut node.dependencies, deps.clone())
            }
            // Disposed while running
            None => return,
        };
        self.resubscribe(SubscriberId::Effect(effect_id), &old_deps, &deps);
    }

    /// Get statistics about the reactive graph
    pub fn stats(&self) -> ReactiveStats {
        ReactiveStats {
            signal_count: self.signals.len(),
            derived_count: self.derived.len(),
            effect_count: self.effects.len(),
            pending_effects: self.pending_effects.len(),
            global_version: self.global_version,
        }
    }
}

impl Default for ReactiveGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the reactive graph
#[derive(Debug, Clone)]
pub struct ReactiveStats {
    pub signal_count: usize,
    pub derived_count: usize,
    pub effect_count: usize,
    pub pending_effects: usize,
    pub global_version: u64,
}

/// Shared reactive graph for thread-safe access
pub type SharedReactiveGraph = Arc<Mutex<ReactiveGraph>>;

/// Lock a shared graph, recovering the guard if a previous holder panicked
pub fn lock_graph(graph: &Mutex<ReactiveGraph>) -> MutexGuard<'_, ReactiveGraph> {
    graph.lock().unwrap_or_else(PoisonError::into_inner)
}
