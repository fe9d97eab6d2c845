//! Selection state
//!
//! The selection is bound to an externally owned raw value: a single value,
//! or an array of values in multiple mode. Reading resolves raw values to
//! items, preferring options the source knows, then items resolved earlier
//! (the resolution cache), then fresh items built from the raw value, which
//! may be poor.
//!
//! Poor items are upgraded by an optional resolver. It runs only when the set
//! of poor identities changes.

use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use selekt_core::{Commit, Derived, ReactiveGraph, Signal, UpdateHandler, VModel, WeakRuntime};
use serde_json::Value;

use crate::error::{FetchError, Result};
use crate::item::{Item, ItemHook};
use crate::json;
use crate::src::SrcHook;

pub type ResolverFn =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, std::result::Result<Value, FetchError>> + Send + Sync>;

/// Resolution of poor model values into full records
#[derive(Clone, Default)]
pub enum Resolve {
    #[default]
    None,
    /// Records to resolve against
    Static(Vec<Value>),
    /// Called with the raw records of the selection, returns full records
    Async(ResolverFn),
}

impl Resolve {
    pub fn resolver<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<Value, FetchError>> + Send + 'static,
    {
        Resolve::Async(Arc::new(move |raws: Vec<Value>| f(raws).boxed()))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Resolve::None)
    }
}

impl fmt::Debug for Resolve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolve::None => f.write_str("None"),
            Resolve::Static(records) => write!(f, "Static({} records)", records.len()),
            Resolve::Async(_) => f.write_str("Async"),
        }
    }
}

/// Context handed to the owner's update handler with every commit
#[derive(Clone, Debug, PartialEq)]
pub struct ModelChange {
    /// The committed selection
    pub items: Vec<Item>,
}

/// Prepend `front`, keeping earlier entries that `front` does not contain
fn merge_front(front: Vec<Item>, rest: Vec<Item>) -> Vec<Item> {
    let mut merged = front;
    for item in rest {
        if !merged.iter().any(|known| known.equals(&item)) {
            merged.push(item);
        }
    }
    merged
}

/// Reactive owner of the selection
#[derive(Clone, Copy, Debug)]
pub struct ModelHook {
    value: VModel<Value, ModelChange>,
    multiple: Signal<Option<bool>>,
    resolve: Signal<Resolve>,
    cache: Signal<Vec<Item>>,
    resolving: Signal<bool>,
    resolve_error: Signal<Option<FetchError>>,
    is_multiple: Derived<bool>,
    items: Derived<Vec<Item>>,
    poor: Derived<bool>,
    item: ItemHook,
}

impl ModelHook {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: &mut ReactiveGraph,
        runtime: WeakRuntime,
        item: ItemHook,
        src: SrcHook,
        initial: Value,
        handler: Option<UpdateHandler<Value, ModelChange>>,
        multiple: Option<bool>,
        resolve: Resolve,
    ) -> Self {
        let value = VModel::new(graph, initial, handler);
        let multiple = graph.create_signal(multiple);
        let resolve = graph.create_signal(resolve);
        let cache = graph.create_signal(Vec::<Item>::new());
        let resolving = graph.create_signal(false);
        let resolve_error = graph.create_signal(None::<FetchError>);

        let is_multiple = graph.create_derived(move |g| {
            g.get(multiple).flatten() == Some(true)
                || value.with(g, Value::is_array).unwrap_or(false)
        });

        let items = graph.create_derived(move |g| {
            let raw = value.get(g).unwrap_or(Value::Null);
            let factory = item.factory(g);
            let mut index = src.data(g);
            index.extend(g.get(cache).unwrap_or_default());

            let values = match raw {
                Value::Array(values) => values,
                other => vec![other],
            };
            values
                .into_iter()
                .filter(json::is_set)
                .filter_map(|raw| match factory.of_value(raw) {
                    Ok(candidate) => Some(
                        index
                            .iter()
                            .find(|known| known.equals(&candidate))
                            .cloned()
                            .unwrap_or(candidate),
                    ),
                    Err(err) => {
                        tracing::warn!(%err, "skipping model value");
                        None
                    }
                })
                .collect::<Vec<_>>()
        });

        let poor = graph.create_derived(move |g| {
            g.get_derived(items)
                .is_some_and(|items| items.iter().any(|item| item.poor))
        });

        // Keep resolved items around so they survive source refreshes
        graph.create_effect(move |g| {
            let current = g.get_derived(items).unwrap_or_default();
            let previous = g.get_untracked(cache).unwrap_or_default();
            g.set_if_changed(cache, merge_front(current, previous));
        });

        // Resolve poor items whenever the set of poor identities changes
        let mut last_key = String::new();
        graph.create_effect(move |g| {
            let current = g.get_derived(items).unwrap_or_default();
            let Some(resolver) = g.get(resolve) else {
                return;
            };
            if resolver.is_none() {
                return;
            }

            let mut poor_keys: Vec<String> = current
                .iter()
                .filter(|item| item.poor)
                .map(Item::index_text)
                .collect();
            if poor_keys.is_empty() {
                last_key.clear();
                return;
            }
            poor_keys.sort();
            let key = format!(
                "{}|{}",
                g.signal_version(resolve.id()).unwrap_or(0),
                poor_keys.join(",")
            );
            if key == last_key {
                return;
            }
            last_key = key;

            let raws: Vec<Value> = current.iter().map(|item| item.raw.clone()).collect();
            match resolver {
                Resolve::None => {}
                Resolve::Static(records) => {
                    Self::apply_resolved(g, item, cache, Value::Array(records));
                }
                Resolve::Async(resolver) => {
                    tracing::debug!(count = poor_keys.len(), "resolving poor values");
                    g.set_if_changed(resolving, true);
                    let request = resolver(raws);
                    let completion = runtime.clone();
                    runtime.spawn(async move {
                        let outcome = request.await;
                        completion.with(|g| {
                            g.batch(|g| {
                                g.set(resolving, false);
                                match outcome {
                                    Ok(body) => {
                                        g.set_if_changed(resolve_error, None);
                                        Self::apply_resolved(g, item, cache, body);
                                    }
                                    Err(err) => {
                                        tracing::warn!(%err, "poor value resolution failed");
                                        g.set(resolve_error, Some(err));
                                    }
                                }
                            });
                        });
                    });
                }
            }
        });

        Self {
            value,
            multiple,
            resolve,
            cache,
            resolving,
            resolve_error,
            is_multiple,
            items,
            poor,
            item,
        }
    }

    fn apply_resolved(graph: &mut ReactiveGraph, item: ItemHook, cache: Signal<Vec<Item>>, body: Value) {
        let factory = item.factory(graph);
        let records = match body {
            Value::Array(records) => records,
            other => json::find_array(&other).cloned().unwrap_or_default(),
        };
        if records.is_empty() {
            return;
        }
        let resolved: Vec<Item> = records.into_iter().map(|raw| factory.of_raw(raw)).collect();
        let previous = graph.get_untracked(cache).unwrap_or_default();
        graph.set_if_changed(cache, merge_front(resolved, previous));
    }

    /// The selection (tracked)
    pub fn items(&self, graph: &mut ReactiveGraph) -> Vec<Item> {
        graph.get_derived(self.items).unwrap_or_default()
    }

    /// The raw bound value (tracked)
    pub fn raw(&self, graph: &ReactiveGraph) -> Value {
        self.value.get(graph).unwrap_or(Value::Null)
    }

    pub fn is_multiple(&self, graph: &mut ReactiveGraph) -> bool {
        graph.get_derived(self.is_multiple).unwrap_or(false)
    }

    /// Some selected item is poor
    pub fn is_poor(&self, graph: &mut ReactiveGraph) -> bool {
        graph.get_derived(self.poor).unwrap_or(false)
    }

    /// A commit is waiting on the owner's handler
    pub fn is_busy(&self, graph: &ReactiveGraph) -> bool {
        self.value.is_busy(graph)
    }

    pub fn is_resolving(&self, graph: &ReactiveGraph) -> bool {
        graph.get(self.resolving).unwrap_or(false)
    }

    pub fn resolve_error(&self, graph: &ReactiveGraph) -> Option<FetchError> {
        graph.get(self.resolve_error).flatten()
    }

    pub fn has_resolver(&self, graph: &ReactiveGraph) -> bool {
        graph.with(self.resolve, |r| !r.is_none()).unwrap_or(false)
    }

    /// Whether `item` is part of the selection (tracked)
    pub fn contains(&self, graph: &mut ReactiveGraph, item: &Item) -> bool {
        self.items(graph).iter().any(|selected| selected.equals(item))
    }

    /// Commit a new selection
    pub fn set(&self, graph: &mut ReactiveGraph, runtime: &WeakRuntime, items: Vec<Item>) -> Commit {
        if self.value.is_busy(graph) {
            tracing::debug!("selection write rejected, commit pending");
            return Commit::Rejected;
        }

        let multiple = self.is_multiple(graph);
        let items = if multiple {
            items
        } else {
            items.into_iter().take(1).collect()
        };
        let raw = if multiple {
            Value::Array(items.iter().map(|item| item.value.clone()).collect())
        } else {
            items.first().map_or(Value::Null, |item| item.value.clone())
        };

        tracing::debug!(count = items.len(), multiple, "committing selection");
        graph.batch(|g| {
            let previous = g.get_untracked(self.cache).unwrap_or_default();
            g.set_if_changed(self.cache, merge_front(items.clone(), previous));
            self.value.set(g, runtime, raw, ModelChange { items })
        })
    }

    /// Add items; replaces the selection in single mode
    pub fn append(&self, graph: &mut ReactiveGraph, runtime: &WeakRuntime, items: Vec<Item>) -> Commit {
        if !self.is_multiple(graph) {
            return self.set(graph, runtime, items);
        }
        let mut next = self.items(graph);
        next.extend(items);
        self.set(graph, runtime, next)
    }

    /// Remove selected items, add the others
    pub fn toggle(&self, graph: &mut ReactiveGraph, runtime: &WeakRuntime, items: Vec<Item>) -> Commit {
        let current = self.items(graph);
        let (remove, add): (Vec<Item>, Vec<Item>) = items
            .into_iter()
            .partition(|item| current.iter().any(|selected| selected.equals(item)));

        let mut next: Vec<Item> = current
            .into_iter()
            .filter(|selected| !remove.iter().any(|item| item.equals(selected)))
            .collect();
        next.extend(add);
        self.set(graph, runtime, next)
    }

    /// Drop the last selected item
    pub fn pop(&self, graph: &mut ReactiveGraph, runtime: &WeakRuntime) -> Commit {
        let mut next = self.items(graph);
        next.pop();
        self.set(graph, runtime, next)
    }

    pub fn clear(&self, graph: &mut ReactiveGraph, runtime: &WeakRuntime) -> Commit {
        self.set(graph, runtime, Vec::new())
    }

    /// Remove the item at `position` of the selection
    pub fn remove(&self, graph: &mut ReactiveGraph, runtime: &WeakRuntime, position: usize) -> Commit {
        let mut next = self.items(graph);
        if position >= next.len() {
            return Commit::Applied;
        }
        next.remove(position);
        self.set(graph, runtime, next)
    }

    /// Check that every raw value maps through the current item spec
    pub fn validate(&self, graph: &mut ReactiveGraph, raw: &Value) -> Result<()> {
        let factory = self.item.factory(graph);
        let values = match raw {
            Value::Array(values) => values.as_slice(),
            other => std::slice::from_ref(other),
        };
        for value in values.iter().filter(|v| json::is_set(v)) {
            factory.of_value(value.clone())?;
        }
        Ok(())
    }

    /// Value decided by the owner
    pub fn set_external(&self, graph: &mut ReactiveGraph, raw: Value) {
        self.value.set_external(graph, raw);
    }

    pub fn set_multiple(&self, graph: &mut ReactiveGraph, multiple: Option<bool>) {
        graph.set_if_changed(self.multiple, multiple);
    }

    pub fn set_resolve(&self, graph: &mut ReactiveGraph, resolve: Resolve) {
        graph.set(self.resolve, resolve);
    }
}
