//! Selekt Core Runtime
//!
//! This crate provides the reactive primitives the Selekt select service is
//! composed from:
//!
//! - **Reactive Signals**: signals, lazily computed derived values and effects
//!   with automatic dependency tracking
//! - **Runtime**: a shared graph bound to a tokio handle for async work
//! - **Async Data**: keyed requests whose stale responses are discarded
//! - **Two-way Bindings**: values owned either locally or by an external owner
//! - **Debounce Timer**: a single rescheduleable commit
//!
//! # Example
//!
//! ```rust
//! use selekt_core::reactive::ReactiveGraph;
//!
//! let mut graph = ReactiveGraph::new();
//!
//! // Create a signal
//! let phrase = graph.create_signal(String::from("ab"));
//!
//! // Create a derived value
//! let length = graph.create_derived(move |g| g.get(phrase).map_or(0, |p| p.len()));
//!
//! // Create an effect
//! let _effect = graph.create_effect(move |g| {
//!     println!("Phrase is now: {:?}", g.get(phrase));
//! });
//!
//! // Update the signal
//! graph.set(phrase, "abc".to_string());
//! assert_eq!(graph.get_derived(length), Some(3));
//! ```

pub mod async_data;
pub mod reactive;
pub mod runtime;
pub mod timer;
pub mod vmodel;

pub use async_data::{AsyncData, AsyncState, Dispatch, Request};
pub use reactive::{
    Derived, DerivedId, Effect, EffectId, ReactiveGraph, ReactiveStats, SharedReactiveGraph,
    Signal, SignalId,
};
pub use runtime::{ReactiveRuntime, RuntimeStats, WeakRuntime};
pub use timer::Debouncer;
pub use vmodel::{Commit, UpdateHandler, VModel};
