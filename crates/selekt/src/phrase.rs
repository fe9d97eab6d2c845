//! Search phrase
//!
//! Keystrokes land in a local buffer immediately. The committed phrase (the
//! one sources and filters react to) is the trimmed buffer, written either
//! right away or after a debounce delay. While a debounced commit is pending
//! the phrase is `typing`.
//!
//! The committed phrase is a two-way binding: an owner may hold it and receive
//! every commit through an update handler.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use selekt_core::{Commit, Debouncer, Derived, ReactiveGraph, Signal, UpdateHandler, VModel, WeakRuntime};
use serde::Deserialize;

use crate::error::{Result, SelectError};

/// Delay used when debouncing is requested without an explicit duration
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

pub type PhrasePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Builds a predicate from the colon separated arguments of an expression
/// segment
pub type ValidatorFactory = Arc<dyn Fn(&[String]) -> Result<PhrasePredicate> + Send + Sync>;

/// Phrase validation configuration
#[derive(Clone)]
pub enum ValidSpec {
    /// Forced result
    Always(bool),
    Predicate(PhrasePredicate),
    /// `"validator:arg|validator:arg"`, every segment must pass
    Expr(String),
}

impl Default for ValidSpec {
    fn default() -> Self {
        ValidSpec::Always(true)
    }
}

impl fmt::Debug for ValidSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidSpec::Always(valid) => write!(f, "Always({valid})"),
            ValidSpec::Predicate(_) => f.write_str("Predicate"),
            ValidSpec::Expr(expr) => write!(f, "Expr({expr:?})"),
        }
    }
}

impl From<bool> for ValidSpec {
    fn from(valid: bool) -> Self {
        ValidSpec::Always(valid)
    }
}

impl From<&str> for ValidSpec {
    fn from(expr: &str) -> Self {
        ValidSpec::Expr(expr.to_owned())
    }
}

/// Registry of named validators usable in expressions
#[derive(Clone)]
pub struct Validators {
    registry: FxHashMap<String, ValidatorFactory>,
}

impl Default for Validators {
    fn default() -> Self {
        let mut validators = Self {
            registry: FxHashMap::default(),
        };
        validators.register("min", |args: &[String]| {
            let argument = args.first().cloned().unwrap_or_default();
            let min: usize = argument
                .trim()
                .parse()
                .map_err(|_| SelectError::InvalidValidatorArgument {
                    validator: "min".into(),
                    argument,
                })?;
            Ok(Arc::new(move |phrase: &str| phrase.chars().count() >= min) as PhrasePredicate)
        });
        validators
    }
}

impl fmt::Debug for Validators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.registry.keys()).finish()
    }
}

impl Validators {
    /// Registry with the built-in validators (`min`)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&[String]) -> Result<PhrasePredicate> + Send + Sync + 'static,
    {
        self.registry.insert(name.into(), Arc::new(factory));
        self
    }

    /// Normalize a validation configuration into a single predicate
    pub fn compile(&self, spec: &ValidSpec) -> Result<PhrasePredicate> {
        match spec {
            ValidSpec::Always(valid) => {
                let valid = *valid;
                Ok(Arc::new(move |_: &str| valid))
            }
            ValidSpec::Predicate(predicate) => Ok(predicate.clone()),
            ValidSpec::Expr(expr) => {
                let checks = expr
                    .split('|')
                    .filter(|segment| !segment.trim().is_empty())
                    .map(|segment| {
                        let mut parts = segment.split(':').map(|part| part.trim().to_owned());
                        let name = parts.next().unwrap_or_default();
                        let args: Vec<String> = parts.collect();
                        let factory = self
                            .registry
                            .get(&name)
                            .ok_or_else(|| SelectError::UnknownValidator(name.clone()))?;
                        factory(&args)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(move |phrase: &str| checks.iter().all(|check| check(phrase))))
            }
        }
    }
}

/// Debounce configuration of phrase commits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Debounce {
    /// Debounce with the default delay when the source is asynchronous
    #[default]
    Auto,
    Off,
    /// Debounce with the default delay
    On,
    /// Explicit delay, `0` disables debouncing
    Millis(u64),
}

impl Debounce {
    pub fn delay(&self, source_async: bool, default_ms: u64) -> Option<Duration> {
        let ms = match self {
            Debounce::Auto if source_async => default_ms,
            Debounce::Auto | Debounce::Off => 0,
            Debounce::On => default_ms,
            Debounce::Millis(ms) => *ms,
        };
        (ms > 0).then(|| Duration::from_millis(ms))
    }
}

impl From<bool> for Debounce {
    fn from(enabled: bool) -> Self {
        if enabled {
            Debounce::On
        } else {
            Debounce::Off
        }
    }
}

impl From<u64> for Debounce {
    fn from(ms: u64) -> Self {
        Debounce::Millis(ms)
    }
}

/// Reactive owner of the search phrase
#[derive(Clone, Debug)]
pub struct PhraseHook {
    value: VModel<String, ()>,
    buffer: Signal<String>,
    typing: Signal<bool>,
    validator: Signal<PhrasePredicateCell>,
    valid: Derived<bool>,
    debounce: Signal<Debounce>,
    default_delay: Signal<u64>,
    timer: Debouncer,
}

/// Signal payload wrapper so the predicate can live in the graph
#[derive(Clone)]
struct PhrasePredicateCell(PhrasePredicate);

impl PhraseHook {
    pub fn new(
        graph: &mut ReactiveGraph,
        initial: String,
        handler: Option<UpdateHandler<String, ()>>,
        validator: PhrasePredicate,
        debounce: Debounce,
        default_delay: u64,
    ) -> Self {
        let value = VModel::new(graph, initial.clone(), handler);
        let buffer = graph.create_signal(initial);
        let validator = graph.create_signal(PhrasePredicateCell(validator));
        let valid = graph.create_derived(move |g| {
            let phrase = value.get(g).unwrap_or_default();
            g.with(validator, |cell| (cell.0)(&phrase)).unwrap_or(true)
        });

        // Follow phrase changes made outside the buffer
        graph.create_effect(move |g| {
            let committed = value.get(g).unwrap_or_default();
            let local = g.get_untracked(buffer).unwrap_or_default();
            if local.trim() != committed {
                g.set(buffer, committed);
            }
        });

        Self {
            value,
            buffer,
            typing: graph.create_signal(false),
            validator,
            valid,
            debounce: graph.create_signal(debounce),
            default_delay: graph.create_signal(default_delay),
            timer: Debouncer::new(),
        }
    }

    /// Committed phrase (tracked)
    pub fn value(&self, graph: &ReactiveGraph) -> String {
        self.value.get(graph).unwrap_or_default()
    }

    /// What the user typed so far (tracked)
    pub fn buffer(&self, graph: &ReactiveGraph) -> String {
        graph.get(self.buffer).unwrap_or_default()
    }

    pub fn is_typing(&self, graph: &ReactiveGraph) -> bool {
        graph.get(self.typing).unwrap_or(false)
    }

    pub fn is_valid(&self, graph: &mut ReactiveGraph) -> bool {
        graph.get_derived(self.valid).unwrap_or(true)
    }

    /// Whether a commit is waiting on the owner's handler
    pub fn is_busy(&self, graph: &ReactiveGraph) -> bool {
        self.value.is_busy(graph)
    }

    /// User input entry point
    pub fn type_text(
        &self,
        graph: &mut ReactiveGraph,
        runtime: &WeakRuntime,
        text: String,
        source_async: bool,
    ) {
        graph.set(self.buffer, text);

        let default_delay = graph.get_untracked(self.default_delay).unwrap_or(DEFAULT_DEBOUNCE_MS);
        let delay = graph
            .get_untracked(self.debounce)
            .unwrap_or_default()
            .delay(source_async, default_delay);

        match delay {
            None => {
                self.timer.cancel();
                graph.set_if_changed(self.typing, false);
                self.commit(graph, runtime);
            }
            Some(delay) => {
                graph.set_if_changed(self.typing, true);
                let this = self.clone();
                let completion = runtime.clone();
                self.timer.schedule(runtime, delay, move |g| {
                    g.set_if_changed(this.typing, false);
                    this.commit(g, &completion);
                });
            }
        }
    }

    fn commit(&self, graph: &mut ReactiveGraph, runtime: &WeakRuntime) {
        let committed = graph
            .get_untracked(self.buffer)
            .unwrap_or_default()
            .trim()
            .to_owned();
        if self.value.with(graph, |current| *current == committed) == Some(true) {
            return;
        }
        tracing::trace!(phrase = %committed, "phrase committed");
        self.value.set(graph, runtime, committed, ());
    }

    /// Clear the phrase, dropping any pending commit
    pub fn reset(&self, graph: &mut ReactiveGraph, runtime: &WeakRuntime) -> Commit {
        self.timer.cancel();
        graph.batch(|g| {
            g.set_if_changed(self.typing, false);
            g.set_if_changed(self.buffer, String::new());
            if self.value.get(g).unwrap_or_default().is_empty() {
                return Commit::Applied;
            }
            self.value.set(g, runtime, String::new(), ())
        })
    }

    /// Phrase decided by the owner
    pub fn set_external(&self, graph: &mut ReactiveGraph, phrase: String) {
        self.value.set_external(graph, phrase);
    }

    pub fn set_validator(&self, graph: &mut ReactiveGraph, validator: PhrasePredicate) {
        graph.set(self.validator, PhrasePredicateCell(validator));
    }

    pub fn set_debounce(&self, graph: &mut ReactiveGraph, debounce: Debounce) {
        graph.set(self.debounce, debounce);
    }
}
