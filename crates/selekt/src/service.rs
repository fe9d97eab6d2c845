//! The select service
//!
//! [`Select`] composes the hooks into one reactive graph, in dependency
//! order: item, phrase, source, model, the fetch gate, items, pointer and ui.
//! The rendering layer reads snapshots ([`Scope`], attribute bags) and
//! forwards user intents (typing, keys, focus, clicks) to its operations.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use selekt_core::{Commit, Derived, ReactiveGraph, ReactiveRuntime, RuntimeStats, WeakRuntime};
use serde_json::Value;

use crate::attrs::{self, AttrBag, AttrState, ElementIds, IdGenerator, SequentialIds};
use crate::config::SelectConfig;
use crate::error::{FetchError, Result, SelectError};
use crate::item::{AsSpec, Item, ItemFactory, ItemHook, ItemState};
use crate::items::{parse_keys, DisableFn, FilterSpec, ItemsHook, SelectionMode, Tagging};
use crate::model::{ModelHook, Resolve};
use crate::phrase::{Debounce, PhraseHook, ValidSpec, Validators};
use crate::pointer::{PointerHook, Step};
use crate::src::{default_http, DefaultFetcher, Fetcher, ParseSpec, Source, SourceState, SrcHook};
use crate::ui::{KeyInput, KeyResponse, UiFlags, UiHook};

/// Render snapshot of a select
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scope {
    pub opened: bool,
    pub active: bool,
    pub disabled: bool,
    pub readonly: bool,
    pub has_value: bool,
    /// Source fetch or model commit in flight
    pub busy: bool,
    /// Committed phrase
    pub phrase: String,
    /// Text the input shows
    pub input_value: String,
    /// Visible candidates with their render state
    pub items: Vec<ItemState>,
    pub selection: Vec<Item>,
    pub pointer: isize,
    pub has_more: bool,
    pub error: Option<FetchError>,
}

static DEFAULT_IDS: LazyLock<SequentialIds> = LazyLock::new(SequentialIds::default);

struct Hooks {
    item: ItemHook,
    phrase: PhraseHook,
    src: SrcHook,
    model: ModelHook,
    items: ItemsHook,
    pointer: PointerHook,
    ui: UiHook,
    enabled: Derived<bool>,
}

struct Inner {
    runtime: ReactiveRuntime,
    hooks: Hooks,
    ids: ElementIds,
    id: Option<String>,
    accessible: bool,
    placeholder: String,
    validators: Validators,
}

/// Handle to one select instance
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct Select {
    inner: Arc<Inner>,
}

impl fmt::Debug for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Select")
            .field("id", &self.inner.ids.root())
            .finish_non_exhaustive()
    }
}

fn model_values(raw: &Value) -> &[Value] {
    match raw {
        Value::Array(values) => values,
        other => std::slice::from_ref(other),
    }
}

fn checked(commit: Commit) -> Result<Commit> {
    match commit {
        Commit::Rejected => Err(SelectError::Busy),
        other => Ok(other),
    }
}

impl Select {
    /// Build a select on the tokio runtime the caller is running on
    pub fn new(config: SelectConfig) -> Result<Self> {
        let runtime = ReactiveRuntime::current().ok_or(SelectError::NoRuntime)?;
        Self::with_runtime(runtime, config)
    }

    /// Build a select on a given runtime
    pub fn with_runtime(runtime: ReactiveRuntime, config: SelectConfig) -> Result<Self> {
        let validator = config.validators.compile(&config.valid)?;

        let factory = ItemFactory::new(config.item_as.clone());
        for value in model_values(&config.model_value).iter().filter(|v| crate::json::is_set(v)) {
            factory.of_value(value.clone())?;
        }

        let root_id = match (&config.id, &config.ids) {
            (Some(id), _) => id.clone(),
            (None, Some(ids)) => ids.next_id(),
            (None, None) => DEFAULT_IDS.next_id(),
        };

        let weak = runtime.downgrade();
        let hooks = runtime.with(|g| Self::compose(g, &weak, &config, validator));

        tracing::debug!(id = %root_id, "select created");
        Ok(Self {
            inner: Arc::new(Inner {
                runtime,
                hooks,
                ids: ElementIds::new(root_id),
                id: config.id,
                accessible: config.accessible,
                placeholder: config.placeholder,
                validators: config.validators,
            }),
        })
    }

    fn compose(
        graph: &mut ReactiveGraph,
        weak: &WeakRuntime,
        config: &SelectConfig,
        validator: crate::phrase::PhrasePredicate,
    ) -> Hooks {
        graph.batch(|g| {
            let ready = g.create_signal(false);

            let item = ItemHook::new(g, config.item_as.clone());
            let phrase = PhraseHook::new(
                g,
                config.phrase.clone(),
                config.on_phrase_update.clone(),
                validator,
                config.debounce,
                config.default_debounce,
            );

            let fetcher = config.fetcher.clone().unwrap_or_else(|| {
                let http = config.http.clone().unwrap_or_else(default_http);
                Arc::new(DefaultFetcher::new(http)) as Arc<dyn Fetcher>
            });
            let src = SrcHook::new(
                g,
                item,
                config.src.clone(),
                config.parse.clone(),
                fetcher,
                config.params.clone(),
            );

            let model = ModelHook::new(
                g,
                weak.clone(),
                item,
                src,
                config.model_value.clone(),
                config.on_model_update.clone(),
                config.multiple,
                config.resolve.clone(),
            );

            let flags = UiFlags::new(g, config.disabled, config.readonly);

            // Fetching waits for a settled, valid phrase and a reason to load
            let gate_phrase = phrase.clone();
            let enabled = g.create_derived(move |g| {
                if !g.get(ready).unwrap_or(false) || gate_phrase.is_typing(g) {
                    return false;
                }
                let valid = gate_phrase.is_valid(g);
                if model.is_poor(g) && !model.has_resolver(g) {
                    return valid;
                }
                flags.is_active(g) && valid
            });
            src.watch(g, weak.clone(), enabled, phrase.clone());

            let items = ItemsHook::new(
                g,
                item,
                phrase.clone(),
                src,
                model,
                config.mode,
                config.filter.clone(),
                config.tagging.clone(),
                parse_keys(&config.tag_on),
                config.disable.clone(),
            );
            let pointer = PointerHook::new(g, &items, config.autopoint);
            let ui = UiHook::new(
                g,
                flags,
                phrase.clone(),
                src,
                model,
                items.clone(),
                pointer,
                config.typeahead,
                config.limit,
            );

            g.set(ready, true);

            Hooks {
                item,
                phrase,
                src,
                model,
                items,
                pointer,
                ui,
                enabled,
            }
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut ReactiveGraph, &Hooks, &WeakRuntime) -> R) -> R {
        let weak = self.inner.runtime.downgrade();
        self.inner.runtime.with(|g| f(g, &self.inner.hooks, &weak))
    }

    // =========================================================================
    // STATE
    // =========================================================================

    /// Committed phrase
    pub fn phrase(&self) -> String {
        self.with(|g, h, _| h.phrase.value(g))
    }

    /// Text the input shows
    pub fn input_value(&self) -> String {
        self.with(|g, h, _| h.ui.input_value(g))
    }

    pub fn is_typing(&self) -> bool {
        self.with(|g, h, _| h.phrase.is_typing(g))
    }

    pub fn is_valid(&self) -> bool {
        self.with(|g, h, _| h.phrase.is_valid(g))
    }

    /// Selected items
    pub fn selection(&self) -> Vec<Item> {
        self.with(|g, h, _| h.model.items(g))
    }

    /// Raw model value
    pub fn model_value(&self) -> Value {
        self.with(|g, h, _| h.model.raw(g))
    }

    pub fn is_multiple(&self) -> bool {
        self.with(|g, h, _| h.model.is_multiple(g))
    }

    /// A model commit is waiting on the owner
    pub fn is_busy(&self) -> bool {
        self.with(|g, h, _| h.model.is_busy(g))
    }

    pub fn is_resolving(&self) -> bool {
        self.with(|g, h, _| h.model.is_resolving(g))
    }

    pub fn resolve_error(&self) -> Option<FetchError> {
        self.with(|g, h, _| h.model.resolve_error(g))
    }

    /// Candidate list
    pub fn items(&self) -> Vec<Item> {
        self.with(|g, h, _| h.items.value(g))
    }

    /// Visible candidates with their render state
    pub fn visible(&self) -> Vec<ItemState> {
        self.with(|g, h, _| h.ui.visible(g))
    }

    pub fn source(&self) -> SourceState {
        self.with(|g, h, _| h.src.state(g))
    }

    /// Whether the source may fetch right now
    pub fn is_enabled(&self) -> bool {
        self.with(|g, h, _| g.get_derived(h.enabled).unwrap_or(false))
    }

    pub fn pointer(&self) -> isize {
        self.with(|g, h, _| h.pointer.index(g))
    }

    pub fn pointed(&self) -> Option<Item> {
        self.with(|g, h, _| h.pointer.item(g))
    }

    pub fn is_opened(&self) -> bool {
        self.with(|g, h, _| h.ui.flags().is_opened(g))
    }

    pub fn is_active(&self) -> bool {
        self.with(|g, h, _| h.ui.flags().is_active(g))
    }

    pub fn has_more(&self) -> bool {
        self.with(|g, h, _| h.ui.has_more(g))
    }

    pub fn check_selected(&self, item: &Item) -> bool {
        self.with(|g, h, _| h.items.check_selected(g, item))
    }

    pub fn check_disabled(&self, item: &Item) -> bool {
        self.with(|g, h, _| h.items.check_disabled(g, item))
    }

    /// Everything the rendering layer needs in one snapshot
    pub fn scope(&self) -> Scope {
        self.with(|g, h, _| {
            let flags = h.ui.flags();
            let selection = h.model.items(g);
            Scope {
                opened: flags.is_opened(g),
                active: flags.is_active(g),
                disabled: flags.is_disabled(g),
                readonly: flags.is_readonly(g),
                has_value: !selection.is_empty(),
                busy: h.src.is_busy(g) || h.model.is_busy(g),
                phrase: h.phrase.value(g),
                input_value: h.ui.input_value(g),
                items: h.ui.visible(g),
                selection,
                pointer: h.pointer.index(g),
                has_more: h.ui.has_more(g),
                error: h.src.error(g),
            }
        })
    }

    pub fn ids(&self) -> &ElementIds {
        &self.inner.ids
    }

    pub fn stats(&self) -> RuntimeStats {
        self.inner.runtime.stats()
    }

    // =========================================================================
    // ATTRIBUTES
    // =========================================================================

    fn attr_state(&self) -> AttrState {
        self.with(|g, h, _| {
            let flags = h.ui.flags();
            AttrState {
                accessible: self.inner.accessible,
                id: self.inner.id.clone(),
                opened: flags.is_opened(g),
                disabled: flags.is_disabled(g),
                readonly: flags.is_readonly(g),
                placeholder: self.inner.placeholder.clone(),
                input_value: h.ui.input_value(g),
                pointed: h.pointer.item(g),
            }
        })
    }

    pub fn root_attrs(&self) -> AttrBag {
        attrs::root(&self.inner.ids, &self.attr_state())
    }

    pub fn input_attrs(&self) -> AttrBag {
        attrs::input(&self.inner.ids, &self.attr_state())
    }

    pub fn list_attrs(&self) -> AttrBag {
        attrs::list(&self.inner.ids, &self.attr_state())
    }

    pub fn option_attrs(&self, option: &ItemState) -> AttrBag {
        attrs::option(&self.inner.ids, &self.attr_state(), option)
    }

    // =========================================================================
    // INTERACTION
    // =========================================================================

    /// Text typed into the input
    pub fn type_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.with(|g, h, rt| h.ui.type_text(g, rt, text));
    }

    pub fn on_key(&self, input: KeyInput) -> KeyResponse {
        self.with(|g, h, rt| h.ui.on_key(g, rt, input))
    }

    pub fn focus_in(&self) {
        self.with(|g, h, _| h.ui.focus_in(g));
    }

    /// Focus left an element; `still_within` when it moved inside the widget
    pub fn focus_out(&self, still_within: bool) {
        self.with(|g, h, rt| h.ui.focus_out(g, rt, still_within));
    }

    pub fn open(&self) {
        self.with(|g, h, _| h.ui.open(g));
    }

    pub fn close(&self) {
        self.with(|g, h, _| h.ui.close(g));
    }

    /// Select options as if clicked: tags are kept as options, single selects
    /// close and the phrase is cleared
    pub fn select(&self, items: Vec<Item>) -> Option<Commit> {
        self.with(|g, h, rt| h.ui.select(g, rt, Some(items)))
    }

    /// Select the pointed candidate
    pub fn select_pointed(&self) -> Option<Commit> {
        self.with(|g, h, rt| h.ui.select(g, rt, None))
    }

    pub fn step(&self, step: impl Into<Step>) {
        self.with(|g, h, _| h.pointer.step(g, step));
    }

    pub fn set_pointer(&self, index: isize) {
        self.with(|g, h, _| h.pointer.set_index(g, index));
    }

    /// Show one more page of candidates
    pub fn load_more(&self) {
        self.with(|g, h, _| h.ui.load_more(g));
    }

    /// Fetch the source again
    pub fn refresh(&self) {
        self.with(|g, h, _| h.src.refresh(g));
    }

    /// Add client side options
    pub fn push_tags(&self, items: Vec<Item>) {
        self.with(|g, h, _| h.src.push_tags(g, items));
    }

    // =========================================================================
    // SELECTION
    // =========================================================================

    pub fn append(&self, items: Vec<Item>) -> Result<Commit> {
        checked(self.with(|g, h, rt| h.model.append(g, rt, items)))
    }

    pub fn toggle(&self, items: Vec<Item>) -> Result<Commit> {
        checked(self.with(|g, h, rt| h.model.toggle(g, rt, items)))
    }

    pub fn pop(&self) -> Result<Commit> {
        checked(self.with(|g, h, rt| h.model.pop(g, rt)))
    }

    pub fn clear(&self) -> Result<Commit> {
        checked(self.with(|g, h, rt| h.model.clear(g, rt)))
    }

    pub fn remove(&self, position: usize) -> Result<Commit> {
        checked(self.with(|g, h, rt| h.model.remove(g, rt, position)))
    }

    /// Item for a source record under the current mapping
    pub fn item_of_raw(&self, raw: Value) -> Item {
        self.with(|g, h, _| h.item.factory(g).of_raw(raw))
    }

    /// Item for a model value under the current mapping
    pub fn item_of_value(&self, value: Value) -> Result<Item> {
        self.with(|g, h, _| h.item.factory(g).of_value(value))
    }

    pub fn item_of_phrase(&self, phrase: &str) -> Item {
        self.with(|g, h, _| h.item.factory(g).of_phrase(phrase))
    }

    // =========================================================================
    // RECONFIGURATION
    // =========================================================================

    pub fn set_src(&self, src: impl Into<Source>) {
        let src = src.into();
        self.with(|g, h, _| h.src.set_src(g, src));
    }

    pub fn set_params(&self, params: BTreeMap<String, String>) {
        self.with(|g, h, _| h.src.set_params(g, params));
    }

    pub fn set_parse(&self, parse: ParseSpec) {
        self.with(|g, h, _| h.src.set_parse(g, parse));
    }

    pub fn set_fetcher(&self, fetcher: Arc<dyn Fetcher>) {
        self.with(|g, h, _| h.src.set_fetcher(g, fetcher));
    }

    pub fn set_item_as(&self, spec: impl Into<AsSpec>) {
        let spec = spec.into();
        self.with(|g, h, _| h.item.set_spec(g, spec));
    }

    pub fn set_mode(&self, mode: SelectionMode) {
        self.with(|g, h, _| h.items.set_mode(g, mode));
    }

    pub fn set_filter(&self, filter: impl Into<FilterSpec>) {
        let filter = filter.into();
        self.with(|g, h, _| h.items.set_filter(g, filter));
    }

    pub fn set_tagging(&self, tagging: impl Into<Tagging>) {
        let tagging = tagging.into();
        self.with(|g, h, _| h.items.set_tagging(g, tagging));
    }

    pub fn set_tag_on(&self, keys: &str) {
        let keys = parse_keys(keys);
        self.with(|g, h, _| h.items.set_tag_on(g, keys));
    }

    pub fn set_disable(&self, disable: Option<DisableFn>) {
        self.with(|g, h, _| h.items.set_disable(g, disable));
    }

    pub fn set_multiple(&self, multiple: Option<bool>) {
        self.with(|g, h, _| h.model.set_multiple(g, multiple));
    }

    pub fn set_resolve(&self, resolve: Resolve) {
        self.with(|g, h, _| h.model.set_resolve(g, resolve));
    }

    /// Value decided by the owner; it must map through the current `as` slots
    pub fn set_model_value(&self, value: Value) -> Result<()> {
        self.with(|g, h, _| {
            h.model.validate(g, &value)?;
            h.model.set_external(g, value);
            Ok(())
        })
    }

    /// Phrase decided by the owner
    pub fn set_phrase(&self, phrase: impl Into<String>) {
        let phrase = phrase.into();
        self.with(|g, h, _| h.phrase.set_external(g, phrase));
    }

    pub fn set_valid(&self, valid: impl Into<ValidSpec>) -> Result<()> {
        let predicate = self.inner.validators.compile(&valid.into())?;
        self.with(|g, h, _| h.phrase.set_validator(g, predicate));
        Ok(())
    }

    pub fn set_debounce(&self, debounce: impl Into<Debounce>) {
        let debounce = debounce.into();
        self.with(|g, h, _| h.phrase.set_debounce(g, debounce));
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.with(|g, h, _| h.ui.flags().set_disabled(g, disabled));
    }

    pub fn set_readonly(&self, readonly: bool) {
        self.with(|g, h, _| h.ui.flags().set_readonly(g, readonly));
    }

    pub fn set_typeahead(&self, typeahead: bool) {
        self.with(|g, h, _| h.ui.set_typeahead(g, typeahead));
    }

    pub fn set_limit(&self, limit: Option<usize>) {
        self.with(|g, h, _| h.ui.set_limit(g, limit));
    }

    pub fn set_autopoint(&self, autopoint: bool) {
        self.with(|g, h, _| h.pointer.set_autopoint(g, autopoint));
    }
}
